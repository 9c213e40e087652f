//! SSA program loading.
//!
//! Go SSA is built outside of this workspace. A bridge program serializes
//! each service's SSA to JSON, either on demand ([`BridgeLoader`]) or ahead
//! of time into `ssa.json` next to the service's sources ([`DumpLoader`]).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, bail};
use netdep_schemas::ssa::Program;
use tracing::{debug, debug_span, warn};

use crate::error::{ExtractError, ExtractErrorKind};

/// File name of a serialized program inside a service directory.
pub const DUMP_FILE_NAME: &str = "ssa.json";

/// Produces the SSA program of one service.
pub trait ProgramLoader: Sync {
    fn load(&self, project_dir: &Path, service_dir: &Path) -> anyhow::Result<Program>;
}

/// Runs the bridge as `<command> -project <dir> -service <dir>` and reads
/// the program from its standard output.
#[derive(Debug, Clone)]
pub struct BridgeLoader {
    command: PathBuf,
}

impl BridgeLoader {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl ProgramLoader for BridgeLoader {
    fn load(&self, project_dir: &Path, service_dir: &Path) -> anyhow::Result<Program> {
        let output = Command::new(&self.command)
            .arg("-project")
            .arg(project_dir)
            .arg("-service")
            .arg(service_dir)
            .output()
            .with_context(|| {
                format!("failed to run SSA bridge '{}'", self.command.display())
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "SSA bridge exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        serde_json::from_slice(&output.stdout)
            .context("SSA bridge produced an invalid program")
    }
}

/// Reads `ssa.json` from the service directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DumpLoader;

impl ProgramLoader for DumpLoader {
    fn load(&self, _project_dir: &Path, service_dir: &Path) -> anyhow::Result<Program> {
        let path = service_dir.join(DUMP_FILE_NAME);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse '{}'", path.display()))
    }
}

/// Loads a service's program and checks it can be walked.
///
/// Errored packages are dropped with a warning. The run is aborted when no
/// package is usable or when the program has no `main` function.
pub(crate) fn load_program(
    loader: &dyn ProgramLoader,
    project_dir: &Path,
    service_dir: &Path,
    service: &str,
) -> Result<Program, ExtractError> {
    let _span = debug_span!("load_program", service).entered();

    let mut program = loader
        .load(project_dir, service_dir)
        .map_err(|err| ExtractError::load(service, err))?;

    for package in program.packages.iter().filter(|p| !p.errors.is_empty()) {
        warn!(
            service,
            package = %package.path,
            errors = package.errors.len(),
            "dropping package with errors"
        );
    }
    if !program.packages.is_empty() && program.usable_packages().next().is_none() {
        return Err(ExtractError::new(ExtractErrorKind::NoUsablePackages {
            service: service.to_string(),
        }));
    }

    if program.main_function().is_none() {
        let package = program
            .usable_packages()
            .next()
            .map_or_else(|| service.to_string(), |p| p.path.clone());
        return Err(ExtractError::new(ExtractErrorKind::MissingEntry { package }));
    }

    // Function ids index into `functions`, so the bodies of errored
    // packages are emptied in place. The walker never enters a function
    // without blocks.
    let errored: HashSet<String> = program
        .packages
        .iter()
        .filter(|p| !p.errors.is_empty())
        .map(|p| p.path.clone())
        .collect();
    for function in program
        .functions
        .iter_mut()
        .filter(|f| errored.contains(&f.package_path))
    {
        function.blocks.clear();
        function.values.clear();
    }
    program.packages.retain(|p| p.errors.is_empty());

    debug!(
        functions = program.functions.len(),
        packages = program.packages.len(),
        "program loaded"
    );
    Ok(program)
}
