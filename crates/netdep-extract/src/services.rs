//! Service discovery and per-service analysis.

use std::path::{Path, PathBuf};

use netdep_schemas::Discovery;
use tracing::instrument;

use crate::annotations::{AnnotationKind, apply_annotations};
use crate::bus::scan_service;
use crate::config::AnalyserConfig;
use crate::error::{ExtractError, ExtractErrorKind};
use crate::loader::{ProgramLoader, load_program};
use crate::walker::walk_service;

/// A service: an immediate subdirectory of the service directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// Last path segment of `dir`.
    pub name: String,
    pub dir: PathBuf,
}

/// Lists the services below `service_dir`, ordered by name.
pub fn find_services(service_dir: &Path) -> Result<Vec<Service>, ExtractError> {
    let mut services = Vec::new();
    for entry in std::fs::read_dir(service_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        services.push(Service {
            name,
            dir: entry.path(),
        });
    }
    if services.is_empty() {
        return Err(ExtractError::new(ExtractErrorKind::NoServices));
    }
    services.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(services)
}

/// Loads, walks and scans one service, then applies its annotations.
#[instrument(skip_all, fields(service = %service.name))]
pub(crate) fn analyse_service(
    loader: &dyn ProgramLoader,
    project_dir: &Path,
    service: &Service,
    config: &AnalyserConfig,
) -> Result<Discovery, ExtractError> {
    let program = load_program(loader, project_dir, &service.dir, &service.name)?;
    let mut discovery = walk_service(&program, &service.name, config);

    apply_annotations(
        &mut discovery.clients,
        &config.annotations,
        AnnotationKind::Client,
    );
    apply_annotations(
        &mut discovery.endpoints,
        &config.annotations,
        AnnotationKind::Endpoint,
    );
    discovery.bus_calls = scan_service(&service.name, &service.dir);

    Ok(discovery)
}
