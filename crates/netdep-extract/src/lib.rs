//! Discovery of network calls in Go services.
//!
//! Each immediate subdirectory of a service directory is one service. For
//! every service the crate loads its SSA program, walks the call graph from
//! `main`, and records outbound HTTP requests (clients) and registered routes
//! and listening ports (endpoints). Unresolved targets are repaired from
//! `//netdep:` comment annotations, and message-bus producers and consumers
//! are collected from the syntax tree.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use netdep_extract::{AnalyserConfig, DumpLoader, discover};
//!
//! let discovery = discover(
//!     Path::new("."),
//!     Path::new("./svc"),
//!     &DumpLoader,
//!     &AnalyserConfig::default(),
//! )
//! .unwrap();
//! println!("{} client calls", discovery.clients.len());
//! ```

mod annotations;
mod bus;
mod config;
mod env;
mod error;
mod frame;
mod loader;
mod registry;
mod resolver;
mod services;
mod sources;
mod walker;

use std::path::{Path, PathBuf};

// Re-export schema types for convenience.
#[doc(inline)]
pub use netdep_schemas::{BusCall, BusRole, CallTarget, Discovery, TraceEntry};
use rayon::prelude::*;
use tracing::{info, instrument};

pub use crate::annotations::{
    ANNOTATION_PREFIX, Annotation, AnnotationKind, apply_annotations,
    collect_annotations,
};
pub use crate::bus::scan_service;
pub use crate::config::{
    AnalyserConfig, AnnotationMap, DEFAULT_MAX_DEPTH, EnvMap, ServiceAnnotations,
};
pub use crate::env::{parse_env, read_env_file};
#[doc(inline)]
pub use crate::error::ExtractError;
use crate::error::ExtractErrorKind;
pub use crate::loader::{BridgeLoader, DUMP_FILE_NAME, DumpLoader, ProgramLoader};
pub use crate::registry::{DiscoveryAction, FORMATTER};
pub use crate::resolver::Resolution;
pub use crate::services::{Service, find_services};
pub use crate::sources::normalise_path;
pub use crate::walker::walk_service;

/// Runs discovery over every service below `service_dir`.
///
/// Services are analysed in parallel; the result lists services in name
/// order, and each service's calls in the order the walk found them.
///
/// # Errors
///
/// Returns [`ExtractError`] if:
/// - A directory does not exist ([`ExtractError::is_invalid_project_directory`],
///   [`ExtractError::is_invalid_service_directory`])
/// - There are no services ([`ExtractError::is_no_services`])
/// - A service cannot be loaded ([`ExtractError::is_load`],
///   [`ExtractError::is_no_usable_packages`], [`ExtractError::is_missing_entry`])
#[instrument(skip(loader, config))]
pub fn discover(
    project_dir: &Path,
    service_dir: &Path,
    loader: &dyn ProgramLoader,
    config: &AnalyserConfig,
) -> Result<Discovery, ExtractError> {
    // Step 1: validate the input directories. Canonical paths make source
    // file names match the positions the SSA bridge reports.
    let project_dir = canonical_dir(project_dir).ok_or_else(|| {
        ExtractError::new(ExtractErrorKind::InvalidProjectDirectory(
            project_dir.to_path_buf(),
        ))
    })?;
    let service_dir = canonical_dir(service_dir).ok_or_else(|| {
        ExtractError::new(ExtractErrorKind::InvalidServiceDirectory(
            service_dir.to_path_buf(),
        ))
    })?;

    // Step 2: list the services.
    let services = find_services(&service_dir)?;
    info!(count = services.len(), "found services");

    // Step 3: collect annotations from every service's sources.
    let annotations: AnnotationMap = services
        .par_iter()
        .map(|service| {
            let found = collect_annotations(&service.name, &service.dir, config.verbose);
            (service.name.clone(), found)
        })
        .collect();
    let config = config.clone().with_annotations(annotations);

    // Step 4: analyse each service. Collecting into a Vec keeps service
    // order; the first error aborts the run.
    let per_service = services
        .par_iter()
        .map(|service| services::analyse_service(loader, &project_dir, service, &config))
        .collect::<Result<Vec<_>, _>>()?;

    // Step 5: merge.
    let mut discovery = Discovery::default();
    for found in per_service {
        discovery.extend(found);
    }
    info!(
        clients = discovery.clients.len(),
        endpoints = discovery.endpoints.len(),
        bus_calls = discovery.bus_calls.len(),
        "discovery finished"
    );
    Ok(discovery)
}

fn canonical_dir(path: &Path) -> Option<PathBuf> {
    let canonical = path.canonicalize().ok()?;
    canonical.is_dir().then_some(canonical)
}
