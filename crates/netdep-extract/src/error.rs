//! Error types for the netdep-extract crate.

use std::backtrace::Backtrace;
use std::fmt;
use std::path::PathBuf;

/// Error type for network call discovery.
///
/// Covers the failures that abort a run: bad input paths, an unparsable
/// environment file, SSA loading problems, and output errors. Failures to
/// resolve a single value or to parse an annotation are not errors; they
/// are logged and surface as unresolved targets.
#[derive(Debug)]
pub struct ExtractError {
    kind: ExtractErrorKind,
    backtrace: Backtrace,
}

/// Internal error variants. Not exposed publicly; use `is_xxx()` methods instead.
#[derive(Debug)]
pub(crate) enum ExtractErrorKind {
    /// The project directory does not exist or is not a directory.
    InvalidProjectDirectory(PathBuf),
    /// The service directory does not exist or is not a directory.
    InvalidServiceDirectory(PathBuf),
    /// A line of the environment file is not `SERVICE.VAR=VALUE`.
    InvalidEnvFile { line: usize },
    /// The SSA program of a service could not be loaded.
    Load {
        service: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Every package of a service failed to load.
    NoUsablePackages { service: String },
    /// A service has no `main` function in a `main` package.
    MissingEntry { package: String },
    /// The service directory has no subdirectories.
    NoServices,
    /// I/O error.
    Io(std::io::Error),
}

impl ExtractError {
    /// Creates an error from an error kind, capturing a backtrace.
    pub(crate) fn new(kind: ExtractErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    pub(crate) fn load(
        service: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::new(ExtractErrorKind::Load {
            service: service.into(),
            source: source.into(),
        })
    }

    /// Returns true if the project directory is invalid.
    pub fn is_invalid_project_directory(&self) -> bool {
        matches!(self.kind, ExtractErrorKind::InvalidProjectDirectory(_))
    }

    /// Returns true if the service directory is invalid.
    pub fn is_invalid_service_directory(&self) -> bool {
        matches!(self.kind, ExtractErrorKind::InvalidServiceDirectory(_))
    }

    /// Returns true if the environment file could not be parsed.
    pub fn is_invalid_env_file(&self) -> bool {
        matches!(self.kind, ExtractErrorKind::InvalidEnvFile { .. })
    }

    /// Returns true if loading a service's SSA program failed.
    pub fn is_load(&self) -> bool {
        matches!(self.kind, ExtractErrorKind::Load { .. })
    }

    /// Returns true if no package of a service loaded cleanly.
    pub fn is_no_usable_packages(&self) -> bool {
        matches!(self.kind, ExtractErrorKind::NoUsablePackages { .. })
    }

    /// Returns true if a service lacks an entry point.
    pub fn is_missing_entry(&self) -> bool {
        matches!(self.kind, ExtractErrorKind::MissingEntry { .. })
    }

    /// Returns true if no services were found.
    pub fn is_no_services(&self) -> bool {
        matches!(self.kind, ExtractErrorKind::NoServices)
    }

    /// Returns true if this error is due to I/O failure.
    pub fn is_io(&self) -> bool {
        matches!(self.kind, ExtractErrorKind::Io(_))
    }

    /// Returns the backtrace captured when this error was created.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for ExtractErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractErrorKind::InvalidProjectDirectory(path) => {
                write!(f, "invalid project directory: {}", path.display())
            }
            ExtractErrorKind::InvalidServiceDirectory(path) => {
                write!(f, "invalid service directory: {}", path.display())
            }
            ExtractErrorKind::InvalidEnvFile { line } => {
                write!(f, "the file cannot be parsed (line {line})")
            }
            ExtractErrorKind::Load { service, source } => {
                write!(f, "failed to load service {service}: {source}")
            }
            ExtractErrorKind::NoUsablePackages { service } => {
                write!(f, "no usable packages found for service {service}")
            }
            ExtractErrorKind::MissingEntry { package } => {
                write!(f, "no main function found in package {package}")
            }
            ExtractErrorKind::NoServices => {
                write!(f, "no service to analyse were found")
            }
            ExtractErrorKind::Io(err) => {
                write!(f, "I/O error: {err}")
            }
        }
    }
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Summary of what happened.
        writeln!(f, "{}", self.kind)?;

        // Backtrace (will be empty unless RUST_BACKTRACE is set).
        write!(f, "{}", self.backtrace)
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ExtractErrorKind::Load { source, .. } => Some(source.as_ref()),
            ExtractErrorKind::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ExtractError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ExtractErrorKind::Io(err))
    }
}
