//! Error types for the netdep-match crate.

use std::backtrace::Backtrace;
use std::fmt;

/// Error type for writing the dependency graph.
///
/// Matching itself cannot fail; unmatched calls become edges to the unknown
/// service. Only writing the result does.
#[derive(Debug)]
pub struct MatchError {
    kind: MatchErrorKind,
    backtrace: Backtrace,
}

/// Internal error variants. Not exposed publicly; use `is_xxx()` methods.
#[derive(Debug)]
pub(crate) enum MatchErrorKind {
    /// Failed to serialize output to JSON.
    Serialization(serde_json::Error),
    /// I/O error when writing output.
    Io(std::io::Error),
}

impl MatchError {
    pub(crate) fn new(kind: MatchErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    pub fn is_serialization(&self) -> bool {
        matches!(self.kind, MatchErrorKind::Serialization(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self.kind, MatchErrorKind::Io(_))
    }

    /// Returns the backtrace captured when this error was created.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for MatchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchErrorKind::Serialization(err) => {
                write!(f, "failed to serialize output: {err}")
            }
            MatchErrorKind::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind)?;

        // Backtrace (empty unless RUST_BACKTRACE is set).
        write!(f, "{}", self.backtrace)
    }
}

impl std::error::Error for MatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            MatchErrorKind::Serialization(err) => Some(err),
            MatchErrorKind::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for MatchError {
    fn from(err: std::io::Error) -> Self {
        Self::new(MatchErrorKind::Io(err))
    }
}

impl From<serde_json::Error> for MatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(MatchErrorKind::Serialization(err))
    }
}
