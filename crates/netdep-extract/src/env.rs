//! Environment variable files.
//!
//! One assignment per line, `SERVICE.VAR=VALUE`. The value is everything
//! after the first `=` and may be empty. Blank lines and lines starting with
//! `#` are skipped.

use std::path::Path;

use tracing::debug;

use crate::config::EnvMap;
use crate::error::{ExtractError, ExtractErrorKind};

/// Parses the contents of an environment variable file.
pub fn parse_env(content: &str) -> Result<EnvMap, ExtractError> {
    let mut env = EnvMap::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let invalid =
            || ExtractError::new(ExtractErrorKind::InvalidEnvFile { line: number + 1 });

        let (key, value) = line.split_once('=').ok_or_else(invalid)?;
        let (service, variable) = key.trim().split_once('.').ok_or_else(invalid)?;
        if !is_identifier(service) || !is_identifier(variable) {
            return Err(invalid());
        }
        env.entry(service.to_string())
            .or_default()
            .insert(variable.to_string(), value.trim().to_string());
    }
    Ok(env)
}

/// Reads and parses an environment variable file.
pub fn read_env_file(path: &Path) -> Result<EnvMap, ExtractError> {
    let content = std::fs::read_to_string(path)?;
    let env = parse_env(&content)?;
    debug!(
        path = %path.display(),
        services = env.len(),
        "environment loaded"
    );
    Ok(env)
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
