//! Go source files of a service and their syntax trees.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tree_sitter::{Parser, Tree};
use walkdir::WalkDir;

use tracing::warn;

/// Non-test `.go` files below `dir`, in file-name order.
pub(crate) fn go_sources(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| is_go_source(path))
        .collect()
}

fn is_go_source(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".go") && !name.ends_with("_test.go")
}

/// A parser for Go.
pub(crate) fn go_parser() -> anyhow::Result<Parser> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .context("failed to load the Go grammar")?;
    Ok(parser)
}

/// Reads and parses one source file.
pub(crate) fn parse_file(parser: &mut Parser, path: &Path) -> anyhow::Result<(String, Tree)> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let tree = parser
        .parse(&source, None)
        .with_context(|| format!("failed to parse '{}'", path.display()))?;
    Ok((source, tree))
}

/// File path in the form used for annotation keys: forward slashes only.
pub fn normalise_path(path: &str) -> String {
    path.replace('\\', "/")
}
