//! Comment annotations and the fallback that applies them.
//!
//! When a URL cannot be resolved statically, the developer can state it in
//! a comment on the line before the call:
//!
//! ```go
//! //netdep:client url=http://payments:8080/charge targetSvc=payments
//! resp, err := client.Do(req)
//! ```
//!
//! Endpoints use `//netdep:endpoint url=<path>`.

use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use netdep_schemas::CallTarget;
use tracing::{debug, info, warn};
use tree_sitter::Tree;

use crate::config::{AnnotationMap, ServiceAnnotations};
use crate::sources::{go_parser, go_sources, normalise_path, parse_file};

/// Marker that starts an annotation comment.
pub const ANNOTATION_PREFIX: &str = "//netdep:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    Client,
    Endpoint,
}

/// A parsed annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub url: Option<String>,
    pub target_service: Option<String>,
}

impl FromStr for Annotation {
    type Err = anyhow::Error;

    /// Parses the text after [`ANNOTATION_PREFIX`], e.g.
    /// `client url=http://b/ targetSvc=b`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split_whitespace();
        let kind = match tokens.next() {
            Some("client") => AnnotationKind::Client,
            Some("endpoint") => AnnotationKind::Endpoint,
            Some(other) => bail!("unknown annotation kind '{other}'"),
            None => bail!("empty annotation"),
        };

        let mut annotation = Annotation {
            kind,
            url: None,
            target_service: None,
        };
        for pair in tokens {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed pair '{pair}'"))?;
            match key {
                "url" => annotation.url = Some(value.to_string()),
                "targetSvc" => annotation.target_service = Some(value.to_string()),
                _ => debug!(key, "ignoring unknown annotation key"),
            }
        }
        Ok(annotation)
    }
}

/// Collects the annotations in every Go source file of a service.
///
/// Keys use the file path as found below `service_dir` (normalised) and the
/// line of the comment. Malformed annotations are logged and skipped.
pub fn collect_annotations(
    service: &str,
    service_dir: &Path,
    verbose: bool,
) -> ServiceAnnotations {
    let mut annotations = ServiceAnnotations::new();
    let mut parser = match go_parser() {
        Ok(parser) => parser,
        Err(err) => {
            warn!(error = %err, "cannot collect annotations");
            return annotations;
        }
    };

    for path in go_sources(service_dir) {
        let (source, tree) = match parse_file(&mut parser, &path) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "skipping file");
                continue;
            }
        };
        let file = normalise_path(&path.to_string_lossy());
        for (line, value) in annotation_comments(&source, &tree) {
            if let Err(err) = value.parse::<Annotation>() {
                warn!(service, file = %file, line, error = %err, "ignoring malformed annotation");
                continue;
            }
            if verbose {
                info!(service, file = %file, line, annotation = %value, "discovered annotation");
            }
            annotations.insert((file.clone(), line), value);
        }
    }
    annotations
}

/// `(line, text after the prefix)` of every annotation comment in a tree.
fn annotation_comments(source: &str, tree: &Tree) -> Vec<(u32, String)> {
    let mut found = Vec::new();
    let mut cursor = tree.walk();
    loop {
        let node = cursor.node();
        if node.kind() == "comment"
            && let Ok(text) = node.utf8_text(source.as_bytes())
            && let Some(rest) = text.strip_prefix(ANNOTATION_PREFIX)
        {
            let line = u32::try_from(node.start_position().row + 1).unwrap_or(u32::MAX);
            found.push((line, rest.trim().to_string()));
        }

        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return found;
            }
        }
    }
}

/// Repairs unresolved targets from annotations of `kind` on the line before
/// their innermost call. Resolved targets and annotations of the other kind
/// are left alone. Returns the number of targets updated.
pub fn apply_annotations(
    targets: &mut [CallTarget],
    annotations: &AnnotationMap,
    kind: AnnotationKind,
) -> usize {
    let mut applied = 0;
    for target in targets.iter_mut().filter(|t| !t.is_resolved) {
        let Some(service_annotations) = annotations.get(&target.service_name) else {
            continue;
        };
        let Some(key) = target
            .innermost()
            .and_then(|e| Some((normalise_path(&e.file), e.line.checked_sub(1)?)))
        else {
            continue;
        };
        let Some(raw) = service_annotations.get(&key) else {
            continue;
        };

        match raw.parse::<Annotation>() {
            Ok(annotation) if annotation.kind != kind => {
                debug!(
                    location = %target.location(),
                    expected = ?kind,
                    found = ?annotation.kind,
                    "annotation kind does not match call"
                );
            }
            Ok(annotation) => {
                if let Some(url) = annotation.url {
                    target.resolve_to(url);
                }
                if annotation.target_service.is_some() {
                    target.target_service = annotation.target_service;
                }
                debug!(
                    service = %target.service_name,
                    location = %target.location(),
                    url = %target.request_location,
                    "applied annotation"
                );
                applied += 1;
            }
            Err(err) => {
                warn!(location = %target.location(), error = %err, "ignoring malformed annotation");
            }
        }
    }
    applied
}
