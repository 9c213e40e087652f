//! Message-bus calls found by syntax alone.
//!
//! A call `x.<M>(...)` is a producer when `M` contains `NotifyMsg` and a
//! consumer when it contains `Subscribe`. Its subject is the first argument
//! of the form `pkg.<Name>Subject`; calls without one are dropped.

use std::path::Path;

use netdep_schemas::{BusCall, BusRole};
use tracing::{debug, warn};
use tree_sitter::{Node, Tree};

use crate::sources::{go_parser, go_sources, normalise_path, parse_file};

const PRODUCER_MARKER: &str = "NotifyMsg";
const CONSUMER_MARKER: &str = "Subscribe";
const SUBJECT_SUFFIX: &str = "Subject";

/// Scans every Go source file of a service for message-bus calls.
pub fn scan_service(service: &str, service_dir: &Path) -> Vec<BusCall> {
    let mut parser = match go_parser() {
        Ok(parser) => parser,
        Err(err) => {
            warn!(error = %err, "cannot scan for message-bus calls");
            return Vec::new();
        }
    };

    let mut calls = Vec::new();
    for path in go_sources(service_dir) {
        let (source, tree) = match parse_file(&mut parser, &path) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "skipping file");
                continue;
            }
        };
        let file = normalise_path(&path.to_string_lossy());
        calls.extend(scan_tree(&source, &tree, service, &file));
    }
    debug!(service, calls = calls.len(), "message-bus scan finished");
    calls
}

fn scan_tree(source: &str, tree: &Tree, service: &str, file: &str) -> Vec<BusCall> {
    let mut calls = Vec::new();
    let mut cursor = tree.walk();
    loop {
        let node = cursor.node();
        if node.kind() == "call_expression"
            && let Some((role, subject)) = classify_call(node, source.as_bytes())
        {
            calls.push(BusCall {
                role,
                subject,
                service_name: service.to_string(),
                file: file.to_string(),
                line: u32::try_from(node.start_position().row + 1).unwrap_or(u32::MAX),
            });
        }

        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return calls;
            }
        }
    }
}

fn classify_call(call: Node<'_>, source: &[u8]) -> Option<(BusRole, String)> {
    let function = call.child_by_field_name("function")?;
    if function.kind() != "selector_expression" {
        return None;
    }
    let method = function
        .child_by_field_name("field")?
        .utf8_text(source)
        .ok()?;
    let role = if method.contains(PRODUCER_MARKER) {
        BusRole::Producer
    } else if method.contains(CONSUMER_MARKER) {
        BusRole::Consumer
    } else {
        return None;
    };

    let arguments = call.child_by_field_name("arguments")?;
    let mut cursor = arguments.walk();
    let subject = arguments
        .named_children(&mut cursor)
        .filter(|arg| arg.kind() == "selector_expression")
        .filter_map(|arg| arg.child_by_field_name("field")?.utf8_text(source).ok())
        .find(|name| name.ends_with(SUBJECT_SUFFIX))?;
    Some((role, subject.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<BusCall> {
        let mut parser = go_parser().unwrap();
        let tree = parser.parse(source, None).unwrap();
        scan_tree(source, &tree, "orders", "/svc/orders/main.go")
    }

    #[test]
    fn test_producer_and_consumer() {
        let calls = scan(
            "package main\n\
             \n\
             func main() {\n\
             \tbus.NotifyMsg(events.OrderCreatedSubject, payload)\n\
             \tbus.Subscribe(events.PaymentDoneSubject, handle)\n\
             }\n",
        );

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].role, BusRole::Producer);
        assert_eq!(calls[0].subject, "OrderCreatedSubject");
        assert_eq!(calls[0].line, 4);
        assert_eq!(calls[1].role, BusRole::Consumer);
        assert_eq!(calls[1].subject, "PaymentDoneSubject");
        assert_eq!(calls[1].location(), "/svc/orders/main.go:5");
    }

    #[test]
    fn test_method_name_only_needs_to_contain_marker() {
        let calls = scan(
            "package main\n\
             func f() { c.QueueSubscribeSync(ctx, events.XSubject) }\n",
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].role, BusRole::Consumer);
        assert_eq!(calls[0].subject, "XSubject");
    }

    #[test]
    fn test_calls_without_subject_are_dropped() {
        let calls = scan(
            "package main\n\
             func f() {\n\
             \tbus.NotifyMsg(\"orders.created\", payload)\n\
             \tbus.Subscribe(events.Handler)\n\
             \tNotifyMsg(events.XSubject)\n\
             }\n",
        );
        assert!(calls.is_empty());
    }

    #[test]
    fn test_scan_service_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("main.go"),
            "package main\nfunc main() { bus.NotifyMsg(events.ASubject) }\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("main_test.go"),
            "package main\nfunc t() { bus.NotifyMsg(events.BSubject) }\n",
        )
        .unwrap();

        let calls = scan_service("orders", dir.path());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].subject, "ASubject");
        assert_eq!(calls[0].service_name, "orders");
    }
}
