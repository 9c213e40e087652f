//! Integration tests for netdep-extract.
//!
//! Each test lays out a project in a temporary directory: one directory per
//! service below `svc/`, holding the service's serialized SSA program
//! (`ssa.json`, read by `DumpLoader`) and any Go sources needed for
//! annotations and message-bus scanning.

use std::collections::BTreeMap;
use std::path::PathBuf;

use netdep_extract::{
    AnalyserConfig, BusRole, DUMP_FILE_NAME, Discovery, DumpLoader, EnvMap,
    discover,
};
use netdep_schemas::ssa::Program;
use netdep_schemas::ssa::builder::{FunctionBuilder, ProgramBuilder};
use tempfile::TempDir;

const HTTP: &str = "net/http";

struct Project {
    _dir: TempDir,
    root: PathBuf,
}

impl Project {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("svc")).unwrap();
        Self { _dir: dir, root }
    }

    fn service_dir(&self, service: &str) -> PathBuf {
        self.root.join("svc").join(service)
    }

    /// Absolute path of a source file of `service`, as the bridge reports it.
    fn file(&self, service: &str, name: &str) -> String {
        self.service_dir(service)
            .join(name)
            .to_string_lossy()
            .into_owned()
    }

    fn add_service(&self, service: &str, program: &Program, sources: &[(&str, &str)]) {
        let dir = self.service_dir(service);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(DUMP_FILE_NAME),
            serde_json::to_string(program).unwrap(),
        )
        .unwrap();
        for (name, content) in sources {
            std::fs::write(dir.join(name), content).unwrap();
        }
    }

    fn discover(&self, config: &AnalyserConfig) -> Discovery {
        discover(&self.root, &self.root.join("svc"), &DumpLoader, config)
            .expect("discover() should succeed")
    }
}

/// A program whose `main` is built by `body`.
fn program_with_main(
    service: &str,
    file: &str,
    body: impl FnOnce(&mut ProgramBuilder, &mut FunctionBuilder),
) -> Program {
    let mut p = ProgramBuilder::new();
    let mut main = p
        .declare(&format!("example.com/shop/svc/{service}"), "main", "main")
        .in_file(file);
    body(&mut p, &mut main);
    main.ret();
    p.define(main);
    p.build()
}

/// `main` calls `http.Get("http://example.com/")`.
#[test]
fn test_basic_call() {
    let project = Project::new();
    let file = project.file("basic_call", "main.go");
    let program = program_with_main("basic_call", &file, |p, main| {
        let get = p.external(HTTP, "Get");
        let url = main.const_str("http://example.com/");
        main.call(get, &[url], 8);
    });
    project.add_service("basic_call", &program, &[]);

    let discovery = project.discover(&AnalyserConfig::default());

    assert_eq!(discovery.clients.len(), 1);
    let target = &discovery.clients[0];
    assert_eq!(target.method_name, "net/http.Get");
    assert_eq!(target.package_name, "net/http");
    assert_eq!(target.service_name, "basic_call");
    assert_eq!(target.request_location, "http://example.com/");
    assert!(target.is_resolved);
    assert_eq!(target.trace.last().unwrap().line, 8);
    assert!(target.trace.last().unwrap().file.starts_with(
        project.service_dir("basic_call").to_string_lossy().as_ref()
    ));
}

/// `main` calls `wrapped(c, "http://example.com/")`, which calls
/// `c.Get(url + "endpoint")`.
#[test]
fn test_wrapped_client() {
    let project = Project::new();
    let file = project.file("wrapped_client", "main.go");

    let mut p = ProgramBuilder::new();
    let get = p.external_method("*net/http.Client", HTTP, "Get");
    let mut wrapped = p
        .declare("example.com/shop/svc/wrapped_client", "main", "wrapped")
        .in_file(&file);
    let client = wrapped.param("c", "*net/http.Client");
    let url = wrapped.param("url", "string");
    let suffix = wrapped.const_str("endpoint");
    let url2 = wrapped.add(url, suffix);
    wrapped.call(get, &[client, url2], 14);
    wrapped.ret();
    let wrapped_id = wrapped.id();
    p.define(wrapped);

    let mut main = p
        .declare("example.com/shop/svc/wrapped_client", "main", "main")
        .in_file(&file);
    let client = main.alloc("*net/http.Client");
    let url = main.const_str("http://example.com/");
    main.call(wrapped_id, &[client, url], 8);
    main.ret();
    p.define(main);
    project.add_service("wrapped_client", &p.build(), &[]);

    let discovery = project.discover(&AnalyserConfig::default());

    assert_eq!(discovery.clients.len(), 1);
    let target = &discovery.clients[0];
    assert_eq!(target.method_name, "(*net/http.Client).Get");
    assert_eq!(target.request_location, "http://example.com/endpoint");
    assert!(target.is_resolved);
    assert!(target.trace.len() >= 2);
    assert_eq!(target.trace[0].line, 8);
    assert_eq!(target.trace.last().unwrap().line, 14);
}

/// `main` calls `http.Get(os.Getenv("FOO"))` with FOO set for the service.
#[test]
fn test_env_variable() {
    let project = Project::new();
    let file = project.file("env_variable", "main.go");
    let program = program_with_main("env_variable", &file, |p, main| {
        let get = p.external(HTTP, "Get");
        let getenv = p.external("os", "Getenv");
        let name = main.const_str("FOO");
        let url = main.call(getenv, &[name], 7);
        main.call(get, &[url], 7);
    });
    project.add_service("env_variable", &program, &[]);

    let env = EnvMap::from([(
        "env_variable".to_string(),
        BTreeMap::from([(
            "FOO".to_string(),
            "http://example.com/endpoint".to_string(),
        )]),
    )]);
    let discovery = project.discover(&AnalyserConfig::default().with_env(env));

    assert_eq!(discovery.clients.len(), 1);
    assert_eq!(
        discovery.clients[0].request_location,
        "http://example.com/endpoint"
    );
    assert!(discovery.clients[0].is_resolved);
}

/// `http.Get` followed by `http.PostForm` yields two targets in source order.
#[test]
fn test_multiple_calls() {
    let project = Project::new();
    let file = project.file("multiple_calls", "main.go");
    let program = program_with_main("multiple_calls", &file, |p, main| {
        let get = p.external(HTTP, "Get");
        let post_form = p.external(HTTP, "PostForm");
        let first = main.const_str("http://example.com/");
        main.call(get, &[first], 8);
        let second = main.const_str("http://example2.com/form");
        let form = main.nil("net/url.Values");
        main.call(post_form, &[second, form], 9);
    });
    project.add_service("multiple_calls", &program, &[]);

    let discovery = project.discover(&AnalyserConfig::default());

    let urls: Vec<_> = discovery
        .clients
        .iter()
        .map(|t| t.request_location.as_str())
        .collect();
    assert_eq!(urls, vec!["http://example.com/", "http://example2.com/form"]);
    assert_eq!(discovery.clients[1].method_name, "net/http.PostForm");
}

fn handle_func_program(project: &Project, service: &str, call_directly: bool) -> Program {
    let file = project.file(service, "main.go");
    let mut p = ProgramBuilder::new();
    let get = p.external(HTTP, "Get");
    let handle_func = p.external(HTTP, "HandleFunc");

    let mut handler = p
        .declare(&format!("example.com/shop/svc/{service}"), "main", "handler")
        .in_file(&file);
    handler.param("w", "net/http.ResponseWriter");
    handler.param("r", "*net/http.Request");
    let url = handler.const_str("https://example.com/");
    handler.call(get, &[url], 20);
    handler.ret();
    let handler_id = handler.id();
    p.define(handler);

    let mut main = p
        .declare(&format!("example.com/shop/svc/{service}"), "main", "main")
        .in_file(&file);
    let path = main.const_str("/test");
    let func = main.func_ref(handler_id);
    main.call(handle_func, &[path, func], 8);
    if call_directly {
        let w = main.nil("net/http.ResponseWriter");
        let r = main.nil("*net/http.Request");
        main.call(handler_id, &[w, r], 9);
    }
    main.ret();
    p.define(main);
    p.build()
}

/// `http.HandleFunc("/test", handler)` where `handler` issues a request.
#[test]
fn test_handle_func_callback() {
    let project = Project::new();
    let program = handle_func_program(&project, "callback", false);
    project.add_service("callback", &program, &[]);

    let discovery = project.discover(&AnalyserConfig::default());

    assert_eq!(discovery.endpoints.len(), 1);
    assert_eq!(discovery.endpoints[0].request_location, "/test");
    assert_eq!(discovery.endpoints[0].service_name, "callback");

    assert_eq!(discovery.clients.len(), 1);
    let client = &discovery.clients[0];
    assert_eq!(client.request_location, "https://example.com/");
    assert_eq!(client.service_name, "callback");
    // The trace starts at the registration site.
    assert_eq!(client.trace[0].line, 8);
    assert_eq!(client.trace.last().unwrap().line, 20);
}

/// A handler that is both registered and called from `main` is reached
/// along two paths with different traces, so both targets are kept.
#[test]
fn test_handler_reached_twice_keeps_both_traces() {
    let project = Project::new();
    let program = handle_func_program(&project, "callback", true);
    project.add_service("callback", &program, &[]);

    let discovery = project.discover(&AnalyserConfig::default());

    assert_eq!(discovery.clients.len(), 2);
    let first_sites: Vec<_> = discovery.clients.iter().map(|t| t.trace[0].line).collect();
    assert_eq!(first_sites, vec![8, 9]);
    assert_ne!(discovery.clients[0].trace, discovery.clients[1].trace);
}

/// A client URL no endpoint exposes is still a resolved client target.
#[test]
fn test_unknown_target_is_resolved_client() {
    let project = Project::new();
    let file = project.file("lonely", "main.go");
    let program = program_with_main("lonely", &file, |p, main| {
        let get = p.external(HTTP, "Get");
        let url = main.const_str("http://Nowhere:80/x");
        main.call(get, &[url], 5);
    });
    project.add_service("lonely", &program, &[]);

    let discovery = project.discover(&AnalyserConfig::default());
    assert_eq!(discovery.clients.len(), 1);
    assert_eq!(discovery.clients[0].request_location, "http://Nowhere:80/x");
    assert!(discovery.endpoints.is_empty());
}

/// An unresolvable URL is repaired by the annotation on the previous line.
#[test]
fn test_annotation_fallback() {
    let project = Project::new();
    let file = project.file("annotated", "main.go");
    let program = program_with_main("annotated", &file, |p, main| {
        let get = p.external(HTTP, "Get");
        let url = main.global("target", "*string");
        main.call(get, &[url], 5);
    });
    let source = "package main\n\
                  \n\
                  func main() {\n\
                  \t//netdep:client url=http://payments:80/charge targetSvc=payments\n\
                  \thttp.Get(*target)\n\
                  }\n";
    project.add_service("annotated", &program, &[("main.go", source)]);

    let discovery = project.discover(&AnalyserConfig::default());

    let target = &discovery.clients[0];
    assert!(target.is_resolved);
    assert_eq!(target.request_location, "http://payments:80/charge");
    assert_eq!(target.target_service.as_deref(), Some("payments"));
}

/// Message-bus calls are collected from every service's sources.
#[test]
fn test_bus_calls() {
    let project = Project::new();
    for service in ["orders", "shipping"] {
        let file = project.file(service, "main.go");
        let program = program_with_main(service, &file, |_, _| {});
        let source = if service == "orders" {
            "package main\nfunc main() { bus.NotifyMsg(events.OrderCreatedSubject, o) }\n"
        } else {
            "package main\nfunc main() { bus.Subscribe(events.OrderCreatedSubject, h) }\n"
        };
        project.add_service(service, &program, &[("main.go", source)]);
    }

    let discovery = project.discover(&AnalyserConfig::default());

    assert_eq!(discovery.bus_calls.len(), 2);
    assert_eq!(discovery.bus_calls[0].service_name, "orders");
    assert_eq!(discovery.bus_calls[0].role, BusRole::Producer);
    assert_eq!(discovery.bus_calls[1].service_name, "shipping");
    assert_eq!(discovery.bus_calls[1].role, BusRole::Consumer);
}

/// Two runs over the same input serialize identically.
#[test]
fn test_deterministic_output() {
    let project = Project::new();
    for (i, service) in ["c", "a", "b"].into_iter().enumerate() {
        let file = project.file(service, "main.go");
        let program = program_with_main(service, &file, |p, main| {
            let get = p.external(HTTP, "Get");
            let url = main.const_str(&format!("http://peer{i}/"));
            main.call(get, &[url], 3);
        });
        project.add_service(service, &program, &[]);
    }

    let first = serde_json::to_string(&project.discover(&AnalyserConfig::default())).unwrap();
    let second = serde_json::to_string(&project.discover(&AnalyserConfig::default())).unwrap();
    assert_eq!(first, second);

    let discovery: Discovery = serde_json::from_str(&first).unwrap();
    let services: Vec<_> = discovery
        .clients
        .iter()
        .map(|t| t.service_name.as_str())
        .collect();
    assert_eq!(services, vec!["a", "b", "c"]);
}

/// A service whose program has no `main` aborts the run.
#[test]
fn test_missing_entry_aborts() {
    let project = Project::new();
    let mut p = ProgramBuilder::new();
    let mut helper = p.declare("example.com/shop/svc/lib", "lib", "helper");
    helper.ret();
    p.define(helper);
    project.add_service("lib", &p.build(), &[]);

    let err = discover(
        &project.root,
        &project.root.join("svc"),
        &DumpLoader,
        &AnalyserConfig::default(),
    )
    .unwrap_err();
    assert!(err.is_missing_entry());
}

/// An empty service directory is an error.
#[test]
fn test_no_services() {
    let project = Project::new();
    let err = discover(
        &project.root,
        &project.root.join("svc"),
        &DumpLoader,
        &AnalyserConfig::default(),
    )
    .unwrap_err();
    assert!(err.is_no_services());
}
