//! Tests for the `netdep` binary.
//!
//! Each test lays out services with serialized SSA dumps in a temporary
//! directory and runs the binary against it.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use netdep_schemas::AdjacencyList;
use netdep_schemas::ssa::Program;
use netdep_schemas::ssa::builder::ProgramBuilder;
use tempfile::TempDir;

const HTTP: &str = "net/http";

fn netdep_bin() -> &'static str {
    env!("CARGO_BIN_EXE_netdep")
}

fn write_service(root: &Path, service: &str, program: &Program) {
    let dir = root.join("svc").join(service);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("ssa.json"), serde_json::to_string(program).unwrap()).unwrap();
}

fn source_file(root: &Path, service: &str) -> String {
    root.join("svc")
        .join(service)
        .join("main.go")
        .to_string_lossy()
        .into_owned()
}

/// `gateway` calls `http://orders:8080/orders`, and `orders` serves that
/// path on port 8080.
fn gateway_and_orders() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();

    let mut p = ProgramBuilder::new();
    let get = p.external(HTTP, "Get");
    let mut main = p
        .declare("example.com/shop/svc/gateway", "main", "main")
        .in_file(&source_file(&root, "gateway"));
    let url = main.const_str("http://orders:8080/orders");
    main.call(get, &[url], 6);
    main.ret();
    p.define(main);
    write_service(&root, "gateway", &p.build());

    let mut p = ProgramBuilder::new();
    let handle = p.external(HTTP, "Handle");
    let listen = p.external(HTTP, "ListenAndServe");
    let mut main = p
        .declare("example.com/shop/svc/orders", "main", "main")
        .in_file(&source_file(&root, "orders"));
    let path = main.const_str("/orders");
    let handler = main.nil("net/http.Handler");
    main.call(handle, &[path, handler], 10);
    let port = main.const_str(":8080");
    let mux = main.nil("net/http.Handler");
    main.call(listen, &[port, mux], 11);
    main.ret();
    p.define(main);
    write_service(&root, "orders", &p.build());

    (dir, root)
}

fn run_netdep(root: &Path, args: &[&str]) -> Output {
    Command::new(netdep_bin())
        .arg("-p")
        .arg(root)
        .arg("-s")
        .arg(root.join("svc"))
        .args(args)
        .output()
        .expect("failed to run netdep")
}

#[test]
fn test_prints_adjacency_list() {
    let (_dir, root) = gateway_and_orders();
    let output = run_netdep(&root, &[]);
    assert!(
        output.status.success(),
        "netdep failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let list: AdjacencyList = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(list.services().collect::<Vec<_>>(), vec!["gateway", "orders"]);
    let peers = list.peers("gateway").unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].service, "orders");
    assert_eq!(peers[0].calls[0].url, "http://orders:8080/orders");
    assert_eq!(
        peers[0].calls[0].location,
        format!("{}:6", source_file(&root, "gateway"))
    );
}

#[test]
fn test_writes_output_file() {
    let (_dir, root) = gateway_and_orders();
    let out = root.join("graph.json");
    let output = run_netdep(&root, &["-o", out.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(output.stdout.is_empty());

    let list: AdjacencyList =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(list.call_count(), 1);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&out).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[test]
fn test_environment_file_resolves_getenv() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();

    let mut p = ProgramBuilder::new();
    let get = p.external(HTTP, "Get");
    let getenv = p.external("os", "Getenv");
    let mut main = p
        .declare("example.com/shop/svc/gateway", "main", "main")
        .in_file(&source_file(&root, "gateway"));
    let name = main.const_str("ORDERS_URL");
    let url = main.call(getenv, &[name], 5);
    main.call(get, &[url], 5);
    main.ret();
    p.define(main);
    write_service(&root, "gateway", &p.build());

    let env = root.join("env");
    std::fs::write(&env, "# urls\ngateway.ORDERS_URL=http://orders:80/\n").unwrap();

    let output = run_netdep(&root, &["-e", env.to_str().unwrap()]);
    assert!(output.status.success());
    let list: AdjacencyList = serde_json::from_slice(&output.stdout).unwrap();
    let peers = list.peers("gateway").unwrap();
    assert_eq!(peers[0].service, "UnknownService");
    assert_eq!(peers[0].calls[0].url, "http://orders:80/");
}

#[test]
fn test_invalid_environment_file_fails() {
    let (_dir, root) = gateway_and_orders();
    let env = root.join("env");
    std::fs::write(&env, "not an assignment\n").unwrap();

    let output = run_netdep(&root, &["-e", env.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("the file cannot be parsed"), "{stderr}");
}

#[test]
fn test_missing_service_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(netdep_bin())
        .arg("-p")
        .arg(dir.path())
        .arg("-s")
        .arg(dir.path().join("nope"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_empty_service_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("svc")).unwrap();
    let output = run_netdep(dir.path(), &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no service to analyse were found"), "{stderr}");
}

#[test]
fn test_man_page() {
    let output = Command::new(netdep_bin()).arg("man").output().unwrap();
    assert!(output.status.success());
    let page = String::from_utf8_lossy(&output.stdout);
    assert!(page.contains(".TH netdep"));
    assert!(page.contains("service\\-directory"));
}
