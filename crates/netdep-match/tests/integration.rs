//! End-to-end tests for matching discovered calls into a dependency graph.

use netdep_match::{AdjacencyList, Discovery, build_graph, run};
use netdep_schemas::{BusCall, BusRole, CallTarget, TraceEntry, UNKNOWN_SERVICE};
use proptest::prelude::*;

fn target(service: &str, location: &str, line: u32) -> CallTarget {
    CallTarget {
        package_name: "net/http".to_string(),
        method_name: "net/http.Get".to_string(),
        service_name: service.to_string(),
        request_location: location.to_string(),
        is_resolved: !location.is_empty(),
        target_service: None,
        trace: vec![
            TraceEntry::new(format!("/svc/{service}/main.go"), 3),
            TraceEntry::new(format!("/svc/{service}/client.go"), line),
        ],
    }
}

fn render(discovery: &Discovery) -> serde_json::Value {
    let mut output = Vec::new();
    run(discovery, &mut output).unwrap();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn test_gateway_calls_two_backends() {
    let discovery = Discovery {
        clients: vec![
            target("gateway", "http://orders:8080/orders", 10),
            target("gateway", "http://payments:80/pay", 11),
            target("gateway", "http://orders:8080/orders", 12),
        ],
        endpoints: vec![
            target("orders", "/orders", 20),
            target("orders", ":8080", 21),
            target("payments", "/pay", 30),
        ],
        bus_calls: Vec::new(),
    };

    let json = render(&discovery);
    assert_eq!(
        json,
        serde_json::json!({
            "gateway": [
                {
                    "service": "orders",
                    "calls": [
                        {
                            "protocol": "HTTP",
                            "url": "http://orders:8080/orders",
                            "arguments": [],
                            "location": "/svc/gateway/client.go:10"
                        },
                        {
                            "protocol": "HTTP",
                            "url": "http://orders:8080/orders",
                            "arguments": [],
                            "location": "/svc/gateway/client.go:12"
                        }
                    ],
                    "count": 2
                },
                {
                    "service": "payments",
                    "calls": [
                        {
                            "protocol": "HTTP",
                            "url": "http://payments:80/pay",
                            "arguments": [],
                            "location": "/svc/gateway/client.go:11"
                        }
                    ],
                    "count": 1
                }
            ],
            "orders": [],
            "payments": []
        })
    );
}

#[test]
fn test_unresolved_clients_share_unknown_node() {
    let discovery = Discovery {
        clients: vec![
            target("a", "", 5),
            target("b", "", 6),
            target("b", "http://nowhere/x", 7),
        ],
        endpoints: Vec::new(),
        bus_calls: Vec::new(),
    };

    let graph = build_graph(&discovery);
    let unknown: Vec<_> = graph.nodes().filter(|n| n.is_unknown).collect();
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].service_name, UNKNOWN_SERVICE);
    assert_eq!(graph.edge_count(), 3);
    assert!(graph.edges().all(|e| e.target.is_unknown));
}

#[test]
fn test_http_and_bus_edges_together() {
    let discovery = Discovery {
        clients: vec![target("orders", "http://billing:80/invoice", 9)],
        endpoints: vec![target("billing", "/invoice", 4)],
        bus_calls: vec![
            BusCall {
                role: BusRole::Producer,
                subject: "OrderCreatedSubject".to_string(),
                service_name: "orders".to_string(),
                file: "/svc/orders/events.go".to_string(),
                line: 14,
            },
            BusCall {
                role: BusRole::Consumer,
                subject: "OrderCreatedSubject".to_string(),
                service_name: "billing".to_string(),
                file: "/svc/billing/main.go".to_string(),
                line: 8,
            },
        ],
    };

    let mut output = Vec::new();
    run(&discovery, &mut output).unwrap();
    let list: AdjacencyList = serde_json::from_slice(&output).unwrap();

    let peers = list.peers("orders").unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].service, "billing");
    assert_eq!(peers[0].count, 2);
    assert_eq!(peers[0].calls[0].protocol, "HTTP");
    assert_eq!(peers[0].calls[1].protocol, "NATS");
    assert_eq!(peers[0].calls[1].url, "OrderCreatedSubject");
    assert_eq!(list.call_count(), 2);
}

fn arb_service() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(str::to_string)
}

fn arb_target() -> impl Strategy<Value = CallTarget> {
    let location = prop_oneof![
        Just(String::new()),
        Just(":8080".to_string()),
        "/[a-z]{1,3}",
        ("[a-d]", prop_oneof![Just(":80"), Just(":8080")], "/[a-z]{1,3}")
            .prop_map(|(svc, port, path)| format!("http://{svc}{port}{path}")),
    ];
    (arb_service(), location, 1..100u32)
        .prop_map(|(service, location, line)| target(&service, &location, line))
}

proptest! {
    #[test]
    fn prop_graph_invariants(
        clients in prop::collection::vec(arb_target(), 0..12),
        endpoints in prop::collection::vec(arb_target(), 0..12),
    ) {
        let discovery = Discovery { clients, endpoints, bus_calls: Vec::new() };
        let graph = build_graph(&discovery);

        for edge in graph.edges() {
            prop_assert_ne!(&edge.source.service_name, &edge.target.service_name);
        }
        prop_assert!(graph.nodes().filter(|n| n.is_unknown).count() <= 1);

        let names: Vec<_> = graph.nodes().map(|n| n.service_name.clone()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        prop_assert_eq!(names, sorted);

        // Matching is a pure function of its input.
        prop_assert_eq!(
            graph.to_adjacency_list(),
            build_graph(&discovery).to_adjacency_list()
        );
    }
}
