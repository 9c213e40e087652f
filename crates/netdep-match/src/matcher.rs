//! Joins client calls and message-bus producers to the services that
//! serve them.
//!
//! ## HTTP
//!
//! 1. Every endpoint whose location starts with `:` records the listening
//!    port of its service. Services without one listen on `:80`.
//! 2. Every endpoint whose location is a path (or empty) registers the URL
//!    `http://<service><port><path>`.
//! 3. A client whose location equals a registered URL is connected to the
//!    service that registered it. An explicit `target_service` from an
//!    annotation takes precedence. Everything else goes to the unknown
//!    service.
//!
//! ## Message bus
//!
//! A producer is connected to every other service that consumes its subject,
//! or to the unknown service when nothing does.
//!
//! Calls from a service to itself are dropped in both cases.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use itertools::Itertools;
use netdep_schemas::{
    BusCall, BusRole, CallTarget, Discovery, NetworkCall, PROTOCOL_HTTP, PROTOCOL_NATS,
    ServiceNode, UNKNOWN_SERVICE,
};
use tracing::{debug, debug_span, warn};

use crate::graph::NodeGraph;

/// Port of services that never call a listen function.
pub const DEFAULT_PORT: &str = ":80";

/// An edge before the node set is final.
struct PendingEdge {
    source: String,
    target: String,
    call: NetworkCall,
}

/// Builds the dependency graph for everything one run discovered.
pub fn build_graph(discovery: &Discovery) -> NodeGraph {
    let _span = debug_span!("build_graph").entered();

    let services: BTreeSet<&str> = discovery
        .clients
        .iter()
        .chain(&discovery.endpoints)
        .map(|t| t.service_name.as_str())
        .chain(discovery.bus_calls.iter().map(|c| c.service_name.as_str()))
        .collect();

    let urls = endpoint_urls(&discovery.endpoints);
    debug!(endpoints = urls.len(), "registered endpoint URLs");

    let mut pending: Vec<PendingEdge> = discovery
        .clients
        .iter()
        .map(|client| http_edge(client, &urls, &services))
        .collect();
    pending.extend(bus_edges(&discovery.bus_calls));

    // Self-edges are false positives from helpers shared between services.
    pending.retain(|edge| edge.source != edge.target);

    let uses_unknown = pending.iter().any(|edge| edge.target == UNKNOWN_SERVICE);
    let nodes = services
        .iter()
        .filter(|&&name| name != UNKNOWN_SERVICE)
        .map(|&name| ServiceNode::new(name))
        .chain(uses_unknown.then(ServiceNode::unknown))
        .sorted_by(|a, b| a.service_name.cmp(&b.service_name));

    let mut graph = NodeGraph::with_nodes(nodes);
    for edge in pending {
        graph.connect(&edge.source, &edge.target, edge.call);
    }
    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "built dependency graph"
    );
    graph
}

/// Maps each endpoint URL to the service that registered it. The first
/// registration of a URL wins.
fn endpoint_urls(endpoints: &[CallTarget]) -> IndexMap<String, String> {
    let mut ports: IndexMap<&str, &str> = IndexMap::new();
    for endpoint in endpoints {
        if endpoint.request_location.starts_with(':') {
            ports
                .entry(endpoint.service_name.as_str())
                .or_insert(endpoint.request_location.as_str());
        }
    }

    let mut urls = IndexMap::new();
    for endpoint in endpoints {
        let path = endpoint.request_location.as_str();
        if !(path.is_empty() || path.starts_with('/')) {
            continue;
        }
        let service = endpoint.service_name.as_str();
        let port = ports.get(service).copied().unwrap_or(DEFAULT_PORT);
        urls.entry(format!("http://{service}{port}{path}"))
            .or_insert_with(|| service.to_string());
    }
    urls
}

fn http_edge(
    client: &CallTarget,
    urls: &IndexMap<String, String>,
    services: &BTreeSet<&str>,
) -> PendingEdge {
    let target = match &client.target_service {
        Some(named) if services.contains(named.as_str()) => named.clone(),
        Some(named) => {
            warn!(
                service = %client.service_name,
                target = %named,
                location = %client.location(),
                "annotation names an unknown service"
            );
            UNKNOWN_SERVICE.to_string()
        }
        None if client.is_resolved => urls
            .get(&client.request_location)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_SERVICE.to_string()),
        None => UNKNOWN_SERVICE.to_string(),
    };

    PendingEdge {
        source: client.service_name.clone(),
        target,
        call: NetworkCall {
            protocol: PROTOCOL_HTTP.to_string(),
            url: client.request_location.clone(),
            method_name: client.method_name.clone(),
            arguments: Vec::new(),
            location: client.location(),
        },
    }
}

fn bus_edges(calls: &[BusCall]) -> Vec<PendingEdge> {
    let consumers = calls
        .iter()
        .filter(|c| c.role == BusRole::Consumer)
        .map(|c| (c.subject.as_str(), c.service_name.as_str()))
        .into_grouping_map()
        .collect::<BTreeSet<_>>();

    let mut edges = Vec::new();
    for producer in calls.iter().filter(|c| c.role == BusRole::Producer) {
        let peers: Vec<&str> = consumers
            .get(producer.subject.as_str())
            .into_iter()
            .flatten()
            .copied()
            .filter(|&service| service != producer.service_name)
            .collect();
        let call = NetworkCall {
            protocol: PROTOCOL_NATS.to_string(),
            url: producer.subject.clone(),
            method_name: String::new(),
            arguments: Vec::new(),
            location: producer.location(),
        };

        if peers.is_empty() {
            edges.push(PendingEdge {
                source: producer.service_name.clone(),
                target: UNKNOWN_SERVICE.to_string(),
                call,
            });
            continue;
        }
        edges.extend(peers.into_iter().map(|peer| PendingEdge {
            source: producer.service_name.clone(),
            target: peer.to_string(),
            call: call.clone(),
        }));
    }
    edges
}
