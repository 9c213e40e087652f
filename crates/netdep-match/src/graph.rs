//! The service dependency graph.

use std::collections::BTreeMap;

use netdep_schemas::{AdjacencyList, NetworkCall, PeerCalls, ServiceNode};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

/// Directed graph of services connected by network calls.
///
/// Nodes are stored in alphabetical order of service name and edges in the
/// order they were matched, so node and edge indices are stable for a given
/// input.
#[derive(Debug, Clone, Default)]
pub struct NodeGraph {
    graph: DiGraph<ServiceNode, NetworkCall>,
    index: BTreeMap<String, NodeIndex>,
}

/// A borrowed view of one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEdge<'a> {
    pub source: &'a ServiceNode,
    pub target: &'a ServiceNode,
    pub call: &'a NetworkCall,
}

impl NodeGraph {
    /// Creates a graph with one node per entry of `nodes`. Callers pass
    /// nodes already sorted and de-duplicated.
    pub(crate) fn with_nodes(nodes: impl IntoIterator<Item = ServiceNode>) -> Self {
        let mut graph = Self::default();
        for node in nodes {
            let name = node.service_name.clone();
            let idx = graph.graph.add_node(node);
            graph.index.insert(name, idx);
        }
        graph
    }

    /// Adds an edge between two existing nodes. Returns false when either
    /// name is not a node.
    pub(crate) fn connect(&mut self, source: &str, target: &str, call: NetworkCall) -> bool {
        let (Some(&from), Some(&to)) = (self.index.get(source), self.index.get(target)) else {
            return false;
        };
        self.graph.add_edge(from, to, call);
        true
    }

    pub fn node(&self, service: &str) -> Option<&ServiceNode> {
        self.index.get(service).map(|&idx| &self.graph[idx])
    }

    /// Nodes in alphabetical order.
    pub fn nodes(&self) -> impl Iterator<Item = &ServiceNode> {
        self.graph.node_weights()
    }

    /// Edges in the order they were matched.
    pub fn edges(&self) -> impl Iterator<Item = ConnectionEdge<'_>> {
        self.graph.edge_references().map(|edge| ConnectionEdge {
            source: &self.graph[edge.source()],
            target: &self.graph[edge.target()],
            call: edge.weight(),
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Converts the graph to its serialized form.
    ///
    /// Every node becomes a key, including nodes without outbound calls.
    /// Peers are listed alphabetically; calls to one peer keep edge order.
    pub fn to_adjacency_list(&self) -> AdjacencyList {
        let mut grouped: BTreeMap<&str, BTreeMap<&str, Vec<NetworkCall>>> = self
            .nodes()
            .map(|node| (node.service_name.as_str(), BTreeMap::new()))
            .collect();

        // `edge_references` yields edges by index; the per-node edge
        // iterators of petgraph walk them newest first.
        for edge in self.edges() {
            grouped
                .entry(edge.source.service_name.as_str())
                .or_default()
                .entry(edge.target.service_name.as_str())
                .or_default()
                .push(edge.call.clone());
        }

        let list = grouped
            .into_iter()
            .map(|(service, peers)| {
                let peers = peers
                    .into_iter()
                    .map(|(peer, calls)| PeerCalls {
                        service: peer.to_string(),
                        count: calls.len(),
                        calls,
                    })
                    .collect();
                (service.to_string(), peers)
            })
            .collect();
        AdjacencyList(list)
    }
}
