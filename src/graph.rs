//! Module for creating and analysing graphs of the energy system
use crate::bus::BusID;
use crate::id::ComponentID;
use crate::input::{StorageKind, TransformerKind};
use crate::system::{ComponentKind, EnergySystem, Node};
use petgraph::Directed;
use petgraph::graph::{Graph, NodeIndex};
use std::collections::HashMap;
use std::fmt::Display;

/// A graph of the buses and technology nodes of an energy system
pub type SystemGraph = Graph<GraphNode, GraphEdge, Directed>;

#[derive(Eq, PartialEq, Clone, Debug)]
/// A node in the system graph
pub enum GraphNode {
    /// A balancing node
    Bus(BusID),
    /// A technology node
    Component(ComponentID, ComponentKind),
}

impl Display for GraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphNode::Bus(id) => write!(f, "{id}"),
            GraphNode::Component(id, kind) => write!(f, "{id} ({})", kind_label(*kind)),
        }
    }
}

fn kind_label(kind: ComponentKind) -> &'static str {
    match kind {
        ComponentKind::CommoditySource => "commodity source",
        ComponentKind::Renewable => "renewable",
        ComponentKind::Shortage => "shortage",
        ComponentKind::Excess => "excess",
        ComponentKind::Demand => "demand",
        ComponentKind::PowerPlant(TransformerKind::Condensing) => "condensing plant",
        ComponentKind::PowerPlant(TransformerKind::Chp) => "CHP plant",
        ComponentKind::PowerPlant(TransformerKind::Ipp) => "industrial plant",
        ComponentKind::Interconnector => "interconnector",
        ComponentKind::Storage(StorageKind::Phes) => "pumped hydro",
        ComponentKind::Storage(StorageKind::Reservoir) => "reservoir",
        ComponentKind::DemandResponse => "demand response",
    }
}

#[derive(Eq, PartialEq, Clone, Debug)]
/// An edge in the system graph, representing a flow
pub struct GraphEdge {
    /// Position of the flow in the system
    pub flow: usize,
    /// Nominal capacity in MW, if the flow is bounded
    pub nominal: Option<String>,
}

impl Display for GraphEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.nominal {
            Some(nominal) => write!(f, "{nominal} MW"),
            None => write!(f, "unbounded"),
        }
    }
}

/// Creates a directed graph of an energy system.
///
/// There is a node for every bus and every technology node, and an edge for every flow.
pub fn create_system_graph(system: &EnergySystem) -> SystemGraph {
    let mut graph = Graph::new();
    let mut node_indices: HashMap<Node, NodeIndex> = HashMap::new();

    let mut get_index = |graph: &mut SystemGraph, node: &Node| {
        *node_indices.entry(node.clone()).or_insert_with(|| {
            graph.add_node(match node {
                Node::Bus(id) => GraphNode::Bus(id.clone()),
                Node::Component(id) => {
                    // NB: The builder registers every component it creates
                    GraphNode::Component(id.clone(), system.components[id])
                }
            })
        })
    };

    // Add buses first so that unconnected buses still appear
    for bus_id in system.buses.keys() {
        get_index(&mut graph, &Node::Bus(bus_id.clone()));
    }

    for (idx, flow) in system.flows.iter().enumerate() {
        let source = get_index(&mut graph, &flow.source);
        let target = get_index(&mut graph, &flow.target);
        graph.add_edge(
            source,
            target,
            GraphEdge {
                flow: idx,
                nominal: flow.nominal.map(|nominal| nominal.0.to_string()),
            },
        );
    }

    graph
}

/// Find buses which no flow enters or leaves
pub fn find_isolated_buses(graph: &SystemGraph) -> Vec<&BusID> {
    graph
        .node_indices()
        .filter(|&idx| graph.neighbors_undirected(idx).next().is_none())
        .filter_map(|idx| match &graph[idx] {
            GraphNode::Bus(id) => Some(id),
            GraphNode::Component(..) => None,
        })
        .collect()
}
