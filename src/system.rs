//! The energy system for one optimisation window.
//!
//! This is a typed intermediate representation between the input tables and the LP. It is built
//! and validated by [`build::build_energy_system`] and then only read by constraint assembly.
//! Each flow carries its bounds in absolute terms for every time step of the window, so the LP
//! never has to look back at input records.
use crate::bus::{BusID, BusMap};
use crate::config::DemandResponseConfig;
use crate::demand_response::DemandResponseCluster;
use crate::id::ComponentID;
use crate::input::{StorageKind, TransformerKind};
use crate::time::TimeIndex;
use crate::units::{Dimensionless, Energy, EmissionsPerEnergy, Hours, MoneyPerEnergy, Power};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

pub mod build;
pub use build::{BuildOptions, build_energy_system};

/// Index of a flow in [`EnergySystem::flows`]
pub type FlowIndex = usize;

/// One end of a flow
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    /// A balancing node
    Bus(BusID),
    /// A technology node (source, sink, transformer, storage or demand response cluster)
    Component(ComponentID),
}

impl Node {
    /// The bus ID, if this node is a bus
    pub fn as_bus(&self) -> Option<&BusID> {
        match self {
            Node::Bus(id) => Some(id),
            Node::Component(_) => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Bus(id) => write!(f, "{id}"),
            Node::Component(id) => write!(f, "{id}"),
        }
    }
}

/// What a technology node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    /// A fuel supply
    CommoditySource,
    /// Exogenous renewable infeed
    Renewable,
    /// Covers unmet demand at a high cost
    Shortage,
    /// Absorbs surplus energy
    Excess,
    /// Fixed demand
    Demand,
    /// A dispatchable power plant
    PowerPlant(TransformerKind),
    /// A directed cross-border link
    Interconnector,
    /// A storage unit
    Storage(StorageKind),
    /// A demand response cluster
    DemandResponse,
}

/// A directed, time-indexed quantity between two nodes.
///
/// Bounds are absolute (i.e. already multiplied by the nominal capacity). A flow without a
/// nominal capacity is bounded below by zero only.
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    /// Where the flow starts
    pub source: Node,
    /// Where the flow ends
    pub target: Node,
    /// Nominal capacity, if the flow is bounded
    pub nominal: Option<Power>,
    /// Lower bound for every time step
    pub lower: Vec<Power>,
    /// Upper bound for every time step
    pub upper: Vec<Power>,
    /// Whether the flow follows a fixed profile
    pub fixed: bool,
    /// Variable cost for every time step
    pub cost: Vec<MoneyPerEnergy>,
    /// Maximum increase between consecutive time steps
    pub gradient_pos: Option<Power>,
    /// Maximum decrease between consecutive time steps
    pub gradient_neg: Option<Power>,
    /// Emissions per unit of energy carried
    pub emission_factor: EmissionsPerEnergy,
}

impl Flow {
    /// A flow bounded by `min(t) * nominal <= flow(t) <= max(t) * nominal`
    pub fn bounded(source: Node, target: Node, nominal: Power, min: &[f64], max: &[f64]) -> Self {
        assert_eq!(min.len(), max.len());

        Self {
            source,
            target,
            nominal: Some(nominal),
            lower: min.iter().map(|&m| Power(m * nominal.0)).collect(),
            upper: max.iter().map(|&m| Power(m * nominal.0)).collect(),
            fixed: false,
            cost: vec![MoneyPerEnergy(0.0); min.len()],
            gradient_pos: None,
            gradient_neg: None,
            emission_factor: EmissionsPerEnergy(0.0),
        }
    }

    /// A flow fixed to `profile(t) * nominal`
    pub fn fixed(source: Node, target: Node, nominal: Power, profile: &[f64]) -> Self {
        Self {
            fixed: true,
            ..Self::bounded(source, target, nominal, profile, profile)
        }
    }

    /// A non-negative flow without an upper bound
    pub fn unbounded(source: Node, target: Node, len: usize) -> Self {
        Self {
            source,
            target,
            nominal: None,
            lower: vec![Power(0.0); len],
            upper: vec![Power(f64::INFINITY); len],
            fixed: false,
            cost: vec![MoneyPerEnergy(0.0); len],
            gradient_pos: None,
            gradient_neg: None,
            emission_factor: EmissionsPerEnergy(0.0),
        }
    }

    /// Set the same variable cost for every time step
    pub fn with_cost(self, cost: MoneyPerEnergy) -> Self {
        Self {
            cost: vec![cost; self.cost.len()],
            ..self
        }
    }

    /// A short description of the flow (e.g. `DE_gas -> DE_bus_el`)
    pub fn label(&self) -> String {
        format!("{} -> {}", self.source, self.target)
    }

    /// Whether the flow has a gradient limit in either direction
    pub fn has_gradient_limit(&self) -> bool {
        self.gradient_pos.is_some() || self.gradient_neg.is_some()
    }
}

/// A conversion node relating its input and output flows.
///
/// For every input `i` and output `o`: `flow_i(t) * factor_o = flow_o(t) * factor_i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformer {
    /// The transformer's ID
    pub id: ComponentID,
    /// Input flows with their conversion factors
    pub inputs: Vec<(FlowIndex, Dimensionless)>,
    /// Output flows with their conversion factors
    pub outputs: Vec<(FlowIndex, Dimensionless)>,
}

/// A stateful node with an energy level
#[derive(Debug, Clone, PartialEq)]
pub struct Storage {
    /// The storage's ID
    pub id: ComponentID,
    /// The charging flow (bus to storage)
    pub inflow: FlowIndex,
    /// The discharging flow (storage to bus)
    pub outflow: FlowIndex,
    /// Maximum energy content
    pub nominal_energy: Energy,
    /// Share of the content lost per hour
    pub loss_rate: f64,
    /// Losses per hour as a share of the nominal content
    pub fixed_losses_relative: f64,
    /// Absolute losses per hour
    pub fixed_losses_absolute: Power,
    /// Content before the first time step (free if `None`)
    pub initial_level: Option<Energy>,
    /// Minimum content after each time step, relative to nominal
    pub min_level: Vec<f64>,
    /// Maximum content after each time step, relative to nominal
    pub max_level: Vec<f64>,
    /// Charging efficiency
    pub efficiency_inflow: Dimensionless,
    /// Discharging efficiency
    pub efficiency_outflow: Dimensionless,
    /// Whether the content after the last time step must equal the initial content
    pub balanced: bool,
}

/// A demand response cluster attached to its inflow from the bus
#[derive(Debug, Clone, PartialEq)]
pub struct DemandResponseUnit {
    /// Cluster parameters, restricted to the window
    pub cluster: DemandResponseCluster,
    /// The flow from the bus into the cluster
    pub inflow: FlowIndex,
}

/// All demand response clusters, sharing a single formulation
#[derive(Debug, Clone, PartialEq)]
pub struct DemandResponseSystem {
    /// The formulation and its parameters
    pub config: DemandResponseConfig,
    /// The clusters
    pub units: Vec<DemandResponseUnit>,
}

/// What an integral limit restricts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitKind {
    /// Total emissions
    Emissions,
    /// Total operational cost
    Budget,
}

/// A limit on a weighted sum of flows over the whole window.
///
/// `Σ_f Σ_t flow(f, t) * w(f, t) <= limit`
#[derive(Debug, Clone, PartialEq)]
pub struct IntegralLimit {
    /// What is limited
    pub kind: LimitKind,
    /// The limit for this window
    pub limit: f64,
    /// Flows with a weight for every time step (which includes the step length)
    pub terms: Vec<(FlowIndex, Vec<f64>)>,
}

/// The complete graph of buses, flows and technology nodes for one optimisation window
#[derive(Debug, Clone, PartialEq)]
pub struct EnergySystem {
    /// The window's time steps
    pub time_index: TimeIndex,
    /// Included buses
    pub buses: BusMap,
    /// Technology nodes and what they represent
    pub components: IndexMap<ComponentID, ComponentKind>,
    /// All flows
    pub flows: Vec<Flow>,
    /// Conversion nodes
    pub transformers: Vec<Transformer>,
    /// Storage units
    pub storages: Vec<Storage>,
    /// Demand response clusters, if demand response is active
    pub demand_response: Option<DemandResponseSystem>,
    /// Emissions and budget limits
    pub integral_limits: Vec<IntegralLimit>,
}

impl EnergySystem {
    /// The number of time steps in the window
    pub fn len(&self) -> usize {
        self.time_index.len()
    }

    /// Whether the window has no time steps
    pub fn is_empty(&self) -> bool {
        self.time_index.is_empty()
    }

    /// The length of a time step
    pub fn step_hours(&self) -> Hours {
        self.time_index.step_hours()
    }

    /// Iterate over flows ending at the given bus
    pub fn flows_into<'a>(&'a self, bus: &'a BusID) -> impl Iterator<Item = FlowIndex> + 'a {
        self.flows
            .iter()
            .enumerate()
            .filter(move |(_, flow)| flow.target.as_bus() == Some(bus))
            .map(|(idx, _)| idx)
    }

    /// Iterate over flows starting at the given bus
    pub fn flows_out_of<'a>(&'a self, bus: &'a BusID) -> impl Iterator<Item = FlowIndex> + 'a {
        self.flows
            .iter()
            .enumerate()
            .filter(move |(_, flow)| flow.source.as_bus() == Some(bus))
            .map(|(idx, _)| idx)
    }

    /// The kind of component at either end of a flow, if any
    pub fn component_kind(&self, flow: &Flow) -> Option<ComponentKind> {
        [&flow.source, &flow.target].into_iter().find_map(|node| match node {
            Node::Component(id) => self.components.get(id).copied(),
            Node::Bus(_) => None,
        })
    }

    /// The electricity bus a flow is incident to, if any
    pub fn electricity_bus<'a>(&'a self, flow: &'a Flow) -> Option<&'a BusID> {
        [&flow.source, &flow.target]
            .into_iter()
            .filter_map(Node::as_bus)
            .find(|id| self.buses.get(*id).is_some_and(|bus| bus.is_electricity()))
    }
}
