//! Build the energy system for one optimisation window from validated input data.
//!
//! Building is a pure function of its inputs. It either returns a consistent graph or fails with
//! a [`DispatchError::GraphConsistency`] naming the offending component.
use super::{
    ComponentKind, DemandResponseSystem, DemandResponseUnit, EnergySystem, Flow, FlowIndex,
    IntegralLimit, LimitKind, Node, Storage, Transformer,
};
use crate::bus::{BusID, BusMap, Carrier};
use crate::config::ScenarioConfig;
use crate::error::DispatchError;
use crate::id::ComponentID;
use crate::input::{InputData, StorageKind, StorageRecord, TransformerRecord};
use crate::time::convert_annual_limit;
use crate::units::{Dimensionless, Energy, MoneyPerEnergy, Power};
use anyhow::{Result, bail};
use indexmap::{IndexMap, IndexSet};
use log::debug;
use std::ops::Range;

/// Minimum headroom between the minimum and maximum load of a power plant
const MIN_LOAD_HEADROOM: f64 = 0.05;

/// Tolerance when subtracting demand response baselines from demand
const BASELINE_TOLERANCE: f64 = 1e-9;

/// How to cut one window out of the full horizon
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    /// The time steps of the full horizon covered by the window
    pub window: Range<usize>,
    /// Storage levels to use instead of the configured initial levels
    pub initial_levels: IndexMap<ComponentID, Energy>,
    /// Whether storage levels must return to their initial value at the end of the window
    pub closes_roundtrip: bool,
    /// Share of the horizon-wide emissions and budget limits available to this window
    pub limit_share: f64,
}

impl BuildOptions {
    /// Options for a single optimisation over the whole horizon
    pub fn full_horizon(len: usize) -> Self {
        Self {
            window: 0..len,
            initial_levels: IndexMap::new(),
            closes_roundtrip: true,
            limit_share: 1.0,
        }
    }
}

/// Build the energy system for one window.
///
/// # Arguments
///
/// * `input` - Validated input data for the full horizon
/// * `config` - The scenario configuration
/// * `options` - Which window to build and how it connects to its neighbours
///
/// # Returns
///
/// The energy system or an error if the graph is inconsistent.
pub fn build_energy_system(
    input: &InputData,
    config: &ScenarioConfig,
    options: &BuildOptions,
) -> Result<EnergySystem> {
    let mut builder = SystemBuilder::new(input, config, options);
    builder.add_commodity_sources()?;
    builder.add_renewables()?;
    builder.add_power_plants()?;
    builder.add_interconnectors()?;
    builder.add_slack_components()?;
    builder.add_storages()?;
    builder.add_demand_response()?;
    builder.add_demands()?;
    builder.check_heat_sinks()?;
    builder.add_integral_limits();

    let system = builder.system;
    debug!(
        "Built energy system with {} buses, {} components and {} flows for time steps {:?}",
        system.buses.len(),
        system.components.len(),
        system.flows.len(),
        options.window
    );

    Ok(system)
}

struct SystemBuilder<'a> {
    input: &'a InputData,
    config: &'a ScenarioConfig,
    options: &'a BuildOptions,
    system: EnergySystem,
    /// Commodity source flows which count towards the emissions limit
    emission_flows: Vec<FlowIndex>,
}

impl<'a> SystemBuilder<'a> {
    fn new(input: &'a InputData, config: &'a ScenarioConfig, options: &'a BuildOptions) -> Self {
        let buses: BusMap = input
            .buses
            .iter()
            .filter(|(_, bus)| config.includes_country(&bus.country))
            .map(|(id, bus)| (id.clone(), bus.clone()))
            .collect();

        Self {
            input,
            config,
            options,
            system: EnergySystem {
                time_index: config.time_index.window(options.window.clone()),
                buses,
                components: IndexMap::new(),
                flows: Vec::new(),
                transformers: Vec::new(),
                storages: Vec::new(),
                demand_response: None,
                integral_limits: Vec::new(),
            },
            emission_flows: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.options.window.len()
    }

    /// Restrict a full-horizon series to the window
    fn window<'b>(&self, values: &'b [f64]) -> &'b [f64] {
        &values[self.options.window.clone()]
    }

    fn add_component(&mut self, id: &ComponentID, kind: ComponentKind) -> Result<()> {
        if self.system.components.insert(id.clone(), kind).is_some() {
            bail!(DispatchError::GraphConsistency(format!(
                "More than one component has the ID {id}"
            )));
        }

        Ok(())
    }

    /// Check that a component refers to a bus which exists in the included countries
    fn check_bus(&self, component: &ComponentID, bus: &BusID) -> Result<()> {
        if !self.system.buses.contains_key(bus) {
            bail!(DispatchError::GraphConsistency(format!(
                "Component {component} refers to undefined bus {bus}"
            )));
        }

        Ok(())
    }

    fn add_flow(&mut self, flow: Flow) -> FlowIndex {
        self.system.flows.push(flow);
        self.system.flows.len() - 1
    }

    fn add_commodity_sources(&mut self) -> Result<()> {
        let emission_countries = self.config.emissions_limit.as_ref().map(|l| &l.countries);
        let prices = &self.input.emission_prices[self.options.window.clone()];
        for source in &self.input.commodity_sources {
            if !self.config.includes_country(&source.country) {
                continue;
            }
            self.check_bus(&source.id, &source.to)?;
            self.add_component(&source.id, ComponentKind::CommoditySource)?;

            let mut flow = Flow::unbounded(
                Node::Component(source.id.clone()),
                Node::Bus(source.to.clone()),
                self.len(),
            );
            flow.cost = prices
                .iter()
                .map(|&price| source.fuel_cost + source.emission_factor * price)
                .collect();
            flow.emission_factor = source.emission_factor;
            let idx = self.add_flow(flow);

            if emission_countries.is_some_and(|countries| countries.contains(&source.country)) {
                self.emission_flows.push(idx);
            }
        }

        Ok(())
    }

    fn add_renewables(&mut self) -> Result<()> {
        for renewable in &self.input.renewables {
            if !self.config.includes_country(&renewable.country) {
                continue;
            }
            self.check_bus(&renewable.id, &renewable.to)?;
            self.add_component(&renewable.id, ComponentKind::Renewable)?;

            let source = Node::Component(renewable.id.clone());
            let target = Node::Bus(renewable.to.clone());
            let profile = self.window(&renewable.profile);
            let flow = if renewable.fixed {
                Flow::fixed(source, target, renewable.capacity, profile)
            } else {
                Flow::bounded(
                    source,
                    target,
                    renewable.capacity,
                    &vec![0.0; profile.len()],
                    profile,
                )
            };
            self.add_flow(flow.with_cost(renewable.cost));
        }

        Ok(())
    }

    fn add_power_plants(&mut self) -> Result<()> {
        for plant in &self.input.transformers {
            if !self.config.includes_country(&plant.country) {
                continue;
            }
            self.add_power_plant(plant)?;
        }

        Ok(())
    }

    fn add_power_plant(&mut self, plant: &TransformerRecord) -> Result<()> {
        self.check_bus(&plant.id, &plant.from)?;
        self.check_bus(&plant.id, &plant.to_el)?;
        if let Some(to_th) = &plant.to_th {
            self.check_bus(&plant.id, to_th)?;
        }
        self.add_component(&plant.id, ComponentKind::PowerPlant(plant.kind))?;

        let node = Node::Component(plant.id.clone());
        let fuel = self.add_flow(Flow::unbounded(
            Node::Bus(plant.from.clone()),
            node.clone(),
            self.len(),
        ));

        let min_load = self.window(&plant.min_load);
        let max_load: Vec<f64> = min_load
            .iter()
            .zip(self.window(&plant.availability))
            .map(|(&min, &availability)| {
                (min + MIN_LOAD_HEADROOM)
                    .max(plant.max_load_factor * availability)
                    .min(1.0)
            })
            .collect();
        let mut electricity = Flow::bounded(
            node.clone(),
            Node::Bus(plant.to_el.clone()),
            plant.capacity,
            min_load,
            &max_load,
        )
        .with_cost(plant.operation_cost);
        electricity.gradient_pos = plant.grad_pos.map(|grad| Power(grad * plant.capacity.0));
        electricity.gradient_neg = plant.grad_neg.map(|grad| Power(grad * plant.capacity.0));
        let electricity = self.add_flow(electricity);

        let mut outputs = vec![(electricity, plant.efficiency_el)];
        if let (Some(to_th), Some(efficiency_th)) = (&plant.to_th, plant.efficiency_th) {
            let heat = self.add_flow(Flow::unbounded(
                node,
                Node::Bus(to_th.clone()),
                self.len(),
            ));
            outputs.push((heat, efficiency_th));
        }

        self.system.transformers.push(Transformer {
            id: plant.id.clone(),
            inputs: vec![(fuel, Dimensionless(1.0))],
            outputs,
        });

        Ok(())
    }

    fn add_interconnectors(&mut self) -> Result<()> {
        let mut directions = IndexSet::new();
        for link in &self.input.interconnectors {
            for bus in [&link.from, &link.to] {
                if !self.input.buses.contains_key(bus) {
                    bail!(DispatchError::GraphConsistency(format!(
                        "Interconnector {} refers to undefined bus {bus}",
                        link.id
                    )));
                }
            }
            if !(self.system.buses.contains_key(&link.from)
                && self.system.buses.contains_key(&link.to))
            {
                debug!(
                    "Dropping interconnector {} because it leaves the included countries",
                    link.id
                );
                continue;
            }
            if !directions.insert((link.from.clone(), link.to.clone())) {
                bail!(DispatchError::GraphConsistency(format!(
                    "More than one interconnector from {} to {}",
                    link.from, link.to
                )));
            }
            self.add_component(&link.id, ComponentKind::Interconnector)?;

            let node = Node::Component(link.id.clone());
            let export = self.add_flow(Flow::bounded(
                Node::Bus(link.from.clone()),
                node.clone(),
                link.capacity,
                &vec![0.0; self.len()],
                self.window(&link.profile),
            ));
            let import = self.add_flow(Flow::unbounded(
                node,
                Node::Bus(link.to.clone()),
                self.len(),
            ));
            self.system.transformers.push(Transformer {
                id: link.id.clone(),
                inputs: vec![(export, Dimensionless(1.0))],
                outputs: vec![(import, link.conversion_factor)],
            });
        }

        Ok(())
    }

    fn add_slack_components(&mut self) -> Result<()> {
        for source in &self.input.shortage_sources {
            if !self.config.includes_country(&source.country) {
                continue;
            }
            self.check_bus(&source.id, &source.bus)?;
            self.add_component(&source.id, ComponentKind::Shortage)?;
            let flow = Flow::unbounded(
                Node::Component(source.id.clone()),
                Node::Bus(source.bus.clone()),
                self.len(),
            );
            self.add_flow(flow.with_cost(source.cost));
        }

        for sink in &self.input.excess_sinks {
            if !self.config.includes_country(&sink.country) {
                continue;
            }
            self.check_bus(&sink.id, &sink.bus)?;
            self.add_component(&sink.id, ComponentKind::Excess)?;
            let flow = Flow::unbounded(
                Node::Bus(sink.bus.clone()),
                Node::Component(sink.id.clone()),
                self.len(),
            );
            self.add_flow(flow.with_cost(sink.cost));
        }

        Ok(())
    }

    fn add_storages(&mut self) -> Result<()> {
        for record in &self.input.storages {
            if !self.config.includes_country(&record.country) {
                continue;
            }
            self.add_storage(record)?;
        }

        Ok(())
    }

    fn add_storage(&mut self, record: &StorageRecord) -> Result<()> {
        self.check_bus(&record.id, &record.bus_inflow)?;
        self.check_bus(&record.id, &record.bus_outflow)?;

        let len = self.len();
        let min_level = vec![record.min_storage_level; len];
        let max_level = vec![record.max_storage_level; len];
        if let Some(t) = (0..len).find(|&t| min_level[t] > max_level[t]) {
            bail!(DispatchError::GraphConsistency(format!(
                "Storage {} has a minimum level above its maximum level at {}",
                record.id,
                self.system.time_index.as_slice()[t]
            )));
        }
        self.add_component(&record.id, ComponentKind::Storage(record.kind))?;

        let node = Node::Component(record.id.clone());
        let (inflow, outflow) = match record.kind {
            StorageKind::Phes => (
                Flow::bounded(
                    Node::Bus(record.bus_inflow.clone()),
                    node.clone(),
                    record.capacity_pump,
                    &vec![0.0; len],
                    &vec![1.0; len],
                )
                .with_cost(record.operation_cost),
                Flow::bounded(
                    node,
                    Node::Bus(record.bus_outflow.clone()),
                    record.capacity_turbine,
                    &vec![0.0; len],
                    &vec![1.0; len],
                )
                .with_cost(record.operation_cost),
            ),
            StorageKind::Reservoir => (
                Flow::unbounded(Node::Bus(record.bus_inflow.clone()), node.clone(), len),
                Flow::bounded(
                    node,
                    Node::Bus(record.bus_outflow.clone()),
                    record.capacity_turbine,
                    &vec![record.min_load_factor; len],
                    &vec![record.max_load_factor; len],
                )
                .with_cost(record.operation_cost),
            ),
        };
        let inflow = self.add_flow(inflow);
        let outflow = self.add_flow(outflow);

        let nominal = record.nominal_storable_energy.0;
        let initial_level = match self.options.initial_levels.get(&record.id) {
            Some(&level) => Some(level),
            None => match record.initial_storage_level {
                Some(level) => Some(Energy(level * nominal)),
                // A free opening level is only bounded by the roundtrip condition
                None if !self.options.closes_roundtrip => {
                    Some(Energy(record.min_storage_level * nominal))
                }
                None => None,
            },
        };

        self.system.storages.push(Storage {
            id: record.id.clone(),
            inflow,
            outflow,
            nominal_energy: record.nominal_storable_energy,
            loss_rate: record.loss_rate,
            fixed_losses_relative: record.fixed_losses_relative,
            fixed_losses_absolute: record.fixed_losses_absolute,
            initial_level,
            min_level,
            max_level,
            efficiency_inflow: record.efficiency_pump,
            efficiency_outflow: record.efficiency_turbine,
            balanced: self.options.closes_roundtrip,
        });

        Ok(())
    }

    fn add_demand_response(&mut self) -> Result<()> {
        let Some(config) = &self.config.demand_response else {
            return Ok(());
        };

        let mut units = Vec::new();
        for cluster in &self.input.demand_response {
            let Some(bus) = self.input.buses.get(&cluster.bus) else {
                bail!(DispatchError::GraphConsistency(format!(
                    "Component {} refers to undefined bus {}",
                    cluster.id, cluster.bus
                )));
            };
            if !self.config.includes_country(&bus.country) {
                continue;
            }
            self.add_component(&cluster.id, ComponentKind::DemandResponse)?;

            let inflow = self.add_flow(Flow::unbounded(
                Node::Bus(cluster.bus.clone()),
                Node::Component(cluster.id.clone()),
                self.len(),
            ));
            units.push(DemandResponseUnit {
                cluster: cluster.window(self.options.window.clone()),
                inflow,
            });
        }

        self.system.demand_response = Some(DemandResponseSystem {
            config: config.clone(),
            units,
        });

        Ok(())
    }

    /// Add demands. Must come after demand response, whose baseline may be subtracted.
    fn add_demands(&mut self) -> Result<()> {
        for demand in &self.input.demands {
            if !self.config.includes_country(&demand.country) {
                continue;
            }
            self.check_bus(&demand.id, &demand.from)?;
            self.add_component(&demand.id, ComponentKind::Demand)?;

            let mut values: Vec<f64> = self
                .options
                .window
                .clone()
                .map(|t| demand.value(t).0)
                .collect();
            if demand.includes_demand_response {
                self.subtract_baseline(&demand.id, &demand.from, &mut values)?;
            }

            // The flow's nominal value is the peak demand, so the profile is rescaled
            let profile: Vec<f64> = if demand.maximum.0 > 0.0 {
                values.iter().map(|v| v / demand.maximum.0).collect()
            } else {
                vec![0.0; values.len()]
            };
            self.add_flow(Flow::fixed(
                Node::Bus(demand.from.clone()),
                Node::Component(demand.id.clone()),
                demand.maximum,
                &profile,
            ));
        }

        Ok(())
    }

    fn subtract_baseline(&self, id: &ComponentID, bus: &BusID, values: &mut [f64]) -> Result<()> {
        let Some(dr) = &self.system.demand_response else {
            return Ok(());
        };

        for unit in dr.units.iter().filter(|unit| &unit.cluster.bus == bus) {
            for (t, value) in values.iter_mut().enumerate() {
                *value -= unit.cluster.baseline(t).0;
            }
        }
        if let Some(t) = values.iter().position(|&v| v < -BASELINE_TOLERANCE) {
            bail!(DispatchError::InvalidValue(format!(
                "Demand response baseline exceeds demand {id} at {}",
                self.system.time_index.as_slice()[t]
            )));
        }
        for value in values.iter_mut() {
            *value = value.max(0.0);
        }

        Ok(())
    }

    /// Check that heat delivered to a bus can leave it again.
    ///
    /// Without a sink, every CHP plant supplying the bus would be forced to zero output.
    fn check_heat_sinks(&self) -> Result<()> {
        let system = &self.system;
        for (id, bus) in &system.buses {
            if bus.carrier != Carrier::Heat || system.flows_out_of(id).next().is_some() {
                continue;
            }
            if let Some(flow) = system.flows_into(id).next() {
                bail!(DispatchError::GraphConsistency(format!(
                    "Heat bus {id} supplied by {} has no sink",
                    system.flows[flow].source
                )));
            }
        }

        Ok(())
    }

    fn add_integral_limits(&mut self) {
        let step_hours = self.system.step_hours().0;
        let horizon = &self.config.time_index;

        if let Some(annual) = self.input.annual_emissions_limit
            && self.config.emissions_limit.is_some()
        {
            let limit = convert_annual_limit(annual.0, horizon.start(), horizon.end())
                * self.options.limit_share;
            let terms = self
                .emission_flows
                .iter()
                .map(|&idx| {
                    let factor = self.system.flows[idx].emission_factor.0;
                    (idx, vec![factor * step_hours; self.len()])
                })
                .collect();
            self.system.integral_limits.push(IntegralLimit {
                kind: LimitKind::Emissions,
                limit,
                terms,
            });
        }

        if let Some(budget) = self.config.budget_limit {
            let terms = self
                .system
                .flows
                .iter()
                .enumerate()
                .filter(|(_, flow)| flow.cost.iter().any(|&c| c != MoneyPerEnergy(0.0)))
                .map(|(idx, flow)| (idx, flow.cost.iter().map(|c| c.0 * step_hours).collect()))
                .collect();
            self.system.integral_limits.push(IntegralLimit {
                kind: LimitKind::Budget,
                limit: budget.0 * self.options.limit_share,
                terms,
            });
        }
    }
}
