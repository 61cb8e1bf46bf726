//! Fixtures for tests

use crate::bus::{Bus, BusID, BusMap, Carrier};
use crate::config::{FuelCostPathway, OutputFlags, ScenarioConfig, SolverKind};
use crate::demand_response::DemandResponseCluster;
use crate::input::{
    CommoditySource, Demand, InputData, SlackComponent, StorageKind, StorageRecord,
    TransformerKind, TransformerRecord,
};
use crate::solver::SolverOptions;
use crate::system::{ComponentKind, EnergySystem, Flow, Node};
use crate::time::{TimeIndex, parse_timestamp};
use crate::units::{
    Dimensionless, EmissionsPerEnergy, Energy, MoneyPerEmissions, MoneyPerEnergy, Power,
};
use chrono::TimeDelta;
use indexmap::IndexMap;
use rstest::fixture;
use std::path::PathBuf;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

fn bus(id: &str, country: &str, carrier: Carrier) -> (BusID, Bus) {
    let id = BusID::new(id);
    let bus = Bus {
        id: id.clone(),
        country: country.into(),
        carrier,
    };
    (id, bus)
}

/// Three hourly time steps starting at midnight on 1 January 2017
#[fixture]
pub fn time_index() -> TimeIndex {
    TimeIndex::new(
        parse_timestamp("2017-01-01 00:00:00").unwrap(),
        parse_timestamp("2017-01-01 02:00:00").unwrap(),
        TimeDelta::hours(1),
    )
    .unwrap()
}

#[fixture]
pub fn buses() -> BusMap {
    [
        bus("DE_bus_el", "DE", Carrier::Electricity),
        bus("DE_bus_gas", "DE", Carrier::Fuel),
        bus("AT_bus_el", "AT", Carrier::Electricity),
    ]
    .into_iter()
    .collect()
}

#[fixture]
pub fn scenario_config(time_index: TimeIndex) -> ScenarioConfig {
    ScenarioConfig {
        countries: ["DE", "AT"].into_iter().map(String::from).collect(),
        solver: SolverKind::Highs,
        solver_options: SolverOptions::default(),
        fuel_cost_pathway: FuelCostPathway::Middle,
        emissions_limit: None,
        budget_limit: None,
        demand_response: None,
        rolling_horizon: None,
        time_index,
        input_dir: PathBuf::new(),
        output_dir: None,
        output: OutputFlags {
            save_production_results: true,
            save_price_results: true,
            save_updated_market_values: false,
            write_lp_file: false,
        },
    }
}

/// A valid pumped hydro storage on the German electricity bus
#[fixture]
pub fn storage_record() -> StorageRecord {
    StorageRecord {
        id: "DE_phes".into(),
        country: "DE".into(),
        kind: StorageKind::Phes,
        bus_inflow: "DE_bus_el".into(),
        bus_outflow: "DE_bus_el".into(),
        capacity_pump: Power(50.0),
        capacity_turbine: Power(50.0),
        nominal_storable_energy: Energy(200.0),
        loss_rate: 0.0,
        fixed_losses_relative: 0.0,
        fixed_losses_absolute: Power(0.0),
        initial_storage_level: Some(0.5),
        min_storage_level: 0.0,
        max_storage_level: 1.0,
        efficiency_pump: Dimensionless(0.9),
        efficiency_turbine: Dimensionless(0.9),
        operation_cost: MoneyPerEnergy(0.0),
        min_load_factor: 0.0,
        max_load_factor: 1.0,
    }
}

/// A demand response cluster which may shift but not shed
#[fixture]
pub fn dr_cluster() -> DemandResponseCluster {
    DemandResponseCluster {
        id: "dr1".into(),
        bus: "DE_bus_el".into(),
        demand: vec![0.5; 3],
        max_demand: Power(20.0),
        capacity_up: vec![1.0, 0.5, 1.0],
        max_capacity_up: Power(10.0),
        capacity_down: vec![1.0; 3],
        max_capacity_down: Power(10.0),
        delay_time: 1,
        shed_time: 1,
        recovery_time_shift: 0,
        recovery_time_shed: 0,
        shift_time: 1.0,
        n_year_limit_shift: 1,
        n_year_limit_shed: 1,
        cost_up: MoneyPerEnergy(1.0),
        cost_down_shift: MoneyPerEnergy(1.0),
        cost_shed: None,
        efficiency: Dimensionless(1.0),
        shift_eligibility: true,
        shed_eligibility: false,
    }
}

/// Input data for a small German system: gas plant, demand, storage and a shortage source
#[fixture]
pub fn input_data(buses: BusMap, storage_record: StorageRecord) -> InputData {
    InputData {
        buses,
        commodity_sources: vec![CommoditySource {
            id: "DE_gas".into(),
            country: "DE".into(),
            to: "DE_bus_gas".into(),
            emission_factor: EmissionsPerEnergy(0.2),
            fuel_cost: MoneyPerEnergy(20.0),
        }],
        emission_prices: vec![MoneyPerEmissions(0.0); 3],
        annual_emissions_limit: None,
        renewables: Vec::new(),
        transformers: vec![TransformerRecord {
            id: "DE_ccgt".into(),
            country: "DE".into(),
            kind: TransformerKind::Condensing,
            from: "DE_bus_gas".into(),
            to_el: "DE_bus_el".into(),
            to_th: None,
            capacity: Power(100.0),
            efficiency_el: Dimensionless(0.5),
            efficiency_th: None,
            operation_cost: MoneyPerEnergy(2.0),
            min_load: vec![0.0; 3],
            max_load_factor: 1.0,
            availability: vec![1.0; 3],
            grad_pos: None,
            grad_neg: None,
        }],
        interconnectors: Vec::new(),
        demands: vec![Demand {
            id: "DE_load".into(),
            country: "DE".into(),
            from: "DE_bus_el".into(),
            maximum: Power(80.0),
            profile: vec![0.5, 1.0, 0.75],
            includes_demand_response: false,
        }],
        shortage_sources: vec![SlackComponent {
            id: "DE_shortage".into(),
            country: "DE".into(),
            bus: "DE_bus_el".into(),
            cost: MoneyPerEnergy(1000.0),
        }],
        excess_sinks: Vec::new(),
        storages: vec![storage_record],
        demand_response: Vec::new(),
    }
}

/// A single electricity bus with a cheap and an expensive generator serving a flat demand of
/// 100 MW
#[fixture]
pub fn simple_system(time_index: TimeIndex) -> EnergySystem {
    let bus_id = BusID::new("DE_bus_el");
    let len = time_index.len();
    let generator = |id: &str, capacity: f64, cost: f64| {
        Flow::bounded(
            Node::Component(id.into()),
            Node::Bus(bus_id.clone()),
            Power(capacity),
            &vec![0.0; len],
            &vec![1.0; len],
        )
        .with_cost(MoneyPerEnergy(cost))
    };
    let flows = vec![
        generator("cheap", 60.0, 10.0),
        generator("expensive", 100.0, 20.0),
        Flow::fixed(
            Node::Bus(bus_id.clone()),
            Node::Component("DE_load".into()),
            Power(100.0),
            &vec![1.0; len],
        ),
    ];

    EnergySystem {
        time_index,
        buses: [bus("DE_bus_el", "DE", Carrier::Electricity)]
            .into_iter()
            .collect(),
        components: IndexMap::from([
            ("cheap".into(), ComponentKind::Renewable),
            ("expensive".into(), ComponentKind::Renewable),
            ("DE_load".into(), ComponentKind::Demand),
        ]),
        flows,
        transformers: Vec::new(),
        storages: Vec::new(),
        demand_response: None,
        integral_limits: Vec::new(),
    }
}

