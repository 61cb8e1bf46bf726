//! Assembly of results from one or more solved windows into chronological result tables.
//!
//! A full-horizon run appends a single solution. Under the rolling horizon, each slice appends
//! only its retained time steps, in order, so the concatenated tables cover every timestamp of
//! the horizon exactly once.
use crate::bus::BusID;
use crate::id::ComponentID;
use crate::optimisation::Solution;
use crate::system::{ComponentKind, LimitKind};
use crate::time::TIMESTAMP_FORMAT;
use crate::units::{Dimensionless, Emissions, Energy, Money, MoneyPerEnergy, Power};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;

fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
}

/// A flow incident to an electricity bus at one time step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductionRecord {
    /// The time step
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    /// Where the flow starts
    pub source: String,
    /// Where the flow ends
    pub target: String,
    /// The flow (MW)
    pub value: Power,
    /// The electricity bus the flow is incident to
    #[serde(skip)]
    pub bus: BusID,
    /// Whether the flow is the infeed of a renewable generator
    #[serde(skip)]
    pub is_renewable: bool,
}

/// The day-ahead price of an electricity bus at one time step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRecord {
    /// The time step
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    /// The bus
    pub bus: BusID,
    /// The price (EUR/MWh)
    pub price: MoneyPerEnergy,
}

/// The level of a storage at the end of one time step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageLevelRecord {
    /// The time step
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    /// The storage
    pub storage: ComponentID,
    /// Energy content (MWh)
    pub level: Energy,
}

/// Harmonised demand response activation of one cluster at one time step.
///
/// The columns are the same for every formulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandResponseRecord {
    /// The time step
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    /// The cluster
    pub cluster: ComponentID,
    /// Load increase (MW)
    pub dsm_up: Power,
    /// Load decrease which is compensated later or earlier (MW)
    pub dsm_do_shift: Power,
    /// Load decrease which is never compensated (MW)
    pub dsm_do_shed: Power,
    /// Cumulative energy shifted down and not yet compensated (MWh)
    pub dsm_storage_level: Energy,
}

/// What a market value refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketValueKind {
    /// An electricity bus (plain average price)
    Bus,
    /// A renewable generator (infeed-weighted average price)
    Renewable,
}

/// The market value of a bus or renewable generator for one calendar month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketValueRecord {
    /// The month (`YYYY-MM`)
    pub month: String,
    /// The bus or generator
    pub id: String,
    /// What `id` refers to
    pub kind: MarketValueKind,
    /// Average price (EUR/MWh)
    pub market_value: MoneyPerEnergy,
}

fn month(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m").to_string()
}

/// The shadow price of an integral limit in one window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LimitShadowPrice {
    /// The index of the window (always 0 for full-horizon runs)
    pub window: usize,
    /// What is limited
    pub kind: LimitKind,
    /// Money per unit of the limited quantity
    pub value: f64,
}

/// Concatenated results of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchResults {
    /// The timestamps covered so far, in order
    pub timestamps: Vec<NaiveDateTime>,
    /// Production of every flow incident to an electricity bus
    pub production: Vec<ProductionRecord>,
    /// Day-ahead prices of every electricity bus
    pub prices: Vec<PriceRecord>,
    /// Storage levels
    pub storage_levels: Vec<StorageLevelRecord>,
    /// Demand response activation (empty if demand response is inactive)
    pub demand_response: Vec<DemandResponseRecord>,
    /// Total objective value, weighted by the retained share of each window
    pub objective_value: Money,
    /// Total emissions of the retained time steps
    pub emissions: Emissions,
    /// Shadow prices of emissions and budget limits
    pub limit_shadow_prices: Vec<LimitShadowPrice>,
    dr_levels: IndexMap<ComponentID, Energy>,
}

impl DispatchResults {
    /// Append the first `retained` time steps of a solved window.
    ///
    /// # Arguments
    ///
    /// * `window` - Index of the window, used to label shadow prices
    /// * `solution` - The solution for the window
    /// * `retained` - How many time steps, counted from the start of the window, to keep
    pub fn append(&mut self, window: usize, solution: &Solution, retained: usize) {
        let system = solution.system();
        assert!(retained > 0 && retained <= system.len());

        let timestamps = &system.time_index.as_slice()[..retained];
        let step_hours = system.step_hours();
        self.timestamps.extend_from_slice(timestamps);

        for (flow, t, value) in solution.iter_flows() {
            if t >= retained {
                continue;
            }

            self.emissions += value * step_hours * flow.emission_factor;

            let Some(bus) = system.electricity_bus(flow) else {
                continue;
            };
            self.production.push(ProductionRecord {
                timestamp: timestamps[t],
                source: flow.source.to_string(),
                target: flow.target.to_string(),
                value,
                bus: bus.clone(),
                is_renewable: system.component_kind(flow) == Some(ComponentKind::Renewable),
            });
        }

        self.prices.extend(
            solution
                .iter_prices()
                .filter(|(_, t, _)| *t < retained)
                .map(|(bus, t, price)| PriceRecord {
                    timestamp: timestamps[t],
                    bus: bus.clone(),
                    price,
                }),
        );

        self.storage_levels.extend(
            solution
                .iter_storage_levels()
                .filter(|(_, t, _)| *t < retained)
                .map(|(storage, t, level)| StorageLevelRecord {
                    timestamp: timestamps[t],
                    storage: storage.clone(),
                    level,
                }),
        );

        for (cluster, t, activation) in solution.iter_demand_response() {
            if t >= retained {
                continue;
            }

            // The level carries on from the previous window
            let level = self.dr_levels.entry(cluster.clone()).or_default();
            *level += (activation.do_shift - activation.up) * step_hours;
            self.demand_response.push(DemandResponseRecord {
                timestamp: timestamps[t],
                cluster: cluster.clone(),
                dsm_up: activation.up,
                dsm_do_shift: activation.do_shift,
                dsm_do_shed: activation.do_shed,
                dsm_storage_level: *level,
            });
        }

        self.limit_shadow_prices.extend(
            solution
                .iter_limit_shadow_prices()
                .map(|(kind, value)| LimitShadowPrice {
                    window,
                    kind,
                    value,
                }),
        );

        let share = retained as f64 / system.len() as f64;
        self.objective_value += solution.objective_value * Dimensionless(share);
    }

    /// The day-ahead price of a bus at every time step, in order
    pub fn prices_for<'a>(&'a self, bus: &'a BusID) -> impl Iterator<Item = MoneyPerEnergy> + 'a {
        self.prices
            .iter()
            .filter(move |record| &record.bus == bus)
            .map(|record| record.price)
    }

    /// Monthly market values of every renewable generator and every electricity bus.
    ///
    /// The market value of a generator is its infeed-weighted average price. The market value of
    /// a bus is its plain average price. Months without infeed are skipped for generators.
    pub fn market_values(&self) -> Vec<MarketValueRecord> {
        let prices: HashMap<_, _> = self
            .prices
            .iter()
            .map(|record| ((&record.bus, record.timestamp), record.price))
            .collect();

        // (month, id) -> (Σ weight * price, Σ weight)
        let mut sums: IndexMap<(String, String, MarketValueKind), (f64, f64)> = IndexMap::new();
        for record in &self.prices {
            let entry = sums
                .entry((month(record.timestamp), record.bus.to_string(), MarketValueKind::Bus))
                .or_default();
            entry.0 += record.price.0;
            entry.1 += 1.0;
        }
        for record in self.production.iter().filter(|record| record.is_renewable) {
            let Some(price) = prices.get(&(&record.bus, record.timestamp)) else {
                continue;
            };
            let entry = sums
                .entry((
                    month(record.timestamp),
                    record.source.clone(),
                    MarketValueKind::Renewable,
                ))
                .or_default();
            entry.0 += record.value.0 * price.0;
            entry.1 += record.value.0;
        }

        sums.into_iter()
            .filter(|(_, (_, weight))| *weight > 0.0)
            .map(|((month, id, kind), (sum, weight))| MarketValueRecord {
                month,
                id,
                kind,
                market_value: MoneyPerEnergy(sum / weight),
            })
            .collect()
    }

    /// The production of the flow from `source` to `target` at every time step, in order
    pub fn production_for<'a>(
        &'a self,
        source: &'a str,
        target: &'a str,
    ) -> impl Iterator<Item = Power> + 'a {
        self.production
            .iter()
            .filter(move |record| record.source == source && record.target == target)
            .map(|record| record.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::simple_system;
    use crate::optimisation::DispatchRun;
    use crate::solver::HighsSolver;
    use crate::system::EnergySystem;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn append_full_window(simple_system: EnergySystem) {
        let solver = HighsSolver::default();
        let solution = DispatchRun::new(&simple_system, &solver).run().unwrap();
        let mut results = DispatchResults::default();
        results.append(0, &solution, simple_system.len());

        assert_eq!(results.timestamps, simple_system.time_index.as_slice());
        assert_eq!(results.production.len(), 9);
        assert_eq!(results.prices.len(), 3);
        assert!(results.storage_levels.is_empty());
        assert!(results.demand_response.is_empty());
        assert_approx_eq!(f64, results.objective_value.0, 4200.0, epsilon = 1e-6);

        let cheap: Vec<_> = results.production_for("cheap", "DE_bus_el").collect();
        assert_eq!(cheap.len(), 3);
        assert!(cheap.iter().all(|p| (p.0 - 60.0).abs() < 1e-6));
        assert!(
            results
                .prices_for(&"DE_bus_el".into())
                .all(|p| (p.0 - 20.0).abs() < 1e-6)
        );
    }

    #[rstest]
    fn append_retained_part(simple_system: EnergySystem) {
        let solver = HighsSolver::default();
        let solution = DispatchRun::new(&simple_system, &solver).run().unwrap();
        let mut results = DispatchResults::default();
        results.append(0, &solution, 2);

        assert_eq!(results.timestamps, &simple_system.time_index.as_slice()[..2]);
        assert_eq!(results.prices.len(), 2);
        assert_eq!(results.production.len(), 6);
        assert_approx_eq!(f64, results.objective_value.0, 2800.0, epsilon = 1e-6);
    }

    #[rstest]
    fn emissions_counted(mut simple_system: EnergySystem) {
        simple_system.flows[1].emission_factor = crate::units::EmissionsPerEnergy(0.5);
        let solver = HighsSolver::default();
        let solution = DispatchRun::new(&simple_system, &solver).run().unwrap();
        let mut results = DispatchResults::default();
        results.append(0, &solution, 3);

        // 40 MW for three hours at 0.5 t/MWh
        assert_approx_eq!(f64, results.emissions.0, 60.0, epsilon = 1e-6);
    }

    #[rstest]
    fn market_values_monthly(simple_system: EnergySystem) {
        let solver = HighsSolver::default();
        let solution = DispatchRun::new(&simple_system, &solver).run().unwrap();
        let mut results = DispatchResults::default();
        results.append(0, &solution, 3);

        // Move the last time step into the next month with a different price
        let next_month = crate::time::parse_timestamp("2017-02-01 00:00:00").unwrap();
        for record in &mut results.production {
            if record.timestamp == simple_system.time_index.as_slice()[2] {
                record.timestamp = next_month;
            }
        }
        results.prices[2].timestamp = next_month;
        results.prices[2].price = MoneyPerEnergy(30.0);
        results.prices[1].price = MoneyPerEnergy(10.0);

        let values = results.market_values();
        let find = |month: &str, id: &str| {
            values
                .iter()
                .find(|v| v.month == month && v.id == id)
                .map(|v| v.market_value.0)
        };
        assert_eq!(values.len(), 6);
        assert_approx_eq!(f64, find("2017-01", "DE_bus_el").unwrap(), 15.0);
        assert_approx_eq!(f64, find("2017-02", "DE_bus_el").unwrap(), 30.0);
        // Both generators run at a constant output, so the weighted mean equals the plain mean
        assert_approx_eq!(f64, find("2017-01", "cheap").unwrap(), 15.0, epsilon = 1e-6);
        assert_approx_eq!(f64, find("2017-02", "expensive").unwrap(), 30.0, epsilon = 1e-6);
    }

    #[test]
    fn timestamp_format() {
        let record = PriceRecord {
            timestamp: crate::time::parse_timestamp("2017-01-01 05:00:00").unwrap(),
            bus: "DE_bus_el".into(),
            price: MoneyPerEnergy(20.0),
        };
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(record).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(out, "timestamp,bus,price\n2017-01-01 05:00:00,DE_bus_el,20.0\n");
    }
}
