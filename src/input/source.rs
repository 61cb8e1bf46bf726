//! Code for reading sources of energy: commodity (fuel) sources, renewables and the slack
//! components which cover shortage and excess.
use super::{
    check_non_negative, check_normalised, ensure_value, input_err_msg, lookup_profile, read_csv,
    read_csv_optional, read_time_series, read_time_series_optional,
};
use crate::bus::BusID;
use crate::config::{EmissionsPathway, FuelCostPathway};
use crate::error::DispatchError;
use crate::id::{ComponentID, define_id_getter, find_duplicate_id};
use crate::time::TimeIndex;
use crate::units::{
    Emissions, EmissionsPerEnergy, MoneyPerEmissions, MoneyPerEnergy, Power, UnitType,
};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const COMMODITY_SOURCES_FILE_NAME: &str = "commodity_sources.csv";
const FUEL_COSTS_FILE_NAME: &str = "costs_fuel.csv";
const EMISSION_PRICES_FILE_NAME: &str = "costs_emissions_ts.csv";
const EMISSION_LIMITS_FILE_NAME: &str = "emission_limits.csv";
const RENEWABLES_FILE_NAME: &str = "renewables.csv";
const RENEWABLES_TS_FILE_NAME: &str = "renewables_ts.csv";
const SHORTAGE_SOURCES_FILE_NAME: &str = "shortage_sources.csv";
const EXCESS_SINKS_FILE_NAME: &str = "excess_sinks.csv";

/// A fuel supply feeding a fuel bus
#[derive(Debug, Clone, PartialEq)]
pub struct CommoditySource {
    /// Unique identifier
    pub id: ComponentID,
    /// The bidding zone of the source
    pub country: String,
    /// The bus supplied
    pub to: BusID,
    /// Emissions per unit of energy supplied
    pub emission_factor: EmissionsPerEnergy,
    /// Fuel cost for the selected pathway
    pub fuel_cost: MoneyPerEnergy,
}
define_id_getter! {CommoditySource, ComponentID}

#[derive(Debug, Deserialize)]
struct CommoditySourceRaw {
    id: ComponentID,
    country: String,
    to: BusID,
    emission_factor: EmissionsPerEnergy,
}

#[derive(Debug, Deserialize)]
struct FuelCostRaw {
    source_id: ComponentID,
    pathway: String,
    cost: MoneyPerEnergy,
}

/// Read commodity sources along with their fuel cost for the selected pathway
pub fn read_commodity_sources(
    input_dir: &Path,
    pathway: FuelCostPathway,
) -> Result<Vec<CommoditySource>> {
    let file_path = input_dir.join(COMMODITY_SOURCES_FILE_NAME);
    let sources_raw: Vec<CommoditySourceRaw> = read_csv_optional(&file_path)?.collect();
    if sources_raw.is_empty() {
        return Ok(Vec::new());
    }

    let costs_path = input_dir.join(FUEL_COSTS_FILE_NAME);
    let costs = read_fuel_costs(read_csv(&costs_path)?, pathway)
        .with_context(|| input_err_msg(&costs_path))?;

    read_commodity_sources_from_iter(sources_raw.into_iter(), &costs)
        .with_context(|| input_err_msg(&file_path))
}

fn read_fuel_costs<I>(
    iter: I,
    pathway: FuelCostPathway,
) -> Result<HashMap<ComponentID, MoneyPerEnergy>>
where
    I: Iterator<Item = FuelCostRaw>,
{
    let pathway = pathway.to_string();
    let mut costs = HashMap::new();
    for record in iter.filter(|record| record.pathway == pathway) {
        ensure_value!(
            record.cost.is_finite(),
            "Fuel cost for {} must be finite",
            record.source_id
        );
        if costs.insert(record.source_id.clone(), record.cost).is_some() {
            bail!(DispatchError::InvalidValue(format!(
                "Duplicate fuel cost for {} and pathway {pathway}",
                record.source_id
            )));
        }
    }

    Ok(costs)
}

fn read_commodity_sources_from_iter<I>(
    iter: I,
    costs: &HashMap<ComponentID, MoneyPerEnergy>,
) -> Result<Vec<CommoditySource>>
where
    I: Iterator<Item = CommoditySourceRaw>,
{
    let sources = iter
        .map(|raw| -> Result<_> {
            ensure_value!(
                raw.emission_factor >= EmissionsPerEnergy(0.0) && raw.emission_factor.is_finite(),
                "Emission factor for {} must be non-negative",
                raw.id
            );
            let Some(&fuel_cost) = costs.get(&raw.id) else {
                bail!(DispatchError::MissingInput(format!(
                    "No fuel cost given for commodity source {}",
                    raw.id
                )));
            };

            Ok(CommoditySource {
                id: raw.id,
                country: raw.country,
                to: raw.to,
                emission_factor: raw.emission_factor,
                fuel_cost,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if let Some(id) = find_duplicate_id(&sources) {
        bail!(DispatchError::InvalidValue(format!(
            "Duplicate commodity source ID found: {id}"
        )));
    }

    Ok(sources)
}

/// Read the emission price for each time step, defaulting to zero if no prices are given
pub fn read_emission_prices(
    input_dir: &Path,
    time_index: &TimeIndex,
) -> Result<Vec<MoneyPerEmissions>> {
    let file_path = input_dir.join(EMISSION_PRICES_FILE_NAME);
    let Some(table) = read_time_series_optional(&file_path, time_index)? else {
        return Ok(vec![MoneyPerEmissions(0.0); time_index.len()]);
    };

    let prices = table.column("price").with_context(|| input_err_msg(&file_path))?;
    check_non_negative(prices, "Emission price").with_context(|| input_err_msg(&file_path))?;

    Ok(prices.iter().copied().map(MoneyPerEmissions).collect())
}

#[derive(Debug, Deserialize)]
struct EmissionLimitRaw {
    pathway: String,
    annual_limit: Emissions,
}

/// Read the annual emissions limit for the given pathway
pub fn read_emission_limit(input_dir: &Path, pathway: EmissionsPathway) -> Result<Emissions> {
    let file_path = input_dir.join(EMISSION_LIMITS_FILE_NAME);
    read_emission_limit_from_iter(read_csv(&file_path)?, pathway)
        .with_context(|| input_err_msg(&file_path))
}

fn read_emission_limit_from_iter<I>(iter: I, pathway: EmissionsPathway) -> Result<Emissions>
where
    I: Iterator<Item = EmissionLimitRaw>,
{
    let pathway = pathway.to_string();
    let mut limits = iter.filter(|record| record.pathway == pathway);
    let Some(record) = limits.next() else {
        bail!(DispatchError::MissingInput(format!(
            "No emissions limit given for pathway {pathway}"
        )));
    };
    ensure_value!(
        limits.next().is_none(),
        "More than one emissions limit given for pathway {pathway}"
    );
    ensure_value!(
        record.annual_limit >= Emissions(0.0) && record.annual_limit.is_finite(),
        "Emissions limit must be non-negative"
    );

    Ok(record.annual_limit)
}

/// A renewable generator whose output follows an exogenous profile
#[derive(Debug, Clone, PartialEq)]
pub struct Renewable {
    /// Unique identifier
    pub id: ComponentID,
    /// The bidding zone of the generator
    pub country: String,
    /// The bus supplied
    pub to: BusID,
    /// Installed capacity
    pub capacity: Power,
    /// Normalised infeed for every time step
    pub profile: Vec<f64>,
    /// Whether the infeed is fixed (otherwise it may be curtailed)
    pub fixed: bool,
    /// Variable cost of infeed
    pub cost: MoneyPerEnergy,
}
define_id_getter! {Renewable, ComponentID}

#[derive(Debug, Deserialize)]
struct RenewableRaw {
    id: ComponentID,
    country: String,
    to: BusID,
    capacity: Power,
    profile: String,
    #[serde(default)]
    fixed: bool,
    #[serde(default)]
    cost: MoneyPerEnergy,
}

impl RenewableRaw {
    fn validate(&self) -> Result<()> {
        ensure_value!(
            self.capacity >= Power(0.0) && self.capacity.is_finite(),
            "Capacity of renewable {} must be non-negative",
            self.id
        );
        ensure_value!(
            self.cost.is_finite(),
            "Cost of renewable {} must be finite",
            self.id
        );

        Ok(())
    }
}

/// Read renewable generators and their infeed profiles
pub fn read_renewables(input_dir: &Path, time_index: &TimeIndex) -> Result<Vec<Renewable>> {
    let file_path = input_dir.join(RENEWABLES_FILE_NAME);
    let renewables_raw: Vec<RenewableRaw> = read_csv_optional(&file_path)?.collect();
    if renewables_raw.is_empty() {
        return Ok(Vec::new());
    }

    let profiles = read_time_series(&input_dir.join(RENEWABLES_TS_FILE_NAME), time_index)?;
    let renewables = renewables_raw
        .into_iter()
        .map(|raw| -> Result<_> {
            raw.validate()?;
            let profile = lookup_profile(Some(&profiles), &raw.profile, RENEWABLES_TS_FILE_NAME)?;
            check_normalised(&profile, &format!("Infeed profile {}", raw.profile))?;

            Ok(Renewable {
                id: raw.id,
                country: raw.country,
                to: raw.to,
                capacity: raw.capacity,
                profile,
                fixed: raw.fixed,
                cost: raw.cost,
            })
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| input_err_msg(&file_path))?;

    if let Some(id) = find_duplicate_id(&renewables) {
        bail!(DispatchError::InvalidValue(format!(
            "Duplicate renewable ID found: {id}"
        )));
    }

    Ok(renewables)
}

/// A shortage source or excess sink attached to a single bus
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SlackComponent {
    /// Unique identifier
    pub id: ComponentID,
    /// The bidding zone of the component
    pub country: String,
    /// The bus the component is attached to
    #[serde(alias = "to", alias = "from")]
    pub bus: BusID,
    /// Cost per unit of energy
    pub cost: MoneyPerEnergy,
}
define_id_getter! {SlackComponent, ComponentID}

fn read_slack_components(file_path: &Path, what: &str) -> Result<Vec<SlackComponent>> {
    let components: Vec<SlackComponent> = read_csv_optional(file_path)?.collect();
    let check = || -> Result<()> {
        for component in &components {
            ensure_value!(
                component.cost >= MoneyPerEnergy(0.0) && component.cost.is_finite(),
                "Cost of {what} {} must be non-negative",
                component.id
            );
        }
        if let Some(id) = find_duplicate_id(&components) {
            bail!(DispatchError::InvalidValue(format!(
                "Duplicate {what} ID found: {id}"
            )));
        }

        Ok(())
    };
    check().with_context(|| input_err_msg(file_path))?;

    Ok(components)
}

/// Read sources which cover unmet demand
pub fn read_shortage_sources(input_dir: &Path) -> Result<Vec<SlackComponent>> {
    read_slack_components(
        &input_dir.join(SHORTAGE_SOURCES_FILE_NAME),
        "shortage source",
    )
}

/// Read sinks which absorb surplus energy
pub fn read_excess_sinks(input_dir: &Path) -> Result<Vec<SlackComponent>> {
    read_slack_components(&input_dir.join(EXCESS_SINKS_FILE_NAME), "excess sink")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, time_index};
    use rstest::rstest;
    use std::fs;
    use tempfile::tempdir;

    fn cost(source_id: &str, pathway: &str, cost: f64) -> FuelCostRaw {
        FuelCostRaw {
            source_id: source_id.into(),
            pathway: pathway.into(),
            cost: MoneyPerEnergy(cost),
        }
    }

    #[test]
    fn read_fuel_costs_selects_pathway() {
        let costs = read_fuel_costs(
            [
                cost("gas", "lower", 10.0),
                cost("gas", "middle", 20.0),
                cost("gas", "upper", 30.0),
            ]
            .into_iter(),
            FuelCostPathway::Middle,
        )
        .unwrap();
        assert_eq!(costs.len(), 1);
        assert_eq!(costs[&ComponentID::new("gas")], MoneyPerEnergy(20.0));
    }

    #[test]
    fn read_commodity_sources_missing_cost() {
        let raw = CommoditySourceRaw {
            id: "DE_gas".into(),
            country: "DE".into(),
            to: "DE_bus_gas".into(),
            emission_factor: EmissionsPerEnergy(0.2),
        };
        assert_error!(
            read_commodity_sources_from_iter([raw].into_iter(), &HashMap::new()),
            "Missing input: No fuel cost given for commodity source DE_gas"
        );
    }

    #[test]
    fn read_commodity_sources_negative_emission_factor() {
        let raw = CommoditySourceRaw {
            id: "DE_gas".into(),
            country: "DE".into(),
            to: "DE_bus_gas".into(),
            emission_factor: EmissionsPerEnergy(-0.2),
        };
        let costs = HashMap::from([(ComponentID::new("DE_gas"), MoneyPerEnergy(20.0))]);
        assert_error!(
            read_commodity_sources_from_iter([raw].into_iter(), &costs),
            "Invalid value: Emission factor for DE_gas must be non-negative"
        );
    }

    #[rstest]
    #[case(EmissionsPathway::BusinessAsUsual, Some(100.0))]
    #[case(EmissionsPathway::HundredPercentLinear, Some(10.0))]
    #[case(EmissionsPathway::EightyPercentLinear, None)]
    fn read_emission_limit_for_pathway(
        #[case] pathway: EmissionsPathway,
        #[case] expected: Option<f64>,
    ) {
        let records = [
            EmissionLimitRaw {
                pathway: "BAU".into(),
                annual_limit: Emissions(100.0),
            },
            EmissionLimitRaw {
                pathway: "100_percent_linear".into(),
                annual_limit: Emissions(10.0),
            },
        ];
        let result = read_emission_limit_from_iter(records.into_iter(), pathway);
        match expected {
            Some(limit) => assert_eq!(result.unwrap(), Emissions(limit)),
            None => assert!(result.is_err()),
        }
    }

    #[rstest]
    fn read_emission_prices_default_zero(time_index: TimeIndex) {
        let dir = tempdir().unwrap();
        let prices = read_emission_prices(dir.path(), &time_index).unwrap();
        assert_eq!(prices, vec![MoneyPerEmissions(0.0); 3]);
    }

    #[rstest]
    fn read_renewables_works(time_index: TimeIndex) {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(RENEWABLES_FILE_NAME),
            "id,country,to,capacity,profile,fixed,cost\n\
            DE_wind,DE,DE_bus_el,100,wind_DE,true,0\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(RENEWABLES_TS_FILE_NAME),
            "timestamp,wind_DE\n\
            2017-01-01 00:00:00,0.1\n\
            2017-01-01 01:00:00,0.5\n\
            2017-01-01 02:00:00,1.0\n",
        )
        .unwrap();
        let renewables = read_renewables(dir.path(), &time_index).unwrap();
        assert_eq!(renewables.len(), 1);
        assert_eq!(renewables[0].profile, [0.1, 0.5, 1.0]);
        assert!(renewables[0].fixed);
    }

    #[rstest]
    fn read_renewables_profile_out_of_range(time_index: TimeIndex) {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(RENEWABLES_FILE_NAME),
            "id,country,to,capacity,profile,fixed,cost\n\
            DE_wind,DE,DE_bus_el,100,wind_DE,true,0\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(RENEWABLES_TS_FILE_NAME),
            "timestamp,wind_DE\n\
            2017-01-01 00:00:00,0.1\n\
            2017-01-01 01:00:00,1.5\n\
            2017-01-01 02:00:00,1.0\n",
        )
        .unwrap();
        let err = read_renewables(dir.path(), &time_index).unwrap_err();
        assert!(matches!(
            DispatchError::find_in(&err),
            Some(DispatchError::InvalidValue(_))
        ));
    }

    #[test]
    fn read_shortage_sources_negative_cost() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(SHORTAGE_SOURCES_FILE_NAME),
            "id,country,to,cost\nDE_shortage,DE,DE_bus_el,-1\n",
        )
        .unwrap();
        assert!(read_shortage_sources(dir.path()).is_err());
        assert!(read_excess_sinks(dir.path()).unwrap().is_empty());
    }
}
