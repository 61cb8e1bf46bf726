//! Common routines for handling input data.
//!
//! Every table is deserialised into a `...Raw` record, validated and converted into a typed
//! record. Time series are aligned against the scenario's [`TimeIndex`] while loading, so that
//! everything downstream can index them by time step.
use crate::bus::BusMap;
use crate::config::ScenarioConfig;
use crate::demand_response::DemandResponseCluster;
use crate::error::DispatchError;
use crate::time::{TimeIndex, parse_timestamp};
use crate::units::{Emissions, MoneyPerEmissions};
use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use itertools::Itertools;
use log::info;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::hash::Hash;
use std::path::Path;

mod bus;
use bus::read_buses;
mod demand;
pub use demand::Demand;
use demand::read_demands;
mod demand_response;
use demand_response::read_demand_response_clusters;
mod source;
pub use source::{CommoditySource, Renewable, SlackComponent};
use source::{
    read_commodity_sources, read_emission_limit, read_emission_prices, read_excess_sinks,
    read_renewables, read_shortage_sources,
};
mod storage;
pub use storage::{StorageKind, StorageRecord};
use storage::read_storages;
mod time_series;
pub use time_series::TimeSeriesTable;
use time_series::{read_time_series, read_time_series_optional};
mod transformer;
pub use transformer::{Interconnector, TransformerKind, TransformerRecord};
use transformer::{read_interconnectors, read_transformers};

/// Bail out with a [`DispatchError::InvalidValue`] if a condition does not hold
macro_rules! ensure_value {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            anyhow::bail!($crate::error::DispatchError::InvalidValue(format!($($arg)+)));
        }
    };
}
pub(crate) use ensure_value;

/// Define a function returning a default value, for use with `#[serde(default = "...")]`
macro_rules! define_param_default {
    ($name:ident, $type:ty, $value:expr) => {
        fn $name() -> $type {
            $value
        }
    };
}
pub(crate) use define_param_default;

/// All validated input data for a scenario, aligned to the full time index
#[derive(Debug, Clone, PartialEq)]
pub struct InputData {
    /// All buses, before filtering by country
    pub buses: BusMap,
    /// Fuel supplies with their pathway-specific costs
    pub commodity_sources: Vec<CommoditySource>,
    /// Emission price for every time step
    pub emission_prices: Vec<MoneyPerEmissions>,
    /// Annual emissions limit for the selected pathway, if the limit is active
    pub annual_emissions_limit: Option<Emissions>,
    /// Renewable generators with exogenous infeed
    pub renewables: Vec<Renewable>,
    /// Dispatchable power plants
    pub transformers: Vec<TransformerRecord>,
    /// Directed cross-border links
    pub interconnectors: Vec<Interconnector>,
    /// Fixed demand
    pub demands: Vec<Demand>,
    /// Sources of last resort which cover unmet demand
    pub shortage_sources: Vec<SlackComponent>,
    /// Sinks which absorb surplus energy
    pub excess_sinks: Vec<SlackComponent>,
    /// Storage units
    pub storages: Vec<StorageRecord>,
    /// Demand response clusters, if demand response is active
    pub demand_response: Vec<DemandResponseCluster>,
}

/// Load all input data for a scenario.
///
/// # Arguments
///
/// * `config` - The resolved scenario configuration
///
/// # Returns
///
/// The validated input data or an error identifying the offending file.
pub fn load_input(config: &ScenarioConfig) -> Result<InputData> {
    let input_dir = &config.input_dir;
    let time_index = &config.time_index;
    info!("Loading input data from {}", input_dir.display());

    let buses = read_buses(input_dir)?;
    let commodity_sources = read_commodity_sources(input_dir, config.fuel_cost_pathway)?;
    let emission_prices = read_emission_prices(input_dir, time_index)?;
    let annual_emissions_limit = config
        .emissions_limit
        .as_ref()
        .map(|limit| read_emission_limit(input_dir, limit.pathway))
        .transpose()?;
    let renewables = read_renewables(input_dir, time_index)?;
    let transformers = read_transformers(input_dir, time_index)?;
    let interconnectors = read_interconnectors(input_dir, time_index)?;
    let demands = read_demands(input_dir, time_index)?;
    let shortage_sources = read_shortage_sources(input_dir)?;
    let excess_sinks = read_excess_sinks(input_dir)?;
    let storages = read_storages(input_dir)?;
    let demand_response = match &config.demand_response {
        Some(dr) => read_demand_response_clusters(input_dir, &dr.scenario, time_index)?,
        None => Vec::new(),
    };

    Ok(InputData {
        buses,
        commodity_sources,
        emission_prices,
        annual_emissions_limit,
        renewables,
        transformers,
        interconnectors,
        demands,
        shortage_sources,
        excess_sinks,
        storages,
        demand_response,
    })
}

/// Read a series of type `T`s from a CSV file.
///
/// Fails with a [`DispatchError::MissingInput`] if the file does not exist and with a
/// [`DispatchError::InvalidValue`] if a row cannot be parsed.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv<'a, T: DeserializeOwned + 'a>(
    file_path: &'a Path,
) -> Result<impl Iterator<Item = T> + 'a> {
    if !file_path.is_file() {
        bail!(DispatchError::MissingInput(format!(
            "Required file {} not found",
            file_path.display()
        )));
    }

    let vec = read_csv_internal(file_path)?;
    if vec.is_empty() {
        bail!(DispatchError::MissingInput(format!(
            "CSV file {} cannot be empty",
            file_path.display()
        )));
    }

    Ok(vec.into_iter())
}

/// Read a series of type `T`s from a CSV file, returning an empty iterator if it doesn't exist
pub fn read_csv_optional<'a, T: DeserializeOwned + 'a>(
    file_path: &'a Path,
) -> Result<impl Iterator<Item = T> + 'a> {
    if !file_path.exists() {
        return Ok(Vec::new().into_iter());
    }

    let vec = read_csv_internal(file_path)?;
    Ok(vec.into_iter())
}

fn read_csv_internal<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(file_path)
        .with_context(|| input_err_msg(file_path))?;

    reader
        .into_deserialize()
        .process_results(|iter| iter.collect_vec())
        .map_err(|err| DispatchError::InvalidValue(format!("{err}")))
        .with_context(|| input_err_msg(file_path))
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Format an error message to include the file path
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Insert a key-value pair into a map, failing if the key is already present
pub fn try_insert<K, V>(map: &mut HashMap<K, V>, key: &K, value: V) -> Result<()>
where
    K: Eq + Hash + Clone + Display,
{
    if map.insert(key.clone(), value).is_some() {
        bail!(DispatchError::InvalidValue(format!(
            "Key {key} already exists in the map"
        )));
    }

    Ok(())
}

/// Collect items into an [`IndexMap`] keyed by ID, failing on duplicate IDs
fn collect_unique<K, V, I>(iter: I, what: &str) -> Result<IndexMap<K, V>>
where
    K: Eq + Hash + Display,
    I: IntoIterator<Item = (K, V)>,
{
    let mut map = IndexMap::new();
    for (key, value) in iter {
        if map.contains_key(&key) {
            bail!(DispatchError::InvalidValue(format!(
                "Duplicate {what} ID found: {key}"
            )));
        }
        map.insert(key, value);
    }

    Ok(map)
}

/// Check that each value in a normalised profile lies in `[0, 1]`
fn check_normalised(values: &[f64], what: &str) -> Result<()> {
    if let Some(value) = values.iter().find(|v| !(0.0..=1.0).contains(*v)) {
        bail!(DispatchError::InvalidValue(format!(
            "{what} must be between 0 and 1 (got {value})"
        )));
    }

    Ok(())
}

/// Check that no value in a profile is negative
fn check_non_negative(values: &[f64], what: &str) -> Result<()> {
    if let Some(value) = values.iter().find(|v| **v < 0.0) {
        bail!(DispatchError::InvalidValue(format!(
            "{what} must not be negative (got {value})"
        )));
    }

    Ok(())
}

/// Parse a timestamp from a data file, raising a [`DispatchError::InvalidValue`] on failure
fn parse_data_timestamp(s: &str) -> Result<chrono::NaiveDateTime> {
    parse_timestamp(s).map_err(|err| {
        DispatchError::InvalidValue(format!("Invalid timestamp '{s}': {err}")).into()
    })
}

/// Read the named profile from a time series table, if a name is given
fn lookup_profile(
    table: Option<&TimeSeriesTable>,
    profile: &str,
    file_name: &str,
) -> Result<Vec<f64>> {
    let Some(table) = table else {
        bail!(DispatchError::MissingInput(format!(
            "Profile {profile} is referenced but {file_name} does not exist"
        )));
    };

    Ok(table.column(profile)?.to_vec())
}
