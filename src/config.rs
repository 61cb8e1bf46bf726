//! Read and resolve the scenario configuration from `config.toml`.
//!
//! The configuration is read into loosely-typed raw structs first, so that invalid selector
//! values can be reported as a [`DispatchError::Configuration`] before any input data is loaded.
//! It is then resolved into an immutable [`ScenarioConfig`], which is passed explicitly to every
//! stage of the run.
use crate::demand_response::{DemandResponseApproach, DemandResponseSettings};
use crate::error::DispatchError;
use crate::input::{define_param_default, input_err_msg, read_toml};
use crate::solver::SolverOptions;
use crate::time::{TimeIndex, parse_frequency, parse_timestamp};
use crate::units::Money;
use anyhow::{Context, Result, bail};
use indexmap::IndexSet;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// The name of the scenario configuration file inside a model directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Fuel cost pathway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter)]
pub enum FuelCostPathway {
    /// Low fuel prices
    #[strum(serialize = "lower")]
    Lower,
    /// Central fuel prices
    #[strum(serialize = "middle")]
    Middle,
    /// High fuel prices
    #[strum(serialize = "upper")]
    Upper,
}

/// Emissions reduction pathway, used to look up the emissions limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter)]
pub enum EmissionsPathway {
    /// Business as usual
    #[strum(serialize = "BAU")]
    BusinessAsUsual,
    /// Linear reduction to 80% below the reference
    #[strum(serialize = "80_percent_linear")]
    EightyPercentLinear,
    /// Linear reduction to 95% below the reference
    #[strum(serialize = "95_percent_linear")]
    NinetyFivePercentLinear,
    /// Linear reduction to zero
    #[strum(serialize = "100_percent_linear")]
    HundredPercentLinear,
}

/// The LP solver to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, EnumIter)]
pub enum SolverKind {
    /// The HiGHS solver
    #[strum(serialize = "highs")]
    Highs,
}

/// The `[control]` section
#[derive(Debug, Deserialize)]
struct ControlRaw {
    countries: Vec<String>,
    #[serde(default = "default_solver")]
    solver: String,
    fuel_cost_pathway: String,
    #[serde(default)]
    activate_emissions_limit: bool,
    emissions_pathway: Option<String>,
    emissions_limit_countries: Option<Vec<String>>,
    #[serde(default)]
    activate_budget_limit: bool,
    budget_limit: Option<f64>,
    #[serde(default)]
    activate_demand_response: bool,
    demand_response_approach: Option<String>,
    demand_response_scenario: Option<String>,
    #[serde(default)]
    rolling_horizon: bool,
    #[serde(default = "default_true")]
    save_production_results: bool,
    #[serde(default = "default_true")]
    save_price_results: bool,
    #[serde(default)]
    save_updated_market_values: bool,
    #[serde(default)]
    write_lp_file: bool,
}

define_param_default!(default_solver, String, "highs".into());
define_param_default!(default_true, bool, true);

/// The `[time]` section
#[derive(Debug, Deserialize)]
struct TimeRaw {
    start_time: String,
    end_time: String,
    #[serde(default = "default_freq")]
    freq: String,
}

define_param_default!(default_freq, String, "60min".into());

/// The `[paths]` section
#[derive(Debug, Deserialize, Default)]
struct PathsRaw {
    input_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
}

/// The `[rolling_horizon]` section
#[derive(Debug, Deserialize)]
struct RollingHorizonRaw {
    time_slice_length_wo_overlap_in_hours: u32,
    overlap_in_hours: u32,
}

/// The configuration file as written by the user
#[derive(Debug, Deserialize)]
struct ScenarioConfigRaw {
    control: ControlRaw,
    time: TimeRaw,
    #[serde(default)]
    paths: PathsRaw,
    rolling_horizon: Option<RollingHorizonRaw>,
    #[serde(default)]
    solver_options: toml::Table,
    #[serde(default)]
    demand_response: DemandResponseSettings,
}

/// Settings for the optional emissions limit
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionsLimitConfig {
    /// The pathway used to look up the annual limit
    pub pathway: EmissionsPathway,
    /// Countries whose commodity sources count towards the limit
    pub countries: IndexSet<String>,
}

/// Settings for demand response
#[derive(Debug, Clone, PartialEq)]
pub struct DemandResponseConfig {
    /// The formulation to use for all clusters
    pub approach: DemandResponseApproach,
    /// Identifies which set of cluster input files to use
    pub scenario: String,
    /// Formulation-specific parameters
    pub settings: DemandResponseSettings,
}

/// Window lengths for a rolling horizon run, in time steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingHorizonConfig {
    /// Number of time steps retained from each slice
    pub slice_length: usize,
    /// Number of extra time steps solved beyond the retained part
    pub overlap: usize,
}

/// Which result files to write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct OutputFlags {
    /// Write production time series
    pub save_production_results: bool,
    /// Write price time series
    pub save_price_results: bool,
    /// Write monthly market values of renewables
    pub save_updated_market_values: bool,
    /// Write the assembled LP problem(s)
    pub write_lp_file: bool,
}

/// A fully resolved, immutable scenario configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    /// Included bidding zones
    pub countries: IndexSet<String>,
    /// The solver to use
    pub solver: SolverKind,
    /// Options passed through to the solver
    pub solver_options: SolverOptions,
    /// The fuel cost pathway
    pub fuel_cost_pathway: FuelCostPathway,
    /// Emissions limit settings, if the limit is active
    pub emissions_limit: Option<EmissionsLimitConfig>,
    /// Budget limit on total operational cost, if active
    pub budget_limit: Option<Money>,
    /// Demand response settings, if demand response is active
    pub demand_response: Option<DemandResponseConfig>,
    /// Rolling horizon window lengths, if the rolling horizon is active
    pub rolling_horizon: Option<RollingHorizonConfig>,
    /// The simulation time grid
    pub time_index: TimeIndex,
    /// Folder containing input data
    pub input_dir: PathBuf,
    /// Default folder for results, if given
    pub output_dir: Option<PathBuf>,
    /// Which result files to write
    pub output: OutputFlags,
}

/// Parse a selector string into one of its enumerated values
fn parse_selector<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr + IntoEnumIterator + std::fmt::Display,
{
    T::from_str(value).or_else(|_| {
        let valid: Vec<_> = T::iter().map(|v| v.to_string()).collect();
        bail!(DispatchError::Configuration(format!(
            "Invalid value '{value}' for {name}. Valid values are: {}",
            valid.join(", ")
        )))
    })
}

fn configuration_error(msg: String) -> anyhow::Error {
    DispatchError::Configuration(msg).into()
}

impl ScenarioConfig {
    /// Read the configuration file from a model directory and resolve it.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing `config.toml`
    ///
    /// # Returns
    ///
    /// The resolved configuration, or an error if the file is missing or invalid.
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<ScenarioConfig> {
        let model_dir = model_dir.as_ref();
        let file_path = model_dir.join(CONFIG_FILE_NAME);
        let raw: ScenarioConfigRaw = read_toml(&file_path).map_err(|err| {
            configuration_error(format!("{}: {err:#}", input_err_msg(&file_path)))
        })?;

        Self::from_raw(raw, model_dir).with_context(|| input_err_msg(&file_path))
    }

    /// Parse configuration from a TOML string, resolving relative paths against `model_dir`
    pub fn from_toml_str(contents: &str, model_dir: &Path) -> Result<ScenarioConfig> {
        let raw: ScenarioConfigRaw = toml::from_str(contents)
            .map_err(|err| configuration_error(format!("Could not parse configuration: {err}")))?;

        Self::from_raw(raw, model_dir)
    }

    fn from_raw(raw: ScenarioConfigRaw, model_dir: &Path) -> Result<ScenarioConfig> {
        let control = raw.control;

        if control.countries.is_empty() {
            bail!(configuration_error("No countries specified".into()));
        }
        let countries: IndexSet<_> = control.countries.into_iter().collect();

        let solver = parse_selector::<SolverKind>("solver", &control.solver)?;
        let fuel_cost_pathway =
            parse_selector::<FuelCostPathway>("fuel_cost_pathway", &control.fuel_cost_pathway)?;

        // Selectors are validated even if the corresponding feature is switched off
        let emissions_pathway = control
            .emissions_pathway
            .as_deref()
            .map(|value| parse_selector::<EmissionsPathway>("emissions_pathway", value))
            .transpose()?;
        let demand_response_approach = control
            .demand_response_approach
            .as_deref()
            .map(|value| {
                parse_selector::<DemandResponseApproach>("demand_response_approach", value)
            })
            .transpose()?;

        let emissions_limit = if control.activate_emissions_limit {
            let pathway = emissions_pathway.ok_or_else(|| {
                configuration_error(
                    "emissions_pathway must be given when the emissions limit is active".into(),
                )
            })?;
            let countries = control
                .emissions_limit_countries
                .map_or_else(|| countries.clone(), |c| c.into_iter().collect());
            Some(EmissionsLimitConfig { pathway, countries })
        } else {
            None
        };

        let budget_limit = if control.activate_budget_limit {
            match control.budget_limit {
                Some(limit) if limit.is_finite() && limit >= 0.0 => Some(Money(limit)),
                _ => bail!(configuration_error(
                    "budget_limit must be a finite, non-negative number when the budget limit is \
                    active"
                        .into()
                )),
            }
        } else {
            None
        };

        let demand_response = if control.activate_demand_response {
            let approach = demand_response_approach.ok_or_else(|| {
                configuration_error(
                    "demand_response_approach must be given when demand response is active"
                        .into(),
                )
            })?;
            let scenario = control.demand_response_scenario.ok_or_else(|| {
                configuration_error(
                    "demand_response_scenario must be given when demand response is active"
                        .into(),
                )
            })?;
            if raw.demand_response.shift_interval == 0 {
                bail!(configuration_error("shift_interval must be positive".into()));
            }
            if raw.demand_response.activate_day_limit && raw.demand_response.t_day_limit == 0 {
                bail!(configuration_error("t_day_limit must be positive".into()));
            }
            Some(DemandResponseConfig {
                approach,
                scenario,
                settings: raw.demand_response,
            })
        } else {
            None
        };

        let time_index = resolve_time_index(&raw.time)?;

        let rolling_horizon = if control.rolling_horizon {
            let rh = raw.rolling_horizon.ok_or_else(|| {
                configuration_error(
                    "A [rolling_horizon] section is required for rolling horizon runs".into(),
                )
            })?;
            Some(resolve_rolling_horizon(&rh, &time_index)?)
        } else {
            None
        };

        let input_dir = model_dir.join(raw.paths.input_dir.unwrap_or_else(|| ".".into()));
        let output_dir = raw.paths.output_dir.map(|dir| model_dir.join(dir));

        Ok(ScenarioConfig {
            countries,
            solver,
            solver_options: SolverOptions::from_table(raw.solver_options)?,
            fuel_cost_pathway,
            emissions_limit,
            budget_limit,
            demand_response,
            rolling_horizon,
            time_index,
            input_dir,
            output_dir,
            output: OutputFlags {
                save_production_results: control.save_production_results,
                save_price_results: control.save_price_results,
                save_updated_market_values: control.save_updated_market_values,
                write_lp_file: control.write_lp_file,
            },
        })
    }

    /// Whether a country is included in the scenario
    pub fn includes_country(&self, country: &str) -> bool {
        self.countries.contains(country)
    }
}

/// Expand the `[time]` section into a concrete time index
fn resolve_time_index(time: &TimeRaw) -> Result<TimeIndex> {
    let start = parse_timestamp(&time.start_time).map_err(|err| {
        configuration_error(format!("Invalid start_time '{}': {err}", time.start_time))
    })?;
    let end = parse_timestamp(&time.end_time).map_err(|err| {
        configuration_error(format!("Invalid end_time '{}': {err}", time.end_time))
    })?;
    let step = parse_frequency(&time.freq)?;

    TimeIndex::new(start, end, step)
}

/// Convert rolling horizon window lengths from hours to time steps
fn resolve_rolling_horizon(
    rh: &RollingHorizonRaw,
    time_index: &TimeIndex,
) -> Result<RollingHorizonConfig> {
    let slice_length = time_index
        .steps_in_hours(rh.time_slice_length_wo_overlap_in_hours)
        .filter(|&steps| steps > 0)
        .ok_or_else(|| {
            configuration_error(format!(
                "time_slice_length_wo_overlap_in_hours must be a positive whole number of time \
                steps (got {} hours)",
                rh.time_slice_length_wo_overlap_in_hours
            ))
        })?;
    let overlap = time_index
        .steps_in_hours(rh.overlap_in_hours)
        .ok_or_else(|| {
            configuration_error(format!(
                "overlap_in_hours must be a whole number of time steps (got {} hours)",
                rh.overlap_in_hours
            ))
        })?;

    Ok(RollingHorizonConfig {
        slice_length,
        overlap,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use rstest::rstest;
    use std::fs;
    use tempfile::tempdir;

    const VALID_CONFIG: &str = r#"
[control]
countries = ["DE", "AT"]
fuel_cost_pathway = "middle"
activate_emissions_limit = true
emissions_pathway = "100_percent_linear"
activate_demand_response = true
demand_response_approach = "DLR"
demand_response_scenario = "50"
rolling_horizon = true

[time]
start_time = "2017-01-01 00:00:00"
end_time = "2017-01-02 23:00:00"
freq = "60min"

[rolling_horizon]
time_slice_length_wo_overlap_in_hours = 24
overlap_in_hours = 12

[solver_options]
time_limit = 60.0
"#;

    fn config_error_kind(contents: &str) -> Option<DispatchError> {
        let err = ScenarioConfig::from_toml_str(contents, Path::new(".")).unwrap_err();
        DispatchError::find_in(&err).cloned()
    }

    #[test]
    fn from_toml_str_valid() {
        let config = ScenarioConfig::from_toml_str(VALID_CONFIG, Path::new("model")).unwrap();
        assert_eq!(config.countries.len(), 2);
        assert_eq!(config.solver, SolverKind::Highs);
        assert_eq!(config.fuel_cost_pathway, FuelCostPathway::Middle);
        assert_eq!(
            config.emissions_limit.unwrap().pathway,
            EmissionsPathway::HundredPercentLinear
        );
        let dr = config.demand_response.unwrap();
        assert_eq!(dr.approach, DemandResponseApproach::Dlr);
        assert_eq!(dr.scenario, "50");
        assert_eq!(dr.settings, DemandResponseSettings::default());
        assert_eq!(
            config.rolling_horizon,
            Some(RollingHorizonConfig {
                slice_length: 24,
                overlap: 12
            })
        );
        assert_eq!(config.time_index.len(), 48);
        assert_eq!(config.input_dir, Path::new("model").join("."));
        assert!(config.output.save_price_results);
        assert!(!config.output.write_lp_file);
    }

    #[test]
    fn from_path_missing_file() {
        let dir = tempdir().unwrap();
        let err = ScenarioConfig::from_path(dir.path()).unwrap_err();
        assert!(matches!(
            DispatchError::find_in(&err),
            Some(DispatchError::Configuration(_))
        ));
    }

    #[test]
    fn from_path_valid() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), VALID_CONFIG).unwrap();
        let config = ScenarioConfig::from_path(dir.path()).unwrap();
        assert!(config.includes_country("AT"));
        assert!(!config.includes_country("FR"));
    }

    #[rstest]
    #[case("fuel_cost_pathway = \"middle\"", "fuel_cost_pathway = \"extreme\"")]
    #[case("\"100_percent_linear\"", "\"90_percent_linear\"")]
    #[case("\"DLR\"", "\"dlr\"")]
    #[case("freq = \"60min\"", "freq = \"hourly\"")]
    #[case("end_time = \"2017-01-02 23:00:00\"", "end_time = \"2016-12-31 23:00:00\"")]
    #[case("end_time = \"2017-01-02 23:00:00\"", "end_time = \"tomorrow\"")]
    #[case("countries = [\"DE\", \"AT\"]", "countries = []")]
    #[case("overlap_in_hours = 12", "overlap_in_hours = -1")]
    #[case(
        "time_slice_length_wo_overlap_in_hours = 24",
        "time_slice_length_wo_overlap_in_hours = 0"
    )]
    #[case("solver = \"highs\"", "solver = \"glpk\"")]
    fn invalid_config_is_configuration_error(#[case] from: &str, #[case] to: &str) {
        let contents = VALID_CONFIG
            .replace("[control]", "[control]\nsolver = \"highs\"")
            .replace(from, to);
        assert!(matches!(
            config_error_kind(&contents),
            Some(DispatchError::Configuration(_))
        ));
    }

    #[test]
    fn invalid_pathway_message() {
        let contents = VALID_CONFIG.replace("\"middle\"", "\"extreme\"");
        assert_error!(
            ScenarioConfig::from_toml_str(&contents, Path::new(".")),
            "Configuration error: Invalid value 'extreme' for fuel_cost_pathway. Valid values \
            are: lower, middle, upper"
        );
    }

    #[test]
    fn rolling_horizon_section_required() {
        let contents = VALID_CONFIG.replace("[rolling_horizon]", "[unused]");
        assert!(matches!(
            config_error_kind(&contents),
            Some(DispatchError::Configuration(_))
        ));
    }

    #[test]
    fn rolling_horizon_quarter_hours() {
        let contents = VALID_CONFIG.replace("freq = \"60min\"", "freq = \"15min\"");
        let config = ScenarioConfig::from_toml_str(&contents, Path::new(".")).unwrap();
        assert_eq!(
            config.rolling_horizon,
            Some(RollingHorizonConfig {
                slice_length: 96,
                overlap: 48
            })
        );
    }

    #[test]
    fn budget_limit_required_when_active() {
        let contents = VALID_CONFIG.replace(
            "rolling_horizon = true",
            "rolling_horizon = true\nactivate_budget_limit = true",
        );
        assert!(matches!(
            config_error_kind(&contents),
            Some(DispatchError::Configuration(_))
        ));

        let contents = VALID_CONFIG.replace(
            "rolling_horizon = true",
            "rolling_horizon = true\nactivate_budget_limit = true\nbudget_limit = 1000.0",
        );
        let config = ScenarioConfig::from_toml_str(&contents, Path::new(".")).unwrap();
        assert_eq!(config.budget_limit, Some(Money(1000.0)));
    }

    #[test]
    fn features_off_by_default() {
        let contents = r#"
[control]
countries = ["DE"]
fuel_cost_pathway = "lower"

[time]
start_time = "2017-01-01 00:00:00"
end_time = "2017-01-01 23:00:00"
"#;
        let config = ScenarioConfig::from_toml_str(contents, Path::new(".")).unwrap();
        assert!(config.emissions_limit.is_none());
        assert!(config.budget_limit.is_none());
        assert!(config.demand_response.is_none());
        assert!(config.rolling_horizon.is_none());
        assert_eq!(config.time_index.len(), 24);
    }
}
