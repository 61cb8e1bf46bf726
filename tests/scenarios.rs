//! End-to-end tests which load small scenarios from disk and solve them.
use chrono::{NaiveDate, TimeDelta};
use float_cmp::{approx_eq, assert_approx_eq};
use itertools::Itertools;
use powerdispatch::config::ScenarioConfig;
use powerdispatch::error::DispatchError;
use powerdispatch::input::load_input;
use powerdispatch::results::DispatchResults;
use powerdispatch::simulation::solve;
use powerdispatch::solver::HighsSolver;
use rstest::rstest;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const HOURS: usize = 48;
const EPSILON: f64 = 1e-6;

const CONFIG: &str = r#"
[control]
countries = ["DE"]
fuel_cost_pathway = "middle"

[time]
start_time = "2017-01-01 00:00:00"
end_time = "2017-01-02 23:00:00"
freq = "60min"
"#;

/// Two renewables with different costs serving a single demand
const RENEWABLES: &str = "id,country,to,capacity,profile,fixed,cost\n\
    cheap,DE,DE_bus_el,60,flat,false,10\n\
    expensive,DE,DE_bus_el,60,flat,false,20\n";

const STORAGE: &str = "id,country,kind,bus_inflow,bus_outflow,capacity_pump,capacity_turbine,\
    nominal_storable_energy,initial_storage_level,efficiency_pump,efficiency_turbine\n\
    DE_phes,DE,phes,DE_bus_el,DE_bus_el,20,20,100,0.5,0.9,0.9\n";

/// Write an hourly time series with one column for every `(name, value)` function
fn time_series(columns: &[(&str, &dyn Fn(usize) -> f64)]) -> String {
    let start = NaiveDate::from_ymd_opt(2017, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let mut contents = format!(
        "timestamp,{}\n",
        columns.iter().map(|(name, _)| name).join(",")
    );
    for t in 0..HOURS {
        let timestamp = start + TimeDelta::hours(t as i64);
        let values = columns.iter().map(|(_, value)| value(t).to_string()).join(",");
        contents.push_str(&format!(
            "{},{values}\n",
            timestamp.format("%Y-%m-%d %H:%M:%S")
        ));
    }

    contents
}

/// Demand alternates between half and full load every six hours
fn alternating(t: usize) -> f64 {
    if (t / 6) % 2 == 0 { 0.5 } else { 1.0 }
}

/// Write a single-zone model with a flat demand of 100 MW to `dir`
fn write_base_model(dir: &Path, demand_profile: &dyn Fn(usize) -> f64) {
    for (file_name, contents) in [
        ("config.toml", CONFIG.to_string()),
        ("buses.csv", "id,country,carrier\nDE_bus_el,DE,electricity\n".into()),
        ("renewables.csv", RENEWABLES.into()),
        ("renewables_ts.csv", time_series(&[("flat", &|_| 1.0)])),
        (
            "demand.csv",
            "id,country,from,maximum,profile\nDE_demand,DE,DE_bus_el,100,load\n".into(),
        ),
        ("demand_ts.csv", time_series(&[("load", demand_profile)])),
        (
            "shortage_sources.csv",
            "id,country,to,cost\nDE_shortage,DE,DE_bus_el,1000\n".into(),
        ),
    ] {
        fs::write(dir.join(file_name), contents).unwrap();
    }
}

/// Write a model with a coal and a gas plant, whose emissions can be capped
fn write_thermal_model(dir: &Path, emissions_limit: bool) {
    write_base_model(dir, &|_| 1.0);
    fs::remove_file(dir.join("renewables.csv")).unwrap();
    if emissions_limit {
        let config = CONFIG.replace(
            "fuel_cost_pathway = \"middle\"",
            "fuel_cost_pathway = \"middle\"\n\
            activate_emissions_limit = true\n\
            emissions_pathway = \"100_percent_linear\"",
        );
        fs::write(dir.join("config.toml"), config).unwrap();
    }
    for (file_name, contents) in [
        (
            "buses.csv",
            "id,country,carrier\n\
            DE_bus_el,DE,electricity\n\
            DE_bus_coal,DE,fuel\n\
            DE_bus_gas,DE,fuel\n",
        ),
        (
            "commodity_sources.csv",
            "id,country,to,emission_factor\n\
            DE_source_coal,DE,DE_bus_coal,0.34\n\
            DE_source_gas,DE,DE_bus_gas,0.2\n",
        ),
        (
            "costs_fuel.csv",
            "source_id,pathway,cost\n\
            DE_source_coal,middle,8\n\
            DE_source_gas,middle,20\n",
        ),
        (
            "transformers.csv",
            "id,country,from,to_el,to_th,kind,capacity,efficiency_el,efficiency_th,operation_cost\n\
            DE_coal,DE,DE_bus_coal,DE_bus_el,,condensing,80,0.4,,0\n\
            DE_gas,DE,DE_bus_gas,DE_bus_el,,condensing,80,0.5,,0\n",
        ),
        (
            "emission_limits.csv",
            "pathway,annual_limit\n100_percent_linear,1095000\n",
        ),
    ] {
        fs::write(dir.join(file_name), contents).unwrap();
    }
}

/// Write the files for a single demand response cluster with a baseline of 20 MW
fn write_demand_response(dir: &Path, approach: &str, shifting_duration: f64) {
    let config = format!(
        "{CONFIG}\n\
        [demand_response]\n\
        shift_interval = 24\n"
    )
    .replace(
        "fuel_cost_pathway = \"middle\"",
        &format!(
            "fuel_cost_pathway = \"middle\"\n\
            activate_demand_response = true\n\
            demand_response_approach = \"{approach}\"\n\
            demand_response_scenario = \"50\""
        ),
    );
    fs::write(dir.join("config.toml"), config).unwrap();
    fs::write(
        dir.join("demand_response_50.csv"),
        format!(
            "id,bus,max_cap,potential_neg_overall,potential_pos_overall,shifting_duration,\
            regeneration_duration,interference_duration_pos,maximum_activations_year,\
            variable_costs\n\
            DE_dsm,DE_bus_el,20,10,10,{shifting_duration},1,1,10000,1\n"
        ),
    )
    .unwrap();
    for file_name in [
        "demand_response_ts_50.csv",
        "demand_response_ava_pos_ts_50.csv",
        "demand_response_ava_neg_ts_50.csv",
    ] {
        fs::write(dir.join(file_name), time_series(&[("DE_dsm", &|_| 1.0)])).unwrap();
    }
}

fn solve_model(dir: &Path) -> DispatchResults {
    let config = ScenarioConfig::from_path(dir).unwrap();
    let input = load_input(&config).unwrap();
    solve(&config, &input, &HighsSolver::default(), None).unwrap()
}

fn sum(values: impl Iterator<Item = powerdispatch::units::Power>) -> f64 {
    values.map(|value| value.0).sum()
}

#[test]
fn cheapest_generator_dispatched_first() {
    let dir = tempdir().unwrap();
    write_base_model(dir.path(), &|_| 1.0);
    let results = solve_model(dir.path());

    assert_eq!(results.timestamps.len(), HOURS);
    for value in results.production_for("cheap", "DE_bus_el") {
        assert_approx_eq!(f64, value.0, 60.0, epsilon = EPSILON);
    }
    for value in results.production_for("expensive", "DE_bus_el") {
        assert_approx_eq!(f64, value.0, 40.0, epsilon = EPSILON);
    }
    for price in results.prices_for(&"DE_bus_el".into()) {
        assert_approx_eq!(f64, price.0, 20.0, epsilon = EPSILON);
    }
    assert_approx_eq!(
        f64,
        results.objective_value.0,
        HOURS as f64 * (60.0 * 10.0 + 40.0 * 20.0),
        epsilon = 1e-4
    );
}

#[test]
fn bus_balance_holds() {
    let dir = tempdir().unwrap();
    write_base_model(dir.path(), &alternating);
    fs::write(dir.path().join("storages.csv"), STORAGE).unwrap();
    let results = solve_model(dir.path());

    let by_timestamp = results
        .production
        .iter()
        .into_group_map_by(|record| record.timestamp);
    assert_eq!(by_timestamp.len(), HOURS);
    for (timestamp, records) in by_timestamp {
        let inflow: f64 = records
            .iter()
            .filter(|record| record.target == "DE_bus_el")
            .map(|record| record.value.0)
            .sum();
        let outflow: f64 = records
            .iter()
            .filter(|record| record.source == "DE_bus_el")
            .map(|record| record.value.0)
            .sum();
        assert!(
            approx_eq!(f64, inflow, outflow, epsilon = EPSILON),
            "Imbalance at {timestamp}: {inflow} vs {outflow}"
        );
    }
}

#[test]
fn emissions_limit_binds() {
    let dir = tempdir().unwrap();
    write_thermal_model(dir.path(), false);
    let unconstrained = solve_model(dir.path());

    // Coal runs at capacity and gas covers the remainder
    assert_approx_eq!(f64, unconstrained.emissions.0, 3648.0, epsilon = 1e-4);

    // The horizon spans one whole day, so the limit is 1095000 / 365 = 3000 t
    let dir = tempdir().unwrap();
    write_thermal_model(dir.path(), true);
    let constrained = solve_model(dir.path());

    assert_approx_eq!(f64, constrained.emissions.0, 3000.0, epsilon = 1e-4);
    assert_approx_eq!(
        f64,
        sum(constrained.production_for("DE_coal", "DE_bus_el")),
        2400.0,
        epsilon = 1e-4
    );
    assert!(constrained.objective_value.0 > unconstrained.objective_value.0);
    assert_eq!(constrained.limit_shadow_prices.len(), 1);
    assert!(constrained.limit_shadow_prices[0].value.abs() > EPSILON);
}

#[test]
fn storage_idle_under_flat_prices() {
    let dir = tempdir().unwrap();
    write_base_model(dir.path(), &|_| 1.0);
    fs::write(dir.path().join("storages.csv"), STORAGE).unwrap();
    let results = solve_model(dir.path());

    for value in results
        .production_for("DE_bus_el", "DE_phes")
        .chain(results.production_for("DE_phes", "DE_bus_el"))
    {
        assert_approx_eq!(f64, value.0, 0.0, epsilon = EPSILON);
    }
}

#[test]
fn storage_roundtrip_closed() {
    let dir = tempdir().unwrap();
    write_base_model(dir.path(), &alternating);
    fs::write(dir.path().join("storages.csv"), STORAGE).unwrap();
    let results = solve_model(dir.path());

    let charged = sum(results.production_for("DE_bus_el", "DE_phes"));
    let discharged = sum(results.production_for("DE_phes", "DE_bus_el"));
    assert!(discharged > EPSILON);

    // Without losses over time, energy stored equals energy released
    assert_approx_eq!(f64, charged * 0.9, discharged / 0.9, epsilon = 1e-4);
    let last = results.storage_levels.last().unwrap();
    assert_approx_eq!(f64, last.level.0, 50.0, epsilon = 1e-4);
    for record in &results.storage_levels {
        assert!(record.level.0 >= -EPSILON && record.level.0 <= 100.0 + EPSILON);
    }
}

#[test]
fn gradients_respected() {
    let dir = tempdir().unwrap();
    write_thermal_model(dir.path(), false);
    let transformers = "id,country,from,to_el,to_th,kind,capacity,efficiency_el,efficiency_th,\
        operation_cost,grad_pos,grad_neg\n\
        DE_coal,DE,DE_bus_coal,DE_bus_el,,condensing,100,0.4,,0,0.1,0.1\n";
    fs::write(dir.path().join("transformers.csv"), transformers).unwrap();
    fs::write(
        dir.path().join("demand_ts.csv"),
        time_series(&[("load", &|t| if t < 24 { 0.2 } else { 1.0 })]),
    )
    .unwrap();
    let results = solve_model(dir.path());

    let production = results
        .production_for("DE_coal", "DE_bus_el")
        .map(|value| value.0)
        .collect_vec();
    assert_eq!(production.len(), HOURS);
    for (previous, next) in production.iter().tuple_windows() {
        assert!((next - previous).abs() <= 10.0 + EPSILON);
    }
}

#[test]
fn rolling_horizon_matches_time_index() {
    let dir = tempdir().unwrap();
    write_base_model(dir.path(), &alternating);
    fs::write(dir.path().join("storages.csv"), STORAGE).unwrap();
    let full = solve_model(dir.path());

    let config = format!(
        "{}\n\
        [rolling_horizon]\n\
        time_slice_length_wo_overlap_in_hours = 12\n\
        overlap_in_hours = 6\n",
        CONFIG.replace(
            "fuel_cost_pathway = \"middle\"",
            "fuel_cost_pathway = \"middle\"\nrolling_horizon = true"
        )
    );
    fs::write(dir.path().join("config.toml"), config).unwrap();
    let sliced = solve_model(dir.path());

    assert_eq!(full.timestamps, sliced.timestamps);
    assert_eq!(sliced.prices.len(), HOURS);
    assert!(sliced.timestamps.iter().all_unique());

    // Storage levels follow the level balance across slice boundaries too
    let levels = sliced
        .storage_levels
        .iter()
        .map(|record| record.level.0)
        .collect_vec();
    let charged = sliced
        .production_for("DE_bus_el", "DE_phes")
        .map(|value| value.0)
        .collect_vec();
    let discharged = sliced
        .production_for("DE_phes", "DE_bus_el")
        .map(|value| value.0)
        .collect_vec();
    // Levels are reported at the end of each time step
    let mut previous = 50.0;
    for t in 0..HOURS {
        let expected = previous + charged[t] * 0.9 - discharged[t] / 0.9;
        assert!(
            approx_eq!(f64, levels[t], expected, epsilon = 1e-4),
            "Storage level discontinuity at time step {t}"
        );
        previous = levels[t];
    }
}

#[test]
fn unknown_pathway_rejected_before_loading() {
    // No input files at all: only the configuration is read
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("config.toml"),
        CONFIG.replace("middle", "extreme"),
    )
    .unwrap();

    let err = ScenarioConfig::from_path(dir.path()).unwrap_err();
    assert!(matches!(
        DispatchError::find_in(&err),
        Some(DispatchError::Configuration(_))
    ));
}

#[test]
fn missing_time_series_row_rejected() {
    let dir = tempdir().unwrap();
    write_base_model(dir.path(), &|_| 1.0);
    let demand_ts = fs::read_to_string(dir.path().join("demand_ts.csv")).unwrap();
    let truncated = demand_ts.lines().take(HOURS).join("\n");
    fs::write(dir.path().join("demand_ts.csv"), truncated).unwrap();

    let config = ScenarioConfig::from_path(dir.path()).unwrap();
    let err = load_input(&config).unwrap_err();
    assert!(matches!(
        DispatchError::find_in(&err),
        Some(DispatchError::DataAlignment(_))
    ));
}

#[test]
fn oemof_shifts_balanced_within_intervals() {
    let dir = tempdir().unwrap();
    write_base_model(dir.path(), &alternating);
    write_demand_response(dir.path(), "oemof", 1.0);
    let results = solve_model(dir.path());

    assert_eq!(results.demand_response.len(), HOURS);
    let total_up: f64 = results.demand_response.iter().map(|r| r.dsm_up.0).sum();
    assert!(total_up > EPSILON);
    for interval in results.demand_response.chunks(24) {
        let up: f64 = interval.iter().map(|r| r.dsm_up.0).sum();
        let down: f64 = interval.iter().map(|r| r.dsm_do_shift.0).sum();
        assert_approx_eq!(f64, up, down, epsilon = 1e-4);
    }
}

#[rstest]
#[case("DLR")]
#[case("DIW")]
fn shifts_balanced_within_horizon(#[case] approach: &str) {
    let dir = tempdir().unwrap();
    write_base_model(dir.path(), &alternating);
    write_demand_response(dir.path(), approach, 2.0);
    let results = solve_model(dir.path());

    assert_eq!(results.demand_response.len(), HOURS);
    let up: f64 = results.demand_response.iter().map(|r| r.dsm_up.0).sum();
    let down: f64 = results
        .demand_response
        .iter()
        .map(|r| r.dsm_do_shift.0)
        .sum();
    assert_approx_eq!(f64, up, down, epsilon = 1e-4);

    // Every shift is balanced, so the level returns to zero
    let last = results.demand_response.last().unwrap();
    assert_approx_eq!(f64, last.dsm_storage_level.0, 0.0, epsilon = 1e-4);
}
