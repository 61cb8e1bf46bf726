//! Functionality for running a dispatch scenario.
use crate::config::ScenarioConfig;
use crate::input::{InputData, load_input};
use crate::optimisation::DispatchRun;
use crate::output::{DataWriter, LP_FILE_NAME};
use crate::results::DispatchResults;
use crate::rolling_horizon::RollingHorizon;
use crate::solver::{Solver, create_solver};
use crate::system::{BuildOptions, build_energy_system};
use anyhow::{Context, Result};
use log::info;
use std::path::Path;

/// Run the scenario and write its results.
///
/// # Arguments:
///
/// * `model_path` - The model directory, recorded in the run metadata
/// * `config` - The resolved scenario configuration
/// * `output_path` - The folder to which output files will be written
/// * `debug_model` - Whether to write the LP and shadow prices as well
pub fn run(
    model_path: &Path,
    config: &ScenarioConfig,
    output_path: &Path,
    debug_model: bool,
) -> Result<DispatchResults> {
    let writer = DataWriter::create(output_path, model_path, config, debug_model)?;

    let input = load_input(config).context("Failed to load input data.")?;
    info!("Loaded input data for {} time steps", config.time_index.len());

    let solver = create_solver(config.solver, &config.solver_options);
    let results = solve(config, &input, solver.as_ref(), writer.lp_dir())?;
    log_summary(&results);

    writer.write_results(&results)?;

    Ok(results)
}

/// Solve the scenario, either over the whole horizon at once or slice by slice.
///
/// # Arguments:
///
/// * `config` - The resolved scenario configuration
/// * `input` - Validated input data
/// * `solver` - The LP solver
/// * `lp_dir` - Folder to write the assembled LP problem(s) to, if any
pub fn solve(
    config: &ScenarioConfig,
    input: &InputData,
    solver: &dyn Solver,
    lp_dir: Option<&Path>,
) -> Result<DispatchResults> {
    if let Some(rolling_horizon) = &config.rolling_horizon {
        let mut controller = RollingHorizon::new(input, config, rolling_horizon, solver);
        if let Some(lp_dir) = lp_dir {
            controller = controller.with_lp_dir(lp_dir);
        }

        return controller.run();
    }

    info!("Building energy system...");
    let options = BuildOptions::full_horizon(config.time_index.len());
    let system =
        build_energy_system(input, config, &options).context("Failed to build energy system.")?;

    info!("Running dispatch optimisation...");
    let lp_file = lp_dir.map(|dir| dir.join(LP_FILE_NAME));
    let mut run = DispatchRun::new(&system, solver);
    if let Some(lp_file) = lp_file.as_deref() {
        run = run.with_lp_file(lp_file);
    }
    let solution = run.run().context("Dispatch optimisation failed.")?;

    let mut results = DispatchResults::default();
    results.append(0, &solution, system.len());

    Ok(results)
}

/// Log the totals of a run
fn log_summary(results: &DispatchResults) {
    info!("Total objective value: {:.2} EUR", results.objective_value.0);
    info!("Total emissions: {:.2} t", results.emissions.0);
    for shadow_price in &results.limit_shadow_prices {
        info!(
            "Shadow price of the {:?} limit in window {}: {:.4}",
            shadow_price.kind, shadow_price.window, shadow_price.value
        );
    }
}
