//! The command line interface for the dispatch model.
use crate::config::ScenarioConfig;
use crate::graph::{create_system_graph, find_isolated_buses};
use crate::input::load_input;
use crate::log;
use crate::optimisation::build_problem;
use crate::output::graph::save_system_graph;
use crate::output::{create_output_directory, get_graphs_dir, get_output_dir};
use crate::settings::Settings;
use crate::system::{BuildOptions, EnergySystem, build_energy_system};
use ::log::{info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for the dispatch model.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// Options for the `run` command
#[derive(Args)]
pub struct RunOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
    /// Whether to write the LP problem and shadow prices of limits
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub debug_model: Option<bool>,
}

/// Options for the `save-graphs` command
#[derive(Args)]
pub struct GraphOpts {
    /// Directory for graph files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run a dispatch scenario.
    Run {
        /// Path to the model directory.
        model_dir: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Validate a scenario without solving it.
    Validate {
        /// The path to the model directory.
        model_dir: PathBuf,
    },
    /// Build the energy system and save it as a graph.
    SaveGraphs {
        /// The path to the model directory.
        model_dir: PathBuf,
        /// Other options
        #[command(flatten)]
        opts: GraphOpts,
    },
    /// Manage settings file.
    Settings {
        /// The subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run { model_dir, opts } => handle_run_command(&model_dir, &opts, None),
            Self::Validate { model_dir } => handle_validate_command(&model_dir, None),
            Self::SaveGraphs { model_dir, opts } => {
                handle_save_graphs_command(&model_dir, &opts, None)
            }
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and start the program
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ powerdispatch --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    if let Some(command) = cli.command {
        command.execute()?;
    } else {
        // No command provided. Show help.
        Cli::command().print_long_help()?;
    }

    Ok(())
}

/// Load program settings, if not provided
fn load_settings(settings: Option<Settings>) -> Result<Settings> {
    match settings {
        Some(settings) => Ok(settings),
        None => Settings::load().context("Failed to load settings."),
    }
}

/// Load the scenario and build the energy system for the whole horizon
fn load_energy_system(model_path: &Path) -> Result<EnergySystem> {
    let config =
        ScenarioConfig::from_path(model_path).context("Failed to load scenario configuration.")?;
    let input = load_input(&config).context("Failed to load input data.")?;
    let options = BuildOptions::full_horizon(config.time_index.len());

    build_energy_system(&input, &config, &options).context("Failed to build energy system.")
}

/// Handle the `run` command.
pub fn handle_run_command(
    model_path: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let mut settings = load_settings(settings)?;

    // These settings can be overridden by command-line arguments
    if let Some(opt) = opts.debug_model {
        settings.debug_model = opt;
    }
    if opts.overwrite {
        settings.overwrite = true;
    }

    // Selectors are checked before any output is created or data is loaded
    let config =
        ScenarioConfig::from_path(model_path).context("Failed to load scenario configuration.")?;

    // The command line takes precedence over the scenario, which takes precedence over settings
    let output_path = match (&opts.output_dir, &config.output_dir) {
        (Some(dir), _) | (None, Some(dir)) => dir.clone(),
        (None, None) => get_output_dir(model_path, settings.results_root)?,
    };

    let overwrite =
        create_output_directory(&output_path, settings.overwrite).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;

    // Initialise program logger
    log::init(&settings.log_level, Some(&output_path))
        .context("Failed to initialise logging.")?;

    info!("Starting powerdispatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded scenario from {}", model_path.display());
    info!("Output folder: {}", output_path.display());

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder will be overwritten");
    }

    crate::simulation::run(model_path, &config, &output_path, settings.debug_model)?;
    info!("Run complete!");

    Ok(())
}

/// Handle the `validate` command.
///
/// The scenario is loaded, the energy system built and the LP assembled, but nothing is solved.
pub fn handle_validate_command(model_path: &Path, settings: Option<Settings>) -> Result<()> {
    let settings = load_settings(settings)?;

    // Initialise program logger (we won't save log files when running the validate command)
    log::init(&settings.log_level, None).context("Failed to initialise logging.")?;

    let system = load_energy_system(model_path).context("Failed to validate model.")?;
    for bus_id in find_isolated_buses(&create_system_graph(&system)) {
        warn!("No flows enter or leave bus {bus_id}");
    }

    let (problem, _, _) = build_problem(&system).context("Failed to validate model.")?;
    info!(
        "Model validation successful! The problem has {} columns and {} rows.",
        problem.num_cols(),
        problem.num_rows()
    );

    Ok(())
}

/// Handle the `save-graphs` command.
pub fn handle_save_graphs_command(
    model_path: &Path,
    opts: &GraphOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let mut settings = load_settings(settings)?;

    if opts.overwrite {
        settings.overwrite = true;
    }

    // Get path to output folder
    let output_path = match &opts.output_dir {
        Some(dir) => dir.clone(),
        None => get_graphs_dir(model_path, settings.results_root)?,
    };

    let overwrite =
        create_output_directory(&output_path, settings.overwrite).with_context(|| {
            format!(
                "Failed to create graphs directory: {}",
                output_path.display()
            )
        })?;

    // Initialise program logger (we won't save log files when running this command)
    log::init(&settings.log_level, None).context("Failed to initialise logging.")?;

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Graphs directory will be overwritten");
    }

    let system = load_energy_system(model_path).context("Failed to build graphs.")?;
    save_system_graph(&create_system_graph(&system), &output_path)?;
    info!("Graphs saved to: {}", output_path.display());

    Ok(())
}
