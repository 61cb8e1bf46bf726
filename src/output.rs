//! The module responsible for writing output data to disk.
use crate::config::{OutputFlags, ScenarioConfig};
use crate::results::DispatchResults;
use crate::time::days_between;
use anyhow::{Context, Result, ensure};
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub mod graph;
pub mod metadata;
use metadata::write_metadata;

/// The output file name for production time series
const PRODUCTION_FILE_NAME: &str = "production.csv";

/// The output file name for day-ahead prices
const PRICES_FILE_NAME: &str = "prices.csv";

/// The output file name for storage levels
const STORAGE_LEVELS_FILE_NAME: &str = "storage_levels.csv";

/// The output file name for demand response activation
const DEMAND_RESPONSE_FILE_NAME: &str = "demand_response.csv";

/// The output file name for monthly market values
const MARKET_VALUES_FILE_NAME: &str = "market_values.csv";

/// The output file name for shadow prices of emissions and budget limits
const SHADOW_PRICES_FILE_NAME: &str = "limit_shadow_prices.csv";

/// The file name of the LP for a full horizon run
pub const LP_FILE_NAME: &str = "model.lp";

/// The subfolder of the results root for graphs
const GRAPHS_DIR_NAME: &str = "graphs";

/// Market values are only meaningful for horizons of at least this many days
const MIN_MARKET_VALUE_DAYS: i64 = 365;

/// Get the model name from the specified directory path
pub fn get_model_name(model_dir: &Path) -> Result<String> {
    // Resolve paths like "." so that they have a final component
    let model_dir = model_dir
        .canonicalize()
        .with_context(|| format!("Invalid model directory: {}", model_dir.display()))?;
    let name = model_dir
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Invalid model directory: {}", model_dir.display()))?;

    Ok(name.to_string())
}

/// Get the default output directory for the model
pub fn get_output_dir(model_dir: &Path, results_root: PathBuf) -> Result<PathBuf> {
    let mut path = results_root;
    path.push(get_model_name(model_dir)?);

    Ok(path)
}

/// Get the default output directory for the model's graphs, under `graphs` in the results root
pub fn get_graphs_dir(model_dir: &Path, results_root: PathBuf) -> Result<PathBuf> {
    get_output_dir(model_dir, results_root.join(GRAPHS_DIR_NAME))
}

/// Create a new output directory for the model, optionally overwriting existing data
///
/// # Arguments
///
/// * `output_dir` - The output directory to create/overwrite
/// * `allow_overwrite` - Whether to delete and recreate the folder if it is non-empty
///
/// # Returns
///
/// `true` if the output dir contained existing data that was deleted, `false` if not, or an error.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    // If the folder already exists, then delete it if allowed
    let overwrite = if let Ok(mut it) = fs::read_dir(output_dir) {
        if it.next().is_none() {
            // Folder exists and is empty: nothing to do
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Please delete the folder or pass \
            the --overwrite command-line option."
        );

        fs::remove_dir_all(output_dir).context("Could not delete folder")?;
        true
    } else {
        false
    };

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// Write a table of records to a CSV file in the output folder
fn write_records<T: Serialize>(file_path: &Path, records: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(file_path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}

/// An object for writing the results of a run to file
pub struct DataWriter {
    output_path: PathBuf,
    flags: OutputFlags,
    debug_model: bool,
}

impl DataWriter {
    /// Open a new data writer, writing run metadata to the output folder.
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    /// * `model_path` - Path to input model
    /// * `config` - The scenario configuration, which decides which files are written
    /// * `debug_model` - Whether to write the LP and shadow prices as well
    pub fn create(
        output_path: &Path,
        model_path: &Path,
        config: &ScenarioConfig,
        debug_model: bool,
    ) -> Result<Self> {
        write_metadata(output_path, model_path, config).context("Failed to save metadata")?;

        Ok(Self {
            output_path: output_path.to_path_buf(),
            flags: config.output,
            debug_model,
        })
    }

    /// Whether the assembled LP problem(s) should be written
    fn writes_lp(&self) -> bool {
        self.flags.write_lp_file || self.debug_model
    }

    /// The folder to write LP files to, if LP files are written
    pub fn lp_dir(&self) -> Option<&Path> {
        self.writes_lp().then_some(self.output_path.as_path())
    }

    /// Write the concatenated results of a run
    pub fn write_results(&self, results: &DispatchResults) -> Result<()> {
        if self.flags.save_production_results {
            self.write_table(PRODUCTION_FILE_NAME, &results.production)?;
            if !results.storage_levels.is_empty() {
                self.write_table(STORAGE_LEVELS_FILE_NAME, &results.storage_levels)?;
            }
            if !results.demand_response.is_empty() {
                self.write_table(DEMAND_RESPONSE_FILE_NAME, &results.demand_response)?;
            }
        }

        if self.flags.save_price_results {
            self.write_table(PRICES_FILE_NAME, &results.prices)?;
        }

        if self.flags.save_updated_market_values {
            let covered_days = results
                .timestamps
                .first()
                .zip(results.timestamps.last())
                .map_or(0, |(first, last)| days_between(*first, *last));
            if covered_days < MIN_MARKET_VALUE_DAYS {
                warn!(
                    "The horizon is shorter than a year, so market values only cover some months"
                );
            }
            self.write_table(MARKET_VALUES_FILE_NAME, &results.market_values())?;
        }

        if self.debug_model && !results.limit_shadow_prices.is_empty() {
            self.write_table(SHADOW_PRICES_FILE_NAME, &results.limit_shadow_prices)?;
        }

        info!("Results written to {}", self.output_path.display());
        Ok(())
    }

    fn write_table<T: Serialize>(&self, file_name: &str, records: &[T]) -> Result<()> {
        let file_path = self.output_path.join(file_name);
        write_records(&file_path, records)
            .with_context(|| format!("Could not write {}", file_path.display()))
    }
}
