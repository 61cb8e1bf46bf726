//! Write a record of how a run was produced to `metadata.toml`.
//!
//! The file describes the scenario that was run, the program build (as captured by the `built`
//! build script) and the host the run happened on, so that result folders can be traced back.
use crate::config::ScenarioConfig;
use crate::time::TIMESTAMP_FORMAT;
use anyhow::{Context, Result};
use chrono::Local;
use platform_info::{PlatformInfo, PlatformInfoAPI, UNameAPI};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// The output filename used for metadata.
const METADATA_FILE_NAME: &str = "metadata.toml";

#[allow(clippy::doc_markdown)]
#[allow(clippy::needless_raw_strings)]
mod built_info {
    // Generated by the build script
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[derive(Serialize)]
struct Metadata<'a> {
    scenario: ScenarioMetadata<'a>,
    program: ProgramMetadata,
    platform: PlatformMetadata,
}

/// What was run, and when
#[derive(Serialize)]
struct ScenarioMetadata<'a> {
    model_path: &'a Path,
    started: String,
    countries: Vec<&'a str>,
    start_time: String,
    end_time: String,
    time_steps: usize,
    step_minutes: i64,
    fuel_cost_pathway: String,
    emissions_pathway: Option<String>,
    demand_response_approach: Option<String>,
    rolling_horizon: bool,
}

impl<'a> ScenarioMetadata<'a> {
    fn new(model_path: &'a Path, config: &'a ScenarioConfig) -> Self {
        let time_index = &config.time_index;
        Self {
            model_path,
            started: Local::now().to_rfc2822(),
            countries: config.countries.iter().map(String::as_str).collect(),
            start_time: time_index.start().format(TIMESTAMP_FORMAT).to_string(),
            end_time: time_index.end().format(TIMESTAMP_FORMAT).to_string(),
            time_steps: time_index.len(),
            step_minutes: time_index.step().num_minutes(),
            fuel_cost_pathway: config.fuel_cost_pathway.to_string(),
            emissions_pathway: config
                .emissions_limit
                .as_ref()
                .map(|limit| limit.pathway.to_string()),
            demand_response_approach: config
                .demand_response
                .as_ref()
                .map(|dr| dr.approach.to_string()),
            rolling_horizon: config.rolling_horizon.is_some(),
        }
    }
}

/// How the program was built
#[derive(Serialize)]
struct ProgramMetadata {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    is_debug: bool,
    rustc_version: &'static str,
    build_time_utc: &'static str,
    /// Short commit hash, with `-dirty` appended for uncommitted changes
    git_commit_hash: String,
}

impl ProgramMetadata {
    fn from_build() -> Self {
        let git_commit_hash = match (built_info::GIT_COMMIT_HASH_SHORT, built_info::GIT_DIRTY) {
            (Some(hash), Some(true)) => format!("{hash}-dirty"),
            (Some(hash), _) => hash.to_string(),
            (None, _) => "unknown".to_string(),
        };

        Self {
            name: built_info::PKG_NAME,
            version: built_info::PKG_VERSION,
            target: built_info::TARGET,
            is_debug: built_info::DEBUG,
            rustc_version: built_info::RUSTC_VERSION,
            build_time_utc: built_info::BUILT_TIME_UTC,
            git_commit_hash,
        }
    }
}

/// The host, as reported by [`PlatformInfo`]
#[derive(Serialize)]
struct PlatformMetadata {
    sysname: String,
    nodename: String,
    release: String,
    machine: String,
    osname: String,
}

impl PlatformMetadata {
    fn from_host() -> Result<Self> {
        let info = PlatformInfo::new()
            .map_err(|err| anyhow::anyhow!("{err}"))
            .context("Unable to determine platform info")?;

        Ok(Self {
            sysname: info.sysname().to_string_lossy().into(),
            nodename: info.nodename().to_string_lossy().into(),
            release: info.release().to_string_lossy().into(),
            machine: info.machine().to_string_lossy().into(),
            osname: info.osname().to_string_lossy().into(),
        })
    }
}

/// Write `metadata.toml` to the output folder.
///
/// # Arguments
///
/// * `output_path` - Folder where the file is written
/// * `model_path` - Path to the model which is being run
/// * `config` - The resolved scenario configuration
pub fn write_metadata(
    output_path: &Path,
    model_path: &Path,
    config: &ScenarioConfig,
) -> Result<()> {
    let metadata = Metadata {
        scenario: ScenarioMetadata::new(model_path, config),
        program: ProgramMetadata::from_build(),
        platform: PlatformMetadata::from_host()?,
    };
    fs::write(
        output_path.join(METADATA_FILE_NAME),
        toml::to_string(&metadata)?,
    )?;

    Ok(())
}
