//! Linear programming dispatch model for interconnected electricity markets.
//!
//! The model translates tabular input data into a graph of buses, flows, transformers, storages
//! and demand response clusters, builds a sparse LP from it, solves it and reads back production
//! and day-ahead prices. Long horizons can be split into overlapping windows which are solved one
//! after the other.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod bus;
pub mod cli;
pub mod config;
pub mod demand_response;
pub mod error;
pub mod graph;
pub mod id;
pub mod input;
pub mod log;
pub mod optimisation;
pub mod output;
pub mod results;
pub mod rolling_horizon;
pub mod settings;
pub mod simulation;
pub mod solver;
pub mod system;
pub mod time;
pub mod units;

#[cfg(test)]
mod fixture;

/// The main GitHub issues page for the program
pub const ISSUES_URL: &str = concat!(env!("CARGO_PKG_REPOSITORY"), "/issues");

/// Get the directory in which program configuration files are stored
pub fn get_config_dir() -> PathBuf {
    let Some(mut config_dir) = dirs::config_dir() else {
        panic!("Couldn't get config directory")
    };
    config_dir.push("powerdispatch");

    config_dir
}
