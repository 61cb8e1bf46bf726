//! Code for reading buses from a CSV file.
use super::{collect_unique, input_err_msg, read_csv};
use crate::bus::{Bus, BusMap};
use anyhow::{Context, Result};
use std::path::Path;

const BUSES_FILE_NAME: &str = "buses.csv";

/// Read buses from the input folder.
///
/// The bus table is required: a model without any balancing nodes can't be built.
pub fn read_buses(input_dir: &Path) -> Result<BusMap> {
    let file_path = input_dir.join(BUSES_FILE_NAME);
    let buses_csv = read_csv(&file_path)?;
    read_buses_from_iter(buses_csv).with_context(|| input_err_msg(&file_path))
}

fn read_buses_from_iter<I>(iter: I) -> Result<BusMap>
where
    I: Iterator<Item = Bus>,
{
    collect_unique(iter.map(|bus| (bus.id.clone(), bus)), "bus")
}
