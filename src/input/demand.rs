//! Code for reading fixed demand.
use super::{
    check_non_negative, ensure_value, input_err_msg, lookup_profile, read_csv, read_time_series,
};
use crate::bus::BusID;
use crate::error::DispatchError;
use crate::id::{ComponentID, define_id_getter, find_duplicate_id};
use crate::time::TimeIndex;
use crate::units::{Power, UnitType};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;

const DEMAND_FILE_NAME: &str = "demand.csv";
const DEMAND_TS_FILE_NAME: &str = "demand_ts.csv";

/// A fixed demand drawing from a bus
#[derive(Debug, Clone, PartialEq)]
pub struct Demand {
    /// Unique identifier
    pub id: ComponentID,
    /// The bidding zone of the demand
    pub country: String,
    /// The bus the demand draws from
    pub from: BusID,
    /// Peak demand
    pub maximum: Power,
    /// Demand for every time step, relative to the peak
    pub profile: Vec<f64>,
    /// Whether the profile already contains the baseline of the demand response clusters on
    /// the same bus
    pub includes_demand_response: bool,
}
define_id_getter! {Demand, ComponentID}

impl Demand {
    /// Demand at time step `t`
    pub fn value(&self, t: usize) -> Power {
        Power(self.maximum.0 * self.profile[t])
    }
}

#[derive(Debug, Deserialize)]
struct DemandRaw {
    id: ComponentID,
    country: String,
    from: BusID,
    maximum: Power,
    profile: String,
    #[serde(default)]
    includes_demand_response: bool,
}

/// Read demands and their profiles.
///
/// Both the demand table and its time series are required.
pub fn read_demands(input_dir: &Path, time_index: &TimeIndex) -> Result<Vec<Demand>> {
    let file_path = input_dir.join(DEMAND_FILE_NAME);
    let demands_raw: Vec<DemandRaw> = read_csv(&file_path)?.collect();
    let profiles = read_time_series(&input_dir.join(DEMAND_TS_FILE_NAME), time_index)?;

    let demands = demands_raw
        .into_iter()
        .map(|raw| -> Result<_> {
            ensure_value!(
                raw.maximum >= Power(0.0) && raw.maximum.is_finite(),
                "Maximum of demand {} must be non-negative",
                raw.id
            );
            let profile = lookup_profile(Some(&profiles), &raw.profile, DEMAND_TS_FILE_NAME)?;
            check_non_negative(&profile, &format!("Demand profile {}", raw.profile))?;

            Ok(Demand {
                id: raw.id,
                country: raw.country,
                from: raw.from,
                maximum: raw.maximum,
                profile,
                includes_demand_response: raw.includes_demand_response,
            })
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| input_err_msg(&file_path))?;

    if let Some(id) = find_duplicate_id(&demands) {
        bail!(DispatchError::InvalidValue(format!(
            "Duplicate demand ID found: {id}"
        )));
    }

    Ok(demands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::time_index;
    use rstest::rstest;
    use std::fs;
    use tempfile::tempdir;

    fn write_demand_files(dir: &Path, maximum: &str) {
        fs::write(
            dir.join(DEMAND_FILE_NAME),
            format!(
                "id,country,from,maximum,profile,includes_demand_response\n\
                DE_load,DE,DE_bus_el,{maximum},load_DE,false\n"
            ),
        )
        .unwrap();
        fs::write(
            dir.join(DEMAND_TS_FILE_NAME),
            "timestamp,load_DE\n\
            2017-01-01 00:00:00,1.0\n\
            2017-01-01 01:00:00,0.5\n\
            2017-01-01 02:00:00,0.75\n",
        )
        .unwrap();
    }

    #[rstest]
    fn read_demands_works(time_index: TimeIndex) {
        let dir = tempdir().unwrap();
        write_demand_files(dir.path(), "100");
        let demands = read_demands(dir.path(), &time_index).unwrap();
        assert_eq!(demands.len(), 1);
        assert_eq!(demands[0].value(1), Power(50.0));
        assert!(!demands[0].includes_demand_response);
    }

    #[rstest]
    fn read_demands_negative_maximum(time_index: TimeIndex) {
        let dir = tempdir().unwrap();
        write_demand_files(dir.path(), "-100");
        let err = read_demands(dir.path(), &time_index).unwrap_err();
        assert!(matches!(
            DispatchError::find_in(&err),
            Some(DispatchError::InvalidValue(_))
        ));
    }

    #[rstest]
    fn read_demands_missing_time_series(time_index: TimeIndex) {
        let dir = tempdir().unwrap();
        write_demand_files(dir.path(), "100");
        fs::remove_file(dir.path().join(DEMAND_TS_FILE_NAME)).unwrap();
        let err = read_demands(dir.path(), &time_index).unwrap_err();
        assert!(matches!(
            DispatchError::find_in(&err),
            Some(DispatchError::MissingInput(_))
        ));
    }
}
