//! Code for reading demand response clusters for a demand response scenario.
use super::{check_normalised, ensure_value, input_err_msg, read_csv, read_time_series};
use crate::bus::BusID;
use crate::demand_response::DemandResponseCluster;
use crate::error::DispatchError;
use crate::id::{ComponentID, find_duplicate_id};
use crate::time::TimeIndex;
use crate::units::{Dimensionless, MoneyPerEnergy, Power, UnitType};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;

/// Represents a row of the demand response cluster table
#[derive(Debug, Deserialize)]
struct DemandResponseClusterRaw {
    id: ComponentID,
    bus: BusID,
    max_cap: Power,
    potential_neg_overall: Power,
    potential_pos_overall: Power,
    shifting_duration: f64,
    regeneration_duration: f64,
    interference_duration_pos: f64,
    maximum_activations_year: f64,
    variable_costs: MoneyPerEnergy,
    efficiency: Option<Dimensionless>,
    shift_eligibility: Option<bool>,
    shed_eligibility: Option<bool>,
    cost_shed: Option<MoneyPerEnergy>,
    shed_time: Option<f64>,
    recovery_time_shed: Option<f64>,
}

impl DemandResponseClusterRaw {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("max_cap", self.max_cap),
            ("potential_neg_overall", self.potential_neg_overall),
            ("potential_pos_overall", self.potential_pos_overall),
        ] {
            ensure_value!(
                value >= Power(0.0) && value.is_finite(),
                "{name} of demand response cluster {} must be non-negative",
                self.id
            );
        }
        for (name, value) in [
            ("shifting_duration", Some(self.shifting_duration)),
            ("regeneration_duration", Some(self.regeneration_duration)),
            ("interference_duration_pos", Some(self.interference_duration_pos)),
            ("maximum_activations_year", Some(self.maximum_activations_year)),
            ("shed_time", self.shed_time),
            ("recovery_time_shed", self.recovery_time_shed),
        ] {
            if let Some(value) = value {
                ensure_value!(
                    value >= 0.0 && value.is_finite(),
                    "{name} of demand response cluster {} must be non-negative",
                    self.id
                );
            }
        }
        if let Some(efficiency) = self.efficiency {
            ensure_value!(
                efficiency > Dimensionless(0.0) && efficiency <= Dimensionless(1.0),
                "Efficiency of demand response cluster {} must be in (0, 1]",
                self.id
            );
        }
        ensure_value!(
            self.variable_costs >= MoneyPerEnergy(0.0) && self.variable_costs.is_finite(),
            "Variable costs of demand response cluster {} must be non-negative",
            self.id
        );

        Ok(())
    }
}

/// Convert a duration in hours into a whole number of time steps, rounding up
fn hours_to_steps(hours: f64, step_hours: f64) -> usize {
    // Guard against e.g. 3.0000000001 steps from floating-point division
    let steps = (hours / step_hours * 1e9).round() / 1e9;
    steps.ceil() as usize
}

/// Read demand response clusters and their time series for a scenario.
///
/// # Arguments
///
/// * `input_dir` - Folder containing input data
/// * `scenario` - Demand response scenario, which selects the files to read
/// * `time_index` - The time index to align time series with
pub fn read_demand_response_clusters(
    input_dir: &Path,
    scenario: &str,
    time_index: &TimeIndex,
) -> Result<Vec<DemandResponseCluster>> {
    let file_path = input_dir.join(format!("demand_response_{scenario}.csv"));
    let clusters_raw: Vec<DemandResponseClusterRaw> = read_csv(&file_path)?.collect();

    let baseline = read_time_series(
        &input_dir.join(format!("demand_response_ts_{scenario}.csv")),
        time_index,
    )?;
    let availability_down = read_time_series(
        &input_dir.join(format!("demand_response_ava_pos_ts_{scenario}.csv")),
        time_index,
    )?;
    let availability_up = read_time_series(
        &input_dir.join(format!("demand_response_ava_neg_ts_{scenario}.csv")),
        time_index,
    )?;

    let step_hours = time_index.step_hours().0;
    let clusters = clusters_raw
        .into_iter()
        .map(|raw| -> Result<_> {
            raw.validate()?;
            let name = raw.id.to_string();
            let demand = baseline.column(&name)?.to_vec();
            let capacity_up = availability_up.column(&name)?.to_vec();
            let capacity_down = availability_down.column(&name)?.to_vec();
            check_normalised(&demand, &format!("Baseline of {name}"))?;
            check_normalised(&capacity_up, &format!("Upwards availability of {name}"))?;
            check_normalised(&capacity_down, &format!("Downwards availability of {name}"))?;

            // Half of the variable costs are attributed to each direction of a shift
            let cost_per_direction = MoneyPerEnergy(raw.variable_costs.0 / 2.0);
            Ok(DemandResponseCluster {
                id: raw.id,
                bus: raw.bus,
                demand,
                max_demand: raw.max_cap,
                capacity_up,
                max_capacity_up: raw.potential_neg_overall,
                capacity_down,
                max_capacity_down: raw.potential_pos_overall,
                delay_time: hours_to_steps(raw.shifting_duration, step_hours),
                shed_time: hours_to_steps(raw.shed_time.unwrap_or(1.0), step_hours),
                recovery_time_shift: hours_to_steps(raw.regeneration_duration, step_hours),
                recovery_time_shed: hours_to_steps(
                    raw.recovery_time_shed.unwrap_or(0.0),
                    step_hours,
                ),
                shift_time: raw.interference_duration_pos,
                n_year_limit_shift: (raw.maximum_activations_year.round() as u32).max(1),
                n_year_limit_shed: 1,
                cost_up: cost_per_direction,
                cost_down_shift: cost_per_direction,
                cost_shed: raw.cost_shed,
                efficiency: raw.efficiency.unwrap_or(Dimensionless(1.0)),
                shift_eligibility: raw.shift_eligibility.unwrap_or(true),
                shed_eligibility: raw.shed_eligibility.unwrap_or(false),
            })
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| input_err_msg(&file_path))?;

    if let Some(id) = find_duplicate_id(&clusters) {
        bail!(DispatchError::InvalidValue(format!(
            "Duplicate demand response cluster ID found: {id}"
        )));
    }

    Ok(clusters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::time_index;
    use rstest::rstest;
    use std::fs;
    use tempfile::tempdir;

    fn write_series(dir: &Path, name: &str, values: [f64; 3]) {
        fs::write(
            dir.join(name),
            format!(
                "timestamp,ind\n\
                2017-01-01 00:00:00,{}\n\
                2017-01-01 01:00:00,{}\n\
                2017-01-01 02:00:00,{}\n",
                values[0], values[1], values[2]
            ),
        )
        .unwrap();
    }

    fn write_cluster(dir: &Path, row: &str) {
        fs::write(
            dir.join("demand_response_50.csv"),
            format!(
                "id,country,bus,max_cap,potential_neg_overall,potential_pos_overall,\
                shifting_duration,regeneration_duration,interference_duration_pos,\
                maximum_activations_year,variable_costs,efficiency,shift_eligibility,\
                shed_eligibility,cost_shed,shed_time,recovery_time_shed\n{row}\n"
            ),
        )
        .unwrap();
        write_series(dir, "demand_response_ts_50.csv", [0.5, 0.5, 0.5]);
        write_series(dir, "demand_response_ava_pos_ts_50.csv", [1.0, 0.8, 0.6]);
        write_series(dir, "demand_response_ava_neg_ts_50.csv", [0.2, 0.4, 0.6]);
    }

    #[rstest]
    #[case(1.0, 3.0, 3)]
    #[case(1.0, 2.5, 3)]
    #[case(0.25, 1.0, 4)]
    #[case(1.0, 0.0, 0)]
    fn hours_to_steps_works(#[case] step: f64, #[case] hours: f64, #[case] expected: usize) {
        assert_eq!(hours_to_steps(hours, step), expected);
    }

    #[rstest]
    fn read_clusters_applies_defaults(time_index: TimeIndex) {
        let dir = tempdir().unwrap();
        write_cluster(dir.path(), "ind,DE,DE_bus_el,100,20,30,2.5,1,4,10.4,10,,,,,,");
        let clusters = read_demand_response_clusters(dir.path(), "50", &time_index).unwrap();
        assert_eq!(clusters.len(), 1);

        let cluster = &clusters[0];
        assert_eq!(cluster.delay_time, 3);
        assert_eq!(cluster.recovery_time_shift, 1);
        assert_eq!(cluster.shift_time, 4.0);
        assert_eq!(cluster.n_year_limit_shift, 10);
        assert_eq!(cluster.n_year_limit_shed, 1);
        assert_eq!(cluster.cost_up, MoneyPerEnergy(5.0));
        assert_eq!(cluster.cost_down_shift, MoneyPerEnergy(5.0));
        assert_eq!(cluster.efficiency, Dimensionless(1.0));
        assert!(cluster.shift_eligibility);
        assert!(!cluster.shed_eligibility);
        assert_eq!(cluster.available_up(1), Power(8.0));
        assert_eq!(cluster.available_down(0), Power(30.0));
        assert_eq!(cluster.baseline(2), Power(50.0));
    }

    #[rstest]
    fn read_clusters_missing_series(time_index: TimeIndex) {
        let dir = tempdir().unwrap();
        write_cluster(dir.path(), "ind,DE,DE_bus_el,100,20,30,2,1,4,10,10,,,,,,");
        fs::remove_file(dir.path().join("demand_response_ava_neg_ts_50.csv")).unwrap();
        let err = read_demand_response_clusters(dir.path(), "50", &time_index).unwrap_err();
        assert!(matches!(
            DispatchError::find_in(&err),
            Some(DispatchError::MissingInput(_))
        ));
    }

    #[rstest]
    fn read_clusters_bad_efficiency(time_index: TimeIndex) {
        let dir = tempdir().unwrap();
        write_cluster(dir.path(), "ind,DE,DE_bus_el,100,20,30,2,1,4,10,10,1.5,,,,,");
        let err = read_demand_response_clusters(dir.path(), "50", &time_index).unwrap_err();
        assert!(matches!(
            DispatchError::find_in(&err),
            Some(DispatchError::InvalidValue(_))
        ));
    }
}
