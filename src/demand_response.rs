//! Demand response clusters: aggregated flexible demand which can shift or shed load.
//!
//! Exactly one formulation is used for all clusters in a run. The choice is made once, from the
//! scenario configuration, and is represented by [`DemandResponseApproach`].
use crate::bus::BusID;
use crate::error::DispatchError;
use crate::id::{ComponentID, define_id_getter};
use crate::input::define_param_default;
use crate::units::{Dimensionless, Energy, Hours, MoneyPerEnergy, Power};
use anyhow::{Result, bail};
use serde::Deserialize;
use std::ops::Range;
use strum::{Display, EnumIter, EnumString};

/// The formulation used to represent demand response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter)]
pub enum DemandResponseApproach {
    /// Delay-limited formulation with one set of shift variables per delay-time class
    #[strum(serialize = "DLR")]
    Dlr,
    /// Formulation with pairwise down-shift variables within a symmetric window
    #[strum(serialize = "DIW")]
    Diw,
    /// Simple formulation balancing shifts within fixed intervals
    #[strum(serialize = "oemof")]
    Oemof,
}

define_param_default!(default_shift_interval, usize, 24);
define_param_default!(default_true, bool, true);
define_param_default!(default_t_day_limit, usize, 24);

/// Formulation-specific parameters shared by all clusters
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DemandResponseSettings {
    /// Length of the balancing intervals for the `oemof` formulation (time steps)
    #[serde(default = "default_shift_interval")]
    pub shift_interval: usize,
    /// Whether annual limits on shifting and shedding apply (`DLR` only)
    #[serde(default = "default_true")]
    pub activate_year_limit: bool,
    /// Whether daily limits on shifting apply (`DLR` only)
    #[serde(default)]
    pub activate_day_limit: bool,
    /// Length of the window for the daily limit (time steps)
    #[serde(default = "default_t_day_limit")]
    pub t_day_limit: usize,
    /// Whether simultaneous up and down activation is capped by the larger capacity (`DLR` only)
    #[serde(default = "default_true")]
    pub addition: bool,
    /// Whether shifts which cannot be balanced before the end of the horizon are forbidden
    /// (`DLR` only)
    #[serde(default = "default_true")]
    pub fixes: bool,
}

impl Default for DemandResponseSettings {
    fn default() -> Self {
        Self {
            shift_interval: default_shift_interval(),
            activate_year_limit: true,
            activate_day_limit: false,
            t_day_limit: default_t_day_limit(),
            addition: true,
            fixes: true,
        }
    }
}

/// An aggregated group of flexible demand units.
///
/// Time series are normalised and are scaled by the corresponding maximum capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandResponseCluster {
    /// Unique identifier for the cluster
    pub id: ComponentID,
    /// The bus the cluster draws from
    pub bus: BusID,
    /// Normalised baseline demand
    pub demand: Vec<f64>,
    /// Maximum baseline demand
    pub max_demand: Power,
    /// Normalised availability for increasing demand
    pub capacity_up: Vec<f64>,
    /// Maximum capacity for increasing demand
    pub max_capacity_up: Power,
    /// Normalised availability for decreasing demand
    pub capacity_down: Vec<f64>,
    /// Maximum capacity for decreasing demand
    pub max_capacity_down: Power,
    /// Maximum number of time steps before a shift must be balanced
    pub delay_time: usize,
    /// Maximum duration of a shed event (time steps)
    pub shed_time: usize,
    /// Minimum time between two shift events (time steps, `DIW` only)
    pub recovery_time_shift: usize,
    /// Minimum time between two shed events (time steps, `DIW` only)
    pub recovery_time_shed: usize,
    /// Maximum duration of a shift at full capacity (hours, `DLR` only)
    pub shift_time: f64,
    /// Maximum number of full shift cycles per year (`DLR` only)
    pub n_year_limit_shift: u32,
    /// Maximum number of full shed cycles per year (`DLR` only)
    pub n_year_limit_shed: u32,
    /// Cost of increasing demand
    pub cost_up: MoneyPerEnergy,
    /// Cost of decreasing demand by shifting
    pub cost_down_shift: MoneyPerEnergy,
    /// Cost of decreasing demand by shedding
    pub cost_shed: Option<MoneyPerEnergy>,
    /// Efficiency of load shifting
    pub efficiency: Dimensionless,
    /// Whether the cluster may shift load
    pub shift_eligibility: bool,
    /// Whether the cluster may shed load
    pub shed_eligibility: bool,
}
define_id_getter! {DemandResponseCluster, ComponentID}

impl DemandResponseCluster {
    /// Restrict the cluster's time series to a window of the horizon
    pub fn window(&self, range: Range<usize>) -> Self {
        Self {
            demand: self.demand[range.clone()].to_vec(),
            capacity_up: self.capacity_up[range.clone()].to_vec(),
            capacity_down: self.capacity_down[range].to_vec(),
            ..self.clone()
        }
    }

    /// Baseline demand at time step `t`
    pub fn baseline(&self, t: usize) -> Power {
        self.max_demand * Dimensionless(self.demand[t])
    }

    /// Available capacity for increasing demand at time step `t`
    pub fn available_up(&self, t: usize) -> Power {
        self.max_capacity_up * Dimensionless(self.capacity_up[t])
    }

    /// Available capacity for decreasing demand at time step `t`
    pub fn available_down(&self, t: usize) -> Power {
        self.max_capacity_down * Dimensionless(self.capacity_down[t])
    }

    /// Mean normalised availability for increasing demand
    pub fn mean_capacity_up(&self) -> f64 {
        mean(&self.capacity_up)
    }

    /// Mean normalised availability for decreasing demand
    pub fn mean_capacity_down(&self) -> f64 {
        mean(&self.capacity_down)
    }

    /// Energy which may be shifted up in a single activation (`DLR` only)
    pub fn max_shift_energy_up(&self) -> Energy {
        self.max_capacity_up * Dimensionless(self.mean_capacity_up()) * Hours(self.shift_time)
    }

    /// Energy which may be shifted down in a single activation (`DLR` only)
    pub fn max_shift_energy_down(&self) -> Energy {
        self.max_capacity_down * Dimensionless(self.mean_capacity_down()) * Hours(self.shift_time)
    }

    /// Energy which may be shed in a single activation lasting `shed_time` steps (`DLR` only)
    pub fn max_shed_energy(&self, step_hours: Hours) -> Energy {
        let duration = Hours(self.shed_time as f64 * step_hours.0);
        self.max_capacity_down * Dimensionless(self.mean_capacity_down()) * duration
    }

    /// The shed cost, which is zero if the cluster can't shed
    pub fn shed_cost(&self) -> MoneyPerEnergy {
        self.cost_shed.unwrap_or_default()
    }

    /// Check that the cluster's flags are consistent with each other and with the chosen
    /// formulation.
    ///
    /// Fails with [`DispatchError::InvalidScenario`] rather than repairing contradictory input.
    pub fn check_scenario(
        &self,
        approach: DemandResponseApproach,
        settings: &DemandResponseSettings,
    ) -> Result<()> {
        if self.shed_eligibility && self.cost_shed.is_none() {
            bail!(DispatchError::InvalidScenario(format!(
                "Demand response cluster {} is eligible for shedding but has no shed cost",
                self.id
            )));
        }
        if self.shift_eligibility && self.delay_time == 0 {
            bail!(DispatchError::InvalidScenario(format!(
                "Demand response cluster {} is eligible for shifting but has a delay time of zero",
                self.id
            )));
        }
        if approach == DemandResponseApproach::Dlr
            && settings.activate_year_limit
            && ((self.shift_eligibility && self.n_year_limit_shift == 0)
                || (self.shed_eligibility && self.n_year_limit_shed == 0))
        {
            bail!(DispatchError::InvalidScenario(format!(
                "Annual limits are active but demand response cluster {} has no permitted \
                activations",
                self.id
            )));
        }

        Ok(())
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, dr_cluster};
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case("DLR", DemandResponseApproach::Dlr)]
    #[case("DIW", DemandResponseApproach::Diw)]
    #[case("oemof", DemandResponseApproach::Oemof)]
    fn approach_from_str(#[case] s: &str, #[case] expected: DemandResponseApproach) {
        assert_eq!(DemandResponseApproach::from_str(s).unwrap(), expected);
        assert_eq!(expected.to_string(), s);
    }

    #[test]
    fn approach_from_str_invalid() {
        assert!(DemandResponseApproach::from_str("dlr").is_err());
    }

    #[rstest]
    fn window_slices_series(dr_cluster: DemandResponseCluster) {
        let window = dr_cluster.window(1..3);
        assert_eq!(window.demand.len(), 2);
        assert_eq!(window.capacity_up, dr_cluster.capacity_up[1..3]);
        assert_eq!(window.max_capacity_down, dr_cluster.max_capacity_down);
    }

    #[rstest]
    #[case(Hours(1.0), 10.0)]
    #[case(Hours(0.25), 2.5)]
    fn max_activation_energy(
        mut dr_cluster: DemandResponseCluster,
        #[case] step_hours: Hours,
        #[case] shed_energy: f64,
    ) {
        // Shift time is in hours, shed time in time steps
        dr_cluster.shift_time = 2.0;
        dr_cluster.shed_time = 1;
        assert_eq!(dr_cluster.max_shift_energy_down(), Energy(20.0));
        assert_eq!(dr_cluster.max_shed_energy(step_hours), Energy(shed_energy));
    }

    #[rstest]
    fn check_scenario_ok(dr_cluster: DemandResponseCluster) {
        let settings = DemandResponseSettings::default();
        for approach in [
            DemandResponseApproach::Dlr,
            DemandResponseApproach::Diw,
            DemandResponseApproach::Oemof,
        ] {
            assert!(dr_cluster.check_scenario(approach, &settings).is_ok());
        }
    }

    #[rstest]
    fn check_scenario_shed_without_cost(mut dr_cluster: DemandResponseCluster) {
        dr_cluster.shed_eligibility = true;
        dr_cluster.cost_shed = None;
        assert_error!(
            dr_cluster.check_scenario(
                DemandResponseApproach::Oemof,
                &DemandResponseSettings::default()
            ),
            "Invalid scenario: Demand response cluster dr1 is eligible for shedding but has no \
            shed cost"
        );
    }

    #[rstest]
    fn check_scenario_shift_without_delay(mut dr_cluster: DemandResponseCluster) {
        dr_cluster.delay_time = 0;
        let err = dr_cluster
            .check_scenario(
                DemandResponseApproach::Diw,
                &DemandResponseSettings::default(),
            )
            .unwrap_err();
        assert!(matches!(
            DispatchError::find_in(&err),
            Some(DispatchError::InvalidScenario(_))
        ));
    }

    #[rstest]
    fn check_scenario_year_limit_without_counts(mut dr_cluster: DemandResponseCluster) {
        dr_cluster.n_year_limit_shift = 0;
        let settings = DemandResponseSettings::default();
        assert!(
            dr_cluster
                .check_scenario(DemandResponseApproach::Dlr, &settings)
                .is_err()
        );

        // Only the DLR formulation has annual limits
        assert!(
            dr_cluster
                .check_scenario(DemandResponseApproach::Oemof, &settings)
                .is_ok()
        );
    }
}
