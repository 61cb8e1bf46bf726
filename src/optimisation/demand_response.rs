//! Variables and constraints for demand response.
//!
//! Each cluster draws its consumption from the bus through an inflow flow. The consumption is the
//! baseline demand, increased by up-shifts and reduced by down-shifts and shedding:
//! `inflow(t) = baseline(t) + up(t) - do_shift(t) - do_shed(t)`.
//!
//! Three formulations are available, selected once per run:
//!
//! * `oemof`: up- and down-shifts must balance within fixed intervals.
//! * `DIW`: every up-shift is compensated by down-shifts within `delay_time` steps either side,
//!   with recovery times between events.
//! * `DLR`: shifts are split by delay time class, each with its own compensating balance
//!   variable, and tracked by shift levels with optional annual and daily limits.
use crate::demand_response::{DemandResponseApproach, DemandResponseCluster, DemandResponseSettings};
use crate::solver::{Problem, Variable};
use crate::system::{DemandResponseSystem, DemandResponseUnit};
use crate::units::{Hours, Power};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::ops::Range;

/// Demand response activation in a single time step, in the same terms for every formulation
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DemandResponseActivation {
    /// Increase in demand (including the catch-up of earlier down-shifts)
    pub up: Power,
    /// Decrease in demand by shifting (including compensation of earlier up-shifts)
    pub do_shift: Power,
    /// Decrease in demand by shedding
    pub do_shed: Power,
}

/// The variables of all demand response clusters, in the same order as the clusters
pub struct DemandResponseVariables {
    units: Vec<UnitVariables>,
}

impl DemandResponseVariables {
    /// The harmonised activation of cluster `unit` at time step `t`
    pub fn activation(&self, unit: usize, t: usize, columns: &[f64]) -> DemandResponseActivation {
        let value = |var: &Variable| columns[var.index()];
        let sum = |vars: &[Vec<Variable>]| vars.iter().map(|v| value(&v[t])).sum::<f64>();

        match &self.units[unit] {
            UnitVariables::Oemof(vars) => DemandResponseActivation {
                up: Power(value(&vars.up[t])),
                do_shift: Power(value(&vars.do_shift[t])),
                do_shed: Power(value(&vars.shed[t])),
            },
            UnitVariables::Diw(vars) => DemandResponseActivation {
                up: Power(value(&vars.up[t])),
                do_shift: Power(
                    vars.window(t)
                        .map(|t_up| value(&vars.do_shift[&(t_up, t)]))
                        .sum(),
                ),
                do_shed: Power(value(&vars.shed[t])),
            },
            UnitVariables::Dlr(vars) => DemandResponseActivation {
                up: Power(sum(&vars.up) + sum(&vars.balance_do)),
                do_shift: Power(sum(&vars.do_shift) + sum(&vars.balance_up)),
                do_shed: Power(value(&vars.shed[t])),
            },
        }
    }
}

enum UnitVariables {
    Oemof(OemofVariables),
    Diw(DiwVariables),
    Dlr(DlrVariables),
}

struct OemofVariables {
    up: Vec<Variable>,
    do_shift: Vec<Variable>,
    shed: Vec<Variable>,
}

struct DiwVariables {
    delay: usize,
    up: Vec<Variable>,
    /// Down-shift at `tt` compensating the up-shift at `t`, keyed by `(t, tt)`
    do_shift: IndexMap<(usize, usize), Variable>,
    shed: Vec<Variable>,
}

impl DiwVariables {
    /// Time steps within `delay` steps of `t`
    fn window(&self, t: usize) -> Range<usize> {
        shift_window(t, self.delay, self.up.len())
    }
}

fn shift_window(t: usize, delay: usize, len: usize) -> Range<usize> {
    t.saturating_sub(delay)..(t + delay + 1).min(len)
}

/// Variables indexed by delay time class `h - 1` and then time step
struct DlrVariables {
    up: Vec<Vec<Variable>>,
    do_shift: Vec<Vec<Variable>>,
    balance_up: Vec<Vec<Variable>>,
    balance_do: Vec<Vec<Variable>>,
    shed: Vec<Variable>,
    level_up: Vec<Variable>,
    level_do: Vec<Variable>,
}

/// Add variables and constraints for all demand response clusters.
///
/// # Arguments
///
/// * `problem` - The optimisation problem
/// * `dr` - The demand response clusters and the formulation to use
/// * `flow_vars` - Flow variables, indexed by flow and time step
/// * `step_hours` - The length of a time step
///
/// # Returns
///
/// The demand response variables, or [`crate::error::DispatchError::InvalidScenario`] if a
/// cluster's flags contradict each other.
pub fn add_demand_response(
    problem: &mut Problem,
    dr: &DemandResponseSystem,
    flow_vars: &[Vec<Variable>],
    step_hours: Hours,
) -> Result<DemandResponseVariables> {
    let approach = dr.config.approach;
    let settings = &dr.config.settings;

    let mut units = Vec::with_capacity(dr.units.len());
    for unit in &dr.units {
        unit.cluster
            .check_scenario(approach, settings)
            .with_context(|| format!("Invalid demand response cluster {}", unit.cluster.id))?;

        let builder = UnitBuilder {
            problem: &mut *problem,
            unit,
            inflow: &flow_vars[unit.inflow],
            step_hours: step_hours.0,
        };
        units.push(match approach {
            DemandResponseApproach::Oemof => {
                UnitVariables::Oemof(builder.add_oemof(settings.shift_interval))
            }
            DemandResponseApproach::Diw => UnitVariables::Diw(builder.add_diw()),
            DemandResponseApproach::Dlr => UnitVariables::Dlr(builder.add_dlr(settings)),
        });
    }

    Ok(DemandResponseVariables { units })
}

struct UnitBuilder<'a> {
    problem: &'a mut Problem,
    unit: &'a DemandResponseUnit,
    inflow: &'a [Variable],
    step_hours: f64,
}

impl UnitBuilder<'_> {
    fn cluster(&self) -> &DemandResponseCluster {
        &self.unit.cluster
    }

    fn len(&self) -> usize {
        self.inflow.len()
    }

    /// Add one column per time step with the given cost per unit of energy and upper bound
    fn add_columns(&mut self, cost: f64, upper: impl Fn(usize) -> f64) -> Vec<Variable> {
        (0..self.len())
            .map(|t| {
                self.problem
                    .add_column(cost * self.step_hours, 0.0..=upper(t))
            })
            .collect()
    }

    fn add_up_columns(&mut self) -> Vec<Variable> {
        let unit = self.unit;
        let cluster = &unit.cluster;
        let cost = cluster.cost_up.0;
        self.add_columns(cost, |t| {
            if cluster.shift_eligibility {
                cluster.available_up(t).0
            } else {
                0.0
            }
        })
    }

    fn add_shed_columns(&mut self) -> Vec<Variable> {
        let unit = self.unit;
        let cluster = &unit.cluster;
        let cost = cluster.shed_cost().0;
        self.add_columns(cost, |t| {
            if cluster.shed_eligibility {
                cluster.available_down(t).0
            } else {
                0.0
            }
        })
    }

    /// Add the consumption balance `inflow(t) - Σ up + Σ down = baseline(t)`
    fn add_balance_row<I>(&mut self, t: usize, shifts: I)
    where
        I: IntoIterator<Item = (Variable, f64)>,
    {
        let baseline = self.cluster().baseline(t).0;
        let terms: Vec<_> = std::iter::once((self.inflow[t], 1.0)).chain(shifts).collect();
        self.problem.add_row(baseline..=baseline, terms);
    }

    fn add_oemof(mut self, interval: usize) -> OemofVariables {
        let unit = self.unit;
        let cluster = &unit.cluster;
        let up = self.add_up_columns();
        let do_shift = self.add_columns(cluster.cost_down_shift.0, |t| {
            if cluster.shift_eligibility {
                cluster.available_down(t).0
            } else {
                0.0
            }
        });
        let shed = self.add_shed_columns();

        for t in 0..self.len() {
            self.add_balance_row(t, [(up[t], -1.0), (do_shift[t], 1.0), (shed[t], 1.0)]);
            self.problem.add_row(
                ..=cluster.available_down(t).0,
                [(do_shift[t], 1.0), (shed[t], 1.0)],
            );
        }

        // Up- and down-shifts balance within each interval, including a final partial one
        let efficiency = cluster.efficiency.0;
        for start in (0..self.len()).step_by(interval.max(1)) {
            let end = (start + interval.max(1)).min(self.len());
            let terms = (start..end).flat_map(|t| [(up[t], efficiency), (do_shift[t], -1.0)]);
            self.problem.add_row(0.0..=0.0, terms);
        }

        OemofVariables {
            up,
            do_shift,
            shed,
        }
    }

    fn add_diw(mut self) -> DiwVariables {
        let unit = self.unit;
        let cluster = &unit.cluster;
        let len = self.len();
        let delay = cluster.delay_time;
        let window = |t: usize| shift_window(t, delay, len);

        let up = self.add_up_columns();
        let mut do_shift = IndexMap::new();
        for t in 0..len {
            for tt in window(t) {
                let upper = if cluster.shift_eligibility {
                    cluster.available_down(tt).0
                } else {
                    0.0
                };
                let var = self.problem.add_column(
                    cluster.cost_down_shift.0 * self.step_hours,
                    0.0..=upper,
                );
                do_shift.insert((t, tt), var);
            }
        }
        let shed = self.add_shed_columns();

        // Down-shifts happening at `tt`, compensating up-shifts at any `t` in its window
        let do_shift_ref = &do_shift;
        let shifts_at = |tt: usize| window(tt).map(move |t| do_shift_ref[&(t, tt)]);

        for t in 0..len {
            let mut terms = vec![(up[t], -1.0), (shed[t], 1.0)];
            terms.extend(shifts_at(t).map(|var| (var, 1.0)));
            self.add_balance_row(t, terms);

            // Every up-shift is compensated within its window
            let mut terms = vec![(up[t], cluster.efficiency.0)];
            terms.extend(window(t).map(|tt| (do_shift_ref[&(t, tt)], -1.0)));
            self.problem.add_row(0.0..=0.0, terms);

            // Down capacity, shared by shifting and shedding
            let mut terms = vec![(shed[t], 1.0)];
            terms.extend(shifts_at(t).map(|var| (var, 1.0)));
            self.problem
                .add_row(..=cluster.available_down(t).0, terms.clone());

            // Up and down activation together may not exceed the larger capacity
            terms.push((up[t], 1.0));
            let combined = cluster.available_up(t).0.max(cluster.available_down(t).0);
            self.problem.add_row(..=combined, terms);
        }

        // At most one full activation per recovery time
        let tau = self.step_hours;
        if cluster.recovery_time_shift > 0 {
            for t in 0..len {
                let end = (t + cluster.recovery_time_shift).min(len);
                self.problem.add_row(
                    ..=cluster.available_up(t).0 * delay as f64 * tau,
                    (t..end).map(|t| (up[t], 1.0)),
                );
            }
        }
        if cluster.shed_eligibility && cluster.recovery_time_shed > 0 {
            for t in 0..len {
                let end = (t + cluster.recovery_time_shed).min(len);
                self.problem.add_row(
                    ..=cluster.available_down(t).0 * cluster.shed_time as f64 * tau,
                    (t..end).map(|t| (shed[t], 1.0)),
                );
            }
        }

        DiwVariables {
            delay,
            up,
            do_shift,
            shed,
        }
    }

    fn add_dlr(mut self, settings: &DemandResponseSettings) -> DlrVariables {
        let unit = self.unit;
        let cluster = &unit.cluster;
        let len = self.len();
        let tau = self.step_hours;
        let efficiency = cluster.efficiency.0;
        let classes = 1..=cluster.delay_time;

        // Shifts in class `h` starting in the last `h` steps cannot be balanced within the window
        let shift_upper = |available: f64, h: usize, t: usize| {
            if !cluster.shift_eligibility || (settings.fixes && t + h >= len) {
                0.0
            } else {
                available
            }
        };
        let balance_upper = |available: f64, h: usize, t: usize| {
            if !cluster.shift_eligibility || t < h {
                0.0
            } else {
                available
            }
        };

        let mut up = Vec::new();
        let mut do_shift = Vec::new();
        let mut balance_up = Vec::new();
        let mut balance_do = Vec::new();
        for h in classes.clone() {
            up.push(self.add_columns(cluster.cost_up.0, |t| {
                shift_upper(cluster.available_up(t).0, h, t)
            }));
            do_shift.push(self.add_columns(cluster.cost_down_shift.0, |t| {
                shift_upper(cluster.available_down(t).0, h, t)
            }));
            balance_up.push(self.add_columns(cluster.cost_down_shift.0, |t| {
                balance_upper(cluster.available_down(t).0, h, t)
            }));
            balance_do.push(self.add_columns(cluster.cost_up.0, |t| {
                balance_upper(cluster.available_up(t).0, h, t)
            }));
        }
        let shed = self.add_shed_columns();

        let max_level_up = cluster.max_shift_energy_up().0;
        let max_level_do = cluster.max_shift_energy_down().0;
        let level_up = self.add_columns(0.0, |_| max_level_up);
        let level_do = self.add_columns(0.0, |_| max_level_do);

        let all_classes = |vars: &[Vec<Variable>], t: usize, coeff: f64| {
            vars.iter().map(move |v| (v[t], coeff)).collect::<Vec<_>>()
        };

        for t in 0..len {
            let mut terms = Vec::new();
            terms.extend(all_classes(&up, t, -1.0));
            terms.extend(all_classes(&balance_do, t, -1.0));
            terms.extend(all_classes(&do_shift, t, 1.0));
            terms.extend(all_classes(&balance_up, t, 1.0));
            terms.push((shed[t], 1.0));
            self.add_balance_row(t, terms);

            // Every shift is balanced exactly `h` steps later
            for (i, h) in classes.clone().enumerate() {
                if t >= h {
                    self.problem.add_row(
                        0.0..=0.0,
                        [(balance_do[i][t], efficiency), (do_shift[i][t - h], -1.0)],
                    );
                    self.problem.add_row(
                        0.0..=0.0,
                        [(up[i][t - h], efficiency), (balance_up[i][t], -1.0)],
                    );
                }
            }

            let mut down = all_classes(&do_shift, t, 1.0);
            down.extend(all_classes(&balance_up, t, 1.0));
            down.push((shed[t], 1.0));
            self.problem
                .add_row(..=cluster.available_down(t).0, down.clone());

            let mut upward = all_classes(&up, t, 1.0);
            upward.extend(all_classes(&balance_do, t, 1.0));
            self.problem
                .add_row(..=cluster.available_up(t).0, upward.clone());

            if settings.addition {
                let combined = cluster.available_up(t).0.max(cluster.available_down(t).0);
                self.problem
                    .add_row(..=combined, down.into_iter().chain(upward));
            }

            // Shift levels track energy shifted but not yet balanced
            let mut terms = vec![(level_do[t], 1.0)];
            if t > 0 {
                terms.push((level_do[t - 1], -1.0));
            }
            terms.extend(all_classes(&do_shift, t, -tau));
            terms.extend(all_classes(&balance_do, t, tau * efficiency));
            self.problem.add_row(0.0..=0.0, terms);

            let mut terms = vec![(level_up[t], 1.0)];
            if t > 0 {
                terms.push((level_up[t - 1], -1.0));
            }
            terms.extend(all_classes(&up, t, -tau));
            terms.extend(all_classes(&balance_up, t, tau / efficiency));
            self.problem.add_row(0.0..=0.0, terms);
        }

        // Annual limits compare shifted or shed energy with the energy of the permitted activations
        if settings.activate_year_limit {
            let n_shift = f64::from(cluster.n_year_limit_shift);
            let shifted = |vars: &[Vec<Variable>]| {
                (0..len)
                    .flat_map(|t| all_classes(vars, t, tau))
                    .collect::<Vec<_>>()
            };
            self.problem
                .add_row(..=max_level_do * n_shift, shifted(&do_shift));
            self.problem.add_row(..=max_level_up * n_shift, shifted(&up));

            if cluster.shed_eligibility {
                let max_shed =
                    cluster.max_shed_energy(Hours(tau)).0 * f64::from(cluster.n_year_limit_shed);
                self.problem
                    .add_row(..=max_shed, shed.iter().map(|&var| (var, tau)));
            }
        }

        if settings.activate_day_limit {
            let window = settings.t_day_limit.max(1);
            for t in 0..len {
                let first = (t + 1).saturating_sub(window);
                let terms = |vars: &[Vec<Variable>]| {
                    (first..=t)
                        .flat_map(|t| all_classes(vars, t, tau))
                        .collect::<Vec<_>>()
                };
                self.problem.add_row(..=max_level_do, terms(&do_shift));
                self.problem.add_row(..=max_level_up, terms(&up));
            }
        }

        DlrVariables {
            up,
            do_shift,
            balance_up,
            balance_do,
            shed,
            level_up,
            level_do,
        }
    }
}
