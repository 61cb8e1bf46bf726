//! Code for performing dispatch optimisation.
//!
//! This translates an [`EnergySystem`] into a [`Problem`], solves it and reads back flows,
//! storage levels, demand response activation and day-ahead prices.
use crate::bus::BusID;
use crate::error::DispatchError;
use crate::id::ComponentID;
use crate::solver::{Problem, RawSolution, Solver, Variable};
use crate::system::{EnergySystem, Flow, FlowIndex, LimitKind};
use crate::units::{Dimensionless, Energy, Money, MoneyPerEnergy, Power, UnitType};
use anyhow::{Context, Result, bail};
use log::debug;
use std::path::Path;

mod constraints;
use constraints::{ConstraintKeys, add_model_constraints};
pub mod demand_response;
use demand_response::{DemandResponseActivation, DemandResponseVariables};

/// A map for easy lookup of variables in the problem.
///
/// We use this data structure for two things:
///
/// 1. In order define constraints for the optimisation
/// 2. To keep track of the combination of parameters that each variable corresponds to, for when we
///    are reading the results of the optimisation.
pub struct VariableMap {
    /// One variable per flow and time step, indexed by [`FlowIndex`]
    flow_vars: Vec<Vec<Variable>>,
    /// One variable per storage for the level before the first step and after each step
    storage_level_vars: Vec<Vec<Variable>>,
    /// Variables for demand response, if active
    demand_response: Option<DemandResponseVariables>,
}

impl VariableMap {
    /// Create a new [`VariableMap`] and add flow and storage level variables to the problem
    fn new(problem: &mut Problem, system: &EnergySystem) -> Self {
        let flow_vars = add_flow_variables(problem, system);
        let storage_level_vars = add_storage_level_variables(problem, system);

        Self {
            flow_vars,
            storage_level_vars,
            demand_response: None,
        }
    }

    /// Get the [`Variable`] for a flow at time step `t`
    fn flow_var(&self, flow: FlowIndex, t: usize) -> Variable {
        self.flow_vars[flow][t]
    }

    /// Get the level [`Variable`] of a storage after `t` time steps
    fn storage_level_var(&self, storage: usize, t: usize) -> Variable {
        self.storage_level_vars[storage][t]
    }
}

/// Add a variable for every flow at every time step.
///
/// The objective coefficient is the flow's variable cost multiplied by the step length, so that
/// the objective is in money and bus balance duals divided by the step length are prices.
fn add_flow_variables(problem: &mut Problem, system: &EnergySystem) -> Vec<Vec<Variable>> {
    let step_hours = system.step_hours().0;
    system
        .flows
        .iter()
        .map(|flow| {
            (0..system.len())
                .map(|t| {
                    let cost = flow.cost[t].value() * step_hours;
                    problem.add_column(cost, flow.lower[t].0..=flow.upper[t].0)
                })
                .collect()
        })
        .collect()
}

fn add_storage_level_variables(problem: &mut Problem, system: &EnergySystem) -> Vec<Vec<Variable>> {
    system
        .storages
        .iter()
        .map(|storage| {
            let nominal = storage.nominal_energy.0;
            let first = match storage.initial_level {
                Some(level) => problem.add_column(0.0, level.0..=level.0),
                None => problem.add_column(0.0, 0.0..=nominal),
            };
            let mut vars = vec![first];
            vars.extend((0..system.len()).map(|t| {
                problem.add_column(
                    0.0,
                    storage.min_level[t] * nominal..=storage.max_level[t] * nominal,
                )
            }));
            vars
        })
        .collect()
}

/// The solution to the dispatch optimisation problem
pub struct Solution<'a> {
    solution: RawSolution,
    variables: VariableMap,
    system: &'a EnergySystem,
    constraint_keys: ConstraintKeys,
    /// The objective value for the solution
    pub objective_value: Money,
}

impl<'a> Solution<'a> {
    fn value(&self, var: Variable) -> f64 {
        self.solution.columns[var.index()]
    }

    /// The energy system this solution belongs to
    pub fn system(&self) -> &'a EnergySystem {
        self.system
    }

    /// The value of a flow at time step `t`
    pub fn flow(&self, flow: FlowIndex, t: usize) -> Power {
        Power(self.value(self.variables.flow_var(flow, t)))
    }

    /// Iterate over every flow at every time step
    pub fn iter_flows(&self) -> impl Iterator<Item = (&Flow, usize, Power)> {
        self.system
            .flows
            .iter()
            .enumerate()
            .flat_map(move |(idx, flow)| {
                (0..self.system.len()).map(move |t| (flow, t, self.flow(idx, t)))
            })
    }

    /// The level of a storage after `t` time steps (`t == 0` is the initial level)
    pub fn storage_level(&self, storage: usize, t: usize) -> Energy {
        Energy(self.value(self.variables.storage_level_var(storage, t)))
    }

    /// Iterate over the level of each storage after each time step
    pub fn iter_storage_levels(&self) -> impl Iterator<Item = (&ComponentID, usize, Energy)> {
        self.system
            .storages
            .iter()
            .enumerate()
            .flat_map(move |(idx, storage)| {
                (0..self.system.len())
                    .map(move |t| (&storage.id, t, self.storage_level(idx, t + 1)))
            })
    }

    /// Day-ahead prices for every electricity bus at every time step.
    ///
    /// The price is the dual value of the bus balance constraint divided by the step length.
    pub fn iter_prices(&self) -> impl Iterator<Item = (&BusID, usize, MoneyPerEnergy)> {
        let step_hours = self.system.step_hours().0;
        self.constraint_keys
            .bus_balance_keys
            .zip_duals::<MoneyPerEnergy>(&self.solution.row_duals)
            .filter(|((bus_id, _), _)| self.system.buses[bus_id].is_electricity())
            .map(move |((bus_id, t), dual)| (bus_id, *t, MoneyPerEnergy(dual.0 / step_hours)))
    }

    /// Shadow prices of the emissions and budget limits (money per unit of the limited quantity)
    pub fn iter_limit_shadow_prices(&self) -> impl Iterator<Item = (LimitKind, f64)> {
        self.constraint_keys
            .integral_limit_keys
            .zip_duals::<Dimensionless>(&self.solution.row_duals)
            .map(|(kind, dual)| (*kind, -dual.0))
    }

    /// Harmonised demand response activation for every cluster at every time step
    pub fn iter_demand_response(
        &self,
    ) -> impl Iterator<Item = (&ComponentID, usize, DemandResponseActivation)> {
        let units = self
            .system
            .demand_response
            .as_ref()
            .map(|dr| dr.units.as_slice())
            .unwrap_or_default();
        let variables = self.variables.demand_response.as_ref();

        units
            .iter()
            .enumerate()
            .flat_map(move |(idx, unit)| {
                (0..self.system.len()).filter_map(move |t| {
                    let activation = variables?.activation(idx, t, &self.solution.columns);
                    Some((&unit.cluster.id, t, activation))
                })
            })
    }
}

/// Provides the interface for running the dispatch optimisation for one window.
///
/// The caller can request that the assembled LP is written to a file with the `with_lp_file`
/// method.
pub struct DispatchRun<'a> {
    system: &'a EnergySystem,
    solver: &'a dyn Solver,
    lp_file: Option<&'a Path>,
}

impl<'a> DispatchRun<'a> {
    /// Create a new [`DispatchRun`] for the specified energy system
    pub fn new(system: &'a EnergySystem, solver: &'a dyn Solver) -> Self {
        Self {
            system,
            solver,
            lp_file: None,
        }
    }

    /// Write the assembled problem to the given path before solving
    pub fn with_lp_file(self, lp_file: &'a Path) -> Self {
        Self {
            lp_file: Some(lp_file),
            ..self
        }
    }

    /// Perform the dispatch optimisation.
    ///
    /// # Returns
    ///
    /// A solution containing flows, storage levels and prices or an error.
    pub fn run(self) -> Result<Solution<'a>> {
        let (problem, variables, constraint_keys) = build_problem(self.system)?;
        debug!(
            "Assembled problem with {} columns and {} rows",
            problem.num_cols(),
            problem.num_rows()
        );

        if let Some(lp_file) = self.lp_file {
            problem
                .write_lp_file(lp_file)
                .with_context(|| format!("Could not write LP file {}", lp_file.display()))?;
        }

        let solution = self.solver.solve(&problem)?;
        if solution.columns.len() != problem.num_cols()
            || solution.row_duals.len() != problem.num_rows()
        {
            bail!(DispatchError::SolverExecution(format!(
                "Solver returned {} columns and {} row duals for a problem with {} columns and \
                {} rows",
                solution.columns.len(),
                solution.row_duals.len(),
                problem.num_cols(),
                problem.num_rows()
            )));
        }

        Ok(Solution {
            objective_value: Money(solution.objective_value),
            solution,
            variables,
            system: self.system,
            constraint_keys,
        })
    }
}

/// Assemble the LP for an energy system.
///
/// Fails with [`DispatchError::InvalidScenario`] if demand response clusters carry contradictory
/// flags.
pub fn build_problem(system: &EnergySystem) -> Result<(Problem, VariableMap, ConstraintKeys)> {
    let mut problem = Problem::default();
    let mut variables = VariableMap::new(&mut problem, system);

    // Demand response adds its own columns and rows, but only refers to existing flows
    if let Some(dr) = &system.demand_response {
        variables.demand_response = Some(demand_response::add_demand_response(
            &mut problem,
            dr,
            &variables.flow_vars,
            system.step_hours(),
        )?);
    }

    let constraint_keys = add_model_constraints(&mut problem, &variables, system);

    Ok((problem, variables, constraint_keys))
}
