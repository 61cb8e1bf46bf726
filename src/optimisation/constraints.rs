//! Code for adding constraints to the dispatch optimisation problem.
use super::VariableMap;
use crate::bus::BusID;
use crate::solver::Problem;
use crate::system::{EnergySystem, LimitKind};
use crate::units::UnitType;

/// Corresponding variables for a constraint along with the row offset in the solution
pub struct KeysWithOffset<T> {
    offset: usize,
    keys: Vec<T>,
}

impl<T> KeysWithOffset<T> {
    /// Zip the keys with the corresponding dual values in the solution, accounting for the offset
    pub fn zip_duals<'a, U>(&'a self, duals: &'a [f64]) -> impl Iterator<Item = (&'a T, U)>
    where
        U: UnitType,
    {
        assert!(
            self.offset + self.keys.len() <= duals.len(),
            "Bad constraint keys: dual rows out of range"
        );

        self.keys
            .iter()
            .zip(duals[self.offset..].iter().copied().map(U::new))
    }
}

/// Indicates the bus and time step covered by each bus balance constraint
pub type BusBalanceKeys = KeysWithOffset<(BusID, usize)>;

/// Indicates what each integral limit constraint restricts
pub type IntegralLimitKeys = KeysWithOffset<LimitKind>;

/// The keys for different constraints
pub struct ConstraintKeys {
    /// Keys for bus balance constraints
    pub bus_balance_keys: BusBalanceKeys,
    /// Keys for emissions and budget limits
    pub integral_limit_keys: IntegralLimitKeys,
}

/// Add constraints for the dispatch model.
///
/// Note: the ordering of constraints is important, as the dual values of the constraints must later
/// be retrieved to calculate prices.
///
/// # Arguments
///
/// * `problem` - The optimisation problem
/// * `variables` - The variables in the problem
/// * `system` - The energy system for this window
///
/// # Returns
///
/// Keys for the different constraints.
pub fn add_model_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    system: &EnergySystem,
) -> ConstraintKeys {
    let bus_balance_keys = add_bus_balance_constraints(problem, variables, system);
    add_transformer_constraints(problem, variables, system);
    add_gradient_constraints(problem, variables, system);
    add_storage_constraints(problem, variables, system);
    let integral_limit_keys = add_integral_limit_constraints(problem, variables, system);

    ConstraintKeys {
        bus_balance_keys,
        integral_limit_keys,
    }
}

/// Add energy balance constraints for every bus: `Σ inflows(t) - Σ outflows(t) = 0`.
///
/// The dual values of these constraints are the day-ahead prices.
fn add_bus_balance_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    system: &EnergySystem,
) -> BusBalanceKeys {
    // Row offset in problem. This line **must** come before we add more constraints.
    let offset = problem.num_rows();

    let mut keys = Vec::new();
    let mut terms = Vec::new();
    for bus_id in system.buses.keys() {
        let inflows: Vec<_> = system.flows_into(bus_id).collect();
        let outflows: Vec<_> = system.flows_out_of(bus_id).collect();
        for t in 0..system.len() {
            terms.extend(
                inflows
                    .iter()
                    .map(|&flow| (variables.flow_var(flow, t), 1.0)),
            );
            terms.extend(
                outflows
                    .iter()
                    .map(|&flow| (variables.flow_var(flow, t), -1.0)),
            );

            problem.add_row(0.0..=0.0, terms.drain(..));
            keys.push((bus_id.clone(), t));
        }
    }

    BusBalanceKeys { offset, keys }
}

/// Relate the input and output flows of every transformer.
///
/// For every input `i` and output `o`: `flow_i(t) * factor_o - flow_o(t) * factor_i = 0`.
fn add_transformer_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    system: &EnergySystem,
) {
    for transformer in &system.transformers {
        for (&(input, factor_in), &(output, factor_out)) in
            itertools::iproduct!(&transformer.inputs, &transformer.outputs)
        {
            for t in 0..system.len() {
                problem.add_row(
                    0.0..=0.0,
                    [
                        (variables.flow_var(input, t), factor_out.0),
                        (variables.flow_var(output, t), -factor_in.0),
                    ],
                );
            }
        }
    }
}

/// Limit the change of gradient-constrained flows between consecutive time steps.
///
/// There is no predecessor for the first time step, so it is unconstrained.
fn add_gradient_constraints(problem: &mut Problem, variables: &VariableMap, system: &EnergySystem) {
    for (idx, flow) in system.flows.iter().enumerate() {
        for t in 1..system.len() {
            let current = variables.flow_var(idx, t);
            let previous = variables.flow_var(idx, t - 1);
            if let Some(limit) = flow.gradient_pos {
                problem.add_row(..=limit.0, [(current, 1.0), (previous, -1.0)]);
            }
            if let Some(limit) = flow.gradient_neg {
                problem.add_row(..=limit.0, [(previous, 1.0), (current, -1.0)]);
            }
        }
    }
}

/// Add the level balance of every storage, and the roundtrip constraint where required.
///
/// `level(t+1) = level(t) * (1 - loss)^τ - (fixed_rel * nominal + fixed_abs) * τ
///     - outflow(t) * τ / η_out + inflow(t) * τ * η_in`
fn add_storage_constraints(problem: &mut Problem, variables: &VariableMap, system: &EnergySystem) {
    let step_hours = system.step_hours().0;
    for (idx, storage) in system.storages.iter().enumerate() {
        let retention = (1.0 - storage.loss_rate).powf(step_hours);
        let fixed_losses = (storage.fixed_losses_relative * storage.nominal_energy.0
            + storage.fixed_losses_absolute.0)
            * step_hours;

        for t in 0..system.len() {
            let rhs = -fixed_losses;
            problem.add_row(
                rhs..=rhs,
                [
                    (variables.storage_level_var(idx, t + 1), 1.0),
                    (variables.storage_level_var(idx, t), -retention),
                    (
                        variables.flow_var(storage.outflow, t),
                        step_hours / storage.efficiency_outflow.0,
                    ),
                    (
                        variables.flow_var(storage.inflow, t),
                        -step_hours * storage.efficiency_inflow.0,
                    ),
                ],
            );
        }

        if storage.balanced {
            problem.add_row(
                0.0..=0.0,
                [
                    (variables.storage_level_var(idx, system.len()), 1.0),
                    (variables.storage_level_var(idx, 0), -1.0),
                ],
            );
        }
    }
}

/// Add emissions and budget limits: `Σ_f Σ_t flow(f, t) * w(f, t) <= limit`
fn add_integral_limit_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    system: &EnergySystem,
) -> IntegralLimitKeys {
    // Row offset in problem. This line **must** come before we add more constraints.
    let offset = problem.num_rows();

    let mut keys = Vec::new();
    for limit in &system.integral_limits {
        let terms = limit.terms.iter().flat_map(|(flow, weights)| {
            weights
                .iter()
                .enumerate()
                .map(|(t, &weight)| (variables.flow_var(*flow, t), weight))
        });
        problem.add_row(..=limit.limit, terms);
        keys.push(limit.kind);
    }

    IntegralLimitKeys { offset, keys }
}
