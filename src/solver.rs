//! The boundary between model building and the numerical LP solver.
//!
//! Constraint assembly only ever produces a [`Problem`]: a sparse, row-wise LP with column bounds
//! and objective coefficients. A [`Solver`] turns that into a [`RawSolution`] of primal column
//! values and row duals, or fails with either [`DispatchError::InfeasibleModel`] or
//! [`DispatchError::SolverExecution`].
use crate::config::SolverKind;
use crate::error::DispatchError;
use anyhow::{Result, bail};
use highs::{HighsModelStatus, RowProblem, Sense};
use log::debug;
use std::fmt::Write as _;
use std::fs;
use std::ops::{Bound, RangeBounds};
use std::path::Path;

/// A decision variable in the optimisation.
///
/// Note that this type does **not** include the value of the variable; it just refers to a
/// particular column of the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variable(usize);

impl Variable {
    /// The column index of the variable
    pub fn index(self) -> usize {
        self.0
    }
}

/// A linear constraint `lower <= Σ coeff * var <= upper`
#[derive(Debug, Clone, PartialEq)]
struct Row {
    lower: f64,
    upper: f64,
    terms: Vec<(Variable, f64)>,
}

/// A linear minimisation problem
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Problem {
    costs: Vec<f64>,
    bounds: Vec<(f64, f64)>,
    rows: Vec<Row>,
}

fn bounds_to_pair<B: RangeBounds<f64>>(bounds: &B) -> (f64, f64) {
    let lower = match bounds.start_bound() {
        Bound::Included(&v) | Bound::Excluded(&v) => v,
        Bound::Unbounded => f64::NEG_INFINITY,
    };
    let upper = match bounds.end_bound() {
        Bound::Included(&v) | Bound::Excluded(&v) => v,
        Bound::Unbounded => f64::INFINITY,
    };

    (lower, upper)
}

impl Problem {
    /// Add a column with the given objective coefficient and bounds
    pub fn add_column<B: RangeBounds<f64>>(&mut self, cost: f64, bounds: B) -> Variable {
        self.costs.push(cost);
        self.bounds.push(bounds_to_pair(&bounds));
        Variable(self.costs.len() - 1)
    }

    /// Add a constraint row
    pub fn add_row<B, I>(&mut self, bounds: B, terms: I)
    where
        B: RangeBounds<f64>,
        I: IntoIterator<Item = (Variable, f64)>,
    {
        let (lower, upper) = bounds_to_pair(&bounds);
        self.rows.push(Row {
            lower,
            upper,
            terms: terms.into_iter().collect(),
        });
    }

    /// The number of columns added so far
    pub fn num_cols(&self) -> usize {
        self.costs.len()
    }

    /// The number of rows added so far
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// The objective coefficient of a column
    pub fn cost(&self, var: Variable) -> f64 {
        self.costs[var.0]
    }

    /// The lower and upper bounds of a column
    pub fn bounds(&self, var: Variable) -> (f64, f64) {
        self.bounds[var.0]
    }

    /// Write the problem in CPLEX LP format
    pub fn to_lp_string(&self) -> String {
        // NB: Writing to a `String` is infallible, so the `unwrap`s below can't panic
        let mut out = String::from("\\ Written by powerdispatch\nMinimize\n obj:");
        let mut any_cost = false;
        for (col, &cost) in self.costs.iter().enumerate() {
            if cost != 0.0 {
                write_term(&mut out, cost, col);
                any_cost = true;
            }
        }
        if !any_cost {
            out.push_str(" 0 x0");
        }

        out.push_str("\nSubject To\n");
        for (i, row) in self.rows.iter().enumerate() {
            let mut expr = String::new();
            for &(var, coeff) in &row.terms {
                write_term(&mut expr, coeff, var.0);
            }
            if expr.is_empty() {
                expr.push_str(" 0 x0");
            }

            if row.lower == row.upper {
                writeln!(out, " c{i}:{expr} = {}", row.lower).unwrap();
            } else {
                if row.lower.is_finite() {
                    writeln!(out, " c{i}_lo:{expr} >= {}", row.lower).unwrap();
                }
                if row.upper.is_finite() {
                    writeln!(out, " c{i}_up:{expr} <= {}", row.upper).unwrap();
                }
            }
        }

        out.push_str("Bounds\n");
        for (col, &(lower, upper)) in self.bounds.iter().enumerate() {
            match (lower.is_finite(), upper.is_finite()) {
                (true, true) if lower == upper => writeln!(out, " x{col} = {lower}").unwrap(),
                (true, true) => writeln!(out, " {lower} <= x{col} <= {upper}").unwrap(),
                (true, false) => writeln!(out, " x{col} >= {lower}").unwrap(),
                (false, true) => writeln!(out, " -inf <= x{col} <= {upper}").unwrap(),
                (false, false) => writeln!(out, " x{col} free").unwrap(),
            }
        }
        out.push_str("End\n");

        out
    }

    /// Write the problem to a file in CPLEX LP format
    pub fn write_lp_file(&self, file_path: &Path) -> Result<()> {
        fs::write(file_path, self.to_lp_string())?;
        debug!("Wrote LP problem to {}", file_path.display());
        Ok(())
    }
}

fn write_term(out: &mut String, coeff: f64, col: usize) {
    if coeff < 0.0 {
        write!(out, " - {} x{col}", -coeff).unwrap();
    } else {
        write!(out, " + {coeff} x{col}").unwrap();
    }
}

/// Solver options, checked against the options the solver knows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverOptions(Vec<(String, SolverOptionValue)>);

/// The value of a single solver option
#[derive(Debug, Clone, PartialEq)]
pub enum SolverOptionValue {
    /// A boolean flag
    Bool(bool),
    /// An integer option
    Int(i32),
    /// A floating-point option
    Float(f64),
    /// A string option
    Str(String),
}

/// The type of value a HiGHS option takes
#[derive(Debug, Clone, Copy, PartialEq)]
enum HighsOptionKind {
    Bool,
    Int,
    Float,
    /// A string, restricted to the given values unless the list is empty
    Str(&'static [&'static str]),
}

const OFF_CHOOSE_ON: &[&str] = &["off", "choose", "on"];

/// HiGHS options which may be set from the scenario configuration
const HIGHS_OPTIONS: &[(&str, HighsOptionKind)] = &[
    ("presolve", HighsOptionKind::Str(OFF_CHOOSE_ON)),
    ("solver", HighsOptionKind::Str(&["simplex", "choose", "ipm", "pdlp"])),
    ("parallel", HighsOptionKind::Str(OFF_CHOOSE_ON)),
    ("run_crossover", HighsOptionKind::Str(OFF_CHOOSE_ON)),
    ("ranging", HighsOptionKind::Str(&["off", "on"])),
    ("time_limit", HighsOptionKind::Float),
    ("threads", HighsOptionKind::Int),
    ("random_seed", HighsOptionKind::Int),
    ("primal_feasibility_tolerance", HighsOptionKind::Float),
    ("dual_feasibility_tolerance", HighsOptionKind::Float),
    ("ipm_optimality_tolerance", HighsOptionKind::Float),
    ("objective_bound", HighsOptionKind::Float),
    ("objective_target", HighsOptionKind::Float),
    ("infinite_cost", HighsOptionKind::Float),
    ("infinite_bound", HighsOptionKind::Float),
    ("small_matrix_value", HighsOptionKind::Float),
    ("large_matrix_value", HighsOptionKind::Float),
    ("simplex_strategy", HighsOptionKind::Int),
    ("simplex_scale_strategy", HighsOptionKind::Int),
    ("simplex_dual_edge_weight_strategy", HighsOptionKind::Int),
    ("simplex_primal_edge_weight_strategy", HighsOptionKind::Int),
    ("simplex_iteration_limit", HighsOptionKind::Int),
    ("ipm_iteration_limit", HighsOptionKind::Int),
    ("highs_debug_level", HighsOptionKind::Int),
    ("log_dev_level", HighsOptionKind::Int),
    ("user_bound_scale", HighsOptionKind::Int),
    ("user_cost_scale", HighsOptionKind::Int),
    ("output_flag", HighsOptionKind::Bool),
    ("log_to_console", HighsOptionKind::Bool),
    ("allow_unbounded_or_infeasible", HighsOptionKind::Bool),
    ("write_solution_to_file", HighsOptionKind::Bool),
    ("solution_file", HighsOptionKind::Str(&[])),
    ("log_file", HighsOptionKind::Str(&[])),
];

fn highs_option_kind(name: &str) -> Option<HighsOptionKind> {
    HIGHS_OPTIONS
        .iter()
        .find(|(option, _)| *option == name)
        .map(|(_, kind)| *kind)
}

/// Check a TOML value against the type HiGHS expects for the option.
///
/// Integers are accepted for floating-point options.
fn check_highs_option(name: &str, value: toml::Value) -> Result<SolverOptionValue> {
    let Some(kind) = highs_option_kind(name) else {
        bail!(DispatchError::Configuration(format!(
            "Unknown solver option {name}"
        )));
    };

    let value = match (kind, value) {
        (HighsOptionKind::Bool, toml::Value::Boolean(b)) => SolverOptionValue::Bool(b),
        (HighsOptionKind::Int, toml::Value::Integer(i)) => match i32::try_from(i) {
            Ok(i) => SolverOptionValue::Int(i),
            Err(_) => bail!(DispatchError::Configuration(format!(
                "Solver option {name} is out of range"
            ))),
        },
        (HighsOptionKind::Float, toml::Value::Float(f)) => SolverOptionValue::Float(f),
        (HighsOptionKind::Float, toml::Value::Integer(i)) => SolverOptionValue::Float(i as f64),
        (HighsOptionKind::Str(allowed), toml::Value::String(s)) => {
            if s.contains('\0') || !(allowed.is_empty() || allowed.contains(&s.as_str())) {
                bail!(DispatchError::Configuration(format!(
                    "Invalid value '{s}' for solver option {name}"
                )));
            }
            SolverOptionValue::Str(s)
        }
        (kind, other) => bail!(DispatchError::Configuration(format!(
            "Solver option {name} has value {other} but expects {}",
            match kind {
                HighsOptionKind::Bool => "a boolean",
                HighsOptionKind::Int => "an integer",
                HighsOptionKind::Float => "a number",
                HighsOptionKind::Str(_) => "a string",
            }
        ))),
    };

    Ok(value)
}

impl SolverOptions {
    /// Convert a TOML table into solver options.
    ///
    /// Every option must be a known HiGHS option with a value of the right type. Anything else is
    /// a configuration error.
    pub fn from_table(table: toml::Table) -> Result<Self> {
        let options = table
            .into_iter()
            .map(|(name, value)| {
                let value = check_highs_option(&name, value)?;
                Ok((name, value))
            })
            .collect::<Result<_>>()?;

        Ok(Self(options))
    }

    /// Iterate over option names and values
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SolverOptionValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Whether no options were given
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The values read back from an optimal solve
#[derive(Debug, Clone, PartialEq)]
pub struct RawSolution {
    /// Primal value of every column, in the order columns were added
    pub columns: Vec<f64>,
    /// Dual value of every row, in the order rows were added
    pub row_duals: Vec<f64>,
    /// The optimal objective value
    pub objective_value: f64,
}

/// A numerical LP solver.
///
/// Implementations must distinguish problems which have no optimal solution
/// ([`DispatchError::InfeasibleModel`]) from failures of the solver itself
/// ([`DispatchError::SolverExecution`]).
pub trait Solver {
    /// Solve the problem to optimality
    fn solve(&self, problem: &Problem) -> Result<RawSolution>;
}

/// Solves problems with HiGHS
#[derive(Debug, Clone, Default)]
pub struct HighsSolver {
    options: SolverOptions,
}

impl HighsSolver {
    /// Create a solver which applies the given options to every solve
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }
}

impl Solver for HighsSolver {
    fn solve(&self, problem: &Problem) -> Result<RawSolution> {
        let mut highs_problem = RowProblem::default();
        let cols: Vec<_> = problem
            .costs
            .iter()
            .zip(problem.bounds.iter())
            .map(|(&cost, &(lower, upper))| highs_problem.add_column(cost, lower..=upper))
            .collect();
        for row in &problem.rows {
            highs_problem.add_row(
                row.lower..=row.upper,
                row.terms.iter().map(|&(var, coeff)| (cols[var.0], coeff)),
            );
        }

        let mut model = highs_problem.optimise(Sense::Minimise);
        model.set_option("output_flag", false);
        for (name, value) in self.options.iter() {
            match value {
                SolverOptionValue::Bool(b) => model.set_option(name, *b),
                SolverOptionValue::Int(i) => model.set_option(name, *i),
                SolverOptionValue::Float(f) => model.set_option(name, *f),
                SolverOptionValue::Str(s) => model.set_option(name, s.as_str()),
            }
        }

        let solved = match model.try_solve() {
            Ok(solved) => solved,
            Err(status) => bail!(DispatchError::SolverExecution(format!(
                "HiGHS could not solve the problem: {status:?}"
            ))),
        };

        match solved.status() {
            HighsModelStatus::Optimal => {}
            status @ (HighsModelStatus::Infeasible
            | HighsModelStatus::Unbounded
            | HighsModelStatus::UnboundedOrInfeasible) => {
                bail!(DispatchError::InfeasibleModel(format!(
                    "Solver returned status {status:?}"
                )))
            }
            status => bail!(DispatchError::SolverExecution(format!(
                "Solver terminated without an optimal solution: {status:?}"
            ))),
        }

        let solution = solved.get_solution();
        Ok(RawSolution {
            columns: solution.columns().to_vec(),
            row_duals: solution.dual_rows().to_vec(),
            objective_value: solved.objective_value(),
        })
    }
}

/// Create the solver selected in the scenario configuration
pub fn create_solver(kind: SolverKind, options: &SolverOptions) -> Box<dyn Solver> {
    match kind {
        SolverKind::Highs => Box::new(HighsSolver::new(options.clone())),
    }
}
