//! The error taxonomy for the dispatch model.
//!
//! All fallible code returns [`anyhow::Result`]. Where an error belongs to one of the categories
//! below, it is raised as a [`DispatchError`] so that callers can tell the categories apart after
//! context has been attached higher up the stack.
use thiserror::Error;

/// The categories of failure which can abort a run
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    /// Bad or missing scenario parameters, including invalid enumerated choices
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A required input file or column is absent
    #[error("Missing input: {0}")]
    MissingInput(String),
    /// A time series does not line up with the time index
    #[error("Data alignment error: {0}")]
    DataAlignment(String),
    /// An input value violates its domain (e.g. a negative capacity)
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    /// The energy system graph is inconsistent (e.g. a flow refers to an undefined bus)
    #[error("Graph consistency error: {0}")]
    GraphConsistency(String),
    /// Contradictory constraint flags were set for the scenario
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),
    /// The solver ran but found no feasible (or bounded) solution
    #[error("Infeasible model: {0}")]
    InfeasibleModel(String),
    /// The solver could not be run at all or stopped without a result
    #[error("Solver execution error: {0}")]
    SolverExecution(String),
}

impl DispatchError {
    /// Find the first [`DispatchError`] in the chain of an [`anyhow::Error`], if any
    pub fn find_in(err: &anyhow::Error) -> Option<&DispatchError> {
        err.chain().find_map(|cause| cause.downcast_ref::<DispatchError>())
    }
}
