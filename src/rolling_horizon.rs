//! Solve a long horizon as a chain of overlapping windows.
//!
//! Each slice solves `[iL, iL + L + O)` (truncated at the end of the horizon) but only keeps the
//! first `L` time steps. The storage levels after the last retained step become the fixed initial
//! levels of the next slice. Slices are solved strictly in order; if one fails, the whole run
//! fails.
use crate::config::{RollingHorizonConfig, ScenarioConfig};
use crate::id::ComponentID;
use crate::input::InputData;
use crate::optimisation::DispatchRun;
use crate::results::DispatchResults;
use crate::solver::Solver;
use crate::system::{BuildOptions, build_energy_system};
use crate::units::Energy;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{debug, info};
use std::fmt;
use std::ops::Range;
use std::path::Path;

/// One window of a rolling horizon run, in time steps of the full horizon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    /// Position of the slice in the chain
    pub index: usize,
    /// The time steps which are optimised
    pub window: Range<usize>,
    /// The time steps whose results are kept
    pub retained: Range<usize>,
}

impl Slice {
    /// Number of time steps which are optimised
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Number of time steps whose results are kept
    pub fn retained_len(&self) -> usize {
        self.retained.len()
    }
}

/// Split a horizon of `len` time steps into slices.
///
/// There are `ceil(len / slice_length)` slices. Neither a window nor its retained part ever
/// extends past the end of the horizon, so the last slice may be shorter than the others.
pub fn plan_slices(len: usize, config: &RollingHorizonConfig) -> Vec<Slice> {
    let step = config.slice_length;
    assert!(step > 0, "Slice length must be positive");

    (0..len.div_ceil(step))
        .map(|index| {
            let start = index * step;
            Slice {
                index,
                window: start..(start + step + config.overlap).min(len),
                retained: start..(start + step).min(len),
            }
        })
        .collect()
}

/// The name of the LP file written for a slice
pub fn slice_lp_file_name(index: usize) -> String {
    format!("model_slice_{index}.lp")
}

/// The state of the rolling horizon controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No slice has been started
    Pending,
    /// Building the energy system for a slice
    Build(usize),
    /// Solving a slice
    Solve(usize),
    /// Extracting the retained results of a slice
    Extract(usize),
    /// Handing storage levels over to the next slice
    Advance(usize),
    /// All slices were solved
    Done,
    /// A slice could not be built or solved
    Failed(usize),
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Build(i) => write!(f, "building slice {i}"),
            Self::Solve(i) => write!(f, "solving slice {i}"),
            Self::Extract(i) => write!(f, "extracting results of slice {i}"),
            Self::Advance(i) => write!(f, "advancing from slice {i}"),
            Self::Done => write!(f, "done"),
            Self::Failed(i) => write!(f, "failed at slice {i}"),
        }
    }
}

/// Runs the slices of a rolling horizon optimisation one after the other
pub struct RollingHorizon<'a> {
    input: &'a InputData,
    config: &'a ScenarioConfig,
    solver: &'a dyn Solver,
    lp_dir: Option<&'a Path>,
    slices: Vec<Slice>,
    state: ControllerState,
    handovers: Vec<IndexMap<ComponentID, Energy>>,
}

impl<'a> RollingHorizon<'a> {
    /// Plan the slices for a scenario
    pub fn new(
        input: &'a InputData,
        config: &'a ScenarioConfig,
        rolling_horizon: &RollingHorizonConfig,
        solver: &'a dyn Solver,
    ) -> Self {
        Self {
            input,
            config,
            solver,
            lp_dir: None,
            slices: plan_slices(config.time_index.len(), rolling_horizon),
            state: ControllerState::Pending,
            handovers: Vec::new(),
        }
    }

    /// Write the LP of every slice to the given folder
    pub fn with_lp_dir(self, lp_dir: &'a Path) -> Self {
        Self {
            lp_dir: Some(lp_dir),
            ..self
        }
    }

    /// The planned slices
    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    /// The current state of the controller
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// The initial storage levels handed to each slice so far.
    ///
    /// The first slice uses the configured levels, so its map is empty.
    pub fn handovers(&self) -> &[IndexMap<ComponentID, Energy>] {
        &self.handovers
    }

    fn transition(&mut self, state: ControllerState) {
        debug!("Rolling horizon: {} -> {}", self.state, state);
        self.state = state;
    }

    /// Solve all slices and concatenate their retained results.
    ///
    /// Fails as soon as one slice cannot be built or solved, leaving the controller in the
    /// [`ControllerState::Failed`] state.
    pub fn run(&mut self) -> Result<DispatchResults> {
        let len = self.config.time_index.len();
        info!(
            "Rolling horizon: {} slices over {} time steps",
            self.slices.len(),
            len
        );

        let mut results = DispatchResults::default();
        let mut initial_levels = IndexMap::new();
        for slice in self.slices.clone() {
            self.handovers.push(initial_levels.clone());
            match self.run_slice(&slice, initial_levels, &mut results) {
                Ok(levels) => initial_levels = levels,
                Err(err) => {
                    self.transition(ControllerState::Failed(slice.index));
                    return Err(err).with_context(|| {
                        format!(
                            "Rolling horizon slice {} (time steps {:?}) failed",
                            slice.index, slice.window
                        )
                    });
                }
            }
        }

        self.transition(ControllerState::Done);
        Ok(results)
    }

    /// Build, solve and extract one slice, returning the levels for the next one
    fn run_slice(
        &mut self,
        slice: &Slice,
        initial_levels: IndexMap<ComponentID, Energy>,
        results: &mut DispatchResults,
    ) -> Result<IndexMap<ComponentID, Energy>> {
        info!(
            "Slice {}: optimising time steps {:?}, retaining {:?}",
            slice.index, slice.window, slice.retained
        );

        self.transition(ControllerState::Build(slice.index));
        let options = BuildOptions {
            window: slice.window.clone(),
            initial_levels,
            closes_roundtrip: false,
            limit_share: self.config.time_index.share_of(slice.window_len()),
        };
        let system = build_energy_system(self.input, self.config, &options)?;

        self.transition(ControllerState::Solve(slice.index));
        let lp_file = self
            .lp_dir
            .map(|dir| dir.join(slice_lp_file_name(slice.index)));
        let mut run = DispatchRun::new(&system, self.solver);
        if let Some(lp_file) = lp_file.as_deref() {
            run = run.with_lp_file(lp_file);
        }
        let solution = run.run()?;

        self.transition(ControllerState::Extract(slice.index));
        let retained_len = slice.retained_len();
        results.append(slice.index, &solution, retained_len);
        let levels = system
            .storages
            .iter()
            .enumerate()
            .map(|(idx, storage)| {
                (
                    storage.id.clone(),
                    solution.storage_level(idx, retained_len),
                )
            })
            .collect();

        self.transition(ControllerState::Advance(slice.index));
        Ok(levels)
    }
}
