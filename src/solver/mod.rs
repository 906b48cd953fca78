//! # Solving Service
//!
//! Contract between the constraint model and whatever finds values for it.
//! Two backends are provided:
//! - `dispatch`: rule-based forward simulation, always available
//! - `milp`: mixed-integer linear program solved through `good_lp`
//!   (requires the `optimization` feature)

pub mod dispatch;
pub mod milp;

pub use dispatch::DispatchSolver;
pub use milp::MilpSolver;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::model::ConstraintModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    /// A feasible solution without a proof of optimality.
    Suboptimal,
    Infeasible,
    /// The time limit was hit; values are the best found so far.
    TimeLimit,
}

impl SolveStatus {
    /// Whether the solution carries usable values.
    pub fn has_solution(self) -> bool {
        matches!(
            self,
            SolveStatus::Optimal | SolveStatus::Suboptimal | SolveStatus::TimeLimit
        )
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => f.write_str("optimal"),
            SolveStatus::Suboptimal => f.write_str("suboptimal"),
            SolveStatus::Infeasible => f.write_str("infeasible"),
            SolveStatus::TimeLimit => f.write_str("time_limit"),
        }
    }
}

/// Outcome of one solve. `values` is indexed by [`crate::model::VarId`] and
/// is empty when the status carries no solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub status: SolveStatus,
    pub objective: f64,
    pub gap: Option<f64>,
    pub runtime: Duration,
    pub values: Vec<f64>,
}

impl Solution {
    pub fn infeasible(runtime: Duration) -> Self {
        Self::without_values(SolveStatus::Infeasible, runtime)
    }

    /// A solve that ended without an assignment, e.g. stopped by the time
    /// limit before any incumbent was found.
    pub fn without_values(status: SolveStatus, runtime: Duration) -> Self {
        Self {
            status,
            objective: f64::NAN,
            gap: None,
            runtime,
            values: Vec::new(),
        }
    }

    /// Whether there is an assignment to read back.
    pub fn has_values(&self) -> bool {
        self.status.has_solution() && !self.values.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("solver backend '{0}' is not available in this build")]
    BackendUnavailable(String),

    #[error("solver backend failed: {0}")]
    Backend(String),

    #[error("model is malformed: {0}")]
    MalformedModel(String),
}

/// Limits passed to every solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveLimits {
    pub time_limit: Duration,
    /// Relative gap at which a MILP search may stop.
    pub mip_gap: f64,
    /// Tolerance used when checking returned values against the model.
    pub feasibility_tolerance: f64,
}

impl Default for SolveLimits {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(60),
            mip_gap: 1e-4,
            feasibility_tolerance: 1e-6,
        }
    }
}

/// A backend able to solve a [`ConstraintModel`].
///
/// Implementations are shared across Monte Carlo workers and called from
/// blocking threads.
pub trait SolvingService: Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, model: &ConstraintModel, limits: &SolveLimits) -> Result<Solution, SolveError>;
}

/// Backend selection as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    #[default]
    Dispatch,
    Milp,
}

/// Instantiate the configured backend.
pub fn create_solver(kind: SolverKind) -> Result<Arc<dyn SolvingService>, SolveError> {
    match kind {
        SolverKind::Dispatch => Ok(Arc::new(DispatchSolver::new())),
        SolverKind::Milp => {
            if cfg!(feature = "optimization") {
                Ok(Arc::new(MilpSolver::new()))
            } else {
                Err(SolveError::BackendUnavailable("milp".to_string()))
            }
        }
    }
}
