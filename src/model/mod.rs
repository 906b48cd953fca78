//! # Constraint Model
//!
//! Solver-neutral description of one scenario's allocation problem. The
//! [`ModelBuilder`] turns parameters and a sampled year sequence into a
//! [`ConstraintModel`]; any [`crate::solver::SolvingService`] can solve it,
//! and [`extract_records`] reads the solution back as monthly records.

pub mod builder;
pub mod constraints;
pub mod expr;
pub mod extract;
pub mod problem;
pub mod scenario;

pub use builder::ModelBuilder;
pub use constraints::{Constraint, LinearConstraint, PiecewiseLinear, Sense, Violation};
pub use expr::{LinExpr, VarId, VarKind, Variable};
pub use extract::{extract_records, summarize};
pub use problem::ConstraintModel;
pub use scenario::{
    ClassVars, FactorTerm, ModelLayout, MonthFrame, PoolVars, Scenario, ScenarioFrame, StepVars,
    YearVars,
};

use thiserror::Error;

use crate::domain::TimeStep;
use crate::hydrology::HydrologyError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("invalid reservoir parameter: {0}")]
    InvalidParameter(String),

    #[error("scenario has no years")]
    EmptyScenario,

    #[error("closing stocks of year {year} are not available to open the next year")]
    ChainBroken { year: usize },

    #[error("{step}: reserve holds {available:.3} Hm³ but human consumption needs {required:.3} Hm³")]
    HumanDrawShortfall {
        step: TimeStep,
        required: f64,
        available: f64,
    },

    #[error(transparent)]
    Hydrology(#[from] HydrologyError),
}
