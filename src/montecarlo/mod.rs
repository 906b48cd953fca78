//! # Monte Carlo Orchestrator
//!
//! Samples year sequences without replacement, solves one constraint model
//! per trial and reduces the successful trials to distribution summaries.
//!
//! Trials are independent: each owns its scenario, model and solution, and
//! draws from a random stream derived from the master seed and its index.
//! They run on blocking worker threads with a bounded per-trial budget; a
//! trial that fails or times out is recorded and excluded from statistics
//! without stopping the batch.

pub mod orchestrator;
pub mod sampler;
pub mod stats;

pub use orchestrator::{FailedTrial, MonteCarlo, TrialOutcome};
pub use sampler::{derive_trial_seed, SamplingError, YearSampler};
pub use stats::{Percentiles, StatsError, Summary};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::allocation::ChainingMode;
use crate::domain::ScenarioResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MonteCarloConfig {
    #[validate(range(min = 1))]
    pub trials: usize,
    /// Years per trial; cannot exceed the number of historical years.
    #[validate(range(min = 1))]
    pub horizon_years: usize,
    pub master_seed: u64,
    pub mode: ChainingMode,
    /// Concurrent trials. One runs the batch sequentially.
    #[validate(range(min = 1, max = 256))]
    pub workers: usize,
    /// Extra wall-clock time granted on top of the solver time limit before
    /// a trial is abandoned.
    pub timeout_grace_secs: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            trials: 100,
            horizon_years: 10,
            master_seed: 42,
            mode: ChainingMode::Connected,
            workers: 1,
            timeout_grace_secs: 5,
        }
    }
}

/// Summaries of the headline metrics over successful trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummaries {
    pub total_deficit: Summary,
    pub total_turbined: Summary,
    pub energy_equivalent: Summary,
    pub total_spill: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub solver: String,
    pub mode: ChainingMode,
    pub master_seed: u64,
    pub horizon_years: usize,
    pub trials_requested: usize,
    pub successful: usize,
    pub failed: usize,
    /// Successful trials whose solve did not prove optimality.
    pub suboptimal: usize,
    /// `None` when no trial succeeded.
    pub metrics: Option<MetricSummaries>,
    /// Lowest total deficit.
    pub best: Option<ScenarioResult>,
    /// Highest total deficit.
    pub worst: Option<ScenarioResult>,
    /// Successful trials in trial order.
    pub results: Vec<ScenarioResult>,
    pub failures: Vec<FailedTrial>,
}

impl MonteCarloReport {
    pub fn success_rate(&self) -> f64 {
        if self.trials_requested == 0 {
            0.0
        } else {
            self.successful as f64 / self.trials_requested as f64
        }
    }
}
