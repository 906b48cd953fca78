use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::sampler::YearSampler;
use super::stats::Summary;
use super::{MetricSummaries, MonteCarloConfig, MonteCarloReport};
use crate::allocation::ReservoirParams;
use crate::domain::{ScenarioResult, SolveDiagnostics};
use crate::hydrology::HydrologyProvider;
use crate::model::{summarize, ModelBuilder, Scenario};
use crate::solver::{SolveLimits, SolveStatus, SolvingService};

/// A trial excluded from the statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTrial {
    pub trial: usize,
    pub seed: u64,
    pub years: Vec<String>,
    /// Solver status when the solve returned one.
    pub status: Option<SolveStatus>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    Solved(ScenarioResult),
    Failed(FailedTrial),
}

impl TrialOutcome {
    pub fn trial(&self) -> usize {
        match self {
            TrialOutcome::Solved(r) => r.trial,
            TrialOutcome::Failed(f) => f.trial,
        }
    }
}

/// Read-only state shared by every trial of a batch.
struct TrialContext {
    params: ReservoirParams,
    hydrology: Arc<dyn HydrologyProvider>,
    solver: Arc<dyn SolvingService>,
    limits: SolveLimits,
    config: MonteCarloConfig,
    sampler: YearSampler,
}

impl TrialContext {
    /// Sample, build, solve and reduce one trial. Runs on a blocking thread.
    /// The solver gets whatever is left of the time limit at `deadline`.
    fn run_trial(&self, trial: usize, deadline: Instant) -> TrialOutcome {
        let (seed, years) = self.sampler.draw_for_trial(self.config.master_seed, trial);
        let failed = |status: Option<SolveStatus>, reason: String| {
            TrialOutcome::Failed(FailedTrial {
                trial,
                seed,
                years: years.clone(),
                status,
                reason,
            })
        };

        let sequence = match self.hydrology.sequence(&years) {
            Ok(sequence) => sequence,
            Err(e) => return failed(None, e.to_string()),
        };
        let scenario = Scenario::new(trial, seed, sequence);
        let model = match ModelBuilder::new(&self.params)
            .mode(self.config.mode)
            .build(&scenario)
        {
            Ok(model) => model,
            Err(e) => return failed(None, e.to_string()),
        };

        let limits = SolveLimits {
            time_limit: deadline.saturating_duration_since(Instant::now()),
            ..self.limits
        };
        let solution = match self.solver.solve(&model, &limits) {
            Ok(solution) => solution,
            Err(e) => return failed(None, e.to_string()),
        };
        if !solution.has_values() {
            return failed(
                Some(solution.status),
                format!("solver returned {} without a solution", solution.status),
            );
        }

        let violations = model.check(&solution.values, self.limits.feasibility_tolerance);
        if let Some(worst) = violations
            .iter()
            .max_by_key(|v| OrderedFloat(v.amount))
        {
            return failed(
                Some(solution.status),
                format!(
                    "solution violates {} constraint(s), worst '{}' by {:.3e}",
                    violations.len(),
                    worst.name,
                    worst.amount
                ),
            );
        }

        let records = model.extract_records(&solution);
        let diagnostics = SolveDiagnostics {
            solver: self.solver.name().to_string(),
            status: solution.status,
            objective: solution.objective,
            gap: solution.gap,
            runtime_ms: u64::try_from(solution.runtime.as_millis()).unwrap_or(u64::MAX),
        };
        let result = summarize(&model, &records, diagnostics);
        debug!(
            trial,
            seed,
            status = %solution.status,
            total_deficit = result.total_deficit,
            runtime_ms = result.diagnostics.runtime_ms,
            "trial solved"
        );
        TrialOutcome::Solved(result)
    }
}

/// Batch runner for one configuration.
pub struct MonteCarlo {
    ctx: Arc<TrialContext>,
}

impl MonteCarlo {
    /// Validate the configuration against the parameters and the hydrology
    /// pool. Configuration errors stop the batch before any trial runs.
    pub fn new(
        params: ReservoirParams,
        hydrology: Arc<dyn HydrologyProvider>,
        solver: Arc<dyn SolvingService>,
        limits: SolveLimits,
        config: MonteCarloConfig,
    ) -> Result<Self> {
        config
            .validate()
            .context("invalid Monte Carlo configuration")?;
        params
            .ensure_valid()
            .context("invalid reservoir parameters")?;
        let sampler = YearSampler::new(hydrology.year_ids(), config.horizon_years)
            .context("cannot sample historical years")?;

        Ok(Self {
            ctx: Arc::new(TrialContext {
                params,
                hydrology,
                solver,
                limits,
                config,
                sampler,
            }),
        })
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.ctx.config
    }

    /// Run one trial on the calling thread.
    pub fn run_trial(&self, trial: usize) -> TrialOutcome {
        self.ctx.run_trial(trial, Instant::now() + self.ctx.limits.time_limit)
    }

    /// Wall-clock budget of one trial.
    fn trial_budget(&self) -> Duration {
        self.ctx.limits.time_limit + Duration::from_secs(self.ctx.config.timeout_grace_secs)
    }

    /// Run one trial on the blocking pool. The solver's own limit ends at
    /// `time_limit`; `budget` adds the grace period on top. A blocking
    /// thread cannot be cancelled, so when the budget expires the trial is
    /// recorded as failed while its thread keeps running until the solver
    /// returns, and its result is dropped.
    async fn spawn_trial(ctx: Arc<TrialContext>, trial: usize, budget: Duration) -> TrialOutcome {
        let worker = Arc::clone(&ctx);
        let deadline = Instant::now() + ctx.limits.time_limit;
        let handle = tokio::task::spawn_blocking(move || worker.run_trial(trial, deadline));

        let (status, reason) = match tokio::time::timeout(budget, handle).await {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(e)) => (None, format!("trial worker failed: {e}")),
            Err(_) => {
                warn!(trial, ?budget, "trial exceeded its time budget");
                (
                    Some(SolveStatus::TimeLimit),
                    format!("no result within {:.1}s", budget.as_secs_f64()),
                )
            }
        };
        let (seed, years) = ctx.sampler.draw_for_trial(ctx.config.master_seed, trial);
        TrialOutcome::Failed(FailedTrial {
            trial,
            seed,
            years,
            status,
            reason,
        })
    }

    /// Run every trial and reduce the outcomes to a report.
    pub async fn run(&self) -> Result<MonteCarloReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let config = &self.ctx.config;
        let budget = self.trial_budget();

        info!(
            %run_id,
            trials = config.trials,
            horizon_years = config.horizon_years,
            mode = %config.mode,
            workers = config.workers,
            solver = self.ctx.solver.name(),
            "starting Monte Carlo batch"
        );

        let mut outcomes: Vec<TrialOutcome> = stream::iter(0..config.trials)
            .map(|trial| Self::spawn_trial(Arc::clone(&self.ctx), trial, budget))
            .buffer_unordered(config.workers)
            .collect()
            .await;
        outcomes.sort_by_key(TrialOutcome::trial);

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                TrialOutcome::Solved(r) => results.push(r),
                TrialOutcome::Failed(f) => {
                    warn!(trial = f.trial, seed = f.seed, reason = %f.reason, "trial failed");
                    failures.push(f);
                }
            }
        }

        let report = reduce(
            run_id,
            started_at,
            self.ctx.solver.name(),
            config,
            results,
            failures,
        )?;
        info!(
            %run_id,
            successful = report.successful,
            failed = report.failed,
            suboptimal = report.suboptimal,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Monte Carlo batch finished"
        );
        Ok(report)
    }
}

fn reduce(
    run_id: Uuid,
    started_at: chrono::DateTime<Utc>,
    solver: &str,
    config: &MonteCarloConfig,
    results: Vec<ScenarioResult>,
    failures: Vec<FailedTrial>,
) -> Result<MonteCarloReport> {
    let metrics = if results.is_empty() {
        None
    } else {
        let metric = |f: fn(&ScenarioResult) -> f64, name: &str| {
            let values: Vec<f64> = results.iter().map(f).collect();
            Summary::from_values(&values).with_context(|| format!("summarizing {name}"))
        };
        Some(MetricSummaries {
            total_deficit: metric(|r| r.total_deficit, "total deficit")?,
            total_turbined: metric(|r| r.total_turbined, "turbined volume")?,
            energy_equivalent: metric(|r| r.energy_equivalent, "energy")?,
            total_spill: metric(|r| r.total_spill, "spill")?,
        })
    };

    let best = results
        .iter()
        .min_by_key(|r| OrderedFloat(r.total_deficit))
        .cloned();
    let worst = results
        .iter()
        .max_by_key(|r| OrderedFloat(r.total_deficit))
        .cloned();

    Ok(MonteCarloReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        solver: solver.to_string(),
        mode: config.mode,
        master_seed: config.master_seed,
        horizon_years: config.horizon_years,
        trials_requested: config.trials,
        successful: results.len(),
        failed: failures.len(),
        suboptimal: results.iter().filter(|r| r.is_suboptimal()).count(),
        metrics,
        best,
        worst,
        results,
        failures,
    })
}
