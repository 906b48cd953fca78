#![cfg(test)]
//! Load Testing Suite for the Monte Carlo orchestrator
//!
//! Large batches over a synthetic 60-year record:
//! - throughput with several concurrent workers
//! - reproducibility of a parallel batch against a sequential one
//! - bounded per-trial runtime of the dispatch backend

use std::sync::Arc;
use std::time::{Duration, Instant};

use reservoir_allocation::allocation::{ChainingMode, ReservoirParams};
use reservoir_allocation::domain::PoolStocks;
use reservoir_allocation::hydrology::{HydrologyProvider, SyntheticConfig, SyntheticHydrology};
use reservoir_allocation::montecarlo::{MonteCarlo, MonteCarloConfig};
use reservoir_allocation::solver::{DispatchSolver, SolveLimits};

fn hydrology() -> Arc<dyn HydrologyProvider> {
    let config = SyntheticConfig {
        n_years: 60,
        random_seed: Some(60),
        ..SyntheticConfig::default()
    };
    Arc::new(SyntheticHydrology::generate(&config).unwrap())
}

fn runner(trials: usize, workers: usize, mode: ChainingMode) -> MonteCarlo {
    let mut params = ReservoirParams::default();
    params.initial_stocks = PoolStocks::new(50.0, 40.0, 15.0);
    MonteCarlo::new(
        params,
        hydrology(),
        Arc::new(DispatchSolver::new()),
        SolveLimits::default(),
        MonteCarloConfig {
            trials,
            horizon_years: 30,
            master_seed: 7,
            mode,
            workers,
            timeout_grace_secs: 5,
        },
    )
    .unwrap()
}

/// Test: Throughput of a large parallel batch
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Ignore by default as this is a slow test
async fn test_large_batch_throughput() {
    let start = Instant::now();
    let report = runner(1_000, 8, ChainingMode::Connected).run().await.unwrap();
    let elapsed = start.elapsed();

    println!(
        "1000 trials x 30 years: {:?} ({} ok, {} failed)",
        elapsed, report.successful, report.failed
    );

    assert_eq!(report.successful + report.failed, 1_000);
    assert!(elapsed < Duration::from_secs(120), "batch took {:?}", elapsed);
}

/// Test: Parallel and sequential batches agree trial by trial
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Ignore by default as this is a slow test
async fn test_parallel_batch_is_reproducible() {
    let sequential = runner(200, 1, ChainingMode::Independent).run().await.unwrap();
    let parallel = runner(200, 16, ChainingMode::Independent).run().await.unwrap();

    assert_eq!(sequential.results.len(), parallel.results.len());
    for (a, b) in sequential.results.iter().zip(&parallel.results) {
        assert_eq!(a.trial, b.trial);
        assert_eq!(a.years, b.years);
        assert_eq!(a.total_deficit, b.total_deficit);
        assert_eq!(a.final_stocks, b.final_stocks);
    }
}

/// Test: Per-trial runtime stays small for the dispatch backend
#[tokio::test]
#[ignore] // Ignore by default as this is a slow test
async fn test_dispatch_trial_runtime() {
    let report = runner(100, 1, ChainingMode::Connected).run().await.unwrap();
    let max_ms = report
        .results
        .iter()
        .map(|r| r.diagnostics.runtime_ms)
        .max()
        .unwrap_or(0);

    println!("Slowest dispatch trial: {} ms", max_ms);
    assert!(max_ms < 2_000, "dispatch trial took {} ms", max_ms);
}
