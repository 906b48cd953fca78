use std::sync::Arc;

use reservoir_allocation::allocation::{ChainingMode, ReservoirParams};
use reservoir_allocation::domain::PoolStocks;
use reservoir_allocation::hydrology::{HistoricalRecord, HydrologyProvider};
use reservoir_allocation::montecarlo::{MonteCarlo, MonteCarloConfig};
use reservoir_allocation::solver::{DispatchSolver, SolveLimits};

const GAP_YEAR: &str = "1987/1988";

fn record() -> Arc<dyn HydrologyProvider> {
    let json = r#"{
        "years": [
            {"id": "1985/1986", "inflow": [60,110,170,180,160,150,140,110,80,60,50,45],
             "sub_basins": [[20,30,40,45,40,35,30,25,20,18,15,15]]},
            {"id": "1986/1987", "inflow": [40,70,90,95,90,85,80,65,50,40,35,30],
             "sub_basins": [[15,20,25,28,25,22,20,18,15,12,10,10]]},
            {"id": "1987/1988", "inflow": [55,95,null,150,140,135,120,95,70,50,40,38],
             "sub_basins": [[18,25,35,40,35,30,28,22,18,15,12,12]]},
            {"id": "1988/1989", "inflow": [70,130,210,230,200,180,160,120,90,65,55,50],
             "sub_basins": [[22,35,50,55,50,45,40,30,25,20,18,16]]},
            {"id": "1989/1990", "inflow": [50,85,120,130,120,110,100,85,65,50,42,40],
             "sub_basins": [[16,22,30,34,30,28,25,20,16,14,12,11]]}
        ]
    }"#;
    Arc::new(HistoricalRecord::from_json_str(json).unwrap())
}

fn params() -> ReservoirParams {
    let mut params = ReservoirParams::default();
    params.initial_stocks = PoolStocks::new(30.0, 20.0, 8.0);
    params
}

fn config(horizon_years: usize, mode: ChainingMode) -> MonteCarloConfig {
    MonteCarloConfig {
        trials: 24,
        horizon_years,
        master_seed: 1987,
        mode,
        workers: 4,
        timeout_grace_secs: 5,
    }
}

#[tokio::test]
async fn test_missing_month_fails_only_trials_that_draw_it() {
    let runner = MonteCarlo::new(
        params(),
        record(),
        Arc::new(DispatchSolver::new()),
        SolveLimits::default(),
        config(2, ChainingMode::Connected),
    )
    .unwrap();
    let report = runner.run().await.unwrap();

    assert_eq!(report.successful + report.failed, 24);
    for failure in &report.failures {
        assert!(failure.years.iter().any(|y| y == GAP_YEAR), "{:?}", failure);
        assert!(failure.reason.contains("no value"), "{}", failure.reason);
        assert!(failure.status.is_none());
    }
    for result in &report.results {
        assert!(result.years.iter().all(|y| y != GAP_YEAR));
        assert_eq!(result.years.len(), 2);
        assert_ne!(result.years[0], result.years[1]);
    }

    assert!(report.successful > 0);
    assert!(report.failed > 0);
    let metrics = report.metrics.as_ref().unwrap();
    assert_eq!(metrics.total_deficit.count, report.successful);
    assert!(metrics.total_spill.min >= 0.0);
}

#[tokio::test]
async fn test_batch_survives_when_every_trial_fails() {
    let runner = MonteCarlo::new(
        params(),
        record(),
        Arc::new(DispatchSolver::new()),
        SolveLimits::default(),
        config(5, ChainingMode::Independent),
    )
    .unwrap();
    let report = runner.run().await.unwrap();

    assert_eq!(report.successful, 0);
    assert_eq!(report.failed, 24);
    assert!(report.metrics.is_none());
    assert!(report.best.is_none() && report.worst.is_none());
    assert_eq!(report.success_rate(), 0.0);
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let runner = MonteCarlo::new(
        params(),
        record(),
        Arc::new(DispatchSolver::new()),
        SolveLimits::default(),
        config(3, ChainingMode::Connected),
    )
    .unwrap();
    let report = runner.run().await.unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["mode"], "connected");
    assert_eq!(json["trials_requested"], 24);
    assert!(json["run_id"].is_string());
    assert!(json["results"].is_array());
}
