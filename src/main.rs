use anyhow::{Context, Result};
use reservoir_allocation::{config, montecarlo, solver, telemetry};
use config::Config;
use montecarlo::MonteCarlo;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e).context("failed to read .env");
        }
    }
    init_tracing();

    let cfg = Config::load()?;
    let params = cfg.reservoir_params();
    let hydrology = cfg.hydrology.provider()?;
    let backend = solver::create_solver(cfg.solver.kind)
        .with_context(|| format!("cannot use solver {:?}", cfg.solver.kind))?;

    if cfg.monte_carlo.workers > 1 && cfg.solver.kind == solver::SolverKind::Milp {
        warn!(
            workers = cfg.monte_carlo.workers,
            "parallel MILP trials share CPU cores; per-trial time limits may be hit more often"
        );
    }

    let runner = MonteCarlo::new(
        params,
        hydrology,
        backend,
        cfg.solver.limits(),
        cfg.monte_carlo.clone(),
    )?;
    let report = runner.run().await?;

    if let Some(metrics) = &report.metrics {
        info!(
            run_id = %report.run_id,
            mean_deficit = metrics.total_deficit.mean,
            p95_deficit = metrics.total_deficit.percentiles.p95,
            mean_spill = metrics.total_spill.mean,
            "deficit distribution"
        );
    } else {
        warn!(run_id = %report.run_id, "no trial produced a solution");
    }

    let stdout = std::io::stdout();
    serde_json::to_writer_pretty(stdout.lock(), &report).context("failed to write report")?;
    println!();
    Ok(())
}
