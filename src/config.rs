use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::allocation::{
    DemandTable, EnergyConfig, HumanConsumption, LossConfig, ObjectiveWeights, OwnDeliveryPolicy,
    ReservoirParams, RightsTable, ShareSplit,
};
use crate::domain::PoolStocks;
use crate::hydrology::{HistoricalRecord, HydrologyProvider, SyntheticConfig, SyntheticHydrology};
use crate::montecarlo::MonteCarloConfig;
use crate::solver::{SolveLimits, SolverKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub reservoir: ReservoirConfig,
    pub rights: RightsTable,
    pub demand: DemandTable,
    pub human_consumption: HumanConsumption,
    pub losses: LossConfig,
    pub energy: EnergyConfig,
    pub objective: ObjectiveWeights,
    pub monte_carlo: MonteCarloConfig,
    pub solver: SolverConfig,
    pub hydrology: HydrologyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservoirConfig {
    pub capacities: PoolStocks,
    pub initial_stocks: PoolStocks,
    pub split: ShareSplit,
    pub support_floor: f64,
    pub own_policy: OwnDeliveryPolicy,
    pub empty_epsilon_hm3: f64,
}

impl Default for ReservoirConfig {
    fn default() -> Self {
        let p = ReservoirParams::default();
        Self {
            capacities: p.capacities,
            initial_stocks: p.initial_stocks,
            split: p.split,
            support_floor: p.support_floor,
            own_policy: p.own_policy,
            empty_epsilon_hm3: p.empty_epsilon_hm3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub kind: SolverKind,
    pub time_limit_secs: u64,
    pub mip_gap: f64,
    pub feasibility_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        let limits = SolveLimits::default();
        Self {
            kind: SolverKind::default(),
            time_limit_secs: limits.time_limit.as_secs(),
            mip_gap: limits.mip_gap,
            feasibility_tolerance: limits.feasibility_tolerance,
        }
    }
}

impl SolverConfig {
    pub fn limits(&self) -> SolveLimits {
        SolveLimits {
            time_limit: Duration::from_secs(self.time_limit_secs.max(1)),
            mip_gap: self.mip_gap,
            feasibility_tolerance: self.feasibility_tolerance,
        }
    }
}

/// Where historical flows come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum HydrologyConfig {
    /// JSON record file.
    Record {
        path: PathBuf,
        #[serde(default)]
        fill_missing_with_zero: bool,
    },
    Synthetic(SyntheticConfig),
}

impl Default for HydrologyConfig {
    fn default() -> Self {
        HydrologyConfig::Synthetic(SyntheticConfig {
            random_seed: Some(1),
            ..SyntheticConfig::default()
        })
    }
}

impl HydrologyConfig {
    pub fn provider(&self) -> Result<Arc<dyn HydrologyProvider>> {
        let record = match self {
            HydrologyConfig::Record {
                path,
                fill_missing_with_zero,
            } => {
                let record = HistoricalRecord::from_path(path)
                    .with_context(|| format!("loading hydrology record {}", path.display()))?;
                if *fill_missing_with_zero {
                    warn!(path = %path.display(), "missing months will be treated as zero flow");
                }
                let fill = record.fill_missing_with_zero || *fill_missing_with_zero;
                record.with_zero_fill(fill)
            }
            HydrologyConfig::Synthetic(cfg) => {
                warn!(
                    n_years = cfg.n_years,
                    "no historical record configured, using synthetic hydrology"
                );
                SyntheticHydrology::generate(cfg).context("generating synthetic hydrology")?
            }
        };
        info!(years = record.len(), "hydrology loaded");
        Ok(Arc::new(record))
    }
}

impl Config {
    /// `config/default.toml` overlaid with `RESERVOIR__`-prefixed
    /// environment variables (`RESERVOIR__MONTE_CARLO__TRIALS=500`).
    pub fn load() -> Result<Self> {
        Self::figment()
            .extract()
            .context("failed to load configuration")
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("RESERVOIR__").split("__"))
    }

    /// Model parameters assembled from the configuration sections.
    pub fn reservoir_params(&self) -> ReservoirParams {
        ReservoirParams {
            capacities: self.reservoir.capacities,
            initial_stocks: self.reservoir.initial_stocks,
            split: self.reservoir.split,
            rights: self.rights.clone(),
            demand: self.demand.clone(),
            support_floor: self.reservoir.support_floor,
            human: self.human_consumption.clone(),
            losses: self.losses.clone(),
            own_policy: self.reservoir.own_policy,
            empty_epsilon_hm3: self.reservoir.empty_epsilon_hm3,
            energy: self.energy,
            objective: self.objective,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{ChainingMode, HumanDrawSchedule};
    use figment::Jail;

    #[test]
    fn test_defaults_match_model_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.reservoir_params(), ReservoirParams::default());
        assert_eq!(cfg.solver.limits(), SolveLimits::default());
    }

    #[test]
    fn test_toml_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file(
                "config/default.toml",
                r#"
                [reservoir]
                support_floor = 0.4

                [human_consumption]
                annual_hm3 = 5.0
                schedule = "monthly_fractions"

                [monte_carlo]
                trials = 20
                mode = "independent"

                [hydrology]
                source = "record"
                path = "data/flows.json"
                "#,
            )?;
            jail.set_env("RESERVOIR__MONTE_CARLO__TRIALS", "250");
            jail.set_env("RESERVOIR__SOLVER__KIND", "milp");

            let cfg = Config::load().map_err(|e| e.to_string())?;
            assert_eq!(cfg.monte_carlo.trials, 250);
            assert_eq!(cfg.monte_carlo.mode, ChainingMode::Independent);
            assert_eq!(cfg.solver.kind, SolverKind::Milp);

            let params = cfg.reservoir_params();
            assert_eq!(params.support_floor, 0.4);
            assert_eq!(params.human.annual_hm3, 5.0);
            assert_eq!(params.human.schedule, HumanDrawSchedule::MonthlyFractions);
            assert_eq!(params.capacities, PoolStocks::new(175.0, 260.0, 105.0));
            assert!(matches!(cfg.hydrology, HydrologyConfig::Record { .. }));
            Ok(())
        });
    }
}
