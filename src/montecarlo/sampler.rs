use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use thiserror::Error;

/// Multiplier of the per-trial seed stream (golden-ratio increment).
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SamplingError {
    #[error("historical pool is empty")]
    EmptyPool,

    #[error("horizon of {horizon} years exceeds the {pool} distinct historical years available")]
    HorizonTooLong { horizon: usize, pool: usize },

    #[error("horizon must be at least one year")]
    ZeroHorizon,
}

/// Seed of one trial. Depends only on the master seed and the trial index,
/// so a run is reproducible whatever order the workers finish in.
pub fn derive_trial_seed(master_seed: u64, trial: usize) -> u64 {
    master_seed.wrapping_add((trial as u64).wrapping_mul(SEED_STRIDE))
}

/// Draws year sequences of a fixed horizon from a pool of historical years.
#[derive(Debug, Clone)]
pub struct YearSampler {
    pool: Vec<String>,
    horizon: usize,
}

impl YearSampler {
    pub fn new(pool: Vec<String>, horizon: usize) -> Result<Self, SamplingError> {
        if pool.is_empty() {
            return Err(SamplingError::EmptyPool);
        }
        if horizon == 0 {
            return Err(SamplingError::ZeroHorizon);
        }
        if horizon > pool.len() {
            return Err(SamplingError::HorizonTooLong {
                horizon,
                pool: pool.len(),
            });
        }
        Ok(Self { pool, horizon })
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn pool(&self) -> &[String] {
        &self.pool
    }

    /// Ordered draw without replacement. The order of the result is the
    /// simulated chronology.
    pub fn draw(&self, rng: &mut StdRng) -> Vec<String> {
        index::sample(rng, self.pool.len(), self.horizon)
            .into_iter()
            .map(|i| self.pool[i].clone())
            .collect()
    }

    /// Draw for one trial from its derived seed.
    pub fn draw_for_trial(&self, master_seed: u64, trial: usize) -> (u64, Vec<String>) {
        let seed = derive_trial_seed(master_seed, trial);
        let mut rng = StdRng::seed_from_u64(seed);
        (seed, self.draw(&mut rng))
    }
}
