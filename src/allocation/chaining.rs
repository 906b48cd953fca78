use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::PoolStocks;
use crate::model::ModelError;

/// How consecutive sampled years are linked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainingMode {
    /// Each year opens with the previous year's March closing stocks.
    #[default]
    Connected,
    /// Every year opens with the configured initial stocks.
    Independent,
}

impl fmt::Display for ChainingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainingMode::Connected => f.write_str("connected"),
            ChainingMode::Independent => f.write_str("independent"),
        }
    }
}

/// Where a year's opening stocks come from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpeningSource {
    /// Fixed at known volumes.
    Fixed(PoolStocks),
    /// Equal to the closing stocks of the given year.
    CarriedFrom(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPhase {
    NotStarted,
    InYear(usize),
    Finished,
}

/// Walks a multi-year horizon and hands out each year's opening stocks.
///
/// `NotStarted -> InYear(0) -> ... -> InYear(n-1) -> Finished`
#[derive(Debug, Clone)]
pub struct YearChain {
    mode: ChainingMode,
    initial: PoolStocks,
    n_years: usize,
    phase: ChainPhase,
}

impl YearChain {
    pub fn new(mode: ChainingMode, initial: PoolStocks, n_years: usize) -> Self {
        Self {
            mode,
            initial,
            n_years,
            phase: ChainPhase::NotStarted,
        }
    }

    pub fn mode(&self) -> ChainingMode {
        self.mode
    }

    pub fn phase(&self) -> ChainPhase {
        self.phase
    }

    /// Opening-stock source of a year, independent of the walk.
    pub fn opening_source(&self, year: usize) -> OpeningSource {
        match (self.mode, year) {
            (_, 0) | (ChainingMode::Independent, _) => OpeningSource::Fixed(self.initial),
            (ChainingMode::Connected, y) => OpeningSource::CarriedFrom(y - 1),
        }
    }

    /// Move to the next year. `previous_closing` is the March closing stock
    /// of the year just finished; it is required when years are connected.
    /// Returns `None` once the horizon is exhausted.
    pub fn advance(
        &mut self,
        previous_closing: Option<&PoolStocks>,
    ) -> Result<Option<(usize, PoolStocks)>, ModelError> {
        let next = match self.phase {
            ChainPhase::NotStarted => 0,
            ChainPhase::InYear(y) => y + 1,
            ChainPhase::Finished => return Ok(None),
        };

        if next >= self.n_years {
            self.phase = ChainPhase::Finished;
            return Ok(None);
        }

        let opening = match self.opening_source(next) {
            OpeningSource::Fixed(stocks) => stocks,
            OpeningSource::CarriedFrom(prev) => {
                *previous_closing.ok_or(ModelError::ChainBroken { year: prev })?
            }
        };
        self.phase = ChainPhase::InYear(next);
        Ok(Some((next, opening)))
    }
}
