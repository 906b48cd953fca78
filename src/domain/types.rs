use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{EnumIter, IntoEnumIterator};

/// Seconds in one day, used to turn monthly mean flow rates into volumes.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Cubic metres per cubic hectometre (Hm³).
pub const M3_PER_HM3: f64 = 1_000_000.0;

// ============================================================================
// Calendar
// ============================================================================

/// Month of the hydrological year. April opens the year, March closes it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumIter,
)]
pub enum Month {
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
    January,
    February,
    March,
}

impl Month {
    /// Position within the hydrological year, 1 (April) ..= 12 (March).
    pub fn index(self) -> usize {
        self as usize + 1
    }

    /// Zero-based position, convenient for indexing 12-element tables.
    pub fn offset(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Month::iter().nth(index.checked_sub(1)?)
    }

    /// Civil month number (January = 1).
    pub fn calendar(self) -> u32 {
        match self {
            Month::January => 1,
            Month::February => 2,
            Month::March => 3,
            Month::April => 4,
            Month::May => 5,
            Month::June => 6,
            Month::July => 7,
            Month::August => 8,
            Month::September => 9,
            Month::October => 10,
            Month::November => 11,
            Month::December => 12,
        }
    }

    /// Day count used for flow-to-volume conversion (no leap years).
    pub fn days(self) -> u32 {
        match self {
            Month::April | Month::June | Month::September | Month::November => 30,
            Month::February => 28,
            _ => 31,
        }
    }

    pub fn seconds(self) -> f64 {
        self.days() as f64 * SECONDS_PER_DAY
    }

    /// Convert a monthly mean flow rate (m³/s) to a monthly volume (Hm³).
    pub fn flow_to_volume_hm3(self, rate_m3s: f64) -> f64 {
        rate_m3s * self.seconds() / M3_PER_HM3
    }

    pub fn is_first(self) -> bool {
        self == Month::April
    }

    pub fn is_last(self) -> bool {
        self == Month::March
    }

    pub fn all() -> impl Iterator<Item = Month> {
        Month::iter()
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Month::April => "apr",
            Month::May => "may",
            Month::June => "jun",
            Month::July => "jul",
            Month::August => "aug",
            Month::September => "sep",
            Month::October => "oct",
            Month::November => "nov",
            Month::December => "dec",
            Month::January => "jan",
            Month::February => "feb",
            Month::March => "mar",
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// A month within a scenario: which sampled year (0-based position in the
/// sequence) and which hydrological month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeStep {
    pub year: usize,
    pub month: Month,
}

impl TimeStep {
    pub fn new(year: usize, month: Month) -> Self {
        Self { year, month }
    }

    /// Flat position over the whole horizon (12 steps per year).
    pub fn flat_index(&self) -> usize {
        self.year * 12 + self.month.offset()
    }

    pub fn from_flat_index(k: usize) -> Self {
        // k % 12 is always in 0..12, so the lookup cannot fail
        let month = Month::iter().nth(k % 12).unwrap_or(Month::April);
        Self { year: k / 12, month }
    }

    /// Iterate every step of an `n_years` horizon in chronological order.
    pub fn horizon(n_years: usize) -> impl Iterator<Item = TimeStep> {
        (0..n_years * 12).map(TimeStep::from_flat_index)
    }
}

impl fmt::Display for TimeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "y{}:{}", self.year, self.month)
    }
}

// ============================================================================
// Storage compartments
// ============================================================================

/// Storage compartment of the reservoir.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
pub enum Pool {
    /// Fixed-priority reserve, filled before any share class.
    Reserve,
    ClassA,
    ClassB,
}

impl Pool {
    pub fn all() -> impl Iterator<Item = Pool> {
        Pool::iter()
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pool::Reserve => f.write_str("reserve"),
            Pool::ClassA => f.write_str("class_a"),
            Pool::ClassB => f.write_str("class_b"),
        }
    }
}

/// Tradable water-right class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
pub enum ShareClass {
    A,
    B,
}

impl ShareClass {
    pub fn pool(self) -> Pool {
        match self {
            ShareClass::A => Pool::ClassA,
            ShareClass::B => Pool::ClassB,
        }
    }

    pub fn other(self) -> Self {
        match self {
            ShareClass::A => ShareClass::B,
            ShareClass::B => ShareClass::A,
        }
    }

    pub fn all() -> impl Iterator<Item = ShareClass> {
        ShareClass::iter()
    }
}

impl fmt::Display for ShareClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareClass::A => f.write_str("A"),
            ShareClass::B => f.write_str("B"),
        }
    }
}

/// Volumes held in each compartment at one instant (Hm³).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStocks {
    pub reserve: f64,
    pub class_a: f64,
    pub class_b: f64,
}

impl PoolStocks {
    pub fn new(reserve: f64, class_a: f64, class_b: f64) -> Self {
        Self {
            reserve,
            class_a,
            class_b,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn get(&self, pool: Pool) -> f64 {
        match pool {
            Pool::Reserve => self.reserve,
            Pool::ClassA => self.class_a,
            Pool::ClassB => self.class_b,
        }
    }

    pub fn set(&mut self, pool: Pool, value: f64) {
        match pool {
            Pool::Reserve => self.reserve = value,
            Pool::ClassA => self.class_a = value,
            Pool::ClassB => self.class_b = value,
        }
    }

    pub fn class(&self, class: ShareClass) -> f64 {
        self.get(class.pool())
    }

    pub fn total(&self) -> f64 {
        self.reserve + self.class_a + self.class_b
    }
}

/// Whether a class pool had water at the start of a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolState {
    Empty,
    NonEmpty,
}

impl PoolState {
    pub fn classify(stock: f64, epsilon: f64) -> Self {
        if stock <= epsilon {
            PoolState::Empty
        } else {
            PoolState::NonEmpty
        }
    }

    pub fn is_empty(self) -> bool {
        matches!(self, PoolState::Empty)
    }
}
