//! # Segmented Reservoir Allocation
//!
//! Monthly rules of the reservoir: the effective downstream right, priority
//! filling of the reserve and share-class pools, own delivery with reserve
//! support up to a floor, deficit accounting and the chaining of stocks
//! from one hydrological year to the next.
//!
//! These rules are evaluated two ways. The constraint model in
//! [`crate::model`] states them as constraints for a solver; [`step_month`]
//! applies them directly to known stocks, which is what the rule-based
//! dispatch backend does.

pub mod chaining;
pub mod delivery;
pub mod fill;
pub mod params;
pub mod rights;
pub mod step;

pub use chaining::{ChainPhase, ChainingMode, OpeningSource, YearChain};
pub use fill::{allocate_fill, headroom, FillOutcome};
pub use params::{
    DeliveryFactor, DemandTable, EnergyConfig, HumanConsumption, HumanDrawSchedule, LossConfig,
    ObjectiveWeights, OwnDeliveryPolicy, ReservoirParams, ShareSplit,
};
pub use rights::RightsTable;
pub use step::{step_month, HumanDraw, MonthInputs, MonthOutcome};
