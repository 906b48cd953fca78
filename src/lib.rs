//! Segmented reservoir allocation.
//!
//! Monthly river inflow is split among a fixed-priority reserve pool and two
//! tradable water-right classes. Each sampled sequence of hydrological years
//! becomes a [`model::ConstraintModel`] that a [`solver::SolvingService`]
//! resolves; the [`montecarlo`] orchestrator repeats this over random year
//! sequences and summarizes the outcome distribution.

pub mod allocation;
pub mod config;
pub mod domain;
pub mod hydrology;
pub mod model;
pub mod montecarlo;
pub mod solver;
pub mod telemetry;
