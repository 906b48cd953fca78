//! Delivery and deficit accounting for the two share classes.
//!
//! Each class first draws from its own pool. When that does not reach
//! `floor × demand` the reserve pool may top it up, but never beyond the
//! floor. A class whose pool opened the month empty is served first, up to
//! its share of the reserve. Whatever is left undelivered is the class's
//! deficit.

use serde::{Deserialize, Serialize};

use crate::domain::PoolState;

/// Minimum own delivery: the class must serve up to the floor from its own
/// pool whenever it holds the water.
pub fn own_floor(available: f64, demand: f64, floor: f64) -> f64 {
    available.max(0.0).min(floor * demand.max(0.0))
}

/// Largest own delivery a class can make in a month.
pub fn own_maximal(available: f64, demand: f64) -> f64 {
    available.max(0.0).min(demand.max(0.0))
}

/// Shortfall against the floor that reserve support may cover.
pub fn support_need(demand: f64, own: f64, floor: f64) -> f64 {
    (floor * demand - own).max(0.0)
}

pub fn deficit(demand: f64, own: f64, support: f64) -> f64 {
    (demand - own - support).max(0.0)
}

/// Reserve support handed to each class in a month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportSplit {
    pub total: f64,
    pub class_a: f64,
    pub class_b: f64,
}

/// Support an empty class is entitled to: its need, capped at its share
/// of the reserve left after human consumption.
pub fn empty_pool_guarantee(need: f64, share: f64, reserve_available: f64) -> f64 {
    need.max(0.0).min(share * reserve_available.max(0.0))
}

/// A class's claim on reserve support in one month.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SupportClaim {
    pub need: f64,
    /// Part of the need served before the remainder is shared.
    pub guaranteed: f64,
}

impl SupportClaim {
    pub fn new(need: f64) -> Self {
        Self {
            need: need.max(0.0),
            guaranteed: 0.0,
        }
    }

    pub fn for_state(state: PoolState, need: f64, share: f64, reserve_available: f64) -> Self {
        let mut claim = Self::new(need);
        if state.is_empty() {
            claim.guaranteed = empty_pool_guarantee(need, share, reserve_available);
        }
        claim
    }
}

/// Grant as much support as the reserve allows, up to the combined need.
/// When the reserve cannot cover both classes, guaranteed parts are served
/// first and the rest is shared in proportion to the remaining need.
pub fn split_support(reserve_available: f64, a: SupportClaim, b: SupportClaim) -> SupportSplit {
    let need_total = a.need + b.need;
    if need_total <= 0.0 {
        return SupportSplit::default();
    }
    let total = reserve_available.max(0.0).min(need_total);
    if total >= need_total {
        return SupportSplit {
            total,
            class_a: a.need,
            class_b: b.need,
        };
    }

    let mut first_a = a.guaranteed.min(a.need).max(0.0);
    let mut first_b = b.guaranteed.min(b.need).max(0.0);
    if first_a + first_b > total {
        let scale = total / (first_a + first_b);
        first_a *= scale;
        first_b *= scale;
    }
    let rest = total - first_a - first_b;
    let open_a = a.need - first_a;
    let open_total = open_a + (b.need - first_b);

    let class_a = if open_total > 0.0 {
        first_a + rest * open_a / open_total
    } else {
        first_a
    };
    SupportSplit {
        total,
        class_a,
        class_b: total - class_a,
    }
}

/// Water released through the turbines: deliveries, the human draw and spill.
pub fn turbined(deliveries: f64, human_draw: f64, spill: f64) -> f64 {
    deliveries + human_draw + spill
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_bounded_by_availability() {
        assert_eq!(own_floor(10.0, 40.0, 0.5), 10.0);
        assert_eq!(own_floor(50.0, 40.0, 0.5), 20.0);
        assert_eq!(own_floor(0.0, 40.0, 0.5), 0.0);
    }

    #[test]
    fn test_support_only_up_to_floor() {
        // demand 30, nothing of its own: need is 15, not 30
        let need = support_need(30.0, 0.0, 0.5);
        assert_eq!(need, 15.0);
        let support = split_support(100.0, SupportClaim::new(need), SupportClaim::new(0.0));
        assert_eq!(support.class_a, 15.0);
        assert_eq!(deficit(30.0, 0.0, support.class_a), 15.0);
    }

    #[test]
    fn test_no_need_when_own_reaches_floor() {
        assert_eq!(support_need(40.0, 25.0, 0.5), 0.0);
    }

    #[test]
    fn test_scarce_reserve_shared_by_need() {
        let s = split_support(6.0, SupportClaim::new(9.0), SupportClaim::new(3.0));
        assert!((s.total - 6.0).abs() < 1e-12);
        assert!((s.class_a - 4.5).abs() < 1e-12);
        assert!((s.class_b - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_class_served_before_sharing() {
        // 10 available: A is empty with need 10, B has need 29
        let a = SupportClaim::for_state(PoolState::Empty, 10.0, 0.71, 10.0);
        let b = SupportClaim::for_state(PoolState::NonEmpty, 29.0, 0.29, 10.0);
        assert!((a.guaranteed - 7.1).abs() < 1e-12);
        assert_eq!(b.guaranteed, 0.0);

        let s = split_support(10.0, a, b);
        assert!((s.total - 10.0).abs() < 1e-12);
        assert!(s.class_a >= 7.1 - 1e-12);
        assert!(s.class_a <= 10.0);
        // remaining 2.9 shared by open need: 2.9 for A, 29 for B
        let expected_a = 7.1 + 2.9 * 2.9 / 31.9;
        assert!((s.class_a - expected_a).abs() < 1e-9);
    }

    #[test]
    fn test_both_empty_split_by_share() {
        let a = SupportClaim::for_state(PoolState::Empty, 10.0, 0.71, 3.0);
        let b = SupportClaim::for_state(PoolState::Empty, 5.0, 0.29, 3.0);
        let s = split_support(3.0, a, b);
        assert!((s.class_a - 2.13).abs() < 1e-12);
        assert!((s.class_b - 0.87).abs() < 1e-12);
    }

    #[test]
    fn test_guarantee_capped_by_need() {
        assert_eq!(empty_pool_guarantee(2.0, 0.71, 100.0), 2.0);
        assert_eq!(empty_pool_guarantee(2.0, 0.71, -5.0), 0.0);
    }

    #[test]
    fn test_negative_reserve_grants_nothing() {
        let s = split_support(-1.0, SupportClaim::new(5.0), SupportClaim::new(5.0));
        assert_eq!(s, SupportSplit::default());
    }
}
