use serde::{Deserialize, Serialize};

use super::params::ShareSplit;
use crate::domain::{PoolStocks, ShareClass};

/// How one month's remainder was distributed across the pools (Hm³).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FillOutcome {
    pub remainder: f64,
    pub fill_reserve: f64,
    /// Remainder left after the reserve took its share.
    pub leftover: f64,
    /// Nominal 71/29 shares before any cap.
    pub nominal_a: f64,
    pub nominal_b: f64,
    /// Shares capped by each class's headroom.
    pub capped_a: f64,
    pub capped_b: f64,
    /// Overflow from the other class absorbed by this one.
    pub reassigned_a: f64,
    pub reassigned_b: f64,
    pub fill_a: f64,
    pub fill_b: f64,
    pub spill: f64,
}

impl FillOutcome {
    pub fn fill(&self, class: ShareClass) -> f64 {
        match class {
            ShareClass::A => self.fill_a,
            ShareClass::B => self.fill_b,
        }
    }

    /// Mass-balance residual; zero when nothing was lost or created.
    pub fn residual(&self) -> f64 {
        self.fill_reserve + self.fill_a + self.fill_b + self.spill - self.remainder
    }
}

/// Headroom of each pool given its opening stock.
pub fn headroom(capacities: &PoolStocks, opening: &PoolStocks) -> PoolStocks {
    PoolStocks::new(
        (capacities.reserve - opening.reserve).max(0.0),
        (capacities.class_a - opening.class_a).max(0.0),
        (capacities.class_b - opening.class_b).max(0.0),
    )
}

/// Distribute a month's remainder by priority.
///
/// 1. The reserve pool takes as much as its headroom allows.
/// 2. The leftover is split between the classes by the nominal shares,
///    each capped at its headroom.
/// 3. Overflow from one class goes to the other's unused headroom.
/// 4. Whatever still does not fit is spilled.
pub fn allocate_fill(remainder: f64, headroom: &PoolStocks, split: &ShareSplit) -> FillOutcome {
    let remainder = remainder.max(0.0);

    let fill_reserve = remainder.min(headroom.reserve);
    let leftover = remainder - fill_reserve;

    let nominal_a = split.class_a * leftover;
    let nominal_b = split.class_b * leftover;
    let capped_a = nominal_a.min(headroom.class_a);
    let capped_b = nominal_b.min(headroom.class_b);

    let overflow_a = nominal_a - capped_a;
    let overflow_b = nominal_b - capped_b;
    let extra_a = headroom.class_a - capped_a;
    let extra_b = headroom.class_b - capped_b;
    let reassigned_a = overflow_b.min(extra_a);
    let reassigned_b = overflow_a.min(extra_b);

    let fill_a = capped_a + reassigned_a;
    let fill_b = capped_b + reassigned_b;
    let spill = (leftover - headroom.class_a - headroom.class_b).max(0.0);

    FillOutcome {
        remainder,
        fill_reserve,
        leftover,
        nominal_a,
        nominal_b,
        capped_a,
        capped_b,
        reassigned_a,
        reassigned_b,
        fill_a,
        fill_b,
        spill,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn split() -> ShareSplit {
        ShareSplit::default()
    }

    #[test]
    fn test_reserve_absorbs_small_remainder() {
        let out = allocate_fill(80.0, &PoolStocks::new(175.0, 260.0, 105.0), &split());
        assert!((out.fill_reserve - 80.0).abs() < EPS);
        assert_eq!(out.fill_a, 0.0);
        assert_eq!(out.fill_b, 0.0);
        assert_eq!(out.spill, 0.0);
    }

    #[test]
    fn test_nominal_split_without_caps() {
        let out = allocate_fill(100.0, &PoolStocks::new(0.0, 260.0, 105.0), &split());
        assert!((out.fill_a - 71.0).abs() < EPS);
        assert!((out.fill_b - 29.0).abs() < EPS);
        assert_eq!(out.spill, 0.0);
    }

    #[test]
    fn test_overflow_reassigned_to_other_class() {
        // Class B only has room for 10 of its nominal 29
        let out = allocate_fill(100.0, &PoolStocks::new(0.0, 260.0, 10.0), &split());
        assert!((out.fill_b - 10.0).abs() < EPS);
        assert!((out.reassigned_a - 19.0).abs() < EPS);
        assert!((out.fill_a - 90.0).abs() < EPS);
        assert_eq!(out.spill, 0.0);
    }

    #[test]
    fn test_spill_when_everything_is_full() {
        // Reserve 5 headroom, A 20, B 10, remainder 100
        let out = allocate_fill(100.0, &PoolStocks::new(5.0, 20.0, 10.0), &split());
        assert!((out.fill_reserve - 5.0).abs() < EPS);
        assert!((out.fill_a - 20.0).abs() < EPS);
        assert!((out.fill_b - 10.0).abs() < EPS);
        assert!((out.spill - 65.0).abs() < EPS);
        assert!(out.residual().abs() < EPS);
    }

    #[test]
    fn test_headroom_never_negative() {
        let h = headroom(&PoolStocks::new(10.0, 10.0, 10.0), &PoolStocks::new(12.0, 4.0, 10.0));
        assert_eq!(h, PoolStocks::new(0.0, 6.0, 0.0));
    }

    proptest! {
        #[test]
        fn prop_fill_conserves_mass(
            remainder in 0.0f64..2_000.0,
            hr in 0.0f64..200.0,
            ha in 0.0f64..300.0,
            hb in 0.0f64..150.0,
        ) {
            let room = PoolStocks::new(hr, ha, hb);
            let out = allocate_fill(remainder, &room, &split());

            prop_assert!(out.residual().abs() < 1e-7);
            prop_assert!(out.fill_reserve <= hr + EPS);
            prop_assert!(out.fill_a <= ha + EPS);
            prop_assert!(out.fill_b <= hb + EPS);
            prop_assert!(out.fill_a >= -EPS && out.fill_b >= -EPS && out.spill >= -EPS);
            // Spill only once every pool is full
            if out.spill > EPS {
                prop_assert!((out.fill_reserve - hr).abs() < 1e-7);
                prop_assert!((out.fill_a - ha).abs() < 1e-7);
                prop_assert!((out.fill_b - hb).abs() < 1e-7);
            }
        }
    }
}
