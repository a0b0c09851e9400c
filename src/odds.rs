//! Pari-mutuel pool/odds engine.
//!
//! Both pools feed one shared pot; a winning wager's payout ratio is the
//! pot divided by the winning side's pool. Everything here is a pure
//! function of the two pool totals: every UI surface and the telemetry
//! path recompute from the same source of truth, so there is no cached
//! state to go stale.

use crate::models::Side;

/// Multiplier assigned to a side whose pool is still empty. Avoids the
/// division by zero and gives every fresh event a deterministic 2.0x
/// starter price.
pub const EMPTY_POOL_MULTIPLIER: f64 = 2.0;

/// Derived odds for one event at one instant.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PoolOdds {
    pub total: u64,
    /// Payout ratio for side A, rounded to one decimal place
    pub multiplier_a: f64,
    /// Payout ratio for side B, rounded to one decimal place
    pub multiplier_b: f64,
    /// Rounded share of the pot on side A (0–100)
    pub percent_a: u8,
    /// Always `100 - percent_a`, never independently rounded
    pub percent_b: u8,
}

impl PoolOdds {
    pub fn multiplier(&self, side: Side) -> f64 {
        match side {
            Side::A => self.multiplier_a,
            Side::B => self.multiplier_b,
        }
    }

    pub fn percent(&self, side: Side) -> u8 {
        match side {
            Side::A => self.percent_a,
            Side::B => self.percent_b,
        }
    }
}

/// Compute multipliers and percentages for the given pools.
///
/// `percent_a` is `round(pool_a / total * 100)` (neutral 50 when no points
/// are in yet); `percent_b` is derived so the pair always sums to exactly
/// 100 regardless of rounding.
pub fn pool_odds(pool_a: u64, pool_b: u64) -> PoolOdds {
    let total = pool_a + pool_b;
    let percent_a = if total == 0 {
        50
    } else {
        (pool_a as f64 / total as f64 * 100.0).round() as u8
    };
    PoolOdds {
        total,
        multiplier_a: side_multiplier(pool_a, total),
        multiplier_b: side_multiplier(pool_b, total),
        percent_a,
        percent_b: 100 - percent_a,
    }
}

/// Payout ratio for one side: `total / pool` rounded to one decimal, or the
/// starter multiplier when the side's pool is empty.
fn side_multiplier(pool: u64, total: u64) -> f64 {
    if pool == 0 {
        EMPTY_POOL_MULTIPLIER
    } else {
        round1(total as f64 / pool as f64)
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Potential payout for a wager. Integer truncation is intentional: payouts
/// never exceed the pool-implied fair value.
pub fn potential_win(amount: u64, multiplier: f64) -> u64 {
    (amount as f64 * multiplier).floor() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_pools_neutral_prior() {
        let odds = pool_odds(0, 0);
        assert_eq!(odds.total, 0);
        assert_eq!(odds.percent_a, 50);
        assert_eq!(odds.percent_b, 50);
        assert_relative_eq!(odds.multiplier_a, 2.0, epsilon = 1e-9);
        assert_relative_eq!(odds.multiplier_b, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_first_wager_scenario() {
        // (0,0) + 10 on A → pools (10,0)
        let odds = pool_odds(10, 0);
        assert_eq!(odds.total, 10);
        assert_eq!(odds.percent_a, 100);
        assert_eq!(odds.percent_b, 0);
        assert_relative_eq!(odds.multiplier_a, 1.0, epsilon = 1e-9);
        // Empty-pool rule still applies to the untouched side
        assert_relative_eq!(odds.multiplier_b, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_seeded_pools_scenario() {
        let odds = pool_odds(45_000, 32_000);
        assert_eq!(odds.total, 77_000);
        assert_eq!(odds.percent_a, 58);
        assert_eq!(odds.percent_b, 42);
        assert_relative_eq!(odds.multiplier_a, 1.7, epsilon = 1e-9);
        assert_relative_eq!(odds.multiplier_b, 2.4, epsilon = 1e-9);
    }

    #[test]
    fn test_percentages_always_sum_to_100() {
        for (a, b) in [
            (1u64, 0u64),
            (0, 1),
            (1, 2),
            (333, 667),
            (45_000, 32_000),
            (95_000, 92_000),
            (1, 999_999),
        ] {
            let odds = pool_odds(a, b);
            assert_eq!(
                odds.percent_a as u32 + odds.percent_b as u32,
                100,
                "pools ({a},{b})"
            );
            let expected = (a as f64 / (a + b) as f64 * 100.0).round() as u8;
            assert_eq!(odds.percent_a, expected, "pools ({a},{b})");
        }
    }

    #[test]
    fn test_multiplier_rounding_one_decimal() {
        // 77000 / 48000 = 1.604… → 1.6
        let odds = pool_odds(29_000, 48_000);
        assert_relative_eq!(odds.multiplier_b, 1.6, epsilon = 1e-9);
    }

    #[test]
    fn test_potential_win_floors() {
        assert_eq!(potential_win(10, 1.7), 17);
        assert_eq!(potential_win(7, 1.7), 11); // 11.9 floors to 11
        assert_eq!(potential_win(10, 2.0), 20);
        assert_eq!(potential_win(0, 2.0), 0);
    }

    #[test]
    fn test_side_accessors() {
        use crate::models::Side;
        let odds = pool_odds(45_000, 32_000);
        assert_relative_eq!(odds.multiplier(Side::A), 1.7, epsilon = 1e-9);
        assert_relative_eq!(odds.multiplier(Side::B), 2.4, epsilon = 1e-9);
        assert_eq!(odds.percent(Side::A), 58);
        assert_eq!(odds.percent(Side::B), 42);
    }
}
