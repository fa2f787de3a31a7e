//! Eviction policy arithmetic.
//!
//! Pure functions; the ledger applies them after every size-growing commit.
//! The clear ratio buys headroom: an eviction pass frees the overage plus
//! `ratio * limit` extra bytes, so back-to-back writes do not each pay for
//! a sweep.

/// Ratio applied when a caller supplies a negative or non-finite value.
pub const DEFAULT_CLEAR_RATIO: f64 = 0.1;

/// Whether the cache is over budget.
pub fn should_evict(total_bytes: u64, limit_bytes: u64) -> bool {
    total_bytes > limit_bytes
}

/// Extra bytes to free beyond reaching the limit.
pub fn target_free_bytes(limit_bytes: u64, clear_ratio: f64) -> u64 {
    (limit_bytes as f64 * clear_ratio.clamp(0.0, 1.0)) as u64
}

/// Bytes an eviction pass must free: the overage plus the headroom
/// fraction of the budget.
///
/// When enough evictable bytes exist the pass lands the total at or below
/// `limit * (1 - ratio)`.
pub fn sweep_target(total_bytes: u64, limit_bytes: u64, clear_ratio: f64) -> u64 {
    total_bytes.saturating_sub(limit_bytes) + target_free_bytes(limit_bytes, clear_ratio)
}

/// Set-time normalization for the clear ratio.
///
/// Negative (or NaN) input falls back to [`DEFAULT_CLEAR_RATIO`]; anything
/// above one is pinned to one.
pub fn normalize_ratio(ratio: f64) -> f64 {
    if ratio.is_nan() || ratio < 0.0 {
        DEFAULT_CLEAR_RATIO
    } else if ratio > 1.0 {
        1.0
    } else {
        ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_only_above_limit() {
        assert!(!should_evict(999, 1000));
        assert!(!should_evict(1000, 1000));
        assert!(should_evict(1001, 1000));
    }

    #[test]
    fn target_free_scales_with_ratio() {
        assert_eq!(target_free_bytes(1000, 0.5), 500);
        assert_eq!(target_free_bytes(1000, 0.0), 0);
        assert_eq!(target_free_bytes(1000, 1.0), 1000);
        // Out-of-range ratios are clamped rather than trusted.
        assert_eq!(target_free_bytes(1000, 4.0), 1000);
        assert_eq!(target_free_bytes(1000, -3.0), 0);
    }

    #[test]
    fn sweep_covers_overage_plus_headroom() {
        // limit 1000, ratio 0.5, three 400-byte writes: total 1200.
        assert_eq!(sweep_target(1200, 1000, 0.5), 700);
        // Deep over budget with a small ratio still clears the overage.
        assert_eq!(sweep_target(1800, 1000, 0.1), 900);
        // Not over budget at all: only the headroom remains.
        assert_eq!(sweep_target(800, 1000, 0.1), 100);
    }

    #[test]
    fn ratio_normalization_policy() {
        assert_eq!(normalize_ratio(-0.3), DEFAULT_CLEAR_RATIO);
        assert_eq!(normalize_ratio(f64::NAN), DEFAULT_CLEAR_RATIO);
        assert_eq!(normalize_ratio(f64::NEG_INFINITY), DEFAULT_CLEAR_RATIO);
        assert_eq!(normalize_ratio(1.5), 1.0);
        assert_eq!(normalize_ratio(f64::INFINITY), 1.0);
        assert_eq!(normalize_ratio(0.25), 0.25);
        assert_eq!(normalize_ratio(0.0), 0.0);
        assert_eq!(normalize_ratio(1.0), 1.0);
    }
}
