//! Unit normalization of raw engine values.

use crate::metrics::types::Unit;

const MICROS_PER_SECOND: f64 = 1_000_000.0;
const BYTES_PER_MEGABYTE: f64 = 1_048_576.0;

/// Convert a raw engine value to its exported base unit.
///
/// Negative inputs (the engine reports `-1` for unknown) clamp to zero so
/// they never reach a Sum, Min or Max aggregate.
#[inline]
#[allow(clippy::cast_precision_loss)]
pub fn normalize(raw: i64, unit: Unit) -> f64 {
    let value = raw.max(0) as f64;
    match unit {
        Unit::Microseconds => value / MICROS_PER_SECOND,
        Unit::Megabytes => value * BYTES_PER_MEGABYTE,
        Unit::Seconds | Unit::Bytes | Unit::Count => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_clamps_to_zero() {
        assert_eq!(normalize(-1, Unit::Microseconds), 0.0);
        assert_eq!(normalize(-1, Unit::Megabytes), 0.0);
        assert_eq!(normalize(i64::MIN, Unit::Count), 0.0);
    }

    #[test]
    fn test_unit_conversion() {
        assert_eq!(normalize(2_000_000, Unit::Microseconds), 2.0);
        assert_eq!(normalize(1, Unit::Megabytes), 1_048_576.0);
        assert_eq!(normalize(42, Unit::Seconds), 42.0);
        assert_eq!(normalize(512, Unit::Bytes), 512.0);
        assert_eq!(normalize(7, Unit::Count), 7.0);
    }

    #[test]
    fn test_extremes_stay_finite() {
        assert!(normalize(i64::MAX, Unit::Megabytes).is_finite());
        assert!(normalize(i64::MAX, Unit::Microseconds).is_finite());
    }
}
