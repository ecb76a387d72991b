//! Aggregate statistics over sample sequences.

use forecast_common::MinMax;

/// Minimum and maximum of the finite samples in `data`.
///
/// Missing (NaN) and infinite samples are ignored. An empty sequence, or one
/// with no finite sample, yields `None` for both bounds.
pub fn min_max(data: &[f64]) -> MinMax {
    data.iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(MinMax::default(), |acc, v| MinMax {
            min: Some(acc.min.map_or(v, |m| m.min(v))),
            max: Some(acc.max.map_or(v, |m| m.max(v))),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_skips_missing() {
        let stats = min_max(&[3.0, f64::NAN, -1.5, 7.25, f64::NAN]);
        assert_eq!(stats.min, Some(-1.5));
        assert_eq!(stats.max, Some(7.25));
    }

    #[test]
    fn test_min_max_all_missing() {
        assert_eq!(min_max(&[f64::NAN, f64::NAN]), MinMax::default());
        assert_eq!(min_max(&[]), MinMax::default());
    }

    #[test]
    fn test_min_max_single_value() {
        let stats = min_max(&[4.0]);
        assert_eq!(stats.min, Some(4.0));
        assert_eq!(stats.max, Some(4.0));
    }
}
