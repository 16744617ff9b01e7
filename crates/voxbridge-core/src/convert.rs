//! Range and percentage conversion.
//!
//! Properties store protocol units (0-100 percentages, Kelvin, booleans);
//! the backend stores raw device units. Conversion happens exactly once,
//! at the read/write boundary, through the helpers here.
//!
//! All helpers return `None` for out-of-domain input or a degenerate range
//! (`min >= max`). Callers must treat `None` as "value unavailable", never
//! as zero.

/// Map a raw backend value inside `[min, max]` onto a 0-100 percentage.
pub fn normalize(raw: f64, min: f64, max: f64) -> Option<f64> {
    if min >= max || raw < min || raw > max {
        return None;
    }
    Some(((raw - min) / (max - min) * 100.0).round())
}

/// Map a 0-100 percentage back onto the raw `[min, max]` range.
pub fn denormalize(pct: f64, min: f64, max: f64) -> Option<f64> {
    if min >= max || !(0.0..=100.0).contains(&pct) {
        return None;
    }
    Some((pct / 100.0 * (max - min) + min).round())
}

/// Clamp an arbitrary requested percentage into [0, 100].
pub fn clamp_percent(pct: f64) -> f64 {
    pct.clamp(0.0, 100.0)
}

/// Pick the candidate closest to `target`. Ties favor the earlier entry.
pub fn nearest_step(target: f64, steps: &[f64]) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for &step in steps {
        let diff = (step - target).abs();
        match best {
            Some((_, best_diff)) if diff >= best_diff => {}
            _ => best = Some((step, diff)),
        }
    }
    best.map(|(step, _)| step)
}

/// Index of the candidate closest to `target`. Ties favor the earlier entry.
pub fn nearest_step_index(target: f64, steps: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &step) in steps.iter().enumerate() {
        let diff = (step - target).abs();
        match best {
            Some((_, best_diff)) if diff >= best_diff => {}
            _ => best = Some((i, diff)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize(875.0, 500.0, 1000.0), Some(75.0));
        assert_eq!(normalize(500.0, 500.0, 1000.0), Some(0.0));
        assert_eq!(normalize(1000.0, 500.0, 1000.0), Some(100.0));
    }

    #[test]
    fn test_normalize_out_of_domain() {
        assert_eq!(normalize(499.0, 500.0, 1000.0), None);
        assert_eq!(normalize(1001.0, 500.0, 1000.0), None);
        assert_eq!(normalize(50.0, 100.0, 100.0), None);
        assert_eq!(normalize(50.0, 200.0, 100.0), None);
    }

    #[test]
    fn test_denormalize_basic() {
        assert_eq!(denormalize(75.0, 500.0, 1000.0), Some(875.0));
        assert_eq!(denormalize(0.0, 500.0, 1000.0), Some(500.0));
        assert_eq!(denormalize(100.0, 500.0, 1000.0), Some(1000.0));
    }

    #[test]
    fn test_denormalize_out_of_domain() {
        assert_eq!(denormalize(101.0, 0.0, 100.0), None);
        assert_eq!(denormalize(-1.0, 0.0, 100.0), None);
        assert_eq!(denormalize(50.0, 10.0, 10.0), None);
    }

    #[test]
    fn test_round_trip_within_one_unit() {
        for (min, max) in [(0.0, 100.0), (500.0, 1000.0), (10.0, 17.0)] {
            let mut v = min;
            while v <= max {
                let pct = normalize(v, min, max).unwrap();
                let back = denormalize(pct, min, max).unwrap();
                let unit = (max - min) / 100.0;
                assert!(
                    (back - v).abs() <= unit.max(1.0),
                    "round trip {v} -> {pct} -> {back} over [{min}, {max}]"
                );
                v += 1.0;
            }
        }
    }

    #[test]
    fn test_nearest_step() {
        let steps = [2200.0, 2700.0, 4000.0, 6500.0];
        assert_eq!(nearest_step(2200.0, &steps), Some(2200.0));
        assert_eq!(nearest_step(2500.0, &steps), Some(2700.0));
        assert_eq!(nearest_step(2450.0, &steps), Some(2200.0)); // tie, first wins
        assert_eq!(nearest_step(9000.0, &steps), Some(6500.0));
        assert_eq!(nearest_step(5.0, &[]), None);
    }

    #[test]
    fn test_nearest_step_index() {
        let steps = [2200.0, 2700.0, 4000.0, 6500.0];
        assert_eq!(nearest_step_index(2600.0, &steps), Some(1));
        assert_eq!(nearest_step_index(0.0, &steps), Some(0));
    }
}
