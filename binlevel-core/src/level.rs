//! Conversion from ultrasonic distance to fill level.

use crate::model::TrashLevel;

/// Distance at or beyond which the sensor sees an empty bin.
pub const MAX_DISTANCE_CM: f64 = 100.0;
/// Distance at or below which the sensor sees a full bin.
pub const MIN_DISTANCE_CM: f64 = 2.0;

/// Convert a raw sensor distance into a fill level.
///
/// Distances between [`MIN_DISTANCE_CM`] and [`MAX_DISTANCE_CM`] are linearly
/// interpolated and rounded half up; anything outside is clamped. `NaN` is
/// treated as an empty bin.
#[must_use]
pub fn trash_level(distance_cm: f64) -> TrashLevel {
    if distance_cm.is_nan() || distance_cm >= MAX_DISTANCE_CM {
        return TrashLevel::EMPTY;
    }
    if distance_cm <= MIN_DISTANCE_CM {
        return TrashLevel::FULL;
    }

    let fraction = (MAX_DISTANCE_CM - distance_cm) / (MAX_DISTANCE_CM - MIN_DISTANCE_CM);
    let percent = round_half_up(fraction * 100.0).clamp(0.0, 100.0);

    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "percent is clamped to 0..=100"
    )]
    let percent = percent as u8;
    TrashLevel::new(percent).unwrap_or(TrashLevel::FULL)
}

/// Round to the nearest integer, ties toward positive infinity.
fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(distance_cm: f64) -> u8 {
        trash_level(distance_cm).percent()
    }

    #[test]
    fn at_or_beyond_max_distance_is_empty() {
        assert_eq!(level(100.0), 0);
        assert_eq!(level(150.0), 0);
        assert_eq!(level(f64::INFINITY), 0);
    }

    #[test]
    fn at_or_below_min_distance_is_full() {
        assert_eq!(level(2.0), 100);
        assert_eq!(level(0.0), 100);
        assert_eq!(level(-5.0), 100);
        assert_eq!(level(f64::NEG_INFINITY), 100);
    }

    #[test]
    fn interpolates_between_bounds() {
        assert_eq!(level(51.0), 50);
        assert_eq!(level(10.0), 92);
        assert_eq!(level(99.0), 1);
        assert_eq!(level(3.0), 99);
    }

    #[test]
    fn rounds_to_nearest() {
        // 48.5 / 98 * 100 = 49.49
        assert_eq!(level(51.5), 49);
        // 49.5 / 98 * 100 = 50.51
        assert_eq!(level(50.5), 51);
        // 49.25 / 98 * 100 = 50.26
        assert_eq!(level(50.75), 50);
    }

    #[test]
    fn ties_round_up() {
        assert!((round_half_up(0.5) - 1.0).abs() < f64::EPSILON);
        assert!((round_half_up(49.5) - 50.0).abs() < f64::EPSILON);
        assert!((round_half_up(50.5) - 51.0).abs() < f64::EPSILON);
        assert!((round_half_up(49.499) - 49.0).abs() < f64::EPSILON);
    }

    #[test]
    fn nan_is_empty() {
        assert_eq!(trash_level(f64::NAN), TrashLevel::EMPTY);
    }

    #[test]
    fn level_stays_in_range_across_inputs() {
        let mut distance = -10_000.0_f64;
        while distance <= 10_000.0 {
            assert!(level(distance) <= 100, "distance {distance} out of range");
            distance += 0.37;
        }
        for distance in [f64::MIN, f64::MAX, -f64::EPSILON, f64::EPSILON, 1e-300, 1e300] {
            assert!(level(distance) <= 100, "distance {distance} out of range");
        }
    }

    #[test]
    fn level_never_increases_with_distance() {
        let mut previous = level(-1.0);
        let mut distance = -1.0_f64;
        while distance <= 101.0 {
            let current = level(distance);
            assert!(current <= previous, "level rose at distance {distance}");
            previous = current;
            distance += 0.01;
        }
    }
}
