//! Geometry helpers shared by the relation evaluator and the control loop.
//!
//! Y is up; the "flat" plane is XZ.

use nalgebra::Vector3;
use std::time::Duration;

use crate::config::ChaseTuning;

/// Squared euclidean distance between two points.
pub fn squared_distance(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    (a - b).norm_squared()
}

/// Projects a vector onto the horizontal plane.
pub fn flatten(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.x, 0.0, v.z)
}

/// Distance between two points ignoring elevation.
pub fn horizontal_distance(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    flatten(&(b - a)).norm()
}

/// Unit horizontal direction from `from` toward `to`.
///
/// Returns `None` when the points are stacked vertically.
pub fn flat_direction(from: &Vector3<f64>, to: &Vector3<f64>) -> Option<Vector3<f64>> {
    flatten(&(to - from)).try_normalize(f64::EPSILON)
}

/// Rise over run from `from` to `to`.
///
/// A vertical offset with no horizontal run is an infinite slope; two
/// coincident points have slope zero.
pub fn slope(from: &Vector3<f64>, to: &Vector3<f64>) -> f64 {
    let rise = to.y - from.y;
    let run = horizontal_distance(from, to);
    if run <= f64::EPSILON {
        if rise.abs() <= f64::EPSILON {
            0.0
        } else {
            f64::INFINITY.copysign(rise)
        }
    } else {
        rise / run
    }
}

/// Polling interval for a target `distance` away.
///
/// Near targets poll at `base_tick` seconds; past `far_distance` the interval grows
/// by `distance * distance_tick_scale`, capped at `max_extra_tick`.
pub fn tick_interval(distance: f64, tuning: &ChaseTuning) -> Duration {
    let extra = if distance > tuning.far_distance {
        (distance * tuning.distance_tick_scale).clamp(0.0, tuning.max_extra_tick)
    } else {
        0.0
    };
    Duration::from_secs_f64(tuning.base_tick + extra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_squared_distance() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(4.0, 6.0, 3.0);
        assert_relative_eq!(squared_distance(&a, &b), 25.0);
    }

    #[test]
    fn test_flat_direction_ignores_height() {
        let dir = flat_direction(&Vector3::zeros(), &Vector3::new(3.0, 50.0, 4.0))
            .expect("horizontal offset exists");
        assert_relative_eq!(dir.x, 0.6, epsilon = 1e-12);
        assert_relative_eq!(dir.y, 0.0);
        assert_relative_eq!(dir.z, 0.8, epsilon = 1e-12);

        assert!(flat_direction(&Vector3::zeros(), &Vector3::new(0.0, 5.0, 0.0)).is_none());
    }

    #[test]
    fn test_slope() {
        let origin = Vector3::zeros();
        assert_relative_eq!(slope(&origin, &Vector3::new(0.0, 2.0, 4.0)), 0.5);
        assert_relative_eq!(slope(&origin, &Vector3::new(4.0, -1.0, 0.0)), -0.25);
        assert_eq!(slope(&origin, &origin), 0.0);
        assert_eq!(slope(&origin, &Vector3::new(0.0, 1.0, 0.0)), f64::INFINITY);
    }

    #[test]
    fn test_tick_interval_near_is_base() {
        let tuning = ChaseTuning::default();
        assert_eq!(tick_interval(0.0, &tuning), Duration::from_millis(100));
        assert_eq!(tick_interval(25.0, &tuning), Duration::from_millis(100));
    }

    #[test]
    fn test_tick_interval_far_is_scaled_and_capped() {
        let tuning = ChaseTuning::default();
        assert_relative_eq!(tick_interval(100.0, &tuning).as_secs_f64(), 1.1, epsilon = 1e-9);
        assert_relative_eq!(tick_interval(5_000.0, &tuning).as_secs_f64(), 2.1, epsilon = 1e-9);
    }

    proptest! {
        #[test]
        fn prop_tick_interval_monotonic_beyond_far(a in 25.0001f64..10_000.0, b in 25.0001f64..10_000.0) {
            let tuning = ChaseTuning::default();
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(tick_interval(near, &tuning) <= tick_interval(far, &tuning));
        }

        #[test]
        fn prop_tick_interval_flat_within_far(d in 0.0f64..=25.0) {
            let tuning = ChaseTuning::default();
            prop_assert_eq!(tick_interval(d, &tuning), Duration::from_millis(100));
        }
    }
}
