//! Absolute heading from a gyro, or dead reckoned from wheel motion when no gyro is available.

use super::{Angle, ModuleState, WheelGeometry};

#[derive(Clone, Debug, PartialEq)]
pub struct HeadingTracker {
    geometry: WheelGeometry,
    heading: Angle,
}

impl HeadingTracker {
    pub fn new(geometry: WheelGeometry) -> Self {
        Self {
            geometry,
            heading: Angle::ZERO,
        }
    }

    /// A connected sensor is authoritative. Without one the angular velocity implied by the
    /// module states is integrated over `dt`, which drifts over time.
    pub fn update(&mut self, sensor: Option<Angle>, states: &[ModuleState; 4], dt: f64) -> Angle {
        self.heading = match sensor {
            Some(reading) => reading,
            None => {
                let omega = self.geometry.to_chassis_velocity(states).omega;
                self.heading + Angle::new(omega * dt.max(0.0))
            }
        };
        self.heading
    }

    pub fn heading(&self) -> Angle {
        self.heading
    }

    /// Only affects the dead-reckoned heading; a gyro is zeroed on its own.
    pub fn zero(&mut self) {
        self.heading = Angle::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{
        domain::{ChassisVelocity, KinematicsSolver},
        tests::unit_square,
    };

    const EPSILON: f64 = 1e-9;

    fn spinning(omega: f64) -> [ModuleState; 4] {
        KinematicsSolver::new(unit_square()).solve(ChassisVelocity::new(0.0, 0.0, omega))
    }

    #[test]
    fn test_sensor_reading_is_used_verbatim() {
        let mut tracker = HeadingTracker::new(unit_square());
        let heading = tracker.update(Some(Angle::new(1.25)), &spinning(3.0), 0.02);
        assert_eq!(heading, Angle::new(1.25));
    }

    #[test]
    fn test_dead_reckoning_integrates_wheel_rotation() {
        let mut tracker = HeadingTracker::new(unit_square());
        for _ in 0..50 {
            tracker.update(None, &spinning(0.5 * PI), 0.02);
        }
        assert_abs_diff_eq!(tracker.heading(), Angle::new(0.5 * PI), epsilon = EPSILON);
    }

    #[test]
    fn test_dead_reckoning_continues_from_last_sensor_reading() {
        let mut tracker = HeadingTracker::new(unit_square());
        tracker.update(Some(Angle::new(1.0)), &spinning(0.0), 0.02);
        let heading = tracker.update(None, &spinning(1.0), 0.5);
        assert_abs_diff_eq!(heading, Angle::new(1.5), epsilon = EPSILON);
    }

    #[test]
    fn test_translation_does_not_rotate() {
        let mut tracker = HeadingTracker::new(unit_square());
        let states =
            KinematicsSolver::new(unit_square()).solve(ChassisVelocity::new(2.0, -1.0, 0.0));
        assert_abs_diff_eq!(tracker.update(None, &states, 1.0), Angle::ZERO, epsilon = EPSILON);
    }

    #[test]
    fn test_zero() {
        let mut tracker = HeadingTracker::new(unit_square());
        tracker.update(None, &spinning(1.0), 1.0);
        tracker.zero();
        assert_eq!(tracker.heading(), Angle::ZERO);
    }
}
