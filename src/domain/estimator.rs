//! Pose estimation from wheel odometry and delayed external position corrections.
//!
//! Odometry is integrated every tick and recorded in a short history. A correction refers to a
//! moment in that history: its residual against the pose recorded at that moment is blended into
//! every later entry and the current estimate, so later odometry builds on the corrected pose.

use std::collections::VecDeque;

use tracing::debug;

use super::{Angle, ModulePosition, Pose2D, Position, WheelGeometry};

/// Externally observed robot position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correction {
    pub position: Position,
    /// Reported for completeness; the estimator trusts its own heading source.
    pub heading: Option<Angle>,
    /// Moment of the observation in seconds, on the same clock as odometry updates.
    pub timestamp: f64,
    /// Blend weight in `[0, 1]`; values outside are clamped.
    pub confidence: f64,
}

impl Correction {
    pub fn new(position: Position, timestamp: f64, confidence: f64) -> Self {
        Self {
            position,
            heading: None,
            timestamp,
            confidence,
        }
    }

    pub fn with_heading(self, heading: Angle) -> Self {
        Self {
            heading: Some(heading),
            ..self
        }
    }

    fn is_finite(&self) -> bool {
        self.position.is_finite() && self.timestamp.is_finite() && self.confidence.is_finite()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Sample {
    timestamp: f64,
    pose: Pose2D,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PoseEstimator {
    geometry: WheelGeometry,
    pose: Pose2D,
    heading_offset: Angle,
    previous_positions: [ModulePosition; 4],
    history: VecDeque<Sample>,
    history_window: f64,
}

impl PoseEstimator {
    /// `heading` and `positions` are the current sensor readings that correspond to `pose`.
    pub fn new(
        geometry: WheelGeometry,
        heading: Angle,
        positions: &[ModulePosition; 4],
        pose: Pose2D,
        history_window: f64,
    ) -> Self {
        Self {
            geometry,
            pose,
            heading_offset: pose.heading() - heading,
            previous_positions: *positions,
            history: VecDeque::new(),
            history_window,
        }
    }

    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    pub fn history_window(&self) -> f64 {
        self.history_window
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Advances the estimate by the wheel travel since the previous call.
    pub fn update_odometry(
        &mut self,
        now: f64,
        heading: Angle,
        positions: &[ModulePosition; 4],
    ) -> Pose2D {
        let mut deltas = [ModulePosition::default(); 4];
        for (delta, (current, previous)) in deltas
            .iter_mut()
            .zip(positions.iter().zip(self.previous_positions.iter()))
        {
            *delta = ModulePosition::new(current.distance - previous.distance, current.angle);
        }

        let estimated_heading = heading + self.heading_offset;
        let mut twist = self.geometry.to_twist(&deltas);
        twist.dtheta = (estimated_heading - self.pose.heading()).radians();

        self.pose = self.pose.exp(twist).with_heading(estimated_heading);
        self.previous_positions = *positions;
        self.record(now);

        self.pose
    }

    /// Blends a correction into the estimate. Returns whether it was applied.
    pub fn add_correction(&mut self, correction: Correction) -> bool {
        if !correction.is_finite() {
            debug!(?correction, "Dropping non-finite correction");
            return false;
        }

        let Some((first, sampled)) = self.sample_at(correction.timestamp) else {
            debug!(
                timestamp = correction.timestamp,
                oldest = self.history.front().map(|s| s.timestamp),
                "Dropping correction outside of the retained history"
            );
            return false;
        };

        let residual = correction.position - sampled.position();
        let shift = residual * correction.confidence.clamp(0.0, 1.0);

        // Later lookups between the neighbouring samples must see this correction in full.
        if self
            .history
            .get(first)
            .map_or(true, |s| s.timestamp != correction.timestamp)
        {
            self.history.insert(
                first,
                Sample {
                    timestamp: correction.timestamp,
                    pose: sampled,
                },
            );
        }
        for sample in self.history.range_mut(first..) {
            sample.pose = sample.pose.with_position(sample.pose.position() + shift);
        }
        self.pose = self.pose.with_position(self.pose.position() + shift);

        debug!(
            timestamp = correction.timestamp,
            confidence = correction.confidence,
            dx = shift.x(),
            dy = shift.y(),
            "Applied correction"
        );
        true
    }

    /// Replaces the pose and the heading and wheel baselines, forgetting all history.
    pub fn reset_pose(&mut self, heading: Angle, positions: &[ModulePosition; 4], pose: Pose2D) {
        self.pose = pose;
        self.heading_offset = pose.heading() - heading;
        self.previous_positions = *positions;
        self.history.clear();
    }

    fn record(&mut self, now: f64) {
        while self.history.back().is_some_and(|s| s.timestamp >= now) {
            self.history.pop_back();
        }
        self.history.push_back(Sample {
            timestamp: now,
            pose: self.pose,
        });

        let oldest = now - self.history_window;
        while self.history.front().is_some_and(|s| s.timestamp < oldest) {
            self.history.pop_front();
        }
    }

    /// Odometry pose at `timestamp`, linearly interpolated between recorded samples, and the
    /// index of the first sample not older than `timestamp`.
    fn sample_at(&self, timestamp: f64) -> Option<(usize, Pose2D)> {
        let latest = self.history.back()?;
        let oldest = self.history.front()?;
        if timestamp < oldest.timestamp || timestamp < latest.timestamp - self.history_window {
            return None;
        }

        let i = self.history.partition_point(|s| s.timestamp < timestamp);
        if i == self.history.len() {
            return Some((i, latest.pose));
        }

        let after = self.history[i];
        if i == 0 || after.timestamp == timestamp {
            return Some((i, after.pose));
        }

        let before = self.history[i - 1];
        let t = (timestamp - before.timestamp) / (after.timestamp - before.timestamp);
        let position =
            before.pose.position() + (after.pose.position() - before.pose.position()) * t;
        let heading = before.pose.heading()
            + Angle::new((after.pose.heading() - before.pose.heading()).radians() * t);

        Some((i, Pose2D::new(position, heading)))
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    use super::*;
    use crate::tests::unit_square;

    const EPSILON: f64 = 1e-9;
    const DT: f64 = 0.02;

    fn straight(distance: f64) -> [ModulePosition; 4] {
        [ModulePosition::new(distance, Angle::ZERO); 4]
    }

    fn estimator(history_window: f64) -> PoseEstimator {
        PoseEstimator::new(
            unit_square(),
            Angle::ZERO,
            &straight(0.0),
            Pose2D::default(),
            history_window,
        )
    }

    /// Drives forward 0.1 m per tick for `ticks` ticks, stamped `DT` apart starting at `DT`.
    fn drive_forward(estimator: &mut PoseEstimator, ticks: usize) {
        for i in 1..=ticks {
            estimator.update_odometry(i as f64 * DT, Angle::ZERO, &straight(i as f64 * 0.1));
        }
    }

    #[test]
    fn test_no_motion_keeps_pose() {
        let start = Pose2D::new(Position::new(1.0, -2.0), Angle::new(0.3));
        let mut estimator = PoseEstimator::new(
            unit_square(),
            Angle::new(0.3),
            &straight(4.2),
            start,
            1.5,
        );
        for i in 1..=100 {
            estimator.update_odometry(i as f64 * DT, Angle::new(0.3), &straight(4.2));
        }
        assert_abs_diff_eq!(estimator.pose(), start, epsilon = EPSILON);
    }

    #[rstest]
    #[case::forward(0.0, (1.0, 0.0))]
    #[case::facing_left(0.5 * PI, (0.0, 1.0))]
    #[case::facing_back(PI, (-1.0, 0.0))]
    fn test_odometry_rotates_into_field_frame(#[case] heading: f64, #[case] expected: (f64, f64)) {
        let mut estimator = PoseEstimator::new(
            unit_square(),
            Angle::new(heading),
            &straight(0.0),
            Pose2D::new(Position::default(), Angle::new(heading)),
            1.5,
        );
        for i in 1..=10 {
            let positions = straight(i as f64 * 0.1);
            estimator.update_odometry(i as f64 * DT, Angle::new(heading), &positions);
        }
        assert_abs_diff_eq!(
            estimator.pose().position(),
            Position::new(expected.0, expected.1),
            epsilon = EPSILON
        );
    }

    #[test]
    fn test_odometry_follows_arc() {
        // Quarter circle of radius 1 m: wheels straight ahead while the gyro turns.
        let mut estimator = estimator(1.5);
        let steps = 100;
        for i in 1..=steps {
            let fraction = i as f64 / steps as f64;
            let heading = Angle::new(0.5 * PI * fraction);
            estimator.update_odometry(i as f64 * DT, heading, &straight(0.5 * PI * fraction));
        }
        assert_abs_diff_eq!(
            estimator.pose(),
            Pose2D::new(Position::new(1.0, 1.0), Angle::new(0.5 * PI)),
            epsilon = 1e-3
        );
    }

    #[test]
    fn test_reset_pose_replaces_heading_baseline() {
        let mut estimator = estimator(1.5);
        drive_forward(&mut estimator, 5);

        let pose = Pose2D::new(Position::new(3.0, 4.0), Angle::new(0.5 * PI));
        estimator.reset_pose(Angle::ZERO, &straight(0.5), pose);
        assert_eq!(estimator.pose(), pose);
        assert_eq!(estimator.history_len(), 0);

        // gyro still reads zero, the robot now faces +y on the field
        estimator.update_odometry(1.0, Angle::ZERO, &straight(1.5));
        assert_abs_diff_eq!(
            estimator.pose(),
            Pose2D::new(Position::new(3.0, 5.0), Angle::new(0.5 * PI)),
            epsilon = EPSILON
        );
    }

    #[test]
    fn test_zero_confidence_correction_is_noop() {
        let mut estimator = estimator(1.5);
        drive_forward(&mut estimator, 10);
        let before = estimator.clone();

        assert!(estimator.add_correction(Correction::new(Position::new(5.0, 5.0), 5.0 * DT, 0.0)));
        assert_eq!(estimator.pose(), before.pose());
        assert_eq!(estimator, before);
    }

    #[test]
    fn test_full_confidence_correction_at_current_time_snaps_position() {
        let mut estimator = estimator(1.5);
        drive_forward(&mut estimator, 10);
        let heading = estimator.pose().heading();

        let observed = Position::new(0.8, 0.25);
        assert!(estimator.add_correction(
            Correction::new(observed, 10.0 * DT, 1.0).with_heading(Angle::new(2.0))
        ));
        assert_abs_diff_eq!(estimator.pose().position(), observed, epsilon = EPSILON);
        assert_eq!(estimator.pose().heading(), heading);
    }

    #[test]
    fn test_past_correction_shifts_current_pose_and_later_odometry() {
        let mut estimator = estimator(1.5);
        drive_forward(&mut estimator, 10);

        // odometry had x = 0.5 at t = 0.1
        let correction = Correction::new(Position::new(0.7, 0.2), 5.0 * DT, 0.5);
        assert!(estimator.add_correction(correction));
        assert_abs_diff_eq!(
            estimator.pose().position(),
            Position::new(1.1, 0.1),
            epsilon = EPSILON
        );

        // the correction is kept when driving on
        estimator.update_odometry(11.0 * DT, Angle::ZERO, &straight(1.1));
        assert_abs_diff_eq!(
            estimator.pose().position(),
            Position::new(1.2, 0.1),
            epsilon = EPSILON
        );
    }

    #[test]
    fn test_correction_between_samples_is_interpolated() {
        let mut estimator = estimator(1.5);
        drive_forward(&mut estimator, 10);

        // odometry passed x = 0.55 halfway between the samples at 0.1 s and 0.12 s
        let correction = Correction::new(Position::new(0.55, 0.0), 5.5 * DT, 1.0);
        assert!(estimator.add_correction(correction));
        assert_abs_diff_eq!(
            estimator.pose().position(),
            Position::new(1.0, 0.0),
            epsilon = EPSILON
        );
    }

    #[test]
    fn test_repeated_correction_between_samples_is_noop() {
        let mut estimator = estimator(1.5);
        drive_forward(&mut estimator, 10);

        let correction = Correction::new(Position::new(0.55, 1.0), 5.5 * DT, 1.0);
        assert!(estimator.add_correction(correction));
        let first = estimator.pose();
        assert_abs_diff_eq!(first.position(), Position::new(1.0, 1.0), epsilon = EPSILON);

        assert!(estimator.add_correction(correction));
        assert_abs_diff_eq!(estimator.pose(), first, epsilon = EPSILON);

        // a later observation in the same gap sees the first one in full
        let later = Correction::new(Position::new(0.575, 1.0), 5.75 * DT, 1.0);
        assert!(estimator.add_correction(later));
        assert_abs_diff_eq!(estimator.pose(), first, epsilon = EPSILON);
    }

    #[test]
    fn test_repeated_correction_after_latest_sample_is_noop() {
        let mut estimator = estimator(1.5);
        drive_forward(&mut estimator, 10);

        let correction = Correction::new(Position::new(1.0, 0.5), 10.5 * DT, 1.0);
        assert!(estimator.add_correction(correction));
        assert!(estimator.add_correction(correction));
        assert_abs_diff_eq!(
            estimator.pose().position(),
            Position::new(1.0, 0.5),
            epsilon = EPSILON
        );
    }

    #[test]
    fn test_older_correction_after_newer_one() {
        let mut estimator = estimator(1.5);
        drive_forward(&mut estimator, 10);

        assert!(estimator.add_correction(Correction::new(Position::new(0.8, 0.5), 8.0 * DT, 1.0)));
        assert_abs_diff_eq!(
            estimator.pose().position(),
            Position::new(1.0, 0.5),
            epsilon = EPSILON
        );

        // odometry had x = 0.5 at 0.1 s, half of the 0.1 m residual is applied from there on
        assert!(estimator.add_correction(Correction::new(Position::new(0.6, 0.0), 5.0 * DT, 0.5)));
        assert_abs_diff_eq!(
            estimator.pose().position(),
            Position::new(1.05, 0.5),
            epsilon = EPSILON
        );

        let at = |t: f64| estimator.sample_at(t).map(|(_, pose)| pose.position());
        assert_abs_diff_eq!(at(4.0 * DT).unwrap(), Position::new(0.4, 0.0), epsilon = EPSILON);
        assert_abs_diff_eq!(at(6.0 * DT).unwrap(), Position::new(0.65, 0.0), epsilon = EPSILON);
        assert_abs_diff_eq!(at(8.0 * DT).unwrap(), Position::new(0.85, 0.5), epsilon = EPSILON);
    }

    #[test]
    fn test_later_correction_sees_earlier_one() {
        let mut estimator = estimator(1.5);
        drive_forward(&mut estimator, 10);

        assert!(estimator.add_correction(Correction::new(Position::new(0.5, 1.0), 5.0 * DT, 1.0)));
        // the sample at 0.16 s already includes the first correction, nothing left to fix
        assert!(estimator.add_correction(Correction::new(Position::new(0.8, 1.0), 8.0 * DT, 1.0)));
        assert_abs_diff_eq!(
            estimator.pose().position(),
            Position::new(1.0, 1.0),
            epsilon = EPSILON
        );
    }

    #[test]
    fn test_stale_correction_is_ignored() {
        let mut estimator = estimator(0.1);
        drive_forward(&mut estimator, 20);
        let before = estimator.clone();

        assert!(!estimator.add_correction(Correction::new(Position::new(9.0, 9.0), 0.1, 1.0)));
        assert_eq!(estimator, before);
    }

    #[test]
    fn test_correction_without_history_is_ignored() {
        let mut estimator = estimator(1.5);
        assert!(!estimator.add_correction(Correction::new(Position::new(1.0, 1.0), 0.0, 1.0)));
        assert_eq!(estimator.pose(), Pose2D::default());
    }

    #[rstest]
    #[case::position(Correction::new(Position::new(f64::NAN, 0.0), 0.1, 1.0))]
    #[case::timestamp(Correction::new(Position::new(0.0, 0.0), f64::INFINITY, 1.0))]
    #[case::confidence(Correction::new(Position::new(0.0, 0.0), 0.1, f64::NAN))]
    fn test_non_finite_correction_is_ignored(#[case] correction: Correction) {
        let mut estimator = estimator(1.5);
        drive_forward(&mut estimator, 10);
        let before = estimator.clone();
        assert!(!estimator.add_correction(correction));
        assert_eq!(estimator, before);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let mut estimator = estimator(1.5);
        drive_forward(&mut estimator, 10);
        assert!(estimator.add_correction(Correction::new(Position::new(1.0, 2.0), 10.0 * DT, 7.0)));
        assert_abs_diff_eq!(
            estimator.pose().position(),
            Position::new(1.0, 2.0),
            epsilon = EPSILON
        );
    }

    #[test]
    fn test_history_is_bounded_by_window() {
        let mut estimator = estimator(0.1);
        drive_forward(&mut estimator, 200);
        assert!(estimator.history_len() <= 7);
        assert!(estimator.history_len() >= 5);
    }

    #[test]
    fn test_repeated_timestamp_replaces_sample() {
        let mut estimator = estimator(1.5);
        estimator.update_odometry(0.02, Angle::ZERO, &straight(0.1));
        estimator.update_odometry(0.02, Angle::ZERO, &straight(0.2));
        assert_eq!(estimator.history_len(), 1);
        assert_abs_diff_eq!(estimator.pose().x(), 0.2, epsilon = EPSILON);
    }
}
