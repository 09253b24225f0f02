//! The drive orchestrator.
//!
//! `Drive` owns the hardware capability and every stateful core component. It is driven by a
//! fixed-period loop: `periodic` once per tick to refresh sensors and the pose estimate, then one
//! of the command methods to emit module targets.

use std::time::Instant;

use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::{
    config::SwerveConfig,
    corrections::CorrectionReceiver,
    domain::{
        Angle, ChassisVelocity, Frame, GeometryError, HeadingTracker, KinematicsSolver,
        ModulePosition, ModuleState, ModuleTarget, Pose2D, PoseEstimator, VelocityShaper,
        WheelGeometry,
    },
    io::{DriveIo, GyroInputs, ModuleInputs},
};

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic seconds since the first call, the time base for every `now` argument.
pub fn clock() -> f64 {
    (Instant::now() - *EPOCH).as_secs_f64()
}

pub struct Drive {
    io: DriveIo,
    module_inputs: [ModuleInputs; 4],
    gyro_inputs: GyroInputs,
    shaper: VelocityShaper,
    solver: KinematicsSolver,
    heading: HeadingTracker,
    estimator: PoseEstimator,
    corrections: CorrectionReceiver,
    max_speed: f64,
    period: f64,
    last_update: f64,
    commanded: ChassisVelocity,
}

impl Drive {
    pub fn new(
        config: &SwerveConfig,
        io: DriveIo,
        corrections: CorrectionReceiver,
        now: f64,
    ) -> Result<Self, GeometryError> {
        let geometry =
            WheelGeometry::rectangular(config.drive.wheel_base, config.drive.track_width)?;

        let mut drive = Self {
            io,
            module_inputs: [ModuleInputs::default(); 4],
            gyro_inputs: GyroInputs::default(),
            shaper: VelocityShaper::new(config.shaper, now),
            solver: KinematicsSolver::new(geometry),
            heading: HeadingTracker::new(geometry),
            estimator: PoseEstimator::new(
                geometry,
                Angle::ZERO,
                &[ModulePosition::default(); 4],
                Pose2D::default(),
                config.estimator.history_window,
            ),
            corrections,
            max_speed: config.shaper.max_speed,
            period: config.drive.period,
            last_update: now,
            commanded: ChassisVelocity::default(),
        };

        drive.read_inputs();
        let heading = drive
            .heading
            .update(drive.gyro_sensor(), &drive.module_states(), 0.0);
        drive
            .estimator
            .reset_pose(heading, &drive.module_positions(), Pose2D::default());

        info!(
            gyro_connected = drive.gyro_inputs.connected,
            period = drive.period,
            "Drive initialized"
        );
        Ok(drive)
    }

    /// Refreshes sensor inputs, the heading and the pose estimate, then applies pending
    /// corrections.
    pub fn periodic(&mut self, now: f64) {
        let was_connected = self.gyro_inputs.connected;
        self.read_inputs();

        match (was_connected, self.gyro_inputs.connected) {
            (true, false) => warn!("Gyro disconnected, dead reckoning heading from module states"),
            (false, true) => warn!("Gyro connected, using its heading"),
            _ => {}
        }

        let dt = now - self.last_update;
        self.last_update = now;

        let states = self.module_states();
        let heading = self.heading.update(self.gyro_sensor(), &states, dt);
        let pose = self
            .estimator
            .update_odometry(now, heading, &self.module_positions());

        for correction in self.corrections.drain() {
            self.estimator.add_correction(correction);
        }

        debug!(
            now,
            %pose,
            corrected = %self.estimator.pose(),
            "Drive periodic"
        );
    }

    /// Drives with normalized stick axes in `[-1, 1]`. Field-relative axes are converted using
    /// the estimated heading.
    pub fn drive(
        &mut self,
        x_speed: f64,
        y_speed: f64,
        rot: f64,
        frame: Frame,
        rate_limit: bool,
        now: f64,
    ) {
        let velocity = self.shaper.shape(x_speed, y_speed, rot, rate_limit, now);
        let velocity = match frame {
            Frame::Field => {
                ChassisVelocity::from_field_relative(velocity, self.estimator.pose().heading())
            }
            Frame::Robot => velocity,
        };
        let targets = self.solver.solve(velocity);
        self.set_module_targets(targets);
    }

    /// Drives with a robot-relative velocity in physical units, e.g. from a path follower.
    /// `discretize` compensates the drift of translating while rotating over one period.
    pub fn drive_chassis(&mut self, velocity: ChassisVelocity, discretize: bool) {
        let velocity = if discretize {
            velocity.discretize(self.period)
        } else {
            velocity
        };
        let targets = self.solver.solve(velocity);
        self.set_module_targets(targets);
    }

    /// Sets the wheels into an X formation to prevent movement.
    pub fn set_cross(&mut self) {
        let targets = self.solver.lock();
        self.commanded = ChassisVelocity::default();
        self.emit(targets);
    }

    pub fn set_module_targets(&mut self, targets: [ModuleTarget; 4]) {
        let targets = KinematicsSolver::desaturate(targets, self.max_speed);
        self.commanded = self.solver.geometry().to_chassis_velocity(&targets);
        self.emit(targets);
    }

    pub fn zero_heading(&mut self) {
        self.io.gyro.zero();
        if !self.gyro_inputs.connected {
            self.heading.zero();
        }
    }

    /// Gyro heading, zero when no gyro is connected.
    pub fn heading(&self) -> Angle {
        if self.gyro_inputs.connected {
            self.gyro_inputs.yaw
        } else {
            Angle::ZERO
        }
    }

    /// rad/s as reported by the gyro.
    pub fn turn_rate(&self) -> f64 {
        self.gyro_inputs.yaw_rate
    }

    /// Heading fed to the estimator, from the gyro or dead reckoned.
    pub fn tracked_heading(&self) -> Angle {
        self.heading.heading()
    }

    pub fn pose(&self) -> Pose2D {
        self.estimator.pose()
    }

    pub fn reset_pose(&mut self, pose: Pose2D) {
        info!(%pose, "Resetting pose");
        self.estimator
            .reset_pose(self.heading.heading(), &self.module_positions(), pose);
    }

    pub fn module_states(&self) -> [ModuleState; 4] {
        self.module_inputs
            .map(|inputs| ModuleState::new(inputs.drive_velocity, inputs.turn_angle))
    }

    pub fn module_positions(&self) -> [ModulePosition; 4] {
        self.module_inputs
            .map(|inputs| ModulePosition::new(inputs.drive_position, inputs.turn_angle))
    }

    /// Robot-relative velocity implied by the last emitted targets.
    pub fn commanded_velocity(&self) -> ChassisVelocity {
        self.commanded
    }

    fn read_inputs(&mut self) {
        self.io.gyro.update_inputs(&mut self.gyro_inputs);
        for (module, inputs) in self.io.modules.iter_mut().zip(self.module_inputs.iter_mut()) {
            module.update_inputs(inputs);
        }
    }

    fn gyro_sensor(&self) -> Option<Angle> {
        self.gyro_inputs.connected.then_some(self.gyro_inputs.yaw)
    }

    fn emit(&mut self, targets: [ModuleTarget; 4]) {
        for (module, target) in self.io.modules.iter_mut().zip(targets) {
            module.set_target(target);
        }
    }
}
