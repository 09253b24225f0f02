//! Simulated drive hardware and a simulated external position source.
//!
//! Modules reach their targets instantly and report wheel travel integrated over one control
//! period. Wheel slip makes the reported travel fall short of the true motion, which lets the
//! estimate drift away from the simulated truth until corrections pull it back.

use rand::{
    distr::{uniform, Distribution, Uniform},
    SeedableRng,
};
use rand_chacha::ChaCha8Rng;

use crate::{
    domain::{Correction, ModuleState, ModuleTarget, Pose2D, Position, Twist2D, WheelGeometry},
    io::{GyroIo, ModuleInputs, ModuleIo},
};

#[derive(Clone, Debug, PartialEq)]
pub struct SimModuleIo {
    period: f64,
    slip: f64,
    inputs: ModuleInputs,
}

impl SimModuleIo {
    pub fn new(period: f64) -> Self {
        Self::with_slip(period, 0.0)
    }

    /// `slip` is the fraction of the true wheel travel missing from the reported position.
    pub fn with_slip(period: f64, slip: f64) -> Self {
        Self {
            period,
            slip,
            inputs: ModuleInputs::default(),
        }
    }
}

impl ModuleIo for SimModuleIo {
    fn update_inputs(&mut self, inputs: &mut ModuleInputs) {
        self.inputs.drive_position += self.inputs.drive_velocity * self.period * (1.0 - self.slip);
        *inputs = self.inputs;
    }

    fn set_target(&mut self, target: ModuleTarget) {
        let target = target.optimize(self.inputs.turn_angle);
        self.inputs.turn_angle = target.angle;
        self.inputs.drive_velocity = target.speed;
    }
}

/// The simulation has no gyro; heading is dead reckoned from the modules.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimGyroIo;

impl GyroIo for SimGyroIo {}

/// Ground truth of the simulated robot, driven by the measured module states.
#[derive(Clone, Debug, PartialEq)]
pub struct SimChassis {
    geometry: WheelGeometry,
    pose: Pose2D,
}

impl SimChassis {
    pub fn new(geometry: WheelGeometry, pose: Pose2D) -> Self {
        Self { geometry, pose }
    }

    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    pub fn advance(&mut self, states: &[ModuleState; 4], dt: f64) -> Pose2D {
        let velocity = self.geometry.to_chassis_velocity(states);
        self.pose = self.pose.exp(Twist2D::new(
            velocity.vx * dt,
            velocity.vy * dt,
            velocity.omega * dt,
        ));
        self.pose
    }
}

/// Noisy observations of the true position, as a camera-based localizer would report them.
#[derive(Clone, Debug)]
pub struct SimVision {
    rng: ChaCha8Rng,
    noise: Uniform<f64>,
    confidence: f64,
}

impl SimVision {
    /// `noise` bounds the uniform error added to each coordinate, in meters.
    pub fn new(seed: u64, noise: f64, confidence: f64) -> Result<Self, uniform::Error> {
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            noise: Uniform::new_inclusive(-noise, noise)?,
            confidence,
        })
    }

    pub fn observe(&mut self, truth: Pose2D, captured_at: f64) -> Correction {
        let error = Position::new(
            self.noise.sample(&mut self.rng),
            self.noise.sample(&mut self.rng),
        );
        Correction::new(truth.position() + error, captured_at, self.confidence)
            .with_heading(truth.heading())
    }
}
