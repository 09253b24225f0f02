//! Hardware capability boundary of the drive.
//!
//! Every backend provides the same capability: fill in the latest sensor readings and accept
//! module targets. Which backend is used is decided once when the drive is assembled.

use serde::Deserialize;

use crate::domain::{Angle, ModuleTarget};

/// Latest readings of a single swerve module.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ModuleInputs {
    /// Cumulative wheel travel in meters.
    pub drive_position: f64,
    /// Wheel speed in m/s.
    pub drive_velocity: f64,
    pub turn_angle: Angle,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GyroInputs {
    pub connected: bool,
    pub yaw: Angle,
    /// rad/s, counter-clockwise positive
    pub yaw_rate: f64,
}

/// A single swerve module. The defaults do nothing, which is how a replayed log behaves: inputs
/// are filled in from recorded data and outputs are discarded.
pub trait ModuleIo: Send {
    fn update_inputs(&mut self, _inputs: &mut ModuleInputs) {}

    fn set_target(&mut self, _target: ModuleTarget) {}
}

pub trait GyroIo: Send {
    fn update_inputs(&mut self, _inputs: &mut GyroInputs) {}

    fn zero(&mut self) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopModuleIo;

impl ModuleIo for NoopModuleIo {}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopGyroIo;

impl GyroIo for NoopGyroIo {}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Real,
    #[default]
    Sim,
    Replay,
}

/// The four modules, in `ModuleId` order, and the gyro.
pub struct DriveIo {
    pub modules: [Box<dyn ModuleIo>; 4],
    pub gyro: Box<dyn GyroIo>,
}

impl DriveIo {
    pub fn real(modules: [Box<dyn ModuleIo>; 4], gyro: Box<dyn GyroIo>) -> Self {
        Self { modules, gyro }
    }

    /// Modules that reach their targets within one period, and no gyro.
    pub fn sim(period: f64, wheel_slip: f64) -> Self {
        use crate::simulator::{SimGyroIo, SimModuleIo};

        Self {
            modules: [(); 4].map(|_| {
                Box::new(SimModuleIo::with_slip(period, wheel_slip)) as Box<dyn ModuleIo>
            }),
            gyro: Box::new(SimGyroIo),
        }
    }

    pub fn replay() -> Self {
        Self {
            modules: [(); 4].map(|_| Box::new(NoopModuleIo) as Box<dyn ModuleIo>),
            gyro: Box::new(NoopGyroIo),
        }
    }
}
