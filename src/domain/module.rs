//! Swerve modules: identifiers, per-wheel states and the fixed wheel geometry.

use std::{f64::consts::FRAC_PI_2, fmt, slice::Iter};

use nalgebra::{SMatrix, SVector};
use thiserror::Error;

use super::{Angle, ChassisVelocity, Position, Twist2D};

/// Module order used for every four-element array in the crate.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ModuleId {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl ModuleId {
    pub fn iter() -> Iter<'static, ModuleId> {
        static MODULES: [ModuleId; 4] = [
            ModuleId::FrontLeft,
            ModuleId::FrontRight,
            ModuleId::RearLeft,
            ModuleId::RearRight,
        ];
        MODULES.iter()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<usize> for ModuleId {
    type Error = GeometryError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ModuleId::FrontLeft),
            1 => Ok(ModuleId::FrontRight),
            2 => Ok(ModuleId::RearLeft),
            3 => Ok(ModuleId::RearRight),
            _ => Err(GeometryError::InvalidModuleId(value)),
        }
    }
}

/// Wheel linear speed (m/s) and steering angle, either measured or desired.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct ModuleState {
    pub speed: f64,
    pub angle: Angle,
}

/// Desired state sent to a module.
pub type ModuleTarget = ModuleState;

impl ModuleState {
    pub const fn new(speed: f64, angle: Angle) -> Self {
        Self { speed, angle }
    }

    /// Reverses the wheel instead of steering it by more than a quarter turn.
    pub fn optimize(self, current_angle: Angle) -> Self {
        if self.angle.difference(current_angle) > FRAC_PI_2 {
            Self {
                speed: -self.speed,
                angle: self.angle + Angle::new(std::f64::consts::PI),
            }
        } else {
            self
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3} m/s, {})", self.speed, self.angle)
    }
}

/// Cumulative wheel travel (m) and current steering angle.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct ModulePosition {
    pub distance: f64,
    pub angle: Angle,
}

impl ModulePosition {
    pub const fn new(distance: f64, angle: Angle) -> Self {
        Self { distance, angle }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("offset of module {0:?} is not finite")]
    NonFiniteOffset(ModuleId),
    #[error("module offsets do not span a rotation (all modules coincide)")]
    Degenerate,
    #[error("invalid module id {0}")]
    InvalidModuleId(usize),
}

/// Fixed offsets of the module pivot points from the robot's rotation center. The robot's front
/// is facing along the positive x-axis, its left side along the positive y-axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WheelGeometry {
    offsets: [Position; 4],
    forward: SMatrix<f64, 3, 8>,
}

impl WheelGeometry {
    pub fn new(offsets: [Position; 4]) -> Result<Self, GeometryError> {
        for (i, offset) in offsets.iter().enumerate() {
            if !offset.is_finite() {
                return Err(GeometryError::NonFiniteOffset(ModuleId::try_from(i)?));
            }
        }

        // Rows 2i and 2i+1 map (vx, vy, omega) to the x and y velocity of module i.
        let inverse = SMatrix::<f64, 8, 3>::from_fn(|row, col| {
            let offset = offsets[row / 2];
            match (row % 2, col) {
                (0, 0) => 1.0,
                (0, 1) => 0.0,
                (0, _) => -offset.y(),
                (_, 0) => 0.0,
                (_, 1) => 1.0,
                (_, _) => offset.x(),
            }
        });

        if inverse.rank(1e-9) < 3 {
            return Err(GeometryError::Degenerate);
        }
        let forward = inverse
            .pseudo_inverse(1e-9)
            .map_err(|_| GeometryError::Degenerate)?;

        Ok(Self { offsets, forward })
    }

    /// Modules at the corners of a `wheel_base` x `track_width` rectangle centered on the robot.
    pub fn rectangular(wheel_base: f64, track_width: f64) -> Result<Self, GeometryError> {
        let (x, y) = (wheel_base / 2.0, track_width / 2.0);
        Self::new([
            Position::new(x, y),
            Position::new(x, -y),
            Position::new(-x, y),
            Position::new(-x, -y),
        ])
    }

    pub fn offset(&self, module_id: ModuleId) -> Position {
        self.offsets[module_id.index()]
    }

    pub fn offsets(&self) -> &[Position; 4] {
        &self.offsets
    }

    /// Least-squares chassis velocity that best explains the measured module states.
    pub fn to_chassis_velocity(&self, states: &[ModuleState; 4]) -> ChassisVelocity {
        let q = self.forward * Self::stack(states.map(|s| (s.speed, s.angle)));
        ChassisVelocity::new(q[0], q[1], q[2])
    }

    /// Robot-relative motion explained by the wheel travel since the previous sample.
    pub fn to_twist(&self, deltas: &[ModulePosition; 4]) -> Twist2D {
        let q = self.forward * Self::stack(deltas.map(|d| (d.distance, d.angle)));
        Twist2D::new(q[0], q[1], q[2])
    }

    fn stack(vectors: [(f64, Angle); 4]) -> SVector<f64, 8> {
        SVector::<f64, 8>::from_fn(|row, _| {
            let (magnitude, angle) = vectors[row / 2];
            if row % 2 == 0 {
                magnitude * angle.cos()
            } else {
                magnitude * angle.sin()
            }
        })
    }
}
