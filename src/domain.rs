//! The domain module holds the drive logic: geometry, kinematics, command shaping and pose
//! estimation. Nothing in here talks to hardware, clocks or threads; callers pass time and sensor
//! readings in explicitly.

mod basis;
mod estimator;
mod heading;
mod kinematics;
mod module;
mod shaper;

pub use basis::{Angle, ChassisVelocity, Frame, Pose2D, Position, Twist2D};
pub use estimator::{Correction, PoseEstimator};
pub use heading::HeadingTracker;
pub use kinematics::KinematicsSolver;
pub use module::{
    GeometryError, ModuleId, ModulePosition, ModuleState, ModuleTarget, WheelGeometry,
};
pub use shaper::{ShaperConfig, SlewRateLimiter, VelocityShaper};
