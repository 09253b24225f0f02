//! Inverse kinematics of a four-wheel independently-steered drive.

use super::{Angle, ChassisVelocity, ModuleId, ModuleTarget, WheelGeometry};

/// Below this speed a module keeps its previous steering angle.
const STANDSTILL_SPEED: f64 = 1e-6;

/// Maps robot-relative chassis velocities to module targets.
///
/// The solver remembers the last commanded steering angles so that stationary modules do not
/// snap back to a default orientation.
#[derive(Clone, Debug, PartialEq)]
pub struct KinematicsSolver {
    geometry: WheelGeometry,
    headings: [Angle; 4],
}

impl KinematicsSolver {
    pub fn new(geometry: WheelGeometry) -> Self {
        Self {
            geometry,
            headings: [Angle::ZERO; 4],
        }
    }

    pub fn geometry(&self) -> &WheelGeometry {
        &self.geometry
    }

    /// Module velocity is `v + omega x r` for each module offset `r`.
    pub fn solve(&mut self, velocity: ChassisVelocity) -> [ModuleTarget; 4] {
        let mut targets = [ModuleTarget::default(); 4];

        for module_id in ModuleId::iter() {
            let i = module_id.index();
            let r = self.geometry.offset(*module_id);
            let vx = velocity.vx - velocity.omega * r.y();
            let vy = velocity.vy + velocity.omega * r.x();
            let speed = vx.hypot(vy);

            if speed >= STANDSTILL_SPEED {
                self.headings[i] = Angle::new(vy.atan2(vx));
            }
            targets[i] = ModuleTarget::new(speed, self.headings[i]);
        }

        targets
    }

    /// Scales all module speeds by the same factor so that none exceeds `max_speed`. Ratios
    /// between modules, and with them the commanded curvature, are preserved.
    pub fn desaturate(targets: [ModuleTarget; 4], max_speed: f64) -> [ModuleTarget; 4] {
        let fastest = targets
            .iter()
            .map(|t| t.speed.abs())
            .fold(0.0, f64::max);

        if fastest <= max_speed {
            return targets;
        }

        let factor = max_speed / fastest;
        targets.map(|t| ModuleTarget::new(t.speed * factor, t.angle))
    }

    /// X formation: every wheel perpendicular to its diagonal so the robot resists being pushed.
    pub fn locked() -> [ModuleTarget; 4] {
        [
            ModuleTarget::new(0.0, Angle::from_deg(45.0)),
            ModuleTarget::new(0.0, Angle::from_deg(-45.0)),
            ModuleTarget::new(0.0, Angle::from_deg(-45.0)),
            ModuleTarget::new(0.0, Angle::from_deg(45.0)),
        ]
    }

    /// Marks the locked formation as the last commanded steering angles.
    pub fn lock(&mut self) -> [ModuleTarget; 4] {
        let targets = Self::locked();
        self.headings = targets.map(|t| t.angle);
        targets
    }
}
