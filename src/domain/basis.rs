//! Basic building blocks.

use std::{
    f64::consts::PI,
    fmt,
    ops::{Add, Mul, Neg, Sub},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Position {
    x: f64,
    y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance(&self, position: Self) -> f64 {
        (*self - position).norm()
    }

    pub fn rotate_vector(&self, angle: Angle) -> Position {
        Position::new(
            self.x * angle.cos() - self.y * angle.sin(),
            self.x * angle.sin() + self.y * angle.cos(),
        )
    }

    /// Direction of the vector from the origin. Zero for the null vector.
    pub fn angle(&self) -> Angle {
        Angle::new(self.y.atan2(self.x))
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<Position> for (f64, f64) {
    fn from(value: Position) -> Self {
        (value.x, value.y)
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Mul<f64> for Position {
    type Output = Position;

    fn mul(self, rhs: f64) -> Self::Output {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

/// Planar angle in radians, kept in `[-PI, PI)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Angle(f64);

impl Angle {
    pub const ZERO: Angle = Angle(0.0);

    pub fn new(radians: f64) -> Self {
        let wrapped = (radians + PI).rem_euclid(2.0 * PI) - PI;
        // rem_euclid may round up to exactly 2 PI for tiny negative inputs
        if wrapped >= PI {
            Self(wrapped - 2.0 * PI)
        } else {
            Self(wrapped)
        }
    }

    pub fn from_deg(degree: f64) -> Self {
        Self::new(degree * PI / 180.0)
    }

    pub fn to_deg(self) -> f64 {
        self.0 * (180.0 / PI)
    }

    pub fn radians(self) -> f64 {
        self.0
    }

    pub fn cos(self) -> f64 {
        self.0.cos()
    }

    pub fn sin(self) -> f64 {
        self.0.sin()
    }

    /// Absolute value of the shortest rotation between both angles, in `[0, PI]`.
    pub fn difference(self, other: Angle) -> f64 {
        (self - other).0.abs()
    }

    /// Moves toward `target` along the shorter arc by at most `max_step` radians.
    pub fn step_toward(self, target: Angle, max_step: f64) -> Angle {
        let delta = (target - self).0;
        if delta.abs() <= max_step {
            target
        } else {
            Angle::new(self.0 + delta.signum() * max_step)
        }
    }
}

impl Neg for Angle {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Angle::new(-self.0)
    }
}

impl Add for Angle {
    type Output = Angle;

    fn add(self, rhs: Self) -> Self::Output {
        Angle::new(self.0 + rhs.0)
    }
}

impl Sub for Angle {
    type Output = Angle;

    fn sub(self, rhs: Self) -> Self::Output {
        Angle::new(self.0 - rhs.0)
    }
}

impl From<Angle> for f64 {
    fn from(value: Angle) -> Self {
        value.0
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} rad", self.0)
    }
}

/// Robot position and orientation in the field frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Pose2D {
    position: Position,
    heading: Angle,
}

impl Pose2D {
    pub const fn new(position: Position, heading: Angle) -> Self {
        Self { position, heading }
    }

    pub fn x(&self) -> f64 {
        self.position.x
    }

    pub fn y(&self) -> f64 {
        self.position.y
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn heading(&self) -> Angle {
        self.heading
    }

    pub fn with_position(self, position: Position) -> Self {
        Self { position, ..self }
    }

    pub fn with_heading(self, heading: Angle) -> Self {
        Self { heading, ..self }
    }

    /// Applies a robot-relative twist assuming constant curvature over the step.
    pub fn exp(&self, twist: Twist2D) -> Pose2D {
        let Twist2D { dx, dy, dtheta } = twist;
        let (s, c) = if dtheta.abs() < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (dtheta.sin() / dtheta, (1.0 - dtheta.cos()) / dtheta)
        };
        let local = Position::new(dx * s - dy * c, dx * c + dy * s);

        Pose2D {
            position: self.position + local.rotate_vector(self.heading),
            heading: self.heading + Angle::new(dtheta),
        }
    }
}

impl fmt::Display for Pose2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(x: {:.3} m, y: {:.3} m, θ: {})",
            self.position.x, self.position.y, self.heading
        )
    }
}

/// Incremental robot-relative motion.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Twist2D {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

impl Twist2D {
    pub const fn new(dx: f64, dy: f64, dtheta: f64) -> Self {
        Self { dx, dy, dtheta }
    }
}

/// Reference frame of a chassis velocity.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Frame {
    Field,
    Robot,
}

/// Translational (m/s) and angular (rad/s) velocity of the chassis. The frame is given by the
/// context the value is used in.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChassisVelocity {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

impl ChassisVelocity {
    pub const fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    pub fn translation(&self) -> Position {
        Position::new(self.vx, self.vy)
    }

    /// Converts a field-relative velocity into the robot frame of a robot facing `heading`.
    pub fn from_field_relative(field: ChassisVelocity, heading: Angle) -> ChassisVelocity {
        let robot = field.translation().rotate_vector(-heading);
        ChassisVelocity::new(robot.x(), robot.y(), field.omega)
    }

    /// Converts a robot-relative velocity into the field frame.
    pub fn to_field_relative(&self, heading: Angle) -> ChassisVelocity {
        let field = self.translation().rotate_vector(heading);
        ChassisVelocity::new(field.x(), field.y(), self.omega)
    }

    /// Returns the constant velocity that, integrated along an arc for `dt`, ends at the pose a
    /// straight-line integration of `self` would reach. Compensates translational drift while
    /// rotating over a finite tick.
    pub fn discretize(&self, dt: f64) -> ChassisVelocity {
        if dt <= 0.0 {
            return *self;
        }

        let dtheta = self.omega * dt;
        let half_dtheta = dtheta / 2.0;
        let cos_minus_one = dtheta.cos() - 1.0;
        let half_theta_by_tan = if cos_minus_one.abs() < 1e-9 {
            1.0 - dtheta * dtheta / 12.0
        } else {
            -(half_dtheta * dtheta.sin()) / cos_minus_one
        };

        let (tx, ty) = (self.vx * dt, self.vy * dt);
        let dx = half_theta_by_tan * tx + half_dtheta * ty;
        let dy = -half_dtheta * tx + half_theta_by_tan * ty;

        ChassisVelocity::new(dx / dt, dy / dt, dtheta / dt)
    }
}

impl fmt::Display for ChassisVelocity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(vx: {:.2} m/s, vy: {:.2} m/s, ω: {:.2} rad/s)",
            self.vx, self.vy, self.omega
        )
    }
}
