//! Operator command shaping.
//!
//! Joystick translation is rate limited in polar coordinates: the magnitude ramps linearly while
//! the direction slews at a rate inversely proportional to the current speed. This bounds the
//! lateral acceleration of the robot and keeps it from skidding through sharp direction changes.

use std::f64::consts::PI;

use serde::Deserialize;

use super::{Angle, ChassisVelocity};

/// Direction slew rate used while the robot stands still, high enough to be instantaneous.
const STANDSTILL_DIRECTION_SLEW_RATE: f64 = 500.0;
/// Magnitude below which a reversing command may flip the travel direction.
const MAGNITUDE_EPSILON: f64 = 1e-4;
const SMALL_TURN: f64 = 0.45 * PI;
const REVERSAL: f64 = 0.85 * PI;

/// Limits the rate of change of a signal to `rate` units per second in either direction.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SlewRateLimiter {
    rate: f64,
    value: f64,
}

impl SlewRateLimiter {
    pub fn new(rate: f64) -> Self {
        Self { rate, value: 0.0 }
    }

    pub fn calculate(&mut self, input: f64, elapsed: f64) -> f64 {
        let max_change = self.rate * elapsed.max(0.0);
        self.value += (input - self.value).clamp(-max_change, max_change);
        self.value
    }

    pub fn reset(&mut self, value: f64) {
        self.value = value;
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShaperConfig {
    /// m/s at full stick deflection.
    pub max_speed: f64,
    /// rad/s at full stick deflection.
    pub max_angular_speed: f64,
    /// rad/s at full translation magnitude.
    pub direction_slew_rate: f64,
    /// Normalized magnitude per second.
    pub magnitude_slew_rate: f64,
    /// Normalized rotation per second.
    pub rotational_slew_rate: f64,
}

impl Default for ShaperConfig {
    fn default() -> Self {
        Self {
            max_speed: 4.8,
            max_angular_speed: 2.0 * PI,
            direction_slew_rate: 1.2,
            magnitude_slew_rate: 1.8,
            rotational_slew_rate: 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct SlewState {
    current_magnitude: f64,
    current_direction: Angle,
    last_update_time: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VelocityShaper {
    config: ShaperConfig,
    state: SlewState,
    magnitude_limiter: SlewRateLimiter,
    rotation_limiter: SlewRateLimiter,
}

impl VelocityShaper {
    pub fn new(config: ShaperConfig, now: f64) -> Self {
        Self {
            config,
            state: SlewState {
                last_update_time: now,
                ..SlewState::default()
            },
            magnitude_limiter: SlewRateLimiter::new(config.magnitude_slew_rate),
            rotation_limiter: SlewRateLimiter::new(config.rotational_slew_rate),
        }
    }

    pub fn config(&self) -> &ShaperConfig {
        &self.config
    }

    /// Converts normalized stick axes in `[-1, 1]` into a chassis velocity in physical units.
    /// The frame of the result is the frame the axes were given in.
    pub fn shape(
        &mut self,
        x_speed: f64,
        y_speed: f64,
        rot: f64,
        rate_limit: bool,
        now: f64,
    ) -> ChassisVelocity {
        if !rate_limit {
            return ChassisVelocity::new(
                x_speed * self.config.max_speed,
                y_speed * self.config.max_speed,
                rot * self.config.max_angular_speed,
            );
        }

        let elapsed = (now - self.state.last_update_time).max(0.0);
        self.state.last_update_time = now;

        let requested_direction = Angle::new(y_speed.atan2(x_speed));
        let requested_magnitude = x_speed.hypot(y_speed);

        let direction_slew_rate = if self.state.current_magnitude != 0.0 {
            (self.config.direction_slew_rate / self.state.current_magnitude).abs()
        } else {
            STANDSTILL_DIRECTION_SLEW_RATE
        };
        let max_step = direction_slew_rate * elapsed;

        let state = &mut self.state;
        let angle_difference = requested_direction.difference(state.current_direction);
        if angle_difference < SMALL_TURN {
            state.current_direction =
                state.current_direction.step_toward(requested_direction, max_step);
            state.current_magnitude =
                self.magnitude_limiter.calculate(requested_magnitude, elapsed);
        } else if angle_difference > REVERSAL {
            if state.current_magnitude > MAGNITUDE_EPSILON {
                state.current_magnitude = self.magnitude_limiter.calculate(0.0, elapsed);
            } else {
                state.current_direction = state.current_direction + Angle::new(PI);
                state.current_magnitude =
                    self.magnitude_limiter.calculate(requested_magnitude, elapsed);
            }
        } else {
            state.current_direction =
                state.current_direction.step_toward(requested_direction, max_step);
            state.current_magnitude = self.magnitude_limiter.calculate(0.0, elapsed);
        }

        let rotation = self.rotation_limiter.calculate(rot, elapsed);

        ChassisVelocity::new(
            state.current_magnitude * state.current_direction.cos() * self.config.max_speed,
            state.current_magnitude * state.current_direction.sin() * self.config.max_speed,
            rotation * self.config.max_angular_speed,
        )
    }

    /// Normalized translation magnitude after shaping.
    pub fn current_magnitude(&self) -> f64 {
        self.state.current_magnitude
    }

    pub fn current_direction(&self) -> Angle {
        self.state.current_direction
    }
}
