//! Runtime configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then environment variables
//! prefixed with `SWERVE__` (for example `SWERVE__DRIVE__PERIOD=0.01`).

use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::{domain::ShaperConfig, io::Backend};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("{field} must be positive and finite, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} must be finite and not negative, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} must be within [0, 1], got {value}")]
    NotFraction { field: &'static str, value: f64 },
    #[error("correction queue capacity must not be zero")]
    ZeroCapacity,
}

/// Chassis dimensions and loop timing.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriveConfig {
    /// Distance between front and rear module pivots, m.
    pub wheel_base: f64,
    /// Distance between left and right module pivots, m.
    pub track_width: f64,
    /// Control loop period, s.
    pub period: f64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            wheel_base: 0.6731,
            track_width: 0.6731,
            period: 0.02,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct EstimatorConfig {
    /// How far back corrections may refer, s.
    pub history_window: f64,
    pub queue_capacity: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            history_window: 1.5,
            queue_capacity: 16,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    pub wheel_slip: f64,
    pub vision_period: f64,
    pub vision_latency: f64,
    pub vision_noise: f64,
    pub vision_confidence: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 2502,
            wheel_slip: 0.03,
            vision_period: 0.1,
            vision_latency: 0.06,
            vision_noise: 0.02,
            vision_confidence: 0.2,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SwerveConfig {
    pub backend: Backend,
    pub drive: DriveConfig,
    pub shaper: ShaperConfig,
    pub estimator: EstimatorConfig,
    pub sim: SimConfig,
}

impl SwerveConfig {
    /// Loads the file at `path` if it exists and applies environment overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        info!(path, "Loading configuration");

        let builder = Config::builder()
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("SWERVE")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: SwerveConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("drive.wheel_base", self.drive.wheel_base),
            ("drive.track_width", self.drive.track_width),
            ("drive.period", self.drive.period),
            ("shaper.max_speed", self.shaper.max_speed),
            ("shaper.max_angular_speed", self.shaper.max_angular_speed),
            ("shaper.direction_slew_rate", self.shaper.direction_slew_rate),
            ("shaper.magnitude_slew_rate", self.shaper.magnitude_slew_rate),
            ("shaper.rotational_slew_rate", self.shaper.rotational_slew_rate),
            ("estimator.history_window", self.estimator.history_window),
            ("sim.vision_period", self.sim.vision_period),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive { field, value });
            }
        }

        for (field, value) in [
            ("sim.vision_latency", self.sim.vision_latency),
            ("sim.vision_noise", self.sim.vision_noise),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Negative { field, value });
            }
        }

        for (field, value) in [
            ("sim.wheel_slip", self.sim.wheel_slip),
            ("sim.vision_confidence", self.sim.vision_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::NotFraction { field, value });
            }
        }

        if self.estimator.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        Ok(())
    }
}
