use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{FusionError, FusionResult};
use crate::types::SensorKind;

/// Process-model tuning for one axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisConfig {
    /// Added to |u| to form the process-noise sigma [m/s²]
    pub accel_noise_floor: f64,
    /// Predicted velocity is clamped to ±limit [m/s]
    pub velocity_limit: f64,
}

impl AxisConfig {
    pub fn horizontal() -> Self {
        Self { accel_noise_floor: 0.1, velocity_limit: 10.0 }
    }

    pub fn vertical() -> Self {
        Self { accel_noise_floor: 0.1, velocity_limit: 3.0 }
    }
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self::horizontal()
    }
}

/// Per-axis overrides; fields left out keep that axis' default
#[derive(Deserialize)]
struct AxisOverrides {
    accel_noise_floor: Option<f64>,
    velocity_limit: Option<f64>,
}

impl AxisOverrides {
    fn apply(self, base: AxisConfig) -> AxisConfig {
        AxisConfig {
            accel_noise_floor: self.accel_noise_floor.unwrap_or(base.accel_noise_floor),
            velocity_limit: self.velocity_limit.unwrap_or(base.velocity_limit),
        }
    }
}

fn horizontal_axis<'de, D: Deserializer<'de>>(d: D) -> Result<AxisConfig, D::Error> {
    Ok(AxisOverrides::deserialize(d)?.apply(AxisConfig::horizontal()))
}

fn vertical_axis<'de, D: Deserializer<'de>>(d: D) -> Result<AxisConfig, D::Error> {
    Ok(AxisOverrides::deserialize(d)?.apply(AxisConfig::vertical()))
}

/// Measurement variances. `inf` disables a channel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementNoise {
    pub gps_x: f64,
    pub gps_y: f64,
    pub gps_z: f64,
    pub ground_speed_y: f64,
    pub ultrasonic: f64,
    pub barometer: f64,
}

impl Default for MeasurementNoise {
    fn default() -> Self {
        Self {
            gps_x: 4.0,
            gps_y: 4.0,
            gps_z: 9.0,
            ground_speed_y: 0.25,
            ultrasonic: 6.25e-6,
            barometer: 0.25,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    // ── Event queue ──
    pub queue_capacity: usize,
    pub idle_timeout_ms: u64,

    // ── Liveness ──
    pub sensor_timeout_ms: u64,
    pub timeout_exempt: Vec<SensorKind>,

    // ── Filters ──
    pub symmetrize_covariance: bool,
    #[serde(deserialize_with = "horizontal_axis")]
    pub x_axis: AxisConfig,
    #[serde(deserialize_with = "horizontal_axis")]
    pub y_axis: AxisConfig,
    #[serde(deserialize_with = "vertical_axis")]
    pub z_axis: AxisConfig,
    pub noise: MeasurementNoise,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            idle_timeout_ms: 5_000,
            sensor_timeout_ms: 1_000,
            // GPS fixes are slow and irregular
            timeout_exempt: vec![SensorKind::Position],
            symmetrize_covariance: true,
            x_axis: AxisConfig::horizontal(),
            y_axis: AxisConfig::horizontal(),
            z_axis: AxisConfig::vertical(),
            noise: MeasurementNoise::default(),
        }
    }
}

impl FusionConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> FusionResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            FusionError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> FusionResult<Self> {
        let config: FusionConfig = serde_json::from_str(text)
            .map_err(|e| FusionError::InvalidConfig(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FusionResult<()> {
        // Flush policy needs at least one slot beyond the "one free" threshold
        if self.queue_capacity < 2 {
            return Err(FusionError::InvalidConfig(format!(
                "queue_capacity must be at least 2, got {}",
                self.queue_capacity
            )));
        }
        if self.idle_timeout_ms == 0 {
            return Err(FusionError::InvalidConfig("idle_timeout_ms must be positive".into()));
        }
        if self.checked_sensor_timeout_us().is_none() {
            return Err(FusionError::InvalidConfig(format!(
                "sensor_timeout_ms out of range, got {}",
                self.sensor_timeout_ms
            )));
        }

        for (name, axis) in [("x_axis", &self.x_axis), ("y_axis", &self.y_axis), ("z_axis", &self.z_axis)] {
            if !(axis.velocity_limit > 0.0) {
                return Err(FusionError::InvalidConfig(format!(
                    "{name}.velocity_limit must be positive, got {}",
                    axis.velocity_limit
                )));
            }
            if !(axis.accel_noise_floor >= 0.0) || !axis.accel_noise_floor.is_finite() {
                return Err(FusionError::InvalidConfig(format!(
                    "{name}.accel_noise_floor must be finite and non-negative, got {}",
                    axis.accel_noise_floor
                )));
            }
        }

        let n = &self.noise;
        for (name, var) in [
            ("gps_x", n.gps_x),
            ("gps_y", n.gps_y),
            ("gps_z", n.gps_z),
            ("ground_speed_y", n.ground_speed_y),
            ("ultrasonic", n.ultrasonic),
            ("barometer", n.barometer),
        ] {
            // NaN fails this comparison too
            if !(var >= 0.0) {
                return Err(FusionError::InvalidConfig(format!(
                    "noise.{name} must be a non-negative variance, got {var}"
                )));
            }
        }
        Ok(())
    }

    /// Saturates for values `validate` rejects
    pub fn sensor_timeout_us(&self) -> i64 {
        self.checked_sensor_timeout_us().unwrap_or(i64::MAX)
    }

    fn checked_sensor_timeout_us(&self) -> Option<i64> {
        i64::try_from(self.sensor_timeout_ms).ok().and_then(|ms| ms.checked_mul(1_000))
    }
}
