use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tunables of a tracking session. Every field has a default so a config
/// file only needs to list what it overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub max_accuracy_m: f64,
    pub max_fix_age_s: f64,
    pub max_speed_mps: f64,
    pub outlier_jump_m: f64,
    pub segments_per_point: usize,
    pub animation_duration_s: f64,
    pub confirm_threshold_m: f64,
    pub sim_accel_mps2: f64,
    pub sim_decel_mps2: f64,
    pub sim_max_speed_mps: f64,
    pub sim_tick_interval_s: f64,
    // below this the live speed readout shows 0
    pub stationary_speed_mps: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: 100.0,
            max_fix_age_s: 10.0,
            max_speed_mps: 83.3,
            outlier_jump_m: 1000.0,
            segments_per_point: 5,
            animation_duration_s: 0.15,
            confirm_threshold_m: 1.0,
            sim_accel_mps2: 5.0,
            sim_decel_mps2: 8.0,
            sim_max_speed_mps: 16.67,
            sim_tick_interval_s: 0.5,
            stationary_speed_mps: 1.5,
        }
    }
}

impl TrackingConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config {}: {}", path.display(), e))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: TrackingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_accuracy_m", self.max_accuracy_m),
            ("max_fix_age_s", self.max_fix_age_s),
            ("max_speed_mps", self.max_speed_mps),
            ("outlier_jump_m", self.outlier_jump_m),
            ("animation_duration_s", self.animation_duration_s),
            ("sim_accel_mps2", self.sim_accel_mps2),
            ("sim_decel_mps2", self.sim_decel_mps2),
            ("sim_max_speed_mps", self.sim_max_speed_mps),
            ("sim_tick_interval_s", self.sim_tick_interval_s),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                bail!("Invalid config: `{}` must be positive, got {}", name, value);
            }
        }

        let non_negative = [
            ("confirm_threshold_m", self.confirm_threshold_m),
            ("stationary_speed_mps", self.stationary_speed_mps),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                bail!(
                    "Invalid config: `{}` must not be negative, got {}",
                    name,
                    value
                );
            }
        }

        if self.segments_per_point == 0 {
            bail!("Invalid config: `segments_per_point` must be at least 1");
        }
        Ok(())
    }
}
