//! Tuning surface for the detection core.
//!
//! Every constant the detector, threshold model, orientation estimator and
//! aggregator use lives here, with defaults matching the field-calibrated
//! values. Partial JSON files deserialize on top of the defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{HazardError, HazardResult};
use crate::types::VehicleProfile;

/// How broken-patch detection relates to the other two classifiers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokenPatchPolicy {
    /// Shares the window, cooldown and clear-on-fire with speed breaker / pothole.
    #[default]
    Shared,
    /// Own speed history and cooldown; runs during the shared cooldown.
    Independent,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    pub gravity: f64,
    pub static_tolerance: f64,
    pub epoch_ms: i64,
    pub acceptance_ms: i64,
    pub max_updates_per_epoch: u32,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            gravity: 9.80,
            static_tolerance: 0.4,
            epoch_ms: 850,
            acceptance_ms: 1000,
            max_updates_per_epoch: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    // ── Speed scaling ──
    pub base_speed_kmh: f64,
    pub scaling_factor: f64,
    pub speed_average_len: usize,

    // ── Speed breaker ──
    pub speed_breaker_negative_ratio: f64,

    // ── Pothole ──
    pub pothole_min_speed_kmh: f64,

    // ── Broken patch ──
    pub broken_patch_spread_kmh: f64,
    pub broken_patch_max_avg_speed_kmh: f64,
    pub broken_patch_min_abs_z: f64,
    pub broken_patch_spread_samples: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            base_speed_kmh: 20.0,
            scaling_factor: 0.05,
            speed_average_len: 10,
            speed_breaker_negative_ratio: 0.5,
            pothole_min_speed_kmh: 10.0,
            broken_patch_spread_kmh: 15.0,
            broken_patch_max_avg_speed_kmh: 20.0,
            broken_patch_min_abs_z: 0.8,
            broken_patch_spread_samples: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    // ── Session ──
    pub vehicle_profile: VehicleProfile,

    // ── Detector window ──
    pub window_capacity: usize,
    pub window_min_fill: usize,
    pub cooldown_ms: i64,
    pub clear_window_on_fire: bool,
    pub broken_patch_policy: BrokenPatchPolicy,

    // ── Aggregation ──
    pub min_event_speed_kmh: f64,
    pub aggregation_window_ms: i64,
    pub default_confidence: f32,

    // ── Signal conditioning ──
    pub vertical_lpf_alpha: Option<f64>,
    pub gravity_compensation: bool,

    pub orientation: OrientationConfig,
    pub thresholds: ThresholdConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            vehicle_profile: VehicleProfile::TwoWheeler,
            window_capacity: 10,
            window_min_fill: 5,
            cooldown_ms: 2000,
            clear_window_on_fire: true,
            broken_patch_policy: BrokenPatchPolicy::Shared,
            min_event_speed_kmh: 7.0,
            aggregation_window_ms: 2000,
            default_confidence: 0.8,
            vertical_lpf_alpha: None,
            gravity_compensation: false,
            orientation: OrientationConfig::default(),
            thresholds: ThresholdConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// Load a (possibly partial) JSON config; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> HazardResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: DetectorConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HazardResult<()> {
        if self.window_min_fill == 0 {
            return Err(invalid("window_min_fill must be at least 1"));
        }
        if self.window_capacity < self.window_min_fill {
            return Err(invalid(format!(
                "window_capacity ({}) must be >= window_min_fill ({})",
                self.window_capacity, self.window_min_fill
            )));
        }
        if self.cooldown_ms < 0 || self.aggregation_window_ms <= 0 {
            return Err(invalid("cooldown_ms must be >= 0 and aggregation_window_ms > 0"));
        }
        if !self.min_event_speed_kmh.is_finite() || self.min_event_speed_kmh < 0.0 {
            return Err(invalid("min_event_speed_kmh must be a non-negative number"));
        }
        if !(0.0..=1.0).contains(&self.default_confidence) {
            return Err(invalid("default_confidence must be within [0, 1]"));
        }
        if let Some(alpha) = self.vertical_lpf_alpha {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(invalid(format!("vertical_lpf_alpha {alpha} outside (0, 1]")));
            }
        }
        if self.orientation.epoch_ms <= 0 || self.orientation.acceptance_ms <= 0 {
            return Err(invalid("orientation epoch and acceptance windows must be positive"));
        }
        if self.thresholds.speed_average_len == 0 {
            return Err(invalid("speed_average_len must be at least 1"));
        }
        if self.thresholds.broken_patch_spread_samples == 0
            || self.thresholds.broken_patch_spread_samples > self.window_capacity
        {
            return Err(invalid(
                "broken_patch_spread_samples must be within 1..=window_capacity",
            ));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> HazardError {
    HazardError::InvalidConfig(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DetectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_capacity, 10);
        assert_eq!(config.window_min_fill, 5);
        assert_eq!(config.cooldown_ms, 2000);
        assert_eq!(config.aggregation_window_ms, 2000);
        assert!(config.clear_window_on_fire);
        assert_eq!(config.broken_patch_policy, BrokenPatchPolicy::Shared);
    }

    #[test]
    fn test_min_fill_above_capacity_rejected() {
        let config = DetectorConfig {
            window_capacity: 4,
            ..DetectorConfig::default()
        };
        assert!(matches!(config.validate(), Err(HazardError::InvalidConfig(_))));
    }

    #[test]
    fn test_bad_alpha_rejected() {
        let config = DetectorConfig {
            vertical_lpf_alpha: Some(1.5),
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "vehicle_profile": "FOUR_WHEELER",
            "min_event_speed_kmh": 5.0,
            "broken_patch_policy": "independent",
            "thresholds": { "base_speed_kmh": 25.0 }
        }"#;
        let config: DetectorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.vehicle_profile, VehicleProfile::FourWheeler);
        assert_eq!(config.min_event_speed_kmh, 5.0);
        assert_eq!(config.broken_patch_policy, BrokenPatchPolicy::Independent);
        assert_eq!(config.thresholds.base_speed_kmh, 25.0);
        assert_eq!(config.thresholds.scaling_factor, 0.05);
        assert_eq!(config.cooldown_ms, 2000);
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join(format!(
            "road_hazard_config_{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{ "cooldown_ms": 1500 }"#).unwrap();
        let config = DetectorConfig::from_json_file(&path).unwrap();
        assert_eq!(config.cooldown_ms, 1500);
        let _ = std::fs::remove_file(&path);
    }
}
