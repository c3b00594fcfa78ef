//! Speed- and vehicle-dependent detection thresholds.
//!
//! Heavier vehicles with stiffer suspensions transmit less vibration per
//! bump, so their base thresholds are lower. Above the base speed the
//! incidental vibration grows too, and both thresholds are scaled up
//! linearly with the moving-average speed.

use crate::config::ThresholdConfig;
use crate::smoothing::SpeedHistory;
use crate::types::{ThresholdPair, VehicleProfile};

/// Empirically calibrated (speed breaker, pothole) thresholds in m/s².
pub fn base_thresholds(profile: VehicleProfile) -> ThresholdPair {
    let (speed_breaker, pothole) = match profile {
        VehicleProfile::TwoWheeler => (1.8, 0.714),
        VehicleProfile::ThreeWheeler => (1.47, 0.612),
        VehicleProfile::FourWheeler | VehicleProfile::Bus => (1.08, 0.41),
    };
    ThresholdPair {
        speed_breaker,
        pothole,
    }
}

#[derive(Clone, Debug)]
pub struct ThresholdModel {
    config: ThresholdConfig,
}

impl ThresholdModel {
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }

    pub fn speed_factor(&self, avg_speed_kmh: f64) -> f64 {
        if avg_speed_kmh > self.config.base_speed_kmh {
            1.0 + (avg_speed_kmh - self.config.base_speed_kmh) * self.config.scaling_factor
                / self.config.base_speed_kmh
        } else {
            1.0
        }
    }

    pub fn thresholds(&self, profile: VehicleProfile, speed_history: &SpeedHistory) -> ThresholdPair {
        let avg_speed = speed_history.average();
        let base = base_thresholds(profile);
        let factor = self.speed_factor(avg_speed);

        let pair = ThresholdPair {
            speed_breaker: base.speed_breaker * factor,
            pothole: base.pothole * factor,
        };

        log::debug!(
            "Dynamic Thresholds -> AvgSpeed: {:.1} km/h, Vehicle: {:?}, SB: {:.3}, Pothole: {:.3}",
            avg_speed,
            profile,
            pair.speed_breaker,
            pair.pothole
        );

        pair
    }
}
