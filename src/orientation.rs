//! Gated pitch/roll estimation from raw accelerometer vectors.
//!
//! The gravity direction is only trustworthy while the phone is nearly
//! static, so recalibration is restricted to samples whose magnitude is
//! close to 1 g, and rate-limited per epoch so a long static stretch cannot
//! keep overwriting the estimate. Between recalibrations the last good
//! orientation is held.

use serde::{Deserialize, Serialize};

use crate::config::OrientationConfig;
use crate::types::AccelSample;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientationState {
    /// Radians.
    pub pitch: f64,
    /// Radians.
    pub roll: f64,
    pub last_calibration: Option<i64>,
    /// Recalibrations over the estimator's lifetime.
    pub calibration_count: u64,
}

pub struct OrientationEstimator {
    config: OrientationConfig,
    state: OrientationState,
    epoch_start: Option<i64>,
    epoch_updates: u32,
}

impl OrientationEstimator {
    pub fn new(config: OrientationConfig) -> Self {
        Self {
            config,
            state: OrientationState::default(),
            epoch_start: None,
            epoch_updates: 0,
        }
    }

    /// Feed one raw sample; returns the current estimate.
    pub fn update(&mut self, sample: &AccelSample) -> OrientationState {
        if !sample.is_finite() {
            return self.state;
        }

        let now = sample.timestamp_ms;
        let epoch_start = *self.epoch_start.get_or_insert(now);
        let elapsed = now - epoch_start;

        let magnitude = sample.magnitude();
        let near_static = (magnitude - self.config.gravity).abs() <= self.config.static_tolerance;

        if self.epoch_updates < self.config.max_updates_per_epoch
            && elapsed <= self.config.acceptance_ms
            && near_static
        {
            let (x, y, z) = (sample.x, sample.y, sample.z);
            self.state.pitch = y.atan2(z);
            self.state.roll = (-x).atan2((y * y + z * z).sqrt());
            self.state.last_calibration = Some(now);
            self.state.calibration_count += 1;
            self.epoch_updates += 1;

            log::debug!(
                "Orientation recalibrated -> pitch: {:.3} rad, roll: {:.3} rad (epoch update {})",
                self.state.pitch,
                self.state.roll,
                self.epoch_updates
            );
        }

        if elapsed >= self.config.epoch_ms {
            self.epoch_start = Some(now);
            self.epoch_updates = 0;
        }

        self.state
    }

    pub fn state(&self) -> OrientationState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn estimator() -> OrientationEstimator {
        OrientationEstimator::new(OrientationConfig::default())
    }

    #[test]
    fn test_initial_orientation_is_level() {
        let est = estimator();
        assert_eq!(est.state().pitch, 0.0);
        assert_eq!(est.state().roll, 0.0);
        assert_eq!(est.state().last_calibration, None);
    }

    #[test]
    fn test_static_sample_calibrates() {
        let mut est = estimator();
        // 30° pitch, magnitude 9.8
        let angle = 30f64.to_radians();
        let state = est.update(&AccelSample::new(0.0, 9.8 * angle.sin(), 9.8 * angle.cos(), 0));
        assert_relative_eq!(state.pitch, angle, epsilon = 1e-9);
        assert_relative_eq!(state.roll, 0.0, epsilon = 1e-9);
        assert_eq!(state.last_calibration, Some(0));
        assert_eq!(state.calibration_count, 1);
    }

    #[test]
    fn test_dynamic_sample_keeps_previous_estimate() {
        let mut est = estimator();
        est.update(&AccelSample::new(0.0, 0.0, 9.8, 0));
        // 14 m/s² is far from gravity
        let state = est.update(&AccelSample::new(0.0, 7.0, 12.0, 10));
        assert_eq!(state.pitch, 0.0);
        assert_eq!(state.calibration_count, 1);
    }

    #[test]
    fn test_epoch_caps_updates_at_ten() {
        let mut est = estimator();
        // 100 samples, magnitude exactly 9.80, all inside one 850 ms epoch
        for i in 0..100 {
            est.update(&AccelSample::new(0.0, 0.0, 9.80, i * 8));
        }
        assert_eq!(est.state().calibration_count, 10);
    }

    #[test]
    fn test_no_update_past_acceptance_window() {
        let mut est = estimator();
        est.update(&AccelSample::new(0.0, 0.0, 9.80, 0));
        assert_eq!(est.state().calibration_count, 1);

        // Sensor gap: next sample lands 1200 ms after the epoch start
        let tilted = AccelSample::new(0.0, 9.80 * 0.5, 9.80 * 0.75f64.sqrt(), 1200);
        let state = est.update(&tilted);
        assert_eq!(state.calibration_count, 1);
        assert_eq!(state.pitch, 0.0);
    }

    #[test]
    fn test_epoch_rolls_over() {
        let mut est = estimator();
        for i in 0..20 {
            est.update(&AccelSample::new(0.0, 0.0, 9.80, i * 10));
        }
        assert_eq!(est.state().calibration_count, 10);

        // Rolls the epoch at 850 ms; following samples can calibrate again
        est.update(&AccelSample::new(0.0, 0.0, 12.0, 850));
        for i in 0..5 {
            est.update(&AccelSample::new(0.0, 0.0, 9.80, 860 + i * 10));
        }
        assert_eq!(est.state().calibration_count, 15);
    }

    #[test]
    fn test_nan_sample_ignored() {
        let mut est = estimator();
        let state = est.update(&AccelSample::new(f64::NAN, 0.0, 9.8, 0));
        assert_eq!(state.calibration_count, 0);
        assert_eq!(est.epoch_start, None);
    }
}
