//! Device frame → vehicle frame rotation.

use serde::{Deserialize, Serialize};

use crate::orientation::OrientationState;
use crate::smoothing::VerticalLowPass;
use crate::types::{frame_rotation, AccelSample};

/// Acceleration in the vehicle frame. Only `z` feeds detection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleAccel {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

pub struct AxisReorienter {
    vertical_lpf: Option<VerticalLowPass>,
    gravity_offset: Option<f64>,
}

impl AxisReorienter {
    /// `lpf_alpha`: optional smoothing of the vertical axis.
    /// `gravity_offset`: subtracted from z' when set.
    pub fn new(lpf_alpha: Option<f64>, gravity_offset: Option<f64>) -> Self {
        Self {
            vertical_lpf: lpf_alpha.map(VerticalLowPass::new),
            gravity_offset,
        }
    }

    pub fn reorient(&mut self, sample: &AccelSample, orientation: &OrientationState) -> VehicleAccel {
        let rotated = frame_rotation(orientation.pitch, orientation.roll) * sample.as_vector();

        let mut z = rotated.z;
        if let Some(g) = self.gravity_offset {
            z -= g;
        }
        if let Some(ref mut lpf) = self.vertical_lpf {
            z = lpf.apply(z);
        }

        log::debug!(
            "Raw Accel -> X: {:.3}, Y: {:.3}, Z: {:.3} | Reoriented -> X: {:.3}, Y: {:.3}, Z: {:.3}",
            sample.x,
            sample.y,
            sample.z,
            rotated.x,
            rotated.y,
            z
        );

        VehicleAccel {
            x: rotated.x,
            y: rotated.y,
            z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn level() -> OrientationState {
        OrientationState::default()
    }

    #[test]
    fn test_level_phone_is_passthrough() {
        let mut r = AxisReorienter::new(None, None);
        let out = r.reorient(&AccelSample::new(0.3, -0.2, 9.8, 0), &level());
        assert_relative_eq!(out.x, 0.3);
        assert_relative_eq!(out.y, -0.2);
        assert_relative_eq!(out.z, 9.8);
    }

    #[test]
    fn test_tilted_gravity_lands_on_vertical_axis() {
        // Mount pitched 40° and rolled 10°: gravity split across all device axes.
        let (pitch, roll) = (40f64.to_radians(), 10f64.to_radians());
        let g = 9.8;
        let x = -g * roll.sin();
        let y = g * roll.cos() * pitch.sin();
        let z = g * roll.cos() * pitch.cos();
        let orientation = OrientationState {
            pitch: y.atan2(z),
            roll: (-x).atan2((y * y + z * z).sqrt()),
            ..OrientationState::default()
        };

        let mut r = AxisReorienter::new(None, None);
        let out = r.reorient(&AccelSample::new(x, y, z, 0), &orientation);
        assert_relative_eq!(out.z, g, epsilon = 1e-9);
        assert_relative_eq!(out.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gravity_compensation() {
        let mut r = AxisReorienter::new(None, Some(9.8));
        let out = r.reorient(&AccelSample::new(0.0, 0.0, 12.3, 0), &level());
        assert_relative_eq!(out.z, 2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_low_pass_applies_to_vertical_only() {
        let mut r = AxisReorienter::new(Some(0.8), None);
        let out = r.reorient(&AccelSample::new(1.0, 1.0, 10.0, 0), &level());
        assert_relative_eq!(out.z, 8.0);
        assert_relative_eq!(out.x, 1.0);
        assert_relative_eq!(out.y, 1.0);
    }
}
