//! Linear algebra aliases for the device → vehicle frame transform.

use nalgebra::{Matrix3, Vector3};

/// Three-axis acceleration vector (m/s²).
pub type AccelVec = Vector3<f64>;

/// Device-to-vehicle frame transform.
pub type FrameRotation = Matrix3<f64>;

/// Build the reorientation matrix for a pitch/roll estimate (radians).
///
/// Rows give the vehicle-frame x', y', z' components:
/// ```text
/// x' =  x·cR + y·sR·sP + z·cR·sP
/// y' =         y·cP    - z·sP
/// z' = -x·sR + y·cR·sP + z·cR·cP
/// ```
pub fn frame_rotation(pitch: f64, roll: f64) -> FrameRotation {
    let (sin_pitch, cos_pitch) = pitch.sin_cos();
    let (sin_roll, cos_roll) = roll.sin_cos();

    Matrix3::new(
        cos_roll,
        sin_roll * sin_pitch,
        cos_roll * sin_pitch,
        0.0,
        cos_pitch,
        -sin_pitch,
        -sin_roll,
        cos_roll * sin_pitch,
        cos_roll * cos_pitch,
    )
}
