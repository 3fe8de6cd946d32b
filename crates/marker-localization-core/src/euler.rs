//! Rotation matrix to pitch/yaw/roll.
//!
//! Convention (Z-Y-X): `R = Rz(roll) · Ry(pitch) · Rx(yaw)`, so
//!
//! ```text
//! pitch = -asin(R[2][0])
//! yaw   = atan2(R[2][1], R[2][2])
//! roll  = atan2(R[1][0], R[0][0])
//! ```
//!
//! At `R[2][0] = ±1` yaw and roll collapse into one degree of freedom.
//! That case is decided explicitly: yaw is pinned to zero and roll carries
//! the whole in-plane angle.

use nalgebra::{Matrix3, Rotation3};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// `|R[2][0]|` at or above `1 - GIMBAL_LOCK_EPS` is treated as gimbal lock.
pub const GIMBAL_LOCK_EPS: f64 = 1e-9;

/// Euler angles in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl EulerAngles {
    pub fn new(pitch: f64, yaw: f64, roll: f64) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Forward formula, inverse of [`decompose_rotation`] away from gimbal lock.
    pub fn to_rotation(&self) -> Matrix3<f64> {
        // nalgebra's (roll, pitch, yaw) are rotations about (x, y, z)
        Rotation3::from_euler_angles(self.yaw, self.pitch, self.roll).into_inner()
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.pitch.is_finite() && self.yaw.is_finite() && self.roll.is_finite()
    }
}

/// Decompose the rotation block of a transform into pitch/yaw/roll.
///
/// Never returns NaN/Inf for a finite input.
pub fn decompose_rotation(r: &Matrix3<f64>) -> EulerAngles {
    let r20 = r[(2, 0)].clamp(-1.0, 1.0);

    if r20.abs() >= 1.0 - GIMBAL_LOCK_EPS {
        // cos(pitch) == 0: with yaw = 0, R[0][1] = -sin(roll) and R[1][1] = cos(roll)
        let pitch = if r20 < 0.0 { FRAC_PI_2 } else { -FRAC_PI_2 };
        let roll = (-r[(0, 1)]).atan2(r[(1, 1)]);
        return EulerAngles::new(pitch, 0.0, roll);
    }

    let pitch = -r20.asin();
    let c = pitch.cos();
    let yaw = (r[(2, 1)] / c).atan2(r[(2, 2)] / c);
    let roll = (r[(1, 0)] / c).atan2(r[(0, 0)] / c);
    EulerAngles::new(pitch, yaw, roll)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn identity_is_all_zero() {
        let e = decompose_rotation(&Matrix3::identity());
        assert_abs_diff_eq!(e.pitch, 0.0);
        assert_abs_diff_eq!(e.yaw, 0.0);
        assert_abs_diff_eq!(e.roll, 0.0);
    }

    #[test]
    fn round_trip_recovers_angles() {
        let samples = [
            (0.1, 0.2, 0.3),
            (-0.7, 1.2, -2.5),
            (1.3, -3.0, 0.4),
            (-1.5, 0.05, 3.1),
            (0.0, -1.0, 1.0),
        ];
        for (pitch, yaw, roll) in samples {
            let angles = EulerAngles::new(pitch, yaw, roll);
            let back = decompose_rotation(&angles.to_rotation());
            assert_abs_diff_eq!(back.pitch, pitch, epsilon = 1e-9);
            assert_abs_diff_eq!(back.yaw, yaw, epsilon = 1e-9);
            assert_abs_diff_eq!(back.roll, roll, epsilon = 1e-9);
        }
    }

    #[test]
    fn matches_closed_form_entries() {
        let r = EulerAngles::new(0.3, -0.4, 0.9).to_rotation();
        assert_abs_diff_eq!(r[(2, 0)], -(0.3f64).sin(), epsilon = 1e-12);
        assert_abs_diff_eq!(r[(0, 0)], 0.3f64.cos() * 0.9f64.cos(), epsilon = 1e-12);
    }

    #[test]
    fn gimbal_lock_positive_pitch_is_finite() {
        let angles = EulerAngles::new(FRAC_PI_2, 0.0, 0.6);
        let e = decompose_rotation(&angles.to_rotation());
        assert!(e.is_finite());
        assert_abs_diff_eq!(e.pitch, FRAC_PI_2, epsilon = 1e-12);
        assert_eq!(e.yaw, 0.0);
        assert_abs_diff_eq!(e.roll, 0.6, epsilon = 1e-9);
    }

    #[test]
    fn gimbal_lock_negative_pitch_is_finite() {
        let angles = EulerAngles::new(-FRAC_PI_2, 0.0, -1.1);
        let e = decompose_rotation(&angles.to_rotation());
        assert!(e.is_finite());
        assert_abs_diff_eq!(e.pitch, -FRAC_PI_2, epsilon = 1e-12);
        assert_eq!(e.yaw, 0.0);
        assert_abs_diff_eq!(e.roll, -1.1, epsilon = 1e-9);
    }

    #[test]
    fn gimbal_lock_reproduces_rotation() {
        // yaw and roll are not separable here; the pinned solution must still describe R
        let r = EulerAngles::new(FRAC_PI_2, 0.4, 0.9).to_rotation();
        let e = decompose_rotation(&r);
        assert!(e.is_finite());
        assert_abs_diff_eq!(e.to_rotation(), r, epsilon = 1e-9);
    }

    #[test]
    fn slightly_out_of_range_entry_does_not_nan() {
        let mut r = Matrix3::zeros();
        r[(2, 0)] = -1.0 - 1e-15;
        r[(0, 2)] = 1.0;
        r[(1, 1)] = 1.0;
        let e = decompose_rotation(&r);
        assert!(e.is_finite());
    }
}
