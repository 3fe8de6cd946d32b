//! Marker-to-camera and marker-to-reference homogeneous transforms.

use crate::Resolution;
use nalgebra::{Matrix3, Matrix4, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Frame ids `0..MARKER_FRAME_OFFSET` are reserved for physical entities (cameras).
pub const MARKER_FRAME_OFFSET: i64 = 100;

/// Synthetic frame id of a marker.
#[inline]
pub fn marker_frame_id(marker_id: i64) -> i64 {
    MARKER_FRAME_OFFSET + marker_id
}

/// Raw output of a planar pose solve: marker pose in the camera frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerPose {
    /// Axis-angle rotation (direction = axis, norm = angle in radians).
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl MarkerPose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    /// Depth of the marker along the camera viewing axis.
    #[inline]
    pub fn depth(&self) -> f64 {
        self.tvec.z
    }

    /// 4×4 marker-to-camera transform `M = [R(rvec) | tvec; 0 0 0 1]`.
    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        homogeneous(&rotation_from_rvec(&self.rvec), &self.tvec)
    }
}

/// Intrinsics rescaled to the resolution of the frame actually processed.
///
/// Returns `diag(sx, sy, 1) · K` with `sx = frame.width / reference.width` and
/// `sy = frame.height / reference.height`, or `None` when `reference` is empty.
pub fn scaled_intrinsics(
    intrinsic: &Matrix3<f64>,
    frame: Resolution,
    reference: Resolution,
) -> Option<Matrix3<f64>> {
    if reference.is_empty() {
        return None;
    }
    let sx = frame.width as f64 / reference.width as f64;
    let sy = frame.height as f64 / reference.height as f64;
    let scale = Matrix3::from_diagonal(&Vector3::new(sx, sy, 1.0));
    Some(scale * intrinsic)
}

/// Rotation matrix from an axis-angle vector (exponential map on SO(3)).
pub fn rotation_from_rvec(rvec: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::new(*rvec).into_inner()
}

/// Stack `[r | t]` over `[0, 0, 0, 1]`.
pub fn homogeneous(r: &Matrix3<f64>, t: &Vector3<f64>) -> Matrix4<f64> {
    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(r);
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(t);
    m
}

/// `T = extrinsic · M`: marker pose expressed in the calibration's reference frame.
#[inline]
pub fn compose_with_extrinsic(
    extrinsic: &Matrix4<f64>,
    marker_to_camera: &Matrix4<f64>,
) -> Matrix4<f64> {
    extrinsic * marker_to_camera
}

/// Finite entries and a last row of exactly `[0, 0, 0, 1]`.
pub fn is_homogeneous(m: &Matrix4<f64>) -> bool {
    m.iter().all(|v| v.is_finite())
        && m[(3, 0)] == 0.0
        && m[(3, 1)] == 0.0
        && m[(3, 2)] == 0.0
        && m[(3, 3)] == 1.0
}
