//! Core types and pose math for fiducial-marker localization.
//!
//! This crate is intentionally small and purely numeric. It does *not*
//! depend on any message bus, marker detector or pose solver; those are
//! wired together in `marker-localization-service`.

mod calibration;
mod confidence;
mod euler;
mod image;
mod logger;
mod transform;
mod types;

pub use calibration::{Calibration, CalibrationError, Resolution};
pub use confidence::ConfidenceModel;
pub use euler::{decompose_rotation, EulerAngles, GIMBAL_LOCK_EPS};
pub use image::{GrayImage, GrayImageView};
pub use transform::{
    compose_with_extrinsic, homogeneous, is_homogeneous, marker_frame_id, rotation_from_rvec,
    scaled_intrinsics, MarkerPose, MARKER_FRAME_OFFSET,
};
pub use types::{
    FrameTransformation, FrameTransformations, ImageAnnotations, MarkerAnnotation, Pose,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
