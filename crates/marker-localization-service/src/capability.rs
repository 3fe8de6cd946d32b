//! External capabilities the service drives: marker detection and planar
//! pose solving. Neither is implemented here.

use marker_localization_core::{GrayImageView, ImageAnnotations, MarkerAnnotation, MarkerPose};
use nalgebra::{Matrix3, Point2};
use serde::{Deserialize, Serialize};

/// Encoded camera frame, the payload of `<entity>.<id>.Frame`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Encoded image bytes (JPEG, PNG, ...).
    pub data: Vec<u8>,
}

/// Per-call detector settings, taken from the service configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Marker dictionary id.
    #[serde(default)]
    pub dictionary: i32,
    /// Worker thread hint, 0 lets the detector decide.
    #[serde(default)]
    pub cpu_parallelism: u32,
}

/// Finds markers in an encoded frame.
///
/// Must not fail: an undecodable frame yields zero detections.
pub trait MarkerDetector {
    fn detect(&self, image: &Image, config: &DetectorConfig) -> ImageAnnotations;
}

impl<F> MarkerDetector for F
where
    F: Fn(&Image, &DetectorConfig) -> ImageAnnotations,
{
    fn detect(&self, image: &Image, config: &DetectorConfig) -> ImageAnnotations {
        self(image, config)
    }
}

/// Finds markers in an already decoded grayscale frame.
pub trait GrayMarkerDetector {
    fn detect_gray(
        &self,
        image: &GrayImageView<'_>,
        config: &DetectorConfig,
    ) -> Vec<MarkerAnnotation>;
}

impl<F> GrayMarkerDetector for F
where
    F: Fn(&GrayImageView<'_>, &DetectorConfig) -> Vec<MarkerAnnotation>,
{
    fn detect_gray(
        &self,
        image: &GrayImageView<'_>,
        config: &DetectorConfig,
    ) -> Vec<MarkerAnnotation> {
        self(image, config)
    }
}

/// Solves the pose of a square marker of side `marker_length` from its four
/// image corners.
///
/// Returns `None` for degenerate correspondences.
pub trait PoseSolver {
    fn solve_pose(
        &self,
        corners: &[Point2<f64>; 4],
        marker_length: f64,
        intrinsic: &Matrix3<f64>,
        distortion: &[f64],
    ) -> Option<MarkerPose>;
}

impl<F> PoseSolver for F
where
    F: Fn(&[Point2<f64>; 4], f64, &Matrix3<f64>, &[f64]) -> Option<MarkerPose>,
{
    fn solve_pose(
        &self,
        corners: &[Point2<f64>; 4],
        marker_length: f64,
        intrinsic: &Matrix3<f64>,
        distortion: &[f64],
    ) -> Option<MarkerPose> {
        self(corners, marker_length, intrinsic, distortion)
    }
}
