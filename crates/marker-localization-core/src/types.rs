use crate::calibration::row_major4;
use crate::{EulerAngles, Resolution};
use nalgebra::{Matrix4, Point2, Point3};
use serde::{Deserialize, Serialize};

/// Marker pose in the reference frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point3<f64>,
    pub orientation: EulerAngles,
}

/// One located marker in an image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerAnnotation {
    /// Marker id in the detector dictionary.
    pub id: i64,
    pub label: String,
    /// Corner points in pixel coordinates, in detector order.
    pub vertices: Vec<Point2<f64>>,
    /// Filled in by localization; `None` if the marker could not be localized.
    #[serde(default)]
    pub pose: Option<Pose>,
    #[serde(default)]
    pub score: f64,
}

impl MarkerAnnotation {
    /// Annotation labelled with its own id, not yet localized.
    pub fn new(id: i64, vertices: Vec<Point2<f64>>) -> Self {
        Self {
            id,
            label: id.to_string(),
            vertices,
            pose: None,
            score: 0.0,
        }
    }

    /// The four corners, or `None` if the detector returned any other count.
    pub fn corners(&self) -> Option<[Point2<f64>; 4]> {
        <[Point2<f64>; 4]>::try_from(self.vertices.as_slice()).ok()
    }
}

/// All marker detections of one frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageAnnotations {
    pub objects: Vec<MarkerAnnotation>,
    /// Resolution of the frame the detector ran on.
    pub resolution: Resolution,
}

impl ImageAnnotations {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            objects: Vec::new(),
            resolution,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Pose of frame `from` expressed in frame `to`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameTransformation {
    pub from: i64,
    pub to: i64,
    /// 4×4 homogeneous transform, row-major in JSON.
    #[serde(with = "row_major4")]
    pub tf: Matrix4<f64>,
}

impl FrameTransformation {
    /// Translation column of `tf`.
    pub fn translation(&self) -> Point3<f64> {
        Point3::new(self.tf[(0, 3)], self.tf[(1, 3)], self.tf[(2, 3)])
    }
}

/// Localization results of one frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameTransformations {
    pub tfs: Vec<FrameTransformation>,
}
