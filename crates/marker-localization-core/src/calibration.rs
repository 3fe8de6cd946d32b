//! Per-camera calibration record.

use crate::transform::is_homogeneous;
use nalgebra::{Matrix3, Matrix4};
use serde::{Deserialize, Serialize};

/// Pixel resolution of an image (or of the images a calibration was fit on).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Calibration validation errors.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CalibrationError {
    #[error("camera {id}: reference resolution must be non-zero")]
    EmptyResolution { id: i64 },
    #[error("camera {id}: intrinsic matrix has non-finite entries")]
    NonFiniteIntrinsic { id: i64 },
    #[error("camera {id}: distortion coefficients must be finite")]
    NonFiniteDistortion { id: i64 },
    #[error("camera {id}: extrinsic is not a homogeneous transform")]
    InvalidExtrinsic { id: i64 },
}

/// Intrinsics, distortion and extrinsic of one camera.
///
/// Immutable once fetched; a refresh replaces the whole record.
/// Matrices are stored row-major in JSON (`[[r0], [r1], ...]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Camera id (the `<id>` in `CameraGateway.<id>.Frame`).
    pub id: i64,
    #[serde(with = "row_major3")]
    pub intrinsic: Matrix3<f64>,
    #[serde(default)]
    pub distortion: Vec<f64>,
    /// Camera-to-reference-frame transform.
    #[serde(with = "row_major4")]
    pub extrinsic: Matrix4<f64>,
    /// Resolution the intrinsics were computed for.
    pub resolution: Resolution,
}

impl Calibration {
    /// Calibration with identity extrinsic and no distortion.
    pub fn new(id: i64, intrinsic: Matrix3<f64>, resolution: Resolution) -> Self {
        Self {
            id,
            intrinsic,
            distortion: Vec::new(),
            extrinsic: Matrix4::identity(),
            resolution,
        }
    }

    pub fn with_distortion(mut self, distortion: Vec<f64>) -> Self {
        self.distortion = distortion;
        self
    }

    pub fn with_extrinsic(mut self, extrinsic: Matrix4<f64>) -> Self {
        self.extrinsic = extrinsic;
        self
    }

    /// Check the record is usable for localization.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        let id = self.id;
        if self.resolution.is_empty() {
            return Err(CalibrationError::EmptyResolution { id });
        }
        if self.intrinsic.iter().any(|v| !v.is_finite()) {
            return Err(CalibrationError::NonFiniteIntrinsic { id });
        }
        if self.distortion.iter().any(|v| !v.is_finite()) {
            return Err(CalibrationError::NonFiniteDistortion { id });
        }
        if !is_homogeneous(&self.extrinsic) {
            return Err(CalibrationError::InvalidExtrinsic { id });
        }
        Ok(())
    }
}

pub(crate) mod row_major3 {
    use nalgebra::Matrix3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(m: &Matrix3<f64>, s: S) -> Result<S::Ok, S::Error> {
        let rows: [[f64; 3]; 3] = std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)]));
        rows.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Matrix3<f64>, D::Error> {
        let rows = <[[f64; 3]; 3]>::deserialize(d)?;
        Ok(Matrix3::from_fn(|r, c| rows[r][c]))
    }
}

pub(crate) mod row_major4 {
    use nalgebra::Matrix4;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(m: &Matrix4<f64>, s: S) -> Result<S::Ok, S::Error> {
        let rows: [[f64; 4]; 4] = std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)]));
        rows.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Matrix4<f64>, D::Error> {
        let rows = <[[f64; 4]; 4]>::deserialize(d)?;
        Ok(Matrix4::from_fn(|r, c| rows[r][c]))
    }
}
