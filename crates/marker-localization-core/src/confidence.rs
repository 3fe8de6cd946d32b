use serde::{Deserialize, Serialize};

fn default_near() -> f64 {
    3.0
}

fn default_far() -> f64 {
    5.0
}

/// Distance-based detection confidence.
///
/// `1.0` closer than `near`, decaying linearly to `0.0` at `far` and clamped
/// there. Non-increasing in depth and continuous at both bounds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceModel {
    #[serde(default = "default_near")]
    pub near: f64,
    #[serde(default = "default_far")]
    pub far: f64,
}

impl Default for ConfidenceModel {
    fn default() -> Self {
        Self {
            near: default_near(),
            far: default_far(),
        }
    }
}

impl ConfidenceModel {
    pub fn new(near: f64, far: f64) -> Self {
        Self { near, far }
    }

    /// Bounds are finite and `near < far`.
    pub fn is_valid(&self) -> bool {
        self.near.is_finite() && self.far.is_finite() && self.near < self.far
    }

    /// Score a marker at depth `z` (camera viewing axis, metres).
    pub fn score(&self, z: f64) -> f64 {
        if z < self.near {
            return 1.0;
        }
        let k = 1.0 / (self.far - self.near);
        (k * (self.far - z)).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn reference_points() {
        let m = ConfidenceModel::default();
        assert_eq!(m.score(2.0), 1.0);
        assert_abs_diff_eq!(m.score(4.0), 0.5, epsilon = 1e-12);
        assert_eq!(m.score(6.0), 0.0);
    }

    #[test]
    fn continuous_at_bounds() {
        let m = ConfidenceModel::default();
        let eps = 1e-9;
        assert_abs_diff_eq!(m.score(3.0 - eps), m.score(3.0 + eps), epsilon = 1e-6);
        assert_abs_diff_eq!(m.score(3.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.score(5.0 - eps), m.score(5.0 + eps), epsilon = 1e-6);
        assert_eq!(m.score(5.0), 0.0);
    }

    #[test]
    fn non_increasing_in_depth() {
        let m = ConfidenceModel::default();
        let mut prev = f64::INFINITY;
        for i in 0..200 {
            let s = m.score(i as f64 * 0.05);
            assert!(s <= prev);
            assert!((0.0..=1.0).contains(&s));
            prev = s;
        }
    }

    #[test]
    fn behind_camera_saturates() {
        assert_eq!(ConfidenceModel::default().score(-1.0), 1.0);
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let m: ConfidenceModel = serde_json::from_str(r#"{"far": 8.0}"#).expect("parse");
        assert_eq!(m, ConfidenceModel::new(3.0, 8.0));
        assert!(m.is_valid());
        assert!(!ConfidenceModel::new(5.0, 5.0).is_valid());
    }
}
