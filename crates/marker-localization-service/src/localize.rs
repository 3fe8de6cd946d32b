//! Marker localization: corner detections + calibration -> reference-frame poses.

use crate::PoseSolver;
use log::{debug, warn};
use marker_localization_core::{
    compose_with_extrinsic, decompose_rotation, marker_frame_id, scaled_intrinsics, Calibration,
    ConfidenceModel, FrameTransformation, FrameTransformations, ImageAnnotations, Pose,
};
use nalgebra::Point3;
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Turns detections of one frame into marker poses.
///
/// Markers without a configured side length are not localizable.
#[derive(Clone, Debug)]
pub struct Localizer<S> {
    lengths: HashMap<i64, f64>,
    confidence: ConfidenceModel,
    solver: S,
}

impl<S: PoseSolver> Localizer<S> {
    pub fn new(lengths: HashMap<i64, f64>, confidence: ConfidenceModel, solver: S) -> Self {
        Self {
            lengths,
            confidence,
            solver,
        }
    }

    /// Physical side length of `marker_id`, if configured.
    #[inline]
    pub fn marker_length(&self, marker_id: i64) -> Option<f64> {
        self.lengths.get(&marker_id).copied()
    }

    pub fn confidence(&self) -> &ConfidenceModel {
        &self.confidence
    }

    /// Localize every localizable marker in `annotations`.
    ///
    /// Fills `pose` and `score` of each localized annotation in place and
    /// returns one marker-to-reference transform per localized marker.
    /// Annotations with a corner count other than four, an unconfigured id
    /// or a failed pose solve are skipped.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(camera = calibration.id, markers = annotations.len()))
    )]
    pub fn localize(
        &self,
        annotations: &mut ImageAnnotations,
        calibration: &Calibration,
    ) -> FrameTransformations {
        let mut out = FrameTransformations::default();
        let Some(intrinsic) = scaled_intrinsics(
            &calibration.intrinsic,
            annotations.resolution,
            calibration.resolution,
        ) else {
            warn!(
                "event=Localizer.Skip camera={} why=\"empty calibration resolution\"",
                calibration.id
            );
            return out;
        };
        out.tfs.reserve(annotations.len());

        for annotation in &mut annotations.objects {
            let Some(corners) = annotation.corners() else {
                continue;
            };
            let Some(length) = self.marker_length(annotation.id) else {
                continue;
            };
            let Some(raw) =
                self.solver
                    .solve_pose(&corners, length, &intrinsic, &calibration.distortion)
            else {
                debug!("event=Localizer.SolveFailed marker={}", annotation.id);
                continue;
            };
            if !(raw.rvec.iter().all(|v| v.is_finite()) && raw.tvec.iter().all(|v| v.is_finite()))
            {
                debug!("event=Localizer.NonFinitePose marker={}", annotation.id);
                continue;
            }

            let tf = compose_with_extrinsic(&calibration.extrinsic, &raw.to_homogeneous());
            let rotation = tf.fixed_view::<3, 3>(0, 0).into_owned();
            annotation.pose = Some(Pose {
                position: Point3::new(tf[(0, 3)], tf[(1, 3)], tf[(2, 3)]),
                orientation: decompose_rotation(&rotation),
            });
            // scored on camera depth, before the extrinsic is applied
            annotation.score = self.confidence.score(raw.depth());

            out.tfs.push(FrameTransformation {
                from: marker_frame_id(annotation.id),
                to: calibration.id,
                tf,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use marker_localization_core::{
        homogeneous, is_homogeneous, rotation_from_rvec, MarkerAnnotation, MarkerPose, Resolution,
    };
    use nalgebra::{Matrix3, Matrix4, Point2, Vector3};
    use std::cell::RefCell;

    fn square() -> Vec<Point2<f64>> {
        vec![
            Point2::new(100.0, 100.0),
            Point2::new(200.0, 100.0),
            Point2::new(200.0, 200.0),
            Point2::new(100.0, 200.0),
        ]
    }

    fn intrinsic() -> Matrix3<f64> {
        Matrix3::new(800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0)
    }

    fn fixed_pose() -> MarkerPose {
        MarkerPose::new(Vector3::new(0.1, -0.2, 0.05), Vector3::new(0.3, -0.1, 4.0))
    }

    fn solver(
        pose: MarkerPose,
    ) -> impl Fn(&[Point2<f64>; 4], f64, &Matrix3<f64>, &[f64]) -> Option<MarkerPose> {
        move |_c: &[Point2<f64>; 4], _l: f64, _k: &Matrix3<f64>, _d: &[f64]| Some(pose)
    }

    fn frame(res: Resolution, objects: Vec<MarkerAnnotation>) -> ImageAnnotations {
        ImageAnnotations {
            objects,
            resolution: res,
        }
    }

    #[test]
    fn unit_scale_identity_extrinsic_is_raw_pose() {
        let res = Resolution::new(640, 480);
        let calib = Calibration::new(7, intrinsic(), res);
        let loc = Localizer::new(
            HashMap::from([(3, 0.1)]),
            ConfidenceModel::default(),
            solver(fixed_pose()),
        );
        let mut anno = frame(res, vec![MarkerAnnotation::new(3, square())]);

        let tfs = loc.localize(&mut anno, &calib);
        assert_eq!(tfs.tfs.len(), 1);
        let t = &tfs.tfs[0];
        assert_eq!((t.from, t.to), (103, 7));
        assert!(is_homogeneous(&t.tf));
        assert_relative_eq!(t.tf, fixed_pose().to_homogeneous(), epsilon = 1e-12);
        assert_relative_eq!(t.translation().coords, fixed_pose().tvec, epsilon = 1e-12);

        let pose = anno.objects[0].pose.expect("pose");
        assert_relative_eq!(pose.position.coords, fixed_pose().tvec, epsilon = 1e-12);
        assert_relative_eq!(anno.objects[0].score, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn solver_sees_rescaled_intrinsics_and_marker_length() {
        let seen = RefCell::new(None);
        let recording = |_c: &[Point2<f64>; 4], l: f64, k: &Matrix3<f64>, d: &[f64]| {
            *seen.borrow_mut() = Some((l, *k, d.to_vec()));
            Some(fixed_pose())
        };
        let calib = Calibration::new(1, intrinsic(), Resolution::new(1280, 960))
            .with_distortion(vec![0.01, 0.02]);
        let loc = Localizer::new(
            HashMap::from([(5, 0.25)]),
            ConfidenceModel::default(),
            recording,
        );
        let mut anno = frame(
            Resolution::new(640, 480),
            vec![MarkerAnnotation::new(5, square())],
        );
        loc.localize(&mut anno, &calib);

        let (length, k, dist) = seen.into_inner().expect("solver called");
        assert_eq!(length, 0.25);
        assert_relative_eq!(k[(0, 0)], 400.0);
        assert_relative_eq!(k[(1, 2)], 120.0);
        assert_eq!(dist, vec![0.01, 0.02]);
    }

    #[test]
    fn extrinsic_is_applied_but_score_uses_camera_depth() {
        let res = Resolution::new(640, 480);
        let extrinsic: Matrix4<f64> = homogeneous(
            &rotation_from_rvec(&Vector3::new(0.0, 0.0, 0.7)),
            &Vector3::new(10.0, 0.0, -20.0),
        );
        let calib = Calibration::new(2, intrinsic(), res).with_extrinsic(extrinsic);
        let loc = Localizer::new(
            HashMap::from([(0, 0.1)]),
            ConfidenceModel::default(),
            solver(fixed_pose()),
        );
        let mut anno = frame(res, vec![MarkerAnnotation::new(0, square())]);

        let tfs = loc.localize(&mut anno, &calib);
        let expected = extrinsic * fixed_pose().to_homogeneous();
        assert_relative_eq!(tfs.tfs[0].tf, expected, epsilon = 1e-12);
        assert_eq!(tfs.tfs[0].from, 100);
        // raw depth 4.0 -> 0.5 even though reference z is -16
        assert_relative_eq!(anno.objects[0].score, 0.5, epsilon = 1e-12);
        let pose = anno.objects[0].pose.expect("pose");
        assert_relative_eq!(pose.position.z, -16.0, epsilon = 1e-12);
        assert_relative_eq!(
            pose.orientation.to_rotation(),
            expected.fixed_view::<3, 3>(0, 0).into_owned(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn unlocalizable_markers_are_skipped() {
        let res = Resolution::new(640, 480);
        let calib = Calibration::new(7, intrinsic(), res);
        let failing = |c: &[Point2<f64>; 4], _l: f64, _k: &Matrix3<f64>, _d: &[f64]| {
            (c[0].x > 0.0).then(fixed_pose)
        };
        let loc = Localizer::new(
            HashMap::from([(1, 0.1), (2, 0.1), (4, 0.1)]),
            ConfidenceModel::default(),
            failing,
        );
        let mut three = square();
        three.pop();
        let degenerate = vec![Point2::new(0.0, 0.0); 4];
        let mut anno = frame(
            res,
            vec![
                MarkerAnnotation::new(1, three),      // wrong corner count
                MarkerAnnotation::new(3, square()),   // no configured length
                MarkerAnnotation::new(4, degenerate), // solver fails
                MarkerAnnotation::new(2, square()),
            ],
        );

        let tfs = loc.localize(&mut anno, &calib);
        assert_eq!(tfs.tfs.len(), 1);
        assert_eq!(tfs.tfs[0].from, 102);
        assert!(anno.objects[..3].iter().all(|o| o.pose.is_none() && o.score == 0.0));
        assert!(anno.objects[3].pose.is_some());
    }

    #[test]
    fn empty_calibration_resolution_localizes_nothing() {
        let calib = Calibration::new(7, intrinsic(), Resolution::default());
        let loc = Localizer::new(
            HashMap::from([(3, 0.1)]),
            ConfidenceModel::default(),
            solver(fixed_pose()),
        );
        let mut anno = frame(
            Resolution::new(640, 480),
            vec![MarkerAnnotation::new(3, square())],
        );
        assert!(loc.localize(&mut anno, &calib).tfs.is_empty());
    }
}
