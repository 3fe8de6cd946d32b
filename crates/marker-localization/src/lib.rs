//! High-level facade crate for the `marker-localization-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core types and the service pipeline
//! - [`bootstrap`] helpers that assemble a dispatch loop and its calibration
//!   cache from [`ServiceOptions`]
//! - (feature `image`) [`detect::DecodingDetector`], which decodes encoded
//!   frames to grayscale before handing them to a marker detector.
//!
//! ## Quickstart
//!
//! ```no_run
//! use marker_localization::{bootstrap, ServiceOptions, MemoryChannel};
//! use marker_localization::core::{GrayImageView, MarkerAnnotation, MarkerPose};
//! use marker_localization::detect::DecodingDetector;
//! use marker_localization::service::DetectorConfig;
//! use log::LevelFilter;
//! use nalgebra::{Matrix3, Point2};
//! use std::time::SystemTime;
//!
//! fn find_markers(_: &GrayImageView<'_>, _: &DetectorConfig) -> Vec<MarkerAnnotation> {
//!     Vec::new()
//! }
//!
//! fn solve(_: &[Point2<f64>; 4], _: f64, _: &Matrix3<f64>, _: &[f64]) -> Option<MarkerPose> {
//!     None
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! bootstrap::init_logging(LevelFilter::Info, false)?;
//! let options = ServiceOptions::load_json("service.json")?;
//!
//! let detector = DecodingDetector::new(find_markers);
//! let (service, mut cache) = bootstrap::build(&options, detector, solve, SystemTime::now());
//! let mut service = bootstrap::serve_calibrations(service, &options, "calibrations")?;
//! let mut channel = MemoryChannel::new();
//! for topic in bootstrap::subscriptions(&options) {
//!     channel.subscribe(topic);
//! }
//! service.run(&mut cache, &mut channel)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `marker_localization::core`: calibration, annotations, transforms, Euler
//!   angles, confidence.
//! - `marker_localization::service`: bus messages, channel, calibration cache
//!   and server, localizer, dispatch loop, options.
//! - `marker_localization::detect` (feature `image`): frame decoding.

pub use marker_localization_core as core;
pub use marker_localization_service as service;

pub use marker_localization_core::{
    Calibration, FrameTransformation, FrameTransformations, ImageAnnotations, MarkerAnnotation,
    Resolution,
};
pub use marker_localization_service::{
    CalibrationCache, Channel, DispatchLoop, DropPolicy, Localizer, MemoryChannel, Message,
    ServiceOptions,
};

pub mod bootstrap;

#[cfg(feature = "image")]
pub mod detect;
