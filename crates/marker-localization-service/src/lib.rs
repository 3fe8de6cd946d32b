//! Calibration-synchronized marker localization over a message bus.
//!
//! Pipeline:
//! - [`DispatchLoop`] pulls message batches from a [`Channel`] and applies the
//!   frame [`DropPolicy`],
//! - [`CalibrationCache`] answers per-camera lookups and refreshes misses with
//!   one coalesced `GetCalibration` request per tick,
//! - a [`MarkerDetector`] finds markers, [`Localizer`] turns them into
//!   reference-frame transforms through a [`PoseSolver`].
//!
//! Detection, pose solving and the broker transport are capabilities
//! supplied by the embedding process.
//!
//! ## Quickstart
//!
//! ```no_run
//! use marker_localization_service::{
//!     CalibrationCache, DetectorConfig, DispatchLoop, Image, Localizer, MemoryChannel,
//!     ServiceOptions,
//! };
//! use marker_localization_core::{ImageAnnotations, MarkerPose, Resolution};
//! use nalgebra::{Matrix3, Point2};
//! use std::time::SystemTime;
//!
//! let options = ServiceOptions::load_json("service.json")?;
//! let detector =
//!     |_: &Image, _: &DetectorConfig| ImageAnnotations::new(Resolution::new(640, 480));
//! let solver = |_: &[Point2<f64>; 4], _: f64, _: &Matrix3<f64>, _: &[f64]| -> Option<MarkerPose> {
//!     None
//! };
//!
//! let localizer = Localizer::new(
//!     options.config.lengths.clone(),
//!     options.config.confidence,
//!     solver,
//! );
//! let mut service = DispatchLoop::new(options.dispatch_options(), detector, localizer);
//! let mut cache = CalibrationCache::new(options.calibration.clone(), SystemTime::now());
//! let mut channel = MemoryChannel::new();
//! service.run(&mut cache, &mut channel)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod cache;
mod calibration_io;
mod capability;
mod channel;
mod dispatch;
mod error;
mod localize;
mod message;
mod options;
mod rpc;
pub mod topic;

pub use cache::{CalibrationCache, CalibrationFetchOptions};
pub use calibration_io::{
    load_calibrations, read_calibration, write_calibration, CalibrationIoError,
};
pub use capability::{DetectorConfig, GrayMarkerDetector, Image, MarkerDetector, PoseSolver};
pub use channel::{topic_matches, Channel, MemoryChannel};
pub use dispatch::{BatchReport, DispatchLoop, DispatchOptions, DropPolicy, Handled};
pub use error::{ChannelError, MessageError};
pub use localize::Localizer;
pub use message::{next_correlation_id, Message, Status, StatusCode, TraceContext};
pub use options::{LocalizationConfig, OptionsError, ServiceOptions, DEFAULT_ZIPKIN_PORT};
pub use rpc::{
    CalibrationServer, GetCalibrationReply, GetCalibrationRequest, RpcServer,
    GET_CALIBRATION_TOPIC,
};
