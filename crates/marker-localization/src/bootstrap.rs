//! Process wiring: options -> dispatch loop + calibration cache.

use crate::service::topic::frame_pattern;
use crate::service::{
    load_calibrations, CalibrationCache, CalibrationIoError, CalibrationServer, DispatchLoop,
    Localizer, MarkerDetector, PoseSolver, ServiceOptions,
};
use log::{info, LevelFilter};
use std::path::Path;
use std::time::SystemTime;

/// Assemble the dispatch loop and its calibration cache from `options`.
///
/// The cache's first refresh tick falls one fetch interval after `now`.
pub fn build<D, S>(
    options: &ServiceOptions,
    detector: D,
    solver: S,
    now: SystemTime,
) -> (DispatchLoop<D, S>, CalibrationCache)
where
    D: MarkerDetector,
    S: PoseSolver,
{
    let localizer = Localizer::new(
        options.config.lengths.clone(),
        options.config.confidence,
        solver,
    );
    let dispatch = DispatchLoop::new(options.dispatch_options(), detector, localizer);
    let cache = CalibrationCache::new(options.calibration.clone(), now);
    info!(
        "event=Bootstrap.Built service={} frames={} markers={} dictionary={}",
        options.service_name,
        frame_pattern(&options.frame_entity),
        options.config.lengths.len(),
        options.config.dictionary
    );
    match options.zipkin_endpoint() {
        Some((host, port)) => info!("event=Bootstrap.Tracing collector={host}:{port}"),
        None => info!("event=Bootstrap.Tracing collector=none"),
    }
    (dispatch, cache)
}

/// Topic patterns the service consumes: camera frames and calibration replies.
pub fn subscriptions(options: &ServiceOptions) -> Vec<String> {
    vec![
        frame_pattern(&options.frame_entity),
        options.calibration.reply_queue.clone(),
    ]
}

/// Serve the calibrations found in `dir` on the configured request topic.
pub fn serve_calibrations<D, S>(
    dispatch: DispatchLoop<D, S>,
    options: &ServiceOptions,
    dir: impl AsRef<Path>,
) -> Result<DispatchLoop<D, S>, CalibrationIoError>
where
    D: MarkerDetector,
    S: PoseSolver,
{
    let calibrations = load_calibrations(dir)?;
    info!(
        "event=Bootstrap.Serving topic={} calibrations={}",
        options.calibration.request_topic,
        calibrations.len()
    );
    let server = CalibrationServer::new(options.calibration.request_topic.clone(), calibrations);
    Ok(dispatch.with_server(server))
}

/// Install the `tracing` subscriber (feature `tracing`) or the plain logger.
///
/// `level` only applies to the plain logger; the subscriber reads `RUST_LOG`.
#[cfg(feature = "tracing")]
pub fn init_logging(_level: LevelFilter, json: bool) -> Result<(), log::SetLoggerError> {
    crate::core::init_tracing(json);
    Ok(())
}

/// Install the `tracing` subscriber (feature `tracing`) or the plain logger.
///
/// `json` only applies to the subscriber.
#[cfg(not(feature = "tracing"))]
pub fn init_logging(level: LevelFilter, _json: bool) -> Result<(), log::SetLoggerError> {
    crate::core::init_with_level(level)
}
