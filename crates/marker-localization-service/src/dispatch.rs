//! Message demultiplexing and frame admission control.

use crate::topic::{detection_topic, parse_frame_topic, transformations_topic};
use crate::{
    CalibrationCache, Channel, ChannelError, DetectorConfig, Image, Localizer, MarkerDetector, Message,
    PoseSolver, RpcServer, TraceContext,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::SystemTime;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Which frames of a ready batch are processed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Only the newest frame of the batch, regardless of camera.
    #[default]
    LatestOverall,
    /// The newest frame of each camera in the batch.
    LatestPerCamera,
}

impl DropPolicy {
    /// Split `frames` (camera id, message) into kept and dropped, keeping batch order.
    fn select(self, frames: Vec<(i64, Message)>) -> (Vec<(i64, Message)>, usize) {
        let total = frames.len();
        let kept: Vec<_> = match self {
            DropPolicy::LatestOverall => frames.into_iter().last().into_iter().collect(),
            DropPolicy::LatestPerCamera => {
                let mut seen = HashSet::new();
                let mut kept: Vec<_> = frames
                    .into_iter()
                    .rev()
                    .filter(|(camera_id, _)| seen.insert(*camera_id))
                    .collect();
                kept.reverse();
                kept
            }
        };
        let dropped = total - kept.len();
        (kept, dropped)
    }
}

fn default_frame_entity() -> String {
    "CameraGateway".to_string()
}

fn default_publish_prefix() -> String {
    "ArUco".to_string()
}

/// Topic routing and backpressure settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOptions {
    /// Entity whose `<entity>.<id>.Frame` topics carry frames.
    #[serde(default = "default_frame_entity")]
    pub frame_entity: String,
    /// Prefix of the outbound Detection/FrameTransformations topics.
    #[serde(default = "default_publish_prefix")]
    pub publish_prefix: String,
    #[serde(default)]
    pub drop_policy: DropPolicy,
    /// Handed to the detector with every frame.
    #[serde(default)]
    pub detector: DetectorConfig,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            frame_entity: default_frame_entity(),
            publish_prefix: default_publish_prefix(),
            drop_policy: DropPolicy::default(),
            detector: DetectorConfig::default(),
        }
    }
}

/// Who consumed a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handled {
    /// The live calibration reply.
    Calibration,
    /// A camera frame, by camera id.
    Frame(i64),
    /// One of the registered RPC servers.
    Rpc,
    Unhandled,
}

/// Outcome of one [`DispatchLoop::run_once`] iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Messages dispatched (everything but dropped frames).
    pub handled: usize,
    pub processed_frames: usize,
    pub dropped_frames: usize,
}

/// Single-consumer service loop.
///
/// Each message is offered to the calibration cache first, then treated as a
/// frame if its topic is one, then offered to the RPC servers in order.
pub struct DispatchLoop<D, S> {
    options: DispatchOptions,
    detector: D,
    localizer: Localizer<S>,
    servers: Vec<Box<dyn RpcServer>>,
}

impl<D, S> DispatchLoop<D, S>
where
    D: MarkerDetector,
    S: PoseSolver,
{
    pub fn new(options: DispatchOptions, detector: D, localizer: Localizer<S>) -> Self {
        Self {
            options,
            detector,
            localizer,
            servers: Vec::new(),
        }
    }

    /// Append an RPC server to the dispatch chain.
    pub fn with_server(mut self, server: impl RpcServer + 'static) -> Self {
        self.servers.push(Box::new(server));
        self
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub fn localizer(&self) -> &Localizer<S> {
        &self.localizer
    }

    /// Run until the channel closes.
    pub fn run(
        &mut self,
        cache: &mut CalibrationCache,
        channel: &mut dyn Channel,
    ) -> Result<(), ChannelError> {
        loop {
            match self.run_once(cache, channel) {
                Ok(_) => {}
                Err(ChannelError::Closed) => {
                    debug!("event=DispatchLoop.Closed");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// [`DispatchLoop::run_once_at`] with the current wall-clock time.
    pub fn run_once(
        &mut self,
        cache: &mut CalibrationCache,
        channel: &mut dyn Channel,
    ) -> Result<BatchReport, ChannelError> {
        self.run_once_at(cache, channel, SystemTime::now())
    }

    /// Take every ready message (blocking for one if none is ready) and dispatch it.
    ///
    /// Non-frame messages are all dispatched, before any frame. Frames are
    /// thinned by the drop policy; the rest are dropped and counted.
    pub fn run_once_at(
        &mut self,
        cache: &mut CalibrationCache,
        channel: &mut dyn Channel,
        now: SystemTime,
    ) -> Result<BatchReport, ChannelError> {
        let mut batch = channel.consume_ready();
        if batch.is_empty() {
            batch.push(channel.consume()?);
        }

        let mut others = Vec::with_capacity(batch.len());
        let mut frames = Vec::new();
        for message in batch {
            match parse_frame_topic(&self.options.frame_entity, &message.topic) {
                Some(camera_id) => frames.push((camera_id, message)),
                None => others.push(message),
            }
        }

        let (kept, dropped) = self.options.drop_policy.select(frames);
        if dropped > 0 {
            warn!("event=DispatchLoop.Consume dropped={dropped}");
        }

        let mut report = BatchReport {
            dropped_frames: dropped,
            ..BatchReport::default()
        };
        for message in others.iter().chain(kept.iter().map(|(_, m)| m)) {
            if let Handled::Frame(_) = self.handle_at(message, cache, channel, now) {
                report.processed_frames += 1;
            }
            report.handled += 1;
        }
        Ok(report)
    }

    /// Dispatch one message through the chain.
    pub fn handle_at(
        &mut self,
        message: &Message,
        cache: &mut CalibrationCache,
        channel: &mut dyn Channel,
        now: SystemTime,
    ) -> Handled {
        if cache.handle_incoming_at(message, channel, now) {
            return Handled::Calibration;
        }
        if let Some(camera_id) = parse_frame_topic(&self.options.frame_entity, &message.topic) {
            self.process_frame(camera_id, message, cache, channel);
            return Handled::Frame(camera_id);
        }
        for server in &mut self.servers {
            if server.serve(message, channel) {
                return Handled::Rpc;
            }
        }
        debug!("event=DispatchLoop.Unhandled topic={}", message.topic);
        Handled::Unhandled
    }

    /// Detect, localize when the camera's calibration is known, publish.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, message, cache, channel), fields(camera = camera_id))
    )]
    fn process_frame(
        &self,
        camera_id: i64,
        message: &Message,
        cache: &mut CalibrationCache,
        channel: &mut dyn Channel,
    ) {
        let image = message.unpack::<Image>().unwrap_or_else(|err| {
            warn!("event=DispatchLoop.BadFrame camera={camera_id} err={err}");
            Image::default()
        });
        let mut annotations = self.detector.detect(&image, &self.options.detector);
        let trace = message
            .trace
            .as_ref()
            .map_or_else(TraceContext::root, TraceContext::child);

        match cache.find(camera_id) {
            Some(calibration) => {
                let tfs = self.localizer.localize(&mut annotations, calibration);
                debug!(
                    "event=DispatchLoop.Localized camera={camera_id} markers={} localized={}",
                    annotations.len(),
                    tfs.tfs.len()
                );
                let topic = transformations_topic(&self.options.publish_prefix, camera_id);
                publish(channel, &topic, &tfs, &trace);
            }
            None => debug!("event=DispatchLoop.NoCalibration camera={camera_id}"),
        }

        let topic = detection_topic(&self.options.publish_prefix, camera_id);
        publish(channel, &topic, &annotations, &trace);
    }
}

fn publish<T: Serialize>(channel: &mut dyn Channel, topic: &str, value: &T, trace: &TraceContext) {
    let message = match Message::pack(value) {
        Ok(message) => message.with_trace(trace.clone()),
        Err(err) => {
            warn!("event=DispatchLoop.EncodeFailed topic={topic} err={err}");
            return;
        }
    };
    if let Err(err) = channel.publish(topic, message) {
        warn!("event=DispatchLoop.PublishFailed topic={topic} err={err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CalibrationFetchOptions, MemoryChannel};
    use marker_localization_core::{ConfidenceModel, ImageAnnotations, MarkerPose, Resolution};
    use nalgebra::{Matrix3, Point2};
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::time::Duration;

    fn t0() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(50)
    }

    fn no_markers(_image: &Image, _config: &DetectorConfig) -> ImageAnnotations {
        ImageAnnotations::new(Resolution::new(640, 480))
    }

    fn no_pose(_c: &[Point2<f64>; 4], _l: f64, _k: &Matrix3<f64>, _d: &[f64]) -> Option<MarkerPose> {
        None
    }

    type Detector = fn(&Image, &DetectorConfig) -> ImageAnnotations;
    type Solver = fn(&[Point2<f64>; 4], f64, &Matrix3<f64>, &[f64]) -> Option<MarkerPose>;

    type Loop = DispatchLoop<Detector, Solver>;

    fn dispatch(policy: DropPolicy) -> Loop {
        let options = DispatchOptions {
            drop_policy: policy,
            ..DispatchOptions::default()
        };
        let localizer = Localizer::new(HashMap::new(), ConfidenceModel::default(), no_pose as Solver);
        DispatchLoop::new(options, no_markers as Detector, localizer)
    }

    fn frame(camera_id: i64, tag: u8) -> Message {
        Message::pack(&Image { data: vec![tag] })
            .expect("pack")
            .with_topic(format!("CameraGateway.{camera_id}.Frame"))
    }

    fn cache() -> CalibrationCache {
        CalibrationCache::new(CalibrationFetchOptions::default(), t0())
    }

    #[test]
    fn latest_overall_keeps_last_frame() {
        let frames = vec![(1, frame(1, 0)), (2, frame(2, 1)), (1, frame(1, 2))];
        let (kept, dropped) = DropPolicy::LatestOverall.select(frames);
        assert_eq!(dropped, 2);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].1.payload, frame(1, 2).payload);
    }

    #[test]
    fn latest_per_camera_keeps_one_per_camera_in_order() {
        let frames = vec![
            (1, frame(1, 0)),
            (2, frame(2, 1)),
            (1, frame(1, 2)),
            (3, frame(3, 3)),
            (2, frame(2, 4)),
        ];
        let (kept, dropped) = DropPolicy::LatestPerCamera.select(frames);
        assert_eq!(dropped, 2);
        let ids: Vec<i64> = kept.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert_eq!(kept[0].1.payload, frame(1, 2).payload);
    }

    #[test]
    fn empty_batch_drops_nothing() {
        let (kept, dropped) = DropPolicy::LatestPerCamera.select(Vec::new());
        assert!(kept.is_empty());
        assert_eq!(dropped, 0);
    }

    #[test]
    fn frame_without_calibration_publishes_detection_only() {
        let mut dl = dispatch(DropPolicy::LatestOverall);
        let mut cache = cache();
        let mut ch = MemoryChannel::new();
        ch.deliver(frame(4, 0));

        let report = dl.run_once_at(&mut cache, &mut ch, t0()).expect("batch");
        assert_eq!(report.processed_frames, 1);
        assert!(cache.is_pending(4));
        let topics: Vec<&str> = ch.published().iter().map(|m| m.topic.as_str()).collect();
        assert_eq!(topics, vec!["ArUco.4.Detection"]);
        assert!(ch.published()[0].trace.is_some());
    }

    #[test]
    fn detector_receives_configured_settings() {
        let settings = DetectorConfig {
            dictionary: 5,
            cpu_parallelism: 2,
        };
        let options = DispatchOptions {
            detector: settings,
            ..DispatchOptions::default()
        };
        let seen = Cell::new(None);
        let detector = |_: &Image, config: &DetectorConfig| {
            seen.set(Some(*config));
            ImageAnnotations::new(Resolution::new(640, 480))
        };
        let localizer = Localizer::new(HashMap::new(), ConfidenceModel::default(), no_pose as Solver);
        let mut dl = DispatchLoop::new(options, detector, localizer);
        let mut ch = MemoryChannel::new();
        ch.deliver(frame(4, 0));

        dl.run_once_at(&mut cache(), &mut ch, t0()).expect("batch");
        assert_eq!(seen.get(), Some(settings));
    }

    #[test]
    fn outgoing_messages_continue_inbound_trace() {
        let mut dl = dispatch(DropPolicy::LatestOverall);
        let mut cache = cache();
        cache.insert(marker_localization_core::Calibration::new(
            4,
            Matrix3::identity(),
            Resolution::new(640, 480),
        ));
        let mut ch = MemoryChannel::new();
        let root = TraceContext::root();
        ch.deliver(frame(4, 0).with_trace(root.clone()));

        dl.run_once_at(&mut cache, &mut ch, t0()).expect("batch");
        assert_eq!(ch.published().len(), 2);
        for msg in ch.published() {
            let trace = msg.trace.as_ref().expect("trace");
            assert_eq!(trace.trace_id, root.trace_id);
            assert_ne!(trace.span_id, root.span_id);
        }
    }

    #[test]
    fn undecodable_frame_is_still_acknowledged() {
        let mut dl = dispatch(DropPolicy::LatestOverall);
        let mut cache = cache();
        let mut ch = MemoryChannel::new();
        let mut bad = frame(2, 0);
        bad.payload = b"not json".to_vec();
        ch.deliver(bad);

        let report = dl.run_once_at(&mut cache, &mut ch, t0()).expect("batch");
        assert_eq!(report.processed_frames, 1);
        let anno: ImageAnnotations = ch.published()[0].unpack().expect("unpack");
        assert!(anno.is_empty());
    }

    #[test]
    fn non_frame_messages_are_never_dropped() {
        let mut dl = dispatch(DropPolicy::LatestOverall);
        let mut cache = cache();
        let mut ch = MemoryChannel::new();
        ch.deliver(frame(1, 0));
        ch.deliver(Message::default().with_topic("Other.Thing"));
        ch.deliver(frame(1, 1));
        ch.deliver(Message::default().with_topic("CameraGateway.x.Frame"));

        let report = dl.run_once_at(&mut cache, &mut ch, t0()).expect("batch");
        assert_eq!(
            report,
            BatchReport {
                handled: 3,
                processed_frames: 1,
                dropped_frames: 1,
            }
        );
    }

    #[test]
    fn rpc_servers_see_unclaimed_messages() {
        struct Echo;
        impl RpcServer for Echo {
            fn serve(&mut self, message: &Message, channel: &mut dyn Channel) -> bool {
                if message.topic != "Echo" {
                    return false;
                }
                channel.publish("Echoed", message.clone()).is_ok()
            }
        }

        let mut dl = dispatch(DropPolicy::LatestOverall).with_server(Echo);
        let mut cache = cache();
        let mut ch = MemoryChannel::new();
        let echo = Message::default().with_topic("Echo");
        let other = Message::default().with_topic("Nope");
        assert_eq!(dl.handle_at(&echo, &mut cache, &mut ch, t0()), Handled::Rpc);
        assert_eq!(dl.handle_at(&other, &mut cache, &mut ch, t0()), Handled::Unhandled);
        assert_eq!(ch.published_on("Echoed").count(), 1);
    }

    #[test]
    fn run_returns_when_channel_closes() {
        let mut dl = dispatch(DropPolicy::LatestOverall);
        let mut cache = cache();
        let mut ch = MemoryChannel::new();
        ch.deliver(frame(1, 0));
        dl.run(&mut cache, &mut ch).expect("clean shutdown");
        assert_eq!(ch.published_on("ArUco.1.Detection").count(), 1);
    }
}
