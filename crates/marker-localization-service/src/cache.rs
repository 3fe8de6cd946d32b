//! Pull-through per-camera calibration cache.
//!
//! Lookups never block and never publish. A miss records the camera id; the
//! periodic tick folds every recorded id into a single `GetCalibration`
//! request. Only the newest request is live: its correlation id is the only
//! one a reply may carry to be accepted.

use crate::rpc::{GetCalibrationReply, GetCalibrationRequest, GET_CALIBRATION_TOPIC};
use crate::{next_correlation_id, Channel, Message};
use log::{debug, info, warn};
use marker_localization_core::Calibration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, SystemTime};

fn default_request_topic() -> String {
    GET_CALIBRATION_TOPIC.to_string()
}

fn default_reply_queue() -> String {
    "ArUco.Localization.Calibration".to_string()
}

fn default_fetch_interval_ms() -> u64 {
    2000
}

/// Calibration refresh settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationFetchOptions {
    /// Topic `GetCalibration` requests are published on.
    #[serde(default = "default_request_topic")]
    pub request_topic: String,
    /// Topic replies are expected on.
    #[serde(default = "default_reply_queue")]
    pub reply_queue: String,
    /// Period of the refresh tick.
    #[serde(default = "default_fetch_interval_ms")]
    pub fetch_interval_ms: u64,
}

impl Default for CalibrationFetchOptions {
    fn default() -> Self {
        Self {
            request_topic: default_request_topic(),
            reply_queue: default_reply_queue(),
            fetch_interval_ms: default_fetch_interval_ms(),
        }
    }
}

impl CalibrationFetchOptions {
    #[inline]
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }
}

/// Per-camera calibration store with lazy, coalesced refresh.
#[derive(Debug)]
pub struct CalibrationCache {
    options: CalibrationFetchOptions,
    calibrations: HashMap<i64, Calibration>,
    /// Ids looked up and missed. Disjoint from `calibrations`.
    requested: BTreeSet<i64>,
    /// Correlation id of the live request.
    outstanding: Option<u64>,
    next_fetch: SystemTime,
}

impl CalibrationCache {
    /// Empty cache; the first refresh tick is one interval after `now`.
    pub fn new(options: CalibrationFetchOptions, now: SystemTime) -> Self {
        let next_fetch = now + options.fetch_interval();
        Self {
            options,
            calibrations: HashMap::new(),
            requested: BTreeSet::new(),
            outstanding: None,
            next_fetch,
        }
    }

    pub fn options(&self) -> &CalibrationFetchOptions {
        &self.options
    }

    /// Calibration of `camera_id`, or `None` after recording it for the next refresh.
    pub fn find(&mut self, camera_id: i64) -> Option<&Calibration> {
        if !self.calibrations.contains_key(&camera_id) {
            if self.requested.insert(camera_id) {
                debug!("event=CalibrationCache.Miss id={camera_id}");
            }
            return None;
        }
        self.calibrations.get(&camera_id)
    }

    /// Store `calibration`, replacing any previous record for its camera.
    ///
    /// Invalid records are refused and their camera stays pending.
    pub fn insert(&mut self, calibration: Calibration) -> bool {
        if let Err(err) = calibration.validate() {
            warn!("event=CalibrationCache.Rejected id={} why=\"{err}\"", calibration.id);
            return false;
        }
        let id = calibration.id;
        self.requested.remove(&id);
        self.calibrations.insert(id, calibration);
        true
    }

    #[inline]
    pub fn contains(&self, camera_id: i64) -> bool {
        self.calibrations.contains_key(&camera_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.calibrations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.calibrations.is_empty()
    }

    /// Camera ids waiting for a calibration, ascending.
    pub fn pending(&self) -> impl Iterator<Item = i64> + '_ {
        self.requested.iter().copied()
    }

    #[inline]
    pub fn is_pending(&self, camera_id: i64) -> bool {
        self.requested.contains(&camera_id)
    }

    /// Correlation id of the live request, if any.
    #[inline]
    pub fn outstanding_request(&self) -> Option<u64> {
        self.outstanding
    }

    /// When the next refresh tick is due.
    #[inline]
    pub fn next_fetch(&self) -> SystemTime {
        self.next_fetch
    }

    /// [`CalibrationCache::handle_incoming_at`] with the current wall-clock time.
    pub fn handle_incoming(&mut self, message: &Message, channel: &mut dyn Channel) -> bool {
        self.handle_incoming_at(message, channel, SystemTime::now())
    }

    /// Consume `message` if it answers the live request, then run the refresh tick.
    ///
    /// Returns `true` iff the message was that reply: on the reply queue and
    /// carrying the live correlation id. Anything else is left for the next
    /// handler in the chain.
    pub fn handle_incoming_at(
        &mut self,
        message: &Message,
        channel: &mut dyn Channel,
        now: SystemTime,
    ) -> bool {
        let is_reply = message.topic == self.options.reply_queue
            && self
                .outstanding
                .is_some_and(|id| message.correlates_with(id));

        if is_reply {
            self.outstanding = None;
            self.accept_reply(message);
        }

        self.tick(channel, now);
        is_reply
    }

    fn accept_reply(&mut self, message: &Message) {
        if !message.status.is_ok() {
            info!(
                "event=CalibrationCache.RPCFailed code={:?} why=\"{}\"",
                message.status.code, message.status.why
            );
            return;
        }

        let reply = match message.unpack::<GetCalibrationReply>() {
            Ok(reply) => reply,
            Err(err) => {
                warn!("event=CalibrationCache.BadReply err={err}");
                return;
            }
        };

        for calibration in reply.calibrations {
            let id = calibration.id;
            if self.insert(calibration) {
                info!("event=CalibrationCache.Updated id={id}");
            }
        }
    }

    fn tick(&mut self, channel: &mut dyn Channel, now: SystemTime) {
        if now < self.next_fetch {
            return;
        }
        self.next_fetch = now + self.options.fetch_interval();
        if self.requested.is_empty() {
            return;
        }

        let request = GetCalibrationRequest {
            ids: self.requested.iter().copied().collect(),
        };
        let message = match Message::pack(&request) {
            Ok(message) => message,
            Err(err) => {
                warn!("event=CalibrationCache.EncodeFailed err={err}");
                return;
            }
        };

        let correlation_id = next_correlation_id();
        let message = message
            .with_correlation_id(correlation_id)
            .with_reply_to(self.options.reply_queue.clone())
            .with_deadline(self.next_fetch);

        info!("event=CalibrationCache.Requesting ids={:?}", request.ids);
        match channel.publish(&self.options.request_topic, message) {
            Ok(()) => self.outstanding = Some(correlation_id),
            Err(err) => {
                // the previous request is superseded even if this one never left
                self.outstanding = None;
                warn!("event=CalibrationCache.PublishFailed err={err}");
            }
        }
    }
}
