//! Calibration request/reply schema and the calibration RPC server.

use crate::{Channel, Message, Status, StatusCode};
use log::{debug, warn};
use marker_localization_core::Calibration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default topic calibration requests are published on.
pub const GET_CALIBRATION_TOPIC: &str = "FrameTransformation.GetCalibration";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCalibrationRequest {
    pub ids: Vec<i64>,
}

/// Any subset of the requested calibrations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GetCalibrationReply {
    pub calibrations: Vec<Calibration>,
}

/// A request handler in the dispatch chain.
pub trait RpcServer {
    /// Handle `message` if it is addressed to this server. Returns `true` if consumed.
    fn serve(&mut self, message: &Message, channel: &mut dyn Channel) -> bool;
}

/// Answers `GetCalibration` requests from a fixed set of calibrations.
#[derive(Clone, Debug)]
pub struct CalibrationServer {
    topic: String,
    calibrations: HashMap<i64, Calibration>,
}

impl CalibrationServer {
    pub fn new(topic: impl Into<String>, calibrations: HashMap<i64, Calibration>) -> Self {
        Self {
            topic: topic.into(),
            calibrations,
        }
    }

    /// Topic this server answers on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn len(&self) -> usize {
        self.calibrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calibrations.is_empty()
    }

    fn answer(&self, request: &Message) -> Message {
        let req = match request.unpack::<GetCalibrationRequest>() {
            Ok(req) => req,
            Err(err) => {
                return Message::from_status(Status::failure(
                    StatusCode::InvalidArgument,
                    format!("malformed GetCalibrationRequest: {err}"),
                ))
            }
        };

        let reply = GetCalibrationReply {
            calibrations: req
                .ids
                .iter()
                .filter_map(|id| self.calibrations.get(id).cloned())
                .collect(),
        };
        debug!(
            "event=CalibrationServer.Reply requested={:?} found={}",
            req.ids,
            reply.calibrations.len()
        );

        Message::pack(&reply).unwrap_or_else(|err| {
            Message::from_status(Status::failure(StatusCode::Internal, err.to_string()))
        })
    }
}

impl RpcServer for CalibrationServer {
    fn serve(&mut self, message: &Message, channel: &mut dyn Channel) -> bool {
        if message.topic != self.topic {
            return false;
        }
        let Some(reply_to) = message.reply_to.as_deref() else {
            warn!("event=CalibrationServer.NoReplyTo topic={}", message.topic);
            return true;
        };

        let mut reply = self.answer(message);
        reply.correlation_id = message.correlation_id;
        if let Some(trace) = &message.trace {
            reply.trace = Some(trace.child());
        }
        if let Err(err) = channel.publish(reply_to, reply) {
            warn!("event=CalibrationServer.PublishFailed reply_to={reply_to} err={err}");
        }
        true
    }
}
