//! Bus message envelope.
//!
//! Payloads are JSON. Request/reply pairs are linked by a correlation id
//! issued from a process-wide monotonic counter.

use crate::MessageError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

static NEXT_CORRELATION_ID: AtomicU64 = AtomicU64::new(1);

/// Issue a fresh correlation id. Strictly increasing within the process.
pub fn next_correlation_id() -> u64 {
    NEXT_CORRELATION_ID.fetch_add(1, Ordering::Relaxed)
}

/// RPC status codes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    #[default]
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    Internal,
    Unavailable,
    FailedPrecondition,
}

/// RPC status attached to replies.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    #[serde(default)]
    pub why: String,
}

impl Status {
    pub fn failure(code: StatusCode, why: impl Into<String>) -> Self {
        Self {
            code,
            why: why.into(),
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

/// Opaque trace context carried next to the payload.
///
/// Purely observational: absent or malformed contexts only start a new trace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

/// 64-bit random id as 16 hex digits.
fn random_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

impl TraceContext {
    /// Start a new trace.
    pub fn root() -> Self {
        Self {
            trace_id: random_id(),
            span_id: random_id(),
        }
    }

    /// New span within the same trace.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: random_id(),
        }
    }
}

/// One message as seen by the service.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    /// Routing key the message was published with.
    pub topic: String,
    pub payload: Vec<u8>,
    pub correlation_id: Option<u64>,
    /// Topic replies should be published to.
    pub reply_to: Option<String>,
    pub deadline: Option<SystemTime>,
    pub status: Status,
    pub trace: Option<TraceContext>,
}

impl Message {
    /// Encode `value` as the payload of a new message.
    pub fn pack<T: Serialize>(value: &T) -> Result<Self, MessageError> {
        Ok(Self {
            payload: serde_json::to_vec(value)?,
            ..Self::default()
        })
    }

    /// Decode the payload.
    pub fn unpack<T: DeserializeOwned>(&self) -> Result<T, MessageError> {
        if self.payload.is_empty() {
            return Err(MessageError::EmptyPayload);
        }
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Payload-less message carrying only a status.
    pub fn from_status(status: Status) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_correlation_id(mut self, id: u64) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn with_reply_to(mut self, topic: impl Into<String>) -> Self {
        self.reply_to = Some(topic.into());
        self
    }

    pub fn with_deadline(mut self, deadline: SystemTime) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }

    /// `true` if this message carries `correlation_id`.
    #[inline]
    pub fn correlates_with(&self, correlation_id: u64) -> bool {
        self.correlation_id == Some(correlation_id)
    }
}
