/// Errors returned by a message channel.
#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Payload encoding errors.
#[derive(thiserror::Error, Debug)]
pub enum MessageError {
    #[error("empty payload")]
    EmptyPayload,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
