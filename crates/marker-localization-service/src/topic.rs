//! Topic naming.
//!
//! Inbound frames: `<entity>.<camera_id>.Frame`.
//! Outbound: `<prefix>.<camera_id>.Detection` and
//! `<prefix>.<camera_id>.FrameTransformations`.

/// Camera id of a frame topic published by `entity`, if `topic` is one.
///
/// The id must be plain ASCII digits.
pub fn parse_frame_topic(entity: &str, topic: &str) -> Option<i64> {
    let rest = topic.strip_prefix(entity)?.strip_prefix('.')?;
    let id = rest.strip_suffix(".Frame")?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

/// Subscription pattern matching every camera's frames.
pub fn frame_pattern(entity: &str) -> String {
    format!("{entity}.*.Frame")
}

pub fn detection_topic(prefix: &str, camera_id: i64) -> String {
    format!("{prefix}.{camera_id}.Detection")
}

pub fn transformations_topic(prefix: &str, camera_id: i64) -> String {
    format!("{prefix}.{camera_id}.FrameTransformations")
}
