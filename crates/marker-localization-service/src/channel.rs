//! Message bus seam.
//!
//! The service only needs `publish`, a blocking `consume` (its sole
//! suspension point) and a non-blocking `consume_ready` batch read. Broker
//! connections, queues and acknowledgement live behind this trait.

use crate::{ChannelError, Message};
use std::collections::VecDeque;

pub trait Channel {
    /// Publish `message` under `topic`.
    fn publish(&mut self, topic: &str, message: Message) -> Result<(), ChannelError>;

    /// Block until the next message arrives.
    fn consume(&mut self) -> Result<Message, ChannelError>;

    /// Every message already delivered, without blocking. May be empty.
    fn consume_ready(&mut self) -> Vec<Message>;
}

/// AMQP-style topic match: `*` matches one dot-separated word, `#` zero or more.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    fn go(p: &[&str], t: &[&str]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(&"#"), _) => go(&p[1..], t) || (!t.is_empty() && go(p, &t[1..])),
            (Some(&"*"), Some(_)) => go(&p[1..], &t[1..]),
            (Some(a), Some(b)) if a == b => go(&p[1..], &t[1..]),
            _ => false,
        }
    }
    let p: Vec<&str> = pattern.split('.').collect();
    let t: Vec<&str> = topic.split('.').collect();
    go(&p, &t)
}

/// In-process channel.
///
/// Published messages are recorded and, when their topic matches one of the
/// loopback subscriptions, delivered back to the inbox. `consume` on an empty
/// inbox reports [`ChannelError::Closed`] since nothing else can fill it.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    inbox: VecDeque<Message>,
    published: Vec<Message>,
    loopback: Vec<String>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route published messages matching `pattern` back into the inbox.
    pub fn subscribe(&mut self, pattern: impl Into<String>) {
        self.loopback.push(pattern.into());
    }

    /// Queue an inbound message.
    pub fn deliver(&mut self, message: Message) {
        self.inbox.push_back(message);
    }

    /// Inbound messages not consumed yet.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    /// Everything published so far, oldest first.
    pub fn published(&self) -> &[Message] {
        &self.published
    }

    /// Published messages on exactly `topic`.
    pub fn published_on<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a Message> + 'a {
        self.published.iter().filter(move |m| m.topic == topic)
    }

    pub fn take_published(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.published)
    }
}

impl Channel for MemoryChannel {
    fn publish(&mut self, topic: &str, message: Message) -> Result<(), ChannelError> {
        let message = message.with_topic(topic);
        if self.loopback.iter().any(|p| topic_matches(p, topic)) {
            self.inbox.push_back(message.clone());
        }
        self.published.push(message);
        Ok(())
    }

    fn consume(&mut self) -> Result<Message, ChannelError> {
        self.inbox.pop_front().ok_or(ChannelError::Closed)
    }

    fn consume_ready(&mut self) -> Vec<Message> {
        self.inbox.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_wildcards() {
        assert!(topic_matches("CameraGateway.*.Frame", "CameraGateway.7.Frame"));
        assert!(!topic_matches("CameraGateway.*.Frame", "CameraGateway.7.8.Frame"));
        assert!(topic_matches("ArUco.#", "ArUco.7.Detection"));
        assert!(topic_matches("ArUco.#", "ArUco"));
        assert!(topic_matches("#.Frame", "A.B.Frame"));
        assert!(!topic_matches("ArUco.*", "ArUco"));
        assert!(topic_matches("exact.topic", "exact.topic"));
    }

    #[test]
    fn memory_channel_records_and_loops_back() {
        let mut ch = MemoryChannel::new();
        ch.subscribe("Replies.*");
        ch.publish("Replies.a", Message::default()).expect("publish");
        ch.publish("Other", Message::default()).expect("publish");

        assert_eq!(ch.published().len(), 2);
        assert_eq!(ch.published_on("Other").count(), 1);
        assert_eq!(ch.pending(), 1);
        let got = ch.consume().expect("looped back");
        assert_eq!(got.topic, "Replies.a");
        assert!(matches!(ch.consume(), Err(ChannelError::Closed)));
    }

    #[test]
    fn consume_ready_drains_in_order() {
        let mut ch = MemoryChannel::new();
        for t in ["a", "b", "c"] {
            ch.deliver(Message::default().with_topic(t));
        }
        let topics: Vec<String> = ch.consume_ready().into_iter().map(|m| m.topic).collect();
        assert_eq!(topics, ["a", "b", "c"]);
        assert!(ch.consume_ready().is_empty());
    }
}
