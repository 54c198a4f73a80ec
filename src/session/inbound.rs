//! Inbound message queue between the transport and the session loop.
//!
//! ```text
//! ┌──────────────┐ InboundMessage ┌──────────────┐
//! │  Transport   │───────────────▶│ Session loop │
//! │  (callback)  │                │ (dispatcher) │
//! └──────────────┘                └──────────────┘
//! ```
//!
//! The transport's receive callback runs on the client's own task, so the
//! queue is a pair of bounded `embassy-sync` channels and never blocks the
//! client. Every message whose topic fits reaches the loop:
//!
//! - a payload over [`MAX_PAYLOAD_LEN`] is queued in order with its payload
//!   stripped and marked [`Rejection::TooLarge`];
//! - a message arriving while the main channel is full keeps only its
//!   topic, on a side channel, marked [`Rejection::Busy`].
//!
//! Only a topic over [`MAX_TOPIC_LEN`], or a full side channel, loses a
//! message outright.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TryReceiveError, TrySendError};
use log::warn;

use crate::topics::redact;

/// Longest topic accepted from the broker.
pub const MAX_TOPIC_LEN: usize = 128;
/// Largest payload accepted from the broker.
pub const MAX_PAYLOAD_LEN: usize = 1024;
/// Messages buffered while the session loop is busy.
pub const INBOUND_DEPTH: usize = 16;
/// Overflow topics held for a "busy" answer.
pub const BUSY_DEPTH: usize = 32;

/// Why a message reached the loop without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Payload over [`MAX_PAYLOAD_LEN`], or delivered in fragments.
    TooLarge,
    /// Arrived while the queue was full.
    Busy,
}

type Topic = heapless::String<MAX_TOPIC_LEN>;

/// One message delivered on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: Topic,
    pub payload: heapless::Vec<u8, MAX_PAYLOAD_LEN>,
    /// Set when the payload was not kept. `payload` is then empty.
    pub rejected: Option<Rejection>,
}

fn copy_topic(topic: &str) -> Option<Topic> {
    let mut t = heapless::String::new();
    t.push_str(topic).ok()?;
    Some(t)
}

impl InboundMessage {
    /// Copy a message into fixed buffers. `None` only when the topic is
    /// too long; an oversized payload yields a [`Rejection::TooLarge`]
    /// message.
    pub fn new(topic: &str, payload: &[u8]) -> Option<Self> {
        let topic = copy_topic(topic)?;
        Some(match heapless::Vec::from_slice(payload) {
            Ok(payload) => Self {
                topic,
                payload,
                rejected: None,
            },
            Err(_) => Self::without_payload(topic, Rejection::TooLarge),
        })
    }

    fn without_payload(topic: Topic, why: Rejection) -> Self {
        Self {
            topic,
            payload: heapless::Vec::new(),
            rejected: Some(why),
        }
    }
}

pub struct InboundQueue {
    messages: Channel<CriticalSectionRawMutex, InboundMessage, INBOUND_DEPTH>,
    busy: Channel<CriticalSectionRawMutex, Topic, BUSY_DEPTH>,
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InboundQueue {
    pub const fn new() -> Self {
        Self {
            messages: Channel::new(),
            busy: Channel::new(),
        }
    }

    /// Next message, queued ones in arrival order before overflow ones.
    pub fn try_receive(&self) -> Result<InboundMessage, TryReceiveError> {
        match self.messages.try_receive() {
            Ok(msg) => Ok(msg),
            Err(TryReceiveError::Empty) => self
                .busy
                .try_receive()
                .map(|topic| InboundMessage::without_payload(topic, Rejection::Busy)),
        }
    }

    fn push(&self, topic: &str, msg: InboundMessage) -> bool {
        let Err(TrySendError::Full(msg)) = self.messages.try_send(msg) else {
            return true;
        };
        if self.busy.try_send(msg.topic).is_err() {
            warn!(
                "Inbound: queue and overflow full, dropping message on '{}'",
                redact(topic)
            );
            return false;
        }
        warn!("Inbound: queue full, message on '{}' will be refused", redact(topic));
        true
    }
}

/// Queue a message from a transport callback.
///
/// Returns whether the message will reach the session loop, whole or
/// marked with a [`Rejection`].
pub fn offer(queue: &InboundQueue, topic: &str, payload: &[u8]) -> bool {
    let Some(msg) = InboundMessage::new(topic, payload) else {
        warn!(
            "Inbound: dropping message with {}-byte topic (max {})",
            topic.len(),
            MAX_TOPIC_LEN
        );
        return false;
    };
    if msg.rejected.is_some() {
        warn!(
            "Inbound: {}-byte payload over {} bytes, queued without it",
            payload.len(),
            MAX_PAYLOAD_LEN
        );
    }
    queue.push(topic, msg)
}

/// Queue a message whose payload is not available in one piece.
pub fn offer_too_large(queue: &InboundQueue, topic: &str) -> bool {
    let Some(t) = copy_topic(topic) else {
        warn!("Inbound: dropping fragmented message with {}-byte topic", topic.len());
        return false;
    };
    queue.push(topic, InboundMessage::without_payload(t, Rejection::TooLarge))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_payload_is_marked_not_dropped() {
        let long_topic = "t".repeat(MAX_TOPIC_LEN + 1);
        assert!(InboundMessage::new(&long_topic, b"").is_none());

        let big = vec![b'x'; MAX_PAYLOAD_LEN + 1];
        let msg = InboundMessage::new("t", &big).unwrap();
        assert_eq!(msg.rejected, Some(Rejection::TooLarge));
        assert!(msg.payload.is_empty());

        let msg = InboundMessage::new("t", b"{}").unwrap();
        assert_eq!(msg.rejected, None);
        assert_eq!(msg.payload.as_slice(), b"{}");
    }

    #[test]
    fn overflow_is_kept_as_busy_after_queued_messages() {
        let q = InboundQueue::new();
        for i in 0..INBOUND_DEPTH {
            assert!(offer(&q, "t", &[i as u8]));
        }
        assert!(offer(&q, "t/late", b"x"));
        for i in 0..INBOUND_DEPTH {
            let msg = q.try_receive().unwrap();
            assert_eq!(msg.payload.as_slice(), &[i as u8]);
            assert_eq!(msg.rejected, None);
        }
        let late = q.try_receive().unwrap();
        assert_eq!(late.topic.as_str(), "t/late");
        assert_eq!(late.rejected, Some(Rejection::Busy));
        assert!(q.try_receive().is_err());
    }

    #[test]
    fn drops_only_when_overflow_is_full() {
        let q = InboundQueue::new();
        for _ in 0..INBOUND_DEPTH + BUSY_DEPTH {
            assert!(offer(&q, "t", b"{}"));
        }
        assert!(!offer(&q, "t", b"{}"));
    }

    #[test]
    fn fragmented_message_is_queued_as_too_large() {
        let q = InboundQueue::new();
        assert!(offer_too_large(&q, "t/1"));
        let msg = q.try_receive().unwrap();
        assert_eq!(msg.rejected, Some(Rejection::TooLarge));
    }
}
