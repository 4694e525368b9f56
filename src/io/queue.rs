//! Outbound FIFO queue
//!
//! Owned by the sender worker. Producers push from any task; the queue has
//! its own lock, independent of the socket lock, so enqueueing never waits
//! on an in-flight write.

use crate::error::Result;
use crate::protocol::any_message::AnyMessage;
use crate::protocol::header::Timestamp;
use crate::protocol::message::{IgtlMessage, Message};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::warn;

/// A fully serialized frame waiting to be written
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Wire type tag
    pub type_tag: &'static str,
    /// Device name from the header
    pub device_name: String,
    /// Creation timestamp from the header
    pub created: Timestamp,
    /// Header + body
    pub bytes: Bytes,
    /// Set once the last byte has been written
    pub sent_at: Option<Timestamp>,
}

impl OutboundFrame {
    /// Serialize a typed message
    pub fn encode<T: Message>(message: &IgtlMessage<T>) -> Result<Self> {
        Ok(OutboundFrame {
            type_tag: T::message_type(),
            device_name: message.device_name(),
            created: message.header.timestamp,
            bytes: Bytes::from(message.encode()?),
            sent_at: None,
        })
    }

    /// Serialize a dynamically typed message
    pub fn from_any(message: &AnyMessage) -> Result<Self> {
        Ok(OutboundFrame {
            type_tag: message.message_type(),
            device_name: message.device_name(),
            created: message.header().timestamp,
            bytes: Bytes::from(message.encode()?),
            sent_at: None,
        })
    }

    /// Stamp the sent time
    pub fn mark_sent(&mut self) -> Timestamp {
        let now = Timestamp::now();
        self.sent_at = Some(now);
        now
    }

    /// Frame size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the frame is empty (never true for an encoded message)
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Statistics for the outbound queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Total frames enqueued
    pub enqueued: u64,
    /// Total frames dequeued for writing
    pub dequeued: u64,
    /// Frames rejected because the queue was full
    pub dropped: u64,
    /// Frames discarded by `clear` at teardown
    pub discarded: u64,
    /// Current queue size
    pub current_size: usize,
    /// Peak queue size
    pub peak_size: usize,
}

#[derive(Debug, Default)]
struct Inner {
    frames: VecDeque<OutboundFrame>,
    stats: QueueStats,
}

/// FIFO of outbound frames with optional capacity bound
#[derive(Debug)]
pub struct OutboundQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: Option<usize>,
}

impl OutboundQueue {
    /// Create a queue; `None` means unbounded
    pub fn new(capacity: Option<usize>) -> Self {
        OutboundQueue {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a frame
    ///
    /// # Returns
    /// `false` if the queue is at capacity and the frame was dropped
    pub fn push(&self, frame: OutboundFrame) -> bool {
        {
            let mut inner = self.lock();
            if let Some(capacity) = self.capacity {
                if inner.frames.len() >= capacity {
                    inner.stats.dropped += 1;
                    warn!(
                        type_tag = frame.type_tag,
                        capacity = capacity,
                        "Outbound queue full, dropping frame"
                    );
                    return false;
                }
            }

            inner.frames.push_back(frame);
            inner.stats.enqueued += 1;
            inner.stats.current_size = inner.frames.len();
            inner.stats.peak_size = inner.stats.peak_size.max(inner.frames.len());
        }
        self.notify.notify_one();
        true
    }

    /// Remove the oldest frame
    pub fn pop(&self) -> Option<OutboundFrame> {
        let mut inner = self.lock();
        let frame = inner.frames.pop_front()?;
        inner.stats.dequeued += 1;
        inner.stats.current_size = inner.frames.len();
        Some(frame)
    }

    /// Wait until a frame is pushed or `limit` elapses
    ///
    /// Returns immediately if the queue is already non-empty.
    pub async fn wait(&self, limit: Duration) {
        if !self.is_empty() {
            return;
        }
        let _ = tokio::time::timeout(limit, self.notify.notified()).await;
    }

    /// Discard all pending frames, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let count = inner.frames.len();
        inner.frames.clear();
        inner.stats.discarded += count as u64;
        inner.stats.current_size = 0;
        count
    }

    /// Number of pending frames
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    /// Whether no frames are pending
    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    /// Snapshot of the queue statistics
    pub fn stats(&self) -> QueueStats {
        self.lock().stats.clone()
    }
}
