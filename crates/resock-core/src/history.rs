//! Bounded, newest-first traffic history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::message::Payload;
use crate::transport::ConnectionId;

/// Which of the two history buffers changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum HistoryKind {
    /// Outbound payloads.
    Sent,
    /// Inbound payloads.
    Received,
}

/// A payload that was handed to the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SentEntry {
    /// The payload.
    pub payload: Payload,
    /// When the payload was sent.
    pub sent_at: DateTime<Utc>,
}

/// A payload delivered by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReceivedEntry {
    /// The payload.
    pub payload: Payload,
    /// When the frame was observed by the client.
    pub received_at: DateTime<Utc>,
    /// The transport connection that delivered the frame.
    pub connection: ConnectionId,
    /// Per-client arrival counter, strictly increasing.
    pub sequence: u64,
}

/// A bounded sequence with the newest entry at index 0.
///
/// Inserts happen at the front; when the bound is exceeded the oldest entries
/// are dropped from the tail. A capacity of `0` never drops anything.
#[derive(Clone, Debug)]
pub struct HistoryBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> HistoryBuffer<T> {
    /// Create an empty buffer with the given bound (`0` = unbounded).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Insert `entry` at the front and evict from the tail if over capacity.
    pub fn record(&mut self, entry: T) {
        self.entries.push_front(entry);
        self.enforce_capacity();
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The configured bound (`0` = unbounded).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the bound. Shrinking truncates the tail immediately.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.enforce_capacity();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent entry.
    pub fn latest(&self) -> Option<&T> {
        self.entries.front()
    }

    /// Entry at `index`, where `0` is the newest.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    /// Iterate newest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    fn enforce_capacity(&mut self) {
        if self.capacity > 0 && self.entries.len() > self.capacity {
            self.entries.truncate(self.capacity);
        }
    }
}

impl<T: Clone> HistoryBuffer<T> {
    /// Copy the entries out, newest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

impl<T> Default for HistoryBuffer<T> {
    fn default() -> Self {
        Self::new(0)
    }
}
