// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log event types flowing through the pusher.
//!
//! Producers hand in [`RawLogEvent`]s. Each one is acknowledged in exactly one
//! way: a completion callback, or a checkpoint range handed back to the
//! [`CheckpointTracker`] that produced it. The [`crate::converter::Converter`]
//! turns raw events into [`LogEvent`]s, which is what batches store.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::constants::TRUNCATED_SUFFIX;

/// Invoked once the event's batch has been handled, delivered or dropped.
pub type DoneCallback = Box<dyn FnOnce() + Send + 'static>;

/// Contiguous span of offsets consumed from a log source, `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: u64,
    pub end: u64,
}

impl Range {
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Smallest range covering both `self` and `other`.
    #[must_use]
    pub fn merge(&self, other: &Range) -> Range {
        Range {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Records which ranges of a source have been durably handled.
///
/// Implemented by the log collection side; the pusher only ever enqueues
/// ranges on it.
pub trait CheckpointTracker: Send + Sync {
    /// Stable identifier, used to group ranges of the same source in a batch.
    fn id(&self) -> String;

    fn enqueue(&self, range: Range);
}

/// How a raw event is acknowledged.
pub enum Acknowledgement {
    /// Nobody waits for this event.
    None,
    Callback(DoneCallback),
    Checkpoint {
        range: Range,
        tracker: Arc<dyn CheckpointTracker>,
    },
}

impl fmt::Debug for Acknowledgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Callback(_) => write!(f, "Callback"),
            Self::Checkpoint { range, tracker } => f
                .debug_struct("Checkpoint")
                .field("range", range)
                .field("tracker", &tracker.id())
                .finish(),
        }
    }
}

/// A log event as produced by the collection side.
#[derive(Debug)]
pub struct RawLogEvent {
    pub message: String,
    /// `None` when no timestamp could be parsed from the log line.
    pub timestamp: Option<SystemTime>,
    pub ack: Acknowledgement,
}

impl RawLogEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: None,
            ack: Acknowledgement::None,
        }
    }

    /// Builds an event from raw bytes, as read from a file. Invalid UTF-8
    /// sequences are replaced with U+FFFD.
    pub fn from_bytes(message: impl AsRef<[u8]>) -> Self {
        Self::new(String::from_utf8_lossy(message.as_ref()).into_owned())
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[must_use]
    pub fn with_callback(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.ack = Acknowledgement::Callback(Box::new(callback));
        self
    }

    #[must_use]
    pub fn with_checkpoint(mut self, range: Range, tracker: Arc<dyn CheckpointTracker>) -> Self {
        self.ack = Acknowledgement::Checkpoint { range, tracker };
        self
    }
}

/// Range consumed by an event together with the tracker that owns it.
#[derive(Clone)]
pub struct CheckpointState {
    pub range: Range,
    pub tracker: Arc<dyn CheckpointTracker>,
}

impl fmt::Debug for CheckpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointState")
            .field("range", &self.range)
            .field("tracker", &self.tracker.id())
            .finish()
    }
}

/// A converted event, ready to be appended to a batch.
pub struct LogEvent {
    pub(crate) timestamp: SystemTime,
    pub(crate) message: String,
    pub(crate) done_callback: Option<DoneCallback>,
    pub(crate) state: Option<CheckpointState>,
}

impl LogEvent {
    pub fn new(
        timestamp: SystemTime,
        message: impl Into<String>,
        done_callback: Option<DoneCallback>,
    ) -> Self {
        Self {
            timestamp,
            message: message.into(),
            done_callback,
            state: None,
        }
    }

    pub(crate) fn with_state(
        timestamp: SystemTime,
        message: String,
        done_callback: Option<DoneCallback>,
        state: Option<CheckpointState>,
    ) -> Self {
        Self {
            timestamp,
            message,
            done_callback,
            state,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn state(&self) -> Option<&CheckpointState> {
        self.state.as_ref()
    }

    #[must_use]
    pub fn has_callback(&self) -> bool {
        self.done_callback.is_some()
    }

    /// Size this event counts for against the request payload limit.
    #[must_use]
    pub fn event_bytes(&self, header_bytes: usize) -> usize {
        self.message.len() + header_bytes
    }
}

impl fmt::Debug for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEvent")
            .field("timestamp", &self.timestamp)
            .field("message", &self.message)
            .field("has_callback", &self.done_callback.is_some())
            .field("state", &self.state)
            .finish()
    }
}

/// Cuts `message` so that it is at most `max_bytes` long, suffix included.
///
/// The cut never splits a UTF-8 character. Returns whether anything was cut.
pub(crate) fn truncate_message(message: &mut String, max_bytes: usize) -> bool {
    if message.len() <= max_bytes {
        return false;
    }
    let (cut, suffix) = truncation_point(message, max_bytes);
    message.truncate(cut);
    message.push_str(suffix);
    true
}

/// Length `message` will have once admitted under a `max_bytes` cap.
pub(crate) fn truncated_len(message: &str, max_bytes: usize) -> usize {
    if message.len() <= max_bytes {
        return message.len();
    }
    let (cut, suffix) = truncation_point(message, max_bytes);
    cut + suffix.len()
}

fn truncation_point(message: &str, max_bytes: usize) -> (usize, &'static str) {
    let suffix = if TRUNCATED_SUFFIX.len() <= max_bytes {
        TRUNCATED_SUFFIX
    } else {
        ""
    };
    let mut cut = max_bytes - suffix.len();
    while !message.is_char_boundary(cut) {
        cut -= 1;
    }
    (cut, suffix)
}
