// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Size-bounded accumulator of converted events for one target.
//!
//! A [`Batch`] is written by its owning queue only. Once handed to a sender it
//! is consumed by exactly one of [`Batch::done`] or [`Batch::update_state_only`],
//! which is what guarantees every completion callback fires exactly once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::BatchLimits;
use crate::event::{
    truncate_message, truncated_len, CheckpointTracker, DoneCallback, LogEvent, Range,
};
use crate::target::Target;

/// One event of a publish request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputLogEvent {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub message: String,
}

/// Wire-level request handed to [`crate::client::LogsClient::put_log_events`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutLogEventsRequest {
    pub log_group_name: String,
    pub log_stream_name: String,
    /// Sorted by timestamp, oldest first.
    pub log_events: Vec<InputLogEvent>,
}

/// Accumulates the ranges of one checkpoint tracker seen in a batch.
pub struct RangeBatcher {
    tracker: Arc<dyn CheckpointTracker>,
    range: Range,
}

impl RangeBatcher {
    fn new(tracker: Arc<dyn CheckpointTracker>, range: Range) -> Self {
        Self { tracker, range }
    }

    fn merge(&mut self, range: &Range) {
        self.range = self.range.merge(range);
    }

    #[must_use]
    pub fn range(&self) -> Range {
        self.range
    }

    fn done(self) {
        self.tracker.enqueue(self.range);
    }
}

pub struct Batch {
    target: Target,
    limits: BatchLimits,
    events: Vec<LogEvent>,
    buffered_bytes: usize,
    callbacks: Vec<DoneCallback>,
    batchers: HashMap<String, RangeBatcher>,
    min_timestamp: Option<SystemTime>,
    max_timestamp: Option<SystemTime>,
}

impl Batch {
    #[must_use]
    pub fn new(target: Target, limits: BatchLimits) -> Self {
        Self {
            target,
            limits,
            events: Vec::new(),
            buffered_bytes: 0,
            callbacks: Vec::new(),
            batchers: HashMap::new(),
            min_timestamp: None,
            max_timestamp: None,
        }
    }

    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Payload size counted against the request limit, headers included.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.buffered_bytes
    }

    /// Accumulated range for the checkpoint tracker `id`, if any event carried one.
    #[must_use]
    pub fn range_for(&self, id: &str) -> Option<Range> {
        self.batchers.get(id).map(RangeBatcher::range)
    }

    /// Whether no further event can be appended under any circumstances.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.events.len() >= self.limits.max_events
            || self.buffered_bytes + self.limits.per_event_header_bytes > self.limits.max_bytes
    }

    /// Whether appending `event` would break one of the request limits.
    #[must_use]
    pub fn would_exceed_limits(&self, event: &LogEvent) -> bool {
        if self.events.len() + 1 > self.limits.max_events {
            return true;
        }
        let event_bytes = truncated_len(&event.message, self.limits.max_message_bytes())
            + self.limits.per_event_header_bytes;
        if self.buffered_bytes + event_bytes > self.limits.max_bytes {
            return true;
        }
        match (self.min_timestamp, self.max_timestamp) {
            (Some(min), Some(max)) => {
                let min = min.min(event.timestamp);
                let max = max.max(event.timestamp);
                span(min, max) > self.limits.max_time_span
            }
            _ => false,
        }
    }

    /// Adds `event`, truncating an oversized message first.
    ///
    /// The caller checks [`Batch::would_exceed_limits`] beforehand.
    pub fn append(&mut self, mut event: LogEvent) {
        if truncate_message(&mut event.message, self.limits.max_message_bytes()) {
            debug!(
                "LOGS | Truncated oversized event for {} to {} bytes",
                self.target,
                event.message.len()
            );
        }
        self.buffered_bytes += event.event_bytes(self.limits.per_event_header_bytes);

        if let Some(callback) = event.done_callback.take() {
            self.callbacks.push(callback);
        }
        if let Some(state) = event.state.take() {
            let id = state.tracker.id();
            match self.batchers.get_mut(&id) {
                Some(batcher) => batcher.merge(&state.range),
                None => {
                    self.batchers
                        .insert(id, RangeBatcher::new(state.tracker, state.range));
                }
            }
        }

        self.min_timestamp = Some(
            self.min_timestamp
                .map_or(event.timestamp, |min| min.min(event.timestamp)),
        );
        self.max_timestamp = Some(
            self.max_timestamp
                .map_or(event.timestamp, |max| max.max(event.timestamp)),
        );
        self.events.push(event);
    }

    /// Builds the publish request, ordered by timestamp.
    #[must_use]
    pub fn build(&self) -> PutLogEventsRequest {
        let mut log_events: Vec<InputLogEvent> = self
            .events
            .iter()
            .map(|event| InputLogEvent {
                timestamp: epoch_millis(event.timestamp),
                message: event.message.clone(),
            })
            .collect();
        log_events.sort_by_key(|event| event.timestamp);

        PutLogEventsRequest {
            log_group_name: self.target.group.clone(),
            log_stream_name: self.target.stream.clone(),
            log_events,
        }
    }

    /// Marks the batch as delivered.
    pub fn done(self) {
        debug!(
            "LOGS | Delivered {} events ({} bytes) to {}",
            self.events.len(),
            self.buffered_bytes,
            self.target
        );
        self.complete();
    }

    /// Gives up on the batch while still acknowledging its events.
    ///
    /// Completion callbacks fire and checkpoints advance, so a batch that can
    /// never be delivered does not hold back its sources.
    pub fn update_state_only(self) {
        warn!(
            "LOGS | Dropping {} events ({} bytes) for {}",
            self.events.len(),
            self.buffered_bytes,
            self.target
        );
        self.complete();
    }

    fn complete(self) {
        for callback in self.callbacks {
            callback();
        }
        for batcher in self.batchers.into_values() {
            batcher.done();
        }
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("target", &self.target)
            .field("events", &self.events.len())
            .field("buffered_bytes", &self.buffered_bytes)
            .field("callbacks", &self.callbacks.len())
            .field("sources", &self.batchers.len())
            .finish()
    }
}

fn span(min: SystemTime, max: SystemTime) -> Duration {
    max.duration_since(min).unwrap_or_default()
}

pub(crate) fn epoch_millis(timestamp: SystemTime) -> i64 {
    timestamp
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
