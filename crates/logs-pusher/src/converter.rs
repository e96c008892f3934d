// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-target conversion of raw events into batchable events.
//!
//! The converter fills in timestamps for events that have none by reusing the
//! last valid timestamp seen for the target, and turns the event's
//! acknowledgement into either a completion callback or checkpoint state.

use std::time::{Duration, SystemTime};

use tracing::warn;

use crate::config::PusherConfig;
use crate::event::{Acknowledgement, CheckpointState, LogEvent, RawLogEvent};
use crate::target::Target;

#[derive(Debug)]
pub struct Converter {
    target: Target,
    warn_old_timestamp: Duration,
    warn_interval: Duration,
    last_valid_time: Option<SystemTime>,
    /// Wall clock time at which `last_valid_time` was recorded.
    last_update_time: Option<SystemTime>,
    last_warn_message: Option<SystemTime>,
}

impl Converter {
    #[must_use]
    pub fn new(target: Target, warn_old_timestamp: Duration, warn_interval: Duration) -> Self {
        Self {
            target,
            warn_old_timestamp,
            warn_interval,
            last_valid_time: None,
            last_update_time: None,
            last_warn_message: None,
        }
    }

    #[must_use]
    pub fn from_config(target: Target, config: &PusherConfig) -> Self {
        Self::new(
            target,
            config.warn_old_timestamp,
            config.warn_old_timestamp_interval,
        )
    }

    pub fn convert(&mut self, raw: RawLogEvent) -> LogEvent {
        self.convert_at(raw, SystemTime::now())
    }

    /// Converts `raw` as if the wall clock read `now`.
    pub fn convert_at(&mut self, raw: RawLogEvent, now: SystemTime) -> LogEvent {
        let timestamp = match raw.timestamp {
            Some(timestamp) => {
                self.last_valid_time = Some(timestamp);
                self.last_update_time = Some(now);
                self.last_warn_message = None;
                timestamp
            }
            None => match self.last_valid_time {
                Some(last_valid) => {
                    self.warn_if_stale(last_valid, now);
                    last_valid
                }
                None => now,
            },
        };

        let (done_callback, state) = match raw.ack {
            Acknowledgement::None => (None, None),
            Acknowledgement::Callback(callback) => (Some(callback), None),
            Acknowledgement::Checkpoint { range, tracker } => {
                (None, Some(CheckpointState { range, tracker }))
            }
        };

        LogEvent::with_state(timestamp, raw.message, done_callback, state)
    }

    fn warn_if_stale(&mut self, last_valid: SystemTime, now: SystemTime) {
        let Some(last_update) = self.last_update_time else {
            return;
        };
        if elapsed(last_update, now) <= self.warn_old_timestamp {
            return;
        }
        if let Some(last_warn) = self.last_warn_message {
            if elapsed(last_warn, now) <= self.warn_interval {
                return;
            }
        }
        warn!(
            "LOGS | Unable to parse timestamp for {}, reusing last valid timestamp {:?} recorded {:?} ago",
            self.target,
            last_valid,
            elapsed(last_update, now)
        );
        self.last_warn_message = Some(now);
    }
}

fn elapsed(earlier: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(earlier).unwrap_or_default()
}
