// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Default limits and intervals for the log pusher.
//!
//! Every value here is only a default: the pipeline reads the effective values
//! from [`crate::config::PusherConfig`], so tests can run with shrunk limits.

use std::time::Duration;

/// Maximum number of log events accepted in a single publish call.
pub const MAX_REQUEST_EVENT_COUNT: usize = 10_000;

/// Maximum size of a single publish call, counting each event's message bytes
/// plus [`PER_EVENT_HEADER_BYTES`].
pub const MAX_REQUEST_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Maximum size of a single event, header included. Larger messages are
/// truncated before they enter a batch.
pub const MAX_EVENT_PAYLOAD_BYTES: usize = 256 * 1024;

/// Fixed overhead the service charges per event on top of the message bytes.
pub const PER_EVENT_HEADER_BYTES: usize = 26;

/// Appended to messages that were cut down to fit [`MAX_EVENT_PAYLOAD_BYTES`].
pub const TRUNCATED_SUFFIX: &str = "[Truncated...]";

/// Largest allowed distance between the oldest and newest event of a batch.
pub const MAX_BATCH_TIME_SPAN: Duration = Duration::from_secs(24 * 60 * 60);

/// Default interval after which a queue flushes a non-empty batch.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Default capacity of a queue's inbound event channel.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default total time a sender keeps retrying one batch.
pub const DEFAULT_RETRY_DURATION: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Base delay for ordinary transient errors.
pub const BASE_RETRY_DELAY_SHORT: Duration = Duration::from_millis(200);

/// Base delay when the service is throttling or unavailable.
pub const BASE_RETRY_DELAY_LONG: Duration = Duration::from_secs(2);

/// Upper bound for a single backoff wait, before jitter.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// How many times a sender re-creates a missing destination for one batch.
pub const MAX_REPAIR_ATTEMPTS: u32 = 3;

/// Default sustained publish rate, in calls per second, across all targets.
pub const DEFAULT_RATE_LIMIT_PER_SECOND: f64 = 5000.0;

/// Default token bucket burst size.
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 5000;

/// Longest single sleep while waiting for a rate limit permit.
pub const MAX_PERMIT_WAIT: Duration = Duration::from_secs(60);

/// Age after which a reused timestamp is reported as stale.
pub const WARN_OLD_TIMESTAMP: Duration = Duration::from_secs(24 * 60 * 60);

/// Minimum interval between two stale-timestamp warnings of one target.
pub const WARN_OLD_TIMESTAMP_LOG_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// How long an applied retention policy is considered fresh.
pub const RETENTION_POLICY_TTL: Duration = Duration::from_secs(5 * 60);

/// How often the retention cache writes its state file.
pub const RETENTION_PERSIST_INTERVAL: Duration = Duration::from_secs(60);

/// Name of the retention cache state file inside the state directory.
pub const RETENTION_POLICY_TTL_FILE_NAME: &str = "retention_policy_ttl";

/// Default directory holding the pusher's state files.
pub const DEFAULT_STATE_DIR: &str = "/var/lib/logs-pusher/state";
