// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching, retrying, rate-limited delivery of log events to a remote log
//! service.
//!
//! Events enter through the [`Dispatcher`], which keeps one [`Queue`] task per
//! [`Target`]. A queue converts events, accumulates them in a size-bounded
//! [`Batch`] and hands full or due batches to a [`Sender`], one at a time.
//! Senders share one [`RateLimiter`] and retry transient failures with
//! backoff. A disk-backed [`RetentionPolicyTtlCache`] keeps retention policy
//! calls from being repeated for every stream of a log group.
//!
//! Producers never see publish errors: each event is acknowledged through its
//! completion callback or checkpoint once its batch is delivered or dropped.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod client;
pub mod config;
pub mod constants;
pub mod converter;
pub mod dispatcher;
pub mod errors;
pub mod event;
pub mod logger;
pub mod queue;
pub mod rate_limit;
pub mod retention;
pub mod retry;
pub mod sender;
pub mod target;

pub use batch::{Batch, InputLogEvent, PutLogEventsRequest};
pub use client::{LogsClient, PutLogEventsResponse, RejectedLogEventsInfo, TargetManager};
pub use config::{BackoffConfig, BatchLimits, PusherConfig, RateLimitConfig, RetentionCacheConfig};
pub use converter::Converter;
pub use dispatcher::Dispatcher;
pub use errors::{ConfigError, ErrorClass, PublishError, PusherError};
pub use event::{Acknowledgement, CheckpointTracker, LogEvent, Range, RawLogEvent};
pub use queue::{Queue, QueueHandle};
pub use rate_limit::RateLimiter;
pub use retention::{RetentionPolicyTtlCache, RetentionPolicyTtlHandle};
pub use sender::{LogsSender, Sender};
pub use target::{LogGroupClass, Target};
