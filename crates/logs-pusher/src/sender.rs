// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Publishes one batch with retries.
//!
//! A send never fails from the caller's point of view. Every outcome ends in
//! exactly one of [`Batch::done`] or [`Batch::update_state_only`]:
//!
//! | outcome                                   | action                          |
//! |-------------------------------------------|---------------------------------|
//! | accepted (possibly with rejected indices) | `done`                          |
//! | destination missing                       | repair, then retry immediately  |
//! | invalid parameter / already accepted      | `update_state_only`             |
//! | transient service error                   | backoff, bounded by the budget  |
//! | local or transport error                  | `update_state_only`             |
//! | stop signal during a wait                 | `update_state_only`             |

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch::Batch;
use crate::client::{LogsClient, RejectedLogEventsInfo, TargetManager};
use crate::config::{BackoffConfig, PusherConfig};
use crate::errors::ErrorClass;
use crate::rate_limit::RateLimiter;
use crate::retry::{backoff_delay, RetryStrategy};
use crate::target::Target;

/// Hands a batch over to the remote service.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Returns once the batch has been delivered or given up on.
    async fn send(&self, batch: Batch);

    /// Total time a batch may spend being retried.
    fn retry_duration(&self) -> Duration;

    /// Batches already retrying use the new budget from their next failure on.
    fn set_retry_duration(&self, retry_duration: Duration);
}

pub struct LogsSender {
    client: Arc<dyn LogsClient>,
    manager: Arc<dyn TargetManager>,
    limiter: Arc<RateLimiter>,
    retry_duration: RwLock<Duration>,
    backoff: BackoffConfig,
    max_repair_attempts: u32,
    stop: CancellationToken,
}

impl LogsSender {
    #[must_use]
    pub fn new(
        client: Arc<dyn LogsClient>,
        manager: Arc<dyn TargetManager>,
        limiter: Arc<RateLimiter>,
        config: &PusherConfig,
        stop: CancellationToken,
    ) -> Self {
        Self {
            client,
            manager,
            limiter,
            retry_duration: RwLock::new(config.retry_duration),
            backoff: config.backoff.clone(),
            max_repair_attempts: config.max_repair_attempts,
            stop,
        }
    }

    /// Waits for a rate limit permit. Only retries give up on stop; the first
    /// attempt always goes out so the final flush is not lost.
    async fn acquire_permit(&self, is_retry: bool) -> bool {
        if !is_retry {
            self.limiter.acquire().await;
            return true;
        }
        tokio::select! {
            biased;
            () = self.stop.cancelled() => false,
            () = self.limiter.acquire() => true,
        }
    }
}

#[async_trait]
impl Sender for LogsSender {
    async fn send(&self, batch: Batch) {
        if batch.is_empty() {
            batch.done();
            return;
        }

        let request = batch.build();
        let target = batch.target().clone();
        let start = Instant::now();
        let mut attempts = 0u32;
        let mut retries = 0u32;
        let mut repairs = 0u32;

        loop {
            if !self.acquire_permit(attempts > 0).await {
                warn!("LOGS | Stop requested while waiting to publish to {}", target);
                batch.update_state_only();
                return;
            }
            attempts += 1;

            let err = match self.client.put_log_events(&request).await {
                Ok(response) => {
                    if let Some(info) = response
                        .rejected_log_events_info
                        .filter(|info| !info.is_empty())
                    {
                        log_rejections(&target, &info);
                    }
                    debug!(
                        "LOGS | Published {} events to {} after {} attempt(s)",
                        request.log_events.len(),
                        target,
                        attempts
                    );
                    batch.done();
                    return;
                }
                Err(err) => err,
            };

            match err.class() {
                ErrorClass::DestinationMissing if repairs < self.max_repair_attempts => {
                    repairs += 1;
                    info!("LOGS | Destination {} is missing, creating it: {}", target, err);
                    match self.manager.init_target(&target).await {
                        Ok(()) => continue,
                        Err(repair_err) => {
                            error!("LOGS | Failed to create {}: {}", target, repair_err);
                        }
                    }
                }
                ErrorClass::DestinationMissing => {
                    warn!(
                        "LOGS | Destination {} still missing after {} repair attempt(s)",
                        target, repairs
                    );
                }
                ErrorClass::NonRetryable => {
                    error!("LOGS | Aborting publish to {}: {}", target, err);
                    batch.update_state_only();
                    return;
                }
                ErrorClass::Unrecognized => {
                    error!("LOGS | Non-retryable failure publishing to {}: {}", target, err);
                    batch.update_state_only();
                    return;
                }
                ErrorClass::Retryable => {}
            }

            let wait = backoff_delay(RetryStrategy::for_error(&err), retries, &self.backoff);
            let budget = self.retry_duration();
            if start.elapsed() + wait > budget {
                error!(
                    "LOGS | All {} retries to {} failed for {:?}: {}",
                    retries, target, budget, err
                );
                batch.update_state_only();
                return;
            }

            warn!(
                "LOGS | Retrying publish to {} in {:?} (retry {}): {}",
                target,
                wait,
                retries + 1,
                err
            );
            tokio::select! {
                biased;
                () = self.stop.cancelled() => {
                    warn!("LOGS | Stop requested, abandoning retries to {}", target);
                    batch.update_state_only();
                    return;
                }
                () = tokio::time::sleep(wait) => {}
            }
            retries += 1;
        }
    }

    fn retry_duration(&self) -> Duration {
        *self
            .retry_duration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_retry_duration(&self, retry_duration: Duration) {
        *self
            .retry_duration
            .write()
            .unwrap_or_else(PoisonError::into_inner) = retry_duration;
    }
}

fn log_rejections(target: &Target, info: &RejectedLogEventsInfo) {
    if let Some(index) = info.too_old_log_event_end_index {
        warn!(
            "LOGS | {} has log events too old to be accepted, ending at index {}",
            target, index
        );
    }
    if let Some(index) = info.too_new_log_event_start_index {
        warn!(
            "LOGS | {} has log events too new to be accepted, starting at index {}",
            target, index
        );
    }
    if let Some(index) = info.expired_log_event_end_index {
        warn!(
            "LOGS | {} has expired log events, ending at index {}",
            target, index
        );
    }
}
