// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Entry point routing events to per-target queues.

use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::client::{LogsClient, TargetManager};
use crate::config::PusherConfig;
use crate::errors::{ConfigError, PusherError};
use crate::event::RawLogEvent;
use crate::queue::{Queue, QueueHandle};
use crate::rate_limit::RateLimiter;
use crate::retention::{RetentionPolicyTtlCache, RetentionPolicyTtlHandle};
use crate::sender::{LogsSender, Sender};
use crate::target::Target;

struct State {
    queues: HashMap<Target, QueueHandle>,
    tasks: Vec<JoinHandle<()>>,
    /// Interval given to queues created from now on.
    flush_interval: Duration,
}

/// Routes events to the queue of their target, creating queues on first use.
///
/// Must be created inside a Tokio runtime: it spawns the retention cache and
/// one task per target.
pub struct Dispatcher {
    config: PusherConfig,
    sender: Arc<dyn Sender>,
    manager: Arc<dyn TargetManager>,
    retention: RetentionPolicyTtlHandle,
    retention_task: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<State>,
    stop: CancellationToken,
    shut_down: AtomicBool,
}

impl Dispatcher {
    /// Creates a dispatcher publishing through `client` with a rate limiter
    /// shared by all targets.
    pub fn new(
        config: PusherConfig,
        client: Arc<dyn LogsClient>,
        manager: Arc<dyn TargetManager>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let stop = CancellationToken::new();
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        let sender = Arc::new(LogsSender::new(
            client,
            Arc::clone(&manager),
            limiter,
            &config,
            stop.clone(),
        ));
        Ok(Self::with_sender(config, sender, manager, stop))
    }

    /// Creates a dispatcher handing batches to a custom sender.
    ///
    /// `stop` is cancelled on shutdown; the sender should abandon its waits
    /// when it fires.
    #[must_use]
    pub fn with_sender(
        config: PusherConfig,
        sender: Arc<dyn Sender>,
        manager: Arc<dyn TargetManager>,
        stop: CancellationToken,
    ) -> Self {
        let (cache, retention) = RetentionPolicyTtlCache::new(&config.retention);
        let retention_task = tokio::spawn(cache.run());
        let state = State {
            queues: HashMap::new(),
            tasks: Vec::new(),
            flush_interval: config.flush_interval,
        };
        Self {
            config,
            sender,
            manager,
            retention,
            retention_task: Mutex::new(Some(retention_task)),
            state: Mutex::new(state),
            stop,
            shut_down: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn retention_cache(&self) -> &RetentionPolicyTtlHandle {
        &self.retention
    }

    /// Queues `event` for `target`.
    ///
    /// Fails only once the dispatcher is shutting down; publish failures are
    /// reported through the event's acknowledgement instead.
    pub async fn add_event(&self, target: &Target, event: RawLogEvent) -> Result<(), PusherError> {
        let handle = self.queue_for(target).await?;
        handle.add_event(event).await
    }

    /// Queues `event` for `target` without waiting for buffer space.
    ///
    /// Returns [`PusherError::QueueFull`] when the event was dropped.
    pub async fn add_event_non_blocking(
        &self,
        target: &Target,
        event: RawLogEvent,
    ) -> Result<(), PusherError> {
        let handle = self.queue_for(target).await?;
        handle.add_event_non_blocking(event)
    }

    /// Changes the flush interval of every queue, restarting their timers.
    pub async fn set_flush_interval(&self, interval: Duration) -> Result<(), PusherError> {
        if interval.is_zero() {
            return Err(PusherError::ZeroFlushInterval);
        }
        let mut state = self.state.lock().await;
        state.flush_interval = interval;
        for handle in state.queues.values() {
            if let Err(e) = handle.set_flush_interval(interval) {
                debug!("LOGS | Skipping flush interval update: {}", e);
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn retry_duration(&self) -> Duration {
        self.sender.retry_duration()
    }

    /// Changes the retry budget of every send, including those retrying now.
    pub fn set_retry_duration(&self, retry_duration: Duration) {
        info!("LOGS | Retry duration set to {:?}", retry_duration);
        self.sender.set_retry_duration(retry_duration);
    }

    /// Flushes every queue and waits for the resulting sends.
    pub async fn flush_all(&self) {
        let handles: Vec<QueueHandle> = self.state.lock().await.queues.values().cloned().collect();
        let mut flushes = JoinSet::new();
        for handle in handles {
            flushes.spawn(async move {
                if let Err(e) = handle.flush().await {
                    debug!("LOGS | Skipping flush: {}", e);
                }
            });
        }
        while let Some(result) = flushes.join_next().await {
            if let Err(e) = result {
                error!("LOGS | Failed to join flush task: {}", e);
            }
        }
    }

    /// Number of targets with a running queue.
    pub async fn queue_count(&self) -> usize {
        self.state.lock().await.queues.len()
    }

    /// Stops accepting events, flushes every queue, waits for in-flight sends
    /// and persists the retention cache. Only the first call does anything.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("LOGS | Shutting down log pusher");
        self.stop.cancel();

        let (queues, tasks) = {
            let mut state = self.state.lock().await;
            (mem::take(&mut state.queues), mem::take(&mut state.tasks))
        };
        drop(queues);
        for task in tasks {
            if let Err(e) = task.await {
                error!("LOGS | Failed to join task: {}", e);
            }
        }

        self.retention.shutdown().await;
        if let Some(task) = self.retention_task.lock().await.take() {
            if let Err(e) = task.await {
                error!("LOGS | Failed to join retention cache task: {}", e);
            }
        }
        info!("LOGS | Log pusher stopped");
    }

    async fn queue_for(&self, target: &Target) -> Result<QueueHandle, PusherError> {
        let mut state = self.state.lock().await;
        if self.stop.is_cancelled() {
            return Err(PusherError::ShutDown);
        }
        if let Some(handle) = state.queues.get(target) {
            return Ok(handle.clone());
        }

        debug!("LOGS | Creating queue for {}", target);
        let config = PusherConfig {
            flush_interval: state.flush_interval,
            ..self.config.clone()
        };
        let (queue, handle) = Queue::new(
            target.clone(),
            &config,
            Arc::clone(&self.sender),
            self.stop.clone(),
        );
        state.tasks.push(tokio::spawn(queue.run()));
        if let Some(days) = target.retention() {
            state.tasks.push(self.apply_retention(target, days));
        }
        state.queues.insert(target.clone(), handle.clone());
        Ok(handle)
    }

    /// Applies the target's retention in the background unless it was set recently.
    fn apply_retention(&self, target: &Target, days: u32) -> JoinHandle<()> {
        let manager = Arc::clone(&self.manager);
        let cache = self.retention.clone();
        let target = target.clone();
        tokio::spawn(async move {
            cache.loaded().await;
            if cache.is_recently_set(&target.group) {
                debug!(
                    "LOGS | Retention policy for {} was set recently, skipping",
                    target.group
                );
                return;
            }
            match manager.put_retention_policy(&target).await {
                Ok(()) => {
                    info!(
                        "LOGS | Set retention of {} to {} days",
                        target.group, days
                    );
                    cache.update(&target.group);
                }
                Err(e) => error!(
                    "LOGS | Unable to set retention of {} to {} days: {}",
                    target.group, days, e
                ),
            }
        })
    }
}
