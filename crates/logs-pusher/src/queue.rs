// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-target event queue.
//!
//! Each target gets one [`Queue`] task that owns the live batch. Producers talk
//! to it through a cloneable [`QueueHandle`]:
//!
//! ```text
//!   QueueHandle ──events───▶ Queue ──convert──▶ Batch ──flush──▶ Sender
//!               ──control──▶   │
//!                              └── timer / stop
//! ```
//!
//! A batch is flushed when the next event would break its limits, when the
//! flush interval elapses since the previous flush, on an explicit flush
//! request and on shutdown. The queue awaits the sender, so a target never has
//! more than one publish in flight.
//!
//! Producers that must not block can use [`QueueHandle::add_event_non_blocking`],
//! which drops the event when the buffer is full.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::batch::Batch;
use crate::config::{BatchLimits, PusherConfig};
use crate::converter::Converter;
use crate::errors::PusherError;
use crate::event::RawLogEvent;
use crate::sender::Sender;
use crate::target::Target;

#[derive(Debug)]
enum Control {
    Flush(oneshot::Sender<()>),
    SetFlushInterval(Duration),
}

/// Cloneable handle for feeding a [`Queue`].
#[derive(Clone, Debug)]
pub struct QueueHandle {
    target: Target,
    events: mpsc::Sender<RawLogEvent>,
    control: mpsc::UnboundedSender<Control>,
}

impl QueueHandle {
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Queues `event`, waiting while the queue's buffer is full.
    pub async fn add_event(&self, event: RawLogEvent) -> Result<(), PusherError> {
        self.events
            .send(event)
            .await
            .map_err(|_| PusherError::QueueClosed(self.target.clone()))
    }

    /// Queues `event` without waiting.
    ///
    /// When the buffer is full the event is dropped unacknowledged and
    /// [`PusherError::QueueFull`] is returned.
    pub fn add_event_non_blocking(&self, event: RawLogEvent) -> Result<(), PusherError> {
        match self.events.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("LOGS | Queue for {} is full, dropping log event", self.target);
                Err(PusherError::QueueFull(self.target.clone()))
            }
            Err(TrySendError::Closed(_)) => Err(PusherError::QueueClosed(self.target.clone())),
        }
    }

    /// Flushes the current batch and waits until it has been sent.
    ///
    /// Events queued before the call are part of the flushed batch.
    pub async fn flush(&self) -> Result<(), PusherError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.control
            .send(Control::Flush(ack_tx))
            .map_err(|_| PusherError::QueueClosed(self.target.clone()))?;
        ack_rx
            .await
            .map_err(|_| PusherError::QueueClosed(self.target.clone()))
    }

    /// Changes the flush interval and restarts the flush timer from now.
    pub fn set_flush_interval(&self, interval: Duration) -> Result<(), PusherError> {
        if interval.is_zero() {
            return Err(PusherError::ZeroFlushInterval);
        }
        self.control
            .send(Control::SetFlushInterval(interval))
            .map_err(|_| PusherError::QueueClosed(self.target.clone()))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

pub struct Queue {
    target: Target,
    limits: BatchLimits,
    converter: Converter,
    batch: Batch,
    sender: Arc<dyn Sender>,
    events: mpsc::Receiver<RawLogEvent>,
    control: mpsc::UnboundedReceiver<Control>,
    flush_interval: Duration,
    last_flush: Instant,
    stop: CancellationToken,
}

impl Queue {
    /// Returns the queue, to be spawned, and a handle to feed it.
    #[must_use]
    pub fn new(
        target: Target,
        config: &PusherConfig,
        sender: Arc<dyn Sender>,
        stop: CancellationToken,
    ) -> (Self, QueueHandle) {
        let (events_tx, events_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let queue = Self {
            converter: Converter::from_config(target.clone(), config),
            batch: Batch::new(target.clone(), config.batch.clone()),
            limits: config.batch.clone(),
            target: target.clone(),
            sender,
            events: events_rx,
            control: control_rx,
            flush_interval: config.flush_interval,
            last_flush: Instant::now(),
            stop,
        };
        let handle = QueueHandle {
            target,
            events: events_tx,
            control: control_tx,
        };
        (queue, handle)
    }

    /// Processes events until the stop token fires or every handle is dropped,
    /// then flushes what is left.
    pub async fn run(mut self) {
        debug!("LOGS | Queue for {} started", self.target);
        self.last_flush = Instant::now();

        loop {
            tokio::select! {
                biased;
                () = self.stop.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.add(event).await,
                    None => break,
                },
                Some(control) = self.control.recv() => match control {
                    Control::Flush(ack) => {
                        self.flush().await;
                        // The requester may have given up waiting.
                        let _ = ack.send(());
                    }
                    Control::SetFlushInterval(interval) => {
                        debug!(
                            "LOGS | Flush interval for {} set to {:?}",
                            self.target, interval
                        );
                        self.flush_interval = interval;
                        self.last_flush = Instant::now();
                    }
                },
                () = sleep_until(self.last_flush + self.flush_interval) => {
                    if self.batch.is_empty() {
                        self.last_flush = Instant::now();
                    } else {
                        self.flush().await;
                    }
                }
            }
        }

        self.shutdown().await;
    }

    async fn add(&mut self, raw: RawLogEvent) {
        let event = self.converter.convert(raw);
        if !self.batch.is_empty() && self.batch.would_exceed_limits(&event) {
            self.flush().await;
        }
        self.batch.append(event);
        if self.batch.is_full() {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        self.last_flush = Instant::now();
        if self.batch.is_empty() {
            return;
        }
        let fresh = Batch::new(self.target.clone(), self.limits.clone());
        let batch = mem::replace(&mut self.batch, fresh);
        debug!(
            "LOGS | Flushing {} events ({} bytes) for {}",
            batch.len(),
            batch.size_bytes(),
            self.target
        );
        self.sender.send(batch).await;
    }

    async fn shutdown(&mut self) {
        self.events.close();
        let mut drained = 0usize;
        while let Some(raw) = self.events.recv().await {
            self.add(raw).await;
            drained += 1;
        }
        if drained > 0 {
            debug!(
                "LOGS | Drained {} buffered events for {} on shutdown",
                drained, self.target
            );
        }
        self.flush().await;

        self.control.close();
        while let Ok(control) = self.control.try_recv() {
            if let Control::Flush(ack) = control {
                if ack.send(()).is_err() {
                    error!("LOGS | Flush requester for {} went away", self.target);
                }
            }
        }
        debug!("LOGS | Queue for {} stopped", self.target);
    }
}
