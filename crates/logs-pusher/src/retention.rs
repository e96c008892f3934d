// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Disk-backed record of recently applied retention policies.
//!
//! Setting a retention policy is an administrative call that only needs to
//! happen once in a while per log group. The cache remembers when it last
//! succeeded so restarts and new streams in the same group can skip it.
//!
//! The service task loads the state file when it starts and keeps those
//! entries apart from new ones. It is the only writer of both maps, and saves
//! them to the state file every persist interval and on shutdown. The file
//! holds one `key:epoch_millis` line per log group.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error};

use crate::batch::epoch_millis;
use crate::config::RetentionCacheConfig;

type Timestamps = HashMap<String, SystemTime>;

#[derive(Debug)]
enum RetentionCommand {
    Update(String, SystemTime),
    Persist(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to the retention cache.
#[derive(Clone, Debug)]
pub struct RetentionPolicyTtlHandle {
    tx: mpsc::UnboundedSender<RetentionCommand>,
    loaded: watch::Receiver<bool>,
    old: Arc<RwLock<Timestamps>>,
    new: Arc<RwLock<Timestamps>>,
    ttl: Duration,
}

impl RetentionPolicyTtlHandle {
    /// Records that the retention policy of `group` was just applied.
    ///
    /// The entry becomes visible once the service task has applied it.
    pub fn update(&self, group: &str) {
        let command = RetentionCommand::Update(escape_key(group), SystemTime::now());
        if self.tx.send(command).is_err() {
            debug!("LOGS | Retention cache stopped, dropping update for {}", group);
        }
    }

    /// Whether the retention policy of `group` was applied less than a TTL ago.
    #[must_use]
    pub fn is_recently_set(&self, group: &str) -> bool {
        self.is_recently_set_at(group, SystemTime::now())
    }

    #[must_use]
    pub fn is_recently_set_at(&self, group: &str, now: SystemTime) -> bool {
        let key = escape_key(group);
        let recent = self
            .new
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
            .or_else(|| {
                self.old
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&key)
                    .copied()
            });
        recent.is_some_and(|set_at| set_at + self.ttl > now)
    }

    /// Waits until the service task has read the state file.
    ///
    /// Lookups made before that only see entries updated in this run.
    pub async fn loaded(&self) {
        let mut loaded = self.loaded.clone();
        // An error means the service is gone and there is nothing to wait for.
        let _ = loaded.wait_for(|loaded| *loaded).await;
    }

    /// Writes the state file and waits for the write to finish.
    ///
    /// Updates sent before this call are included.
    pub async fn persist(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(RetentionCommand::Persist(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Persists one last time and stops the service task.
    ///
    /// Calling it again, or after the task is gone, does nothing.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(RetentionCommand::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

/// Service task owning the cache's writes and its state file.
pub struct RetentionPolicyTtlCache {
    rx: mpsc::UnboundedReceiver<RetentionCommand>,
    loaded: watch::Sender<bool>,
    old: Arc<RwLock<Timestamps>>,
    new: Arc<RwLock<Timestamps>>,
    state_file: PathBuf,
    ttl: Duration,
    persist_interval: Duration,
}

impl RetentionPolicyTtlCache {
    /// Returns the service, to be spawned, with its handle. The state file is
    /// read once the service runs.
    #[must_use]
    pub fn new(config: &RetentionCacheConfig) -> (Self, RetentionPolicyTtlHandle) {
        let old = Arc::new(RwLock::new(Timestamps::new()));
        let new = Arc::new(RwLock::new(Timestamps::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let (loaded_tx, loaded_rx) = watch::channel(false);

        let service = Self {
            rx,
            loaded: loaded_tx,
            old: Arc::clone(&old),
            new: Arc::clone(&new),
            state_file: config.state_file_path(),
            ttl: config.ttl,
            persist_interval: config.persist_interval,
        };
        let handle = RetentionPolicyTtlHandle {
            tx,
            loaded: loaded_rx,
            old,
            new,
            ttl: config.ttl,
        };
        (service, handle)
    }

    pub async fn run(mut self) {
        let persisted = load_state(&self.state_file).await;
        debug!(
            "LOGS | Retention cache started with {} persisted entries",
            persisted.len()
        );
        *self.old.write().unwrap_or_else(PoisonError::into_inner) = persisted;
        self.loaded.send_replace(true);

        let mut ticker = tokio::time::interval(self.persist_interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(RetentionCommand::Update(key, set_at)) => {
                        self.new
                            .write()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(key, set_at);
                    }
                    Some(RetentionCommand::Persist(ack)) => {
                        self.save().await;
                        let _ = ack.send(());
                    }
                    Some(RetentionCommand::Shutdown(ack)) => {
                        self.save().await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.save().await;
                        break;
                    }
                },
                _ = ticker.tick() => self.save().await,
            }
        }
        debug!("LOGS | Retention cache stopped");
    }

    /// Entries worth keeping: fresh loaded ones, overridden by new ones.
    fn snapshot(&self, now: SystemTime) -> Timestamps {
        let mut entries: Timestamps = self
            .old
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, set_at)| **set_at + self.ttl > now)
            .map(|(key, set_at)| (key.clone(), *set_at))
            .collect();
        let new = self.new.read().unwrap_or_else(PoisonError::into_inner);
        entries.extend(new.iter().map(|(key, set_at)| (key.clone(), *set_at)));
        entries
    }

    async fn save(&self) {
        let entries = self.snapshot(SystemTime::now());
        let mut keys: Vec<_> = entries.keys().collect();
        keys.sort();
        let mut contents = String::new();
        for key in keys {
            contents.push_str(&format!("{}:{}\n", key, epoch_millis(entries[key])));
        }

        if let Err(e) = write_atomically(&self.state_file, contents.as_bytes()).await {
            error!(
                "LOGS | Unable to write retention policy state file {}: {}",
                self.state_file.display(),
                e
            );
        }
    }
}

async fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}

async fn load_state(path: &Path) -> Timestamps {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("LOGS | No retention policy state file at {}", path.display());
            return Timestamps::new();
        }
        Err(e) => {
            error!(
                "LOGS | Unable to read retention policy state file {}: {}",
                path.display(),
                e
            );
            return Timestamps::new();
        }
    };

    let mut entries = Timestamps::new();
    for line in contents.lines().filter(|line| !line.trim().is_empty()) {
        let parsed = line.rsplit_once(':').and_then(|(key, millis)| {
            let millis = millis.trim().parse::<u64>().ok()?;
            Some((key.to_string(), UNIX_EPOCH + Duration::from_millis(millis)))
        });
        match parsed {
            Some((key, set_at)) => {
                entries.insert(key, set_at);
            }
            None => error!("LOGS | Skipping malformed retention policy entry: {}", line),
        }
    }
    entries
}

/// Normalizes a log group name into a state file key.
#[must_use]
pub fn escape_key(group: &str) -> String {
    group
        .chars()
        .map(|c| match c {
            '/' | '\\' | ' ' | ':' => '_',
            other => other,
        })
        .collect()
}
