// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collaborator interfaces the pusher consumes.
//!
//! The wire client and the destination manager live outside this crate; they
//! only have to report failures as [`PublishError`] so the sender can classify
//! them.

use async_trait::async_trait;
use serde::Deserialize;

use crate::batch::PutLogEventsRequest;
use crate::errors::PublishError;
use crate::target::Target;

/// Indices of events the service accepted the request for but did not store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedLogEventsInfo {
    /// Events up to this index were older than the retention allows.
    pub too_old_log_event_end_index: Option<i64>,
    /// Events from this index on were too far in the future.
    pub too_new_log_event_start_index: Option<i64>,
    /// Events up to this index had already expired.
    pub expired_log_event_end_index: Option<i64>,
}

impl RejectedLogEventsInfo {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.too_old_log_event_end_index.is_none()
            && self.too_new_log_event_start_index.is_none()
            && self.expired_log_event_end_index.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutLogEventsResponse {
    #[serde(default)]
    pub rejected_log_events_info: Option<RejectedLogEventsInfo>,
}

/// Publishes batches to the remote log service.
#[async_trait]
pub trait LogsClient: Send + Sync {
    async fn put_log_events(
        &self,
        request: &PutLogEventsRequest,
    ) -> Result<PutLogEventsResponse, PublishError>;
}

/// Creates and configures destinations.
#[async_trait]
pub trait TargetManager: Send + Sync {
    /// Creates the log group and stream of `target` when they are missing.
    async fn init_target(&self, target: &Target) -> Result<(), PublishError>;

    /// Applies `target`'s retention to its log group.
    async fn put_retention_policy(&self, target: &Target) -> Result<(), PublishError>;
}
