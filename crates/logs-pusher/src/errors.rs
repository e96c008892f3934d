// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the log pusher.

use crate::target::Target;

/// How the sender reacts to a failed publish or administrative call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The log group or stream does not exist and can be created.
    DestinationMissing,
    /// The service refused the request for good; retrying cannot help.
    NonRetryable,
    /// A service-side condition that is expected to clear up.
    Retryable,
    /// Not a service error at all (local or transport fault).
    Unrecognized,
}

/// Failure reported by the wire client for a publish or administrative call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("data already accepted: {0}")]
    DataAlreadyAccepted(String),

    #[error("throttled: {0}")]
    Throttling(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("service error {code}: {message}")]
    Service { code: String, message: String },

    #[error("local error: {0}")]
    Local(String),
}

impl PublishError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ResourceNotFound(_) => ErrorClass::DestinationMissing,
            Self::InvalidParameter(_) | Self::DataAlreadyAccepted(_) => ErrorClass::NonRetryable,
            Self::Throttling(_) | Self::ServiceUnavailable(_) | Self::Service { .. } => {
                ErrorClass::Retryable
            }
            Self::Local(_) => ErrorClass::Unrecognized,
        }
    }

    /// Whether the service asked us to slow down, as opposed to a one-off failure.
    #[must_use]
    pub fn is_throttling(&self) -> bool {
        matches!(self, Self::Throttling(_) | Self::ServiceUnavailable(_))
    }
}

/// Errors raised while building or validating [`crate::config::PusherConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid value '{value}' for {var}")]
    InvalidValue { var: String, value: String },
}

/// Errors surfaced to event producers by the dispatcher and queues.
///
/// Publish failures are never reported here; they end in the batch's
/// completion callbacks.
#[derive(Debug, thiserror::Error)]
pub enum PusherError {
    #[error("queue for {0} is closed")]
    QueueClosed(Target),

    #[error("queue for {0} is full")]
    QueueFull(Target),

    #[error("flush interval must be greater than 0")]
    ZeroFlushInterval,

    #[error("pusher has been shut down")]
    ShutDown,
}
