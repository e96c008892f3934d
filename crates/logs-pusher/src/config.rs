// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration of the pusher.
//!
//! All limits, intervals and TTLs are plain fields with production defaults so
//! that tests and embedders can shrink them. [`PusherConfig::from_env`] reads
//! the `LOGS_PUSHER_*` environment variables on top of the defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants;
use crate::errors::ConfigError;

/// Per-request limits enforced by [`crate::batch::Batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchLimits {
    /// Maximum number of events per publish call.
    pub max_events: usize,
    /// Maximum payload per publish call, headers included.
    pub max_bytes: usize,
    /// Maximum size of one event, header included.
    pub max_event_bytes: usize,
    /// Overhead charged per event.
    pub per_event_header_bytes: usize,
    /// Maximum distance between the oldest and newest event of a batch.
    pub max_time_span: Duration,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_events: constants::MAX_REQUEST_EVENT_COUNT,
            max_bytes: constants::MAX_REQUEST_PAYLOAD_BYTES,
            max_event_bytes: constants::MAX_EVENT_PAYLOAD_BYTES,
            per_event_header_bytes: constants::PER_EVENT_HEADER_BYTES,
            max_time_span: constants::MAX_BATCH_TIME_SPAN,
        }
    }
}

impl BatchLimits {
    /// Largest message that fits in one event once the header is accounted.
    #[must_use]
    pub fn max_message_bytes(&self) -> usize {
        self.max_event_bytes
            .saturating_sub(self.per_event_header_bytes)
    }
}

/// Exponential backoff parameters used between publish retries.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub base_delay_short: Duration,
    pub base_delay_long: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_short: constants::BASE_RETRY_DELAY_SHORT,
            base_delay_long: constants::BASE_RETRY_DELAY_LONG,
            max_delay: constants::MAX_RETRY_DELAY,
        }
    }
}

/// Token bucket parameters for the shared publish rate limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Tokens added per second.
    pub per_second: f64,
    /// Bucket capacity.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: constants::DEFAULT_RATE_LIMIT_PER_SECOND,
            burst: constants::DEFAULT_RATE_LIMIT_BURST,
        }
    }
}

/// Retention policy TTL cache parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionCacheConfig {
    pub ttl: Duration,
    pub persist_interval: Duration,
    /// Directory holding the state file.
    pub state_dir: PathBuf,
}

impl Default for RetentionCacheConfig {
    fn default() -> Self {
        Self {
            ttl: constants::RETENTION_POLICY_TTL,
            persist_interval: constants::RETENTION_PERSIST_INTERVAL,
            state_dir: PathBuf::from(constants::DEFAULT_STATE_DIR),
        }
    }
}

impl RetentionCacheConfig {
    #[must_use]
    pub fn state_file_path(&self) -> PathBuf {
        self.state_dir
            .join(constants::RETENTION_POLICY_TTL_FILE_NAME)
    }
}

/// Configuration of the whole pusher pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PusherConfig {
    /// How long a queue accumulates before flushing a non-empty batch.
    pub flush_interval: Duration,
    /// Capacity of each queue's inbound event channel.
    pub queue_capacity: usize,
    /// Total time the sender keeps retrying a single batch.
    pub retry_duration: Duration,
    /// How often a missing destination is re-created for one batch.
    pub max_repair_attempts: u32,
    /// Age after which a reused timestamp triggers a warning.
    pub warn_old_timestamp: Duration,
    /// Minimum interval between two stale-timestamp warnings.
    pub warn_old_timestamp_interval: Duration,
    pub batch: BatchLimits,
    pub backoff: BackoffConfig,
    pub rate_limit: RateLimitConfig,
    pub retention: RetentionCacheConfig,
}

impl Default for PusherConfig {
    fn default() -> Self {
        Self {
            flush_interval: constants::DEFAULT_FLUSH_INTERVAL,
            queue_capacity: constants::DEFAULT_QUEUE_CAPACITY,
            retry_duration: constants::DEFAULT_RETRY_DURATION,
            max_repair_attempts: constants::MAX_REPAIR_ATTEMPTS,
            warn_old_timestamp: constants::WARN_OLD_TIMESTAMP,
            warn_old_timestamp_interval: constants::WARN_OLD_TIMESTAMP_LOG_INTERVAL,
            batch: BatchLimits::default(),
            backoff: BackoffConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retention: RetentionCacheConfig::default(),
        }
    }
}

impl PusherConfig {
    /// Create configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ms) = parse_env::<u64>("LOGS_PUSHER_FLUSH_INTERVAL_MS")? {
            config.flush_interval = Duration::from_millis(ms);
        }
        if let Some(capacity) = parse_env::<usize>("LOGS_PUSHER_QUEUE_CAPACITY")? {
            config.queue_capacity = capacity;
        }
        if let Some(secs) = parse_env::<u64>("LOGS_PUSHER_RETRY_DURATION_SECS")? {
            config.retry_duration = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_env::<u32>("LOGS_PUSHER_MAX_REPAIR_ATTEMPTS")? {
            config.max_repair_attempts = attempts;
        }
        if let Some(rate) = parse_env::<f64>("LOGS_PUSHER_RATE_LIMIT")? {
            config.rate_limit.per_second = rate;
        }
        if let Some(burst) = parse_env::<u32>("LOGS_PUSHER_RATE_BURST")? {
            config.rate_limit.burst = burst;
        }
        if let Some(secs) = parse_env::<u64>("LOGS_PUSHER_RETENTION_TTL_SECS")? {
            config.retention.ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("LOGS_PUSHER_RETENTION_PERSIST_INTERVAL_SECS")? {
            config.retention.persist_interval = Duration::from_secs(secs);
        }
        if let Ok(dir) = env::var("LOGS_PUSHER_STATE_DIR") {
            if !dir.trim().is_empty() {
                config.retention.state_dir = PathBuf::from(dir.trim());
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "flush interval must be greater than 0".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "queue capacity must be greater than 0".to_string(),
            ));
        }
        if self.batch.max_events == 0 {
            return Err(ConfigError::InvalidConfig(
                "batch event limit must be greater than 0".to_string(),
            ));
        }
        if self.batch.max_event_bytes <= self.batch.per_event_header_bytes {
            return Err(ConfigError::InvalidConfig(format!(
                "per-event limit of {} bytes leaves no room for the {} byte event header",
                self.batch.max_event_bytes, self.batch.per_event_header_bytes
            )));
        }
        if self.batch.max_event_bytes > self.batch.max_bytes {
            return Err(ConfigError::InvalidConfig(format!(
                "per-event limit of {} bytes exceeds the request limit of {} bytes",
                self.batch.max_event_bytes, self.batch.max_bytes
            )));
        }
        if !self.rate_limit.per_second.is_finite() || self.rate_limit.per_second <= 0.0 {
            return Err(ConfigError::InvalidConfig(format!(
                "rate limit must be a positive number, got {}",
                self.rate_limit.per_second
            )));
        }
        if self.rate_limit.burst == 0 {
            return Err(ConfigError::InvalidConfig(
                "rate limit burst must be at least 1".to_string(),
            ));
        }
        if self.backoff.base_delay_short > self.backoff.max_delay
            || self.backoff.base_delay_long > self.backoff.max_delay
        {
            return Err(ConfigError::InvalidConfig(
                "backoff base delays must not exceed the maximum delay".to_string(),
            ));
        }
        if self.retention.ttl.is_zero() || self.retention.persist_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "retention cache TTL and persist interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 9] = [
        "LOGS_PUSHER_FLUSH_INTERVAL_MS",
        "LOGS_PUSHER_QUEUE_CAPACITY",
        "LOGS_PUSHER_RETRY_DURATION_SECS",
        "LOGS_PUSHER_MAX_REPAIR_ATTEMPTS",
        "LOGS_PUSHER_RATE_LIMIT",
        "LOGS_PUSHER_RATE_BURST",
        "LOGS_PUSHER_RETENTION_TTL_SECS",
        "LOGS_PUSHER_RETENTION_PERSIST_INTERVAL_SECS",
        "LOGS_PUSHER_STATE_DIR",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = PusherConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch.max_events, 10_000);
        assert_eq!(config.batch.max_bytes, 1024 * 1024);
        assert_eq!(config.batch.max_message_bytes(), 256 * 1024 - 26);
        assert_eq!(config.retention.ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_validate_rejects_zero_flush_interval() {
        let config = PusherConfig {
            flush_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_event_limit_smaller_than_header() {
        let mut config = PusherConfig::default();
        config.batch.max_event_bytes = 26;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_event_limit_above_request_limit() {
        let mut config = PusherConfig::default();
        config.batch.max_bytes = 1000;
        config.batch.max_event_bytes = 2000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_rate_limit() {
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = PusherConfig::default();
            config.rate_limit.per_second = rate;
            assert!(config.validate().is_err(), "rate {rate} should be invalid");
        }
        let mut config = PusherConfig::default();
        config.rate_limit.burst = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_state_file_path() {
        let mut config = RetentionCacheConfig::default();
        config.state_dir = PathBuf::from("/tmp/state");
        assert_eq!(
            config.state_file_path(),
            PathBuf::from("/tmp/state/retention_policy_ttl")
        );
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = PusherConfig::from_env().expect("defaults should be valid");
        assert_eq!(config, PusherConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var("LOGS_PUSHER_FLUSH_INTERVAL_MS", "250");
        env::set_var("LOGS_PUSHER_QUEUE_CAPACITY", "42");
        env::set_var("LOGS_PUSHER_RATE_LIMIT", "12.5");
        env::set_var("LOGS_PUSHER_RATE_BURST", "3");
        env::set_var("LOGS_PUSHER_STATE_DIR", " /tmp/pusher ");

        let config = PusherConfig::from_env().expect("config should parse");
        assert_eq!(config.flush_interval, Duration::from_millis(250));
        assert_eq!(config.queue_capacity, 42);
        assert!((config.rate_limit.per_second - 12.5).abs() < f64::EPSILON);
        assert_eq!(config.rate_limit.burst, 3);
        assert_eq!(config.retention.state_dir, PathBuf::from("/tmp/pusher"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unparsable_value() {
        clear_env();
        env::set_var("LOGS_PUSHER_QUEUE_CAPACITY", "lots");
        let err = PusherConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref var, ref value }
                if var == "LOGS_PUSHER_QUEUE_CAPACITY" && value == "lots"
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_validates() {
        clear_env();
        env::set_var("LOGS_PUSHER_FLUSH_INTERVAL_MS", "0");
        assert!(PusherConfig::from_env().is_err());
        clear_env();
    }
}
