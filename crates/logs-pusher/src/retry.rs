// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Backoff between publish retries.

use std::time::Duration;

use crate::config::BackoffConfig;
use crate::errors::PublishError;

/// Which base delay a retry backs off from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// One-off service failures.
    Short,
    /// The service is throttling or unavailable.
    Long,
}

impl RetryStrategy {
    #[must_use]
    pub fn for_error(error: &PublishError) -> Self {
        if error.is_throttling() {
            Self::Long
        } else {
            Self::Short
        }
    }
}

/// Delay before retry number `attempt` (0 based), without jitter.
#[must_use]
pub fn base_delay(strategy: RetryStrategy, attempt: u32, config: &BackoffConfig) -> Duration {
    let base = match strategy {
        RetryStrategy::Short => config.base_delay_short,
        RetryStrategy::Long => config.base_delay_long,
    };
    let factor = 2u32.checked_pow(attempt.min(31)).unwrap_or(u32::MAX);
    base.checked_mul(factor)
        .unwrap_or(config.max_delay)
        .min(config.max_delay)
}

/// Delay before retry number `attempt`, with half of it randomized.
#[must_use]
pub fn backoff_delay(strategy: RetryStrategy, attempt: u32, config: &BackoffConfig) -> Duration {
    let delay = base_delay(strategy, attempt, config);
    let half = delay / 2;
    let jitter_nanos = u64::try_from(half.as_nanos()).unwrap_or(u64::MAX);
    half + Duration::from_nanos(fastrand::u64(0..=jitter_nanos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_selection() {
        assert_eq!(
            RetryStrategy::for_error(&PublishError::Throttling(String::new())),
            RetryStrategy::Long
        );
        assert_eq!(
            RetryStrategy::for_error(&PublishError::ServiceUnavailable(String::new())),
            RetryStrategy::Long
        );
        assert_eq!(
            RetryStrategy::for_error(&PublishError::Service {
                code: "InternalFailure".to_string(),
                message: String::new(),
            }),
            RetryStrategy::Short
        );
    }

    #[test]
    fn test_base_delay_doubles_up_to_cap() {
        let config = BackoffConfig::default();
        let delays: Vec<_> = (0..6)
            .map(|attempt| base_delay(RetryStrategy::Short, attempt, &config))
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1600),
                Duration::from_millis(3200),
                Duration::from_millis(6400),
            ]
        );
        assert_eq!(
            base_delay(RetryStrategy::Long, 5, &config),
            Duration::from_secs(60)
        );
        assert_eq!(
            base_delay(RetryStrategy::Long, 100, &config),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_jitter_stays_within_half_to_full_delay() {
        let config = BackoffConfig::default();
        for attempt in 0..10 {
            let full = base_delay(RetryStrategy::Long, attempt, &config);
            for _ in 0..20 {
                let delay = backoff_delay(RetryStrategy::Long, attempt, &config);
                assert!(delay >= full / 2, "{delay:?} below half of {full:?}");
                assert!(delay <= full, "{delay:?} above {full:?}");
            }
        }
    }
}
