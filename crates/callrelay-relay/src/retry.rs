// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backoff schedule for deliveries waiting on a not-yet-ready endpoint.
//
// Readiness is the only thing retried: an endpoint that is attached but
// rejects an invocation is not retried (the application may already have
// acted on it).

use std::time::Duration;

use callrelay_core::config::RetryConfig;
use tracing::{debug, warn};

/// Result of evaluating whether to check readiness again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-check readiness after this delay.
    RetryAfter(Duration),
    /// Attempt budget exhausted.
    Exhausted,
}

/// Decide what to do after `attempt` failed readiness checks (0-based).
pub fn next_retry(attempt: u32, config: &RetryConfig) -> RetryDecision {
    if let Some(max) = config.max_attempts {
        if attempt >= max {
            warn!(attempt, max, "delivery retry limit exhausted");
            return RetryDecision::Exhausted;
        }
    }

    let delay = compute_delay(attempt, config);
    debug!(attempt, delay_ms = delay.as_millis() as u64, "endpoint not ready, scheduling retry");
    RetryDecision::RetryAfter(delay)
}

/// delay = min(base * multiplier^attempt, max_delay)
fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_ms = config.base_delay_ms;
    let factor = u64::from(config.multiplier.max(1)).saturating_pow(attempt.min(16));
    let capped_ms = base_ms
        .saturating_mul(factor)
        .min(config.max_delay_ms.max(base_ms));
    Duration::from_millis(capped_ms)
}

/// Total time a message may wait before it times out, `None` when unbounded.
pub fn retry_budget(config: &RetryConfig) -> Option<Duration> {
    let max = config.max_attempts?;
    Some((0..max).map(|attempt| compute_delay(attempt, config)).sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_respects_max() {
        let config = RetryConfig {
            max_attempts: Some(3),
            ..Default::default()
        };
        assert!(matches!(next_retry(0, &config), RetryDecision::RetryAfter(_)));
        assert!(matches!(next_retry(2, &config), RetryDecision::RetryAfter(_)));
        assert_eq!(next_retry(3, &config), RetryDecision::Exhausted);
    }

    #[test]
    fn unbounded_never_exhausts() {
        let config = RetryConfig {
            max_attempts: None,
            ..Default::default()
        };
        assert!(matches!(next_retry(10_000, &config), RetryDecision::RetryAfter(_)));
        assert_eq!(retry_budget(&config), None);
    }

    #[test]
    fn delay_doubles_then_caps() {
        let config = RetryConfig {
            max_delay_ms: 8_000,
            ..Default::default()
        };
        assert_eq!(compute_delay(0, &config), Duration::from_millis(500));
        assert_eq!(compute_delay(1, &config), Duration::from_millis(1_000));
        assert_eq!(compute_delay(2, &config), Duration::from_millis(2_000));
        assert_eq!(compute_delay(4, &config), Duration::from_millis(8_000));
        assert_eq!(compute_delay(30, &config), Duration::from_millis(8_000));
    }

    #[test]
    fn default_schedule_stays_short_per_wait() {
        let config = RetryConfig::default();
        assert_eq!(compute_delay(0, &config), Duration::from_millis(500));
        assert_eq!(compute_delay(1, &config), Duration::from_millis(1_000));
        assert_eq!(compute_delay(20, &config), Duration::from_millis(1_000));
        // Roughly four and a half minutes before a message times out.
        assert_eq!(retry_budget(&config), Some(Duration::from_millis(269_500)));
    }

    #[test]
    fn multiplier_one_is_fixed_delay() {
        let config = RetryConfig {
            multiplier: 1,
            ..Default::default()
        };
        for attempt in [0, 1, 5, 50] {
            assert_eq!(compute_delay(attempt, &config), Duration::from_millis(500));
        }
    }

    #[test]
    fn budget_sums_schedule() {
        let config = RetryConfig {
            base_delay_ms: 100,
            max_delay_ms: 300,
            multiplier: 2,
            max_attempts: Some(4),
        };
        // 100 + 200 + 300 + 300
        assert_eq!(retry_budget(&config), Some(Duration::from_millis(900)));
    }
}
