//! Backoff timing for model retries and fallbacks
//!
//! Exponential backoff with jitter, applied by the fallback router before it
//! re-issues a request to the same model or to the next model in the chain.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Configuration for retry behavior on transient errors (throttling, rate limits)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts against a single model (default: 3)
    pub max_attempts: usize,
    /// Base delay in milliseconds for exponential backoff (default: 500ms)
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds (default: 30000ms)
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

/// Delay before the attempt following `attempt` (1-based).
///
/// Doubles from `base_delay_ms` per attempt, capped at `max_delay_ms`, then
/// jittered by up to 20% either way.
pub fn backoff_delay(attempt: usize, config: &RetryConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(10) as u32;
    let delay_ms = config
        .base_delay_ms
        .saturating_mul(1_u64 << exponent)
        .min(config.max_delay_ms);
    Duration::from_millis(jitter_ms(delay_ms))
}

fn jitter_ms(delay_ms: u64) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as i64;
    // Percentage in -20..=20
    let percent = nanos % 41 - 20;
    let delay = delay_ms as i64;
    (delay + delay * percent / 100).max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.max_delay_ms, 30_000);
    }

    #[test]
    fn test_retry_config_partial_json_uses_defaults() {
        let config: RetryConfig = serde_json::from_str(r#"{"max_attempts": 5}"#).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay_ms, 500);
    }

    #[test]
    fn test_backoff_delay_first_attempt() {
        let config = RetryConfig::default();
        let delay = backoff_delay(1, &config);

        // 500ms * 2^0 with ±20% jitter
        assert!(delay.as_millis() >= 400);
        assert!(delay.as_millis() <= 600);
    }

    #[test]
    fn test_backoff_delay_respects_max() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 2000,
            max_attempts: 10,
        };

        let delay = backoff_delay(10, &config);
        assert!(delay.as_millis() <= 2400);
    }

    #[test]
    fn test_backoff_delay_zero_base_is_zero() {
        let config = RetryConfig {
            base_delay_ms: 0,
            max_delay_ms: 0,
            max_attempts: 2,
        };
        assert_eq!(backoff_delay(4, &config), Duration::ZERO);
    }

    #[test]
    fn test_jitter_ms_within_bounds() {
        let jittered = jitter_ms(1000);
        assert!(jittered >= 800);
        assert!(jittered <= 1200);
    }
}
