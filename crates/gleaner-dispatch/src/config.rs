//! Configuration for the dispatcher
//!
//! Round limits, retry budgets, backoff timing and the provider priority
//! list. Durations are stored as integer milliseconds/seconds so the
//! struct round-trips through TOML unchanged.

use crate::error::DispatchError;
use gleaner_domain::ProviderId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Provider used when none is configured explicitly
pub const DEFAULT_PROVIDER: &str = "google/gemini-2.0-flash-001";

/// Configuration for a dispatcher run
///
/// # Examples
///
/// ```
/// use gleaner_dispatch::DispatchConfig;
/// use std::time::Duration;
///
/// let config = DispatchConfig::default();
/// assert_eq!(config.max_rounds, 3);
/// assert_eq!(config.inter_round_delay(1), Duration::from_secs(5));
/// assert_eq!(config.inter_round_delay(7), Duration::from_secs(10));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum scheduler rounds (>= 1)
    pub max_rounds: u32,

    /// Calls per provider within one dispatch (>= 1)
    pub per_provider_retries: u32,

    /// Delay after round N is `inter_round_delays_ms[N-1]`; the last value
    /// is reused past the end. Must be non-decreasing.
    pub inter_round_delays_ms: Vec<u64>,

    /// Upper bound for a single provider call (seconds)
    pub request_timeout_secs: u64,

    /// First backoff delay between calls to the same provider (milliseconds)
    pub backoff_base_ms: u64,

    /// Pause before falling back to the next provider (milliseconds)
    pub provider_switch_delay_ms: u64,

    /// Providers to try, highest priority first
    pub provider_priority: Vec<String>,

    /// Maximum simultaneous dispatches within a round (>= 1)
    pub concurrency_limit: usize,

    /// Optional per-provider call budget, shared by all dispatches
    pub rate_limit_per_minute: Option<u32>,

    /// Calls a provider may burst before the rate limit applies
    pub rate_limit_burst: u32,

    /// Rounds granted to each reconciliation re-run
    pub max_extra_rounds: u32,
}

impl Default for DispatchConfig {
    /// Balanced settings
    ///
    /// - 3 rounds, 3 calls per provider
    /// - 5s then 10s between rounds
    /// - 120s request timeout, 1s backoff base
    fn default() -> Self {
        Self {
            max_rounds: 3,
            per_provider_retries: 3,
            inter_round_delays_ms: vec![5_000, 10_000],
            request_timeout_secs: 120,
            backoff_base_ms: 1_000,
            provider_switch_delay_ms: 1_000,
            provider_priority: vec![DEFAULT_PROVIDER.to_string()],
            concurrency_limit: 4,
            rate_limit_per_minute: None,
            rate_limit_burst: 1,
            max_extra_rounds: 1,
        }
    }
}

impl DispatchConfig {
    /// Aggressive preset: fewer rounds, shorter waits, more parallelism
    pub fn aggressive() -> Self {
        Self {
            max_rounds: 2,
            per_provider_retries: 2,
            inter_round_delays_ms: vec![2_000],
            request_timeout_secs: 60,
            backoff_base_ms: 500,
            provider_switch_delay_ms: 500,
            concurrency_limit: 8,
            ..Self::default()
        }
    }

    /// Lenient preset: more rounds, longer waits, gentle on rate limits
    pub fn lenient() -> Self {
        Self {
            max_rounds: 5,
            per_provider_retries: 4,
            inter_round_delays_ms: vec![5_000, 10_000, 20_000, 30_000],
            request_timeout_secs: 300,
            backoff_base_ms: 2_000,
            provider_switch_delay_ms: 2_000,
            concurrency_limit: 2,
            rate_limit_per_minute: Some(30),
            ..Self::default()
        }
    }

    /// Delay to apply after `round` (1-based) before the next round
    pub fn inter_round_delay(&self, round: u32) -> Duration {
        let Some(last) = self.inter_round_delays_ms.last() else {
            return Duration::ZERO;
        };
        let idx = round.saturating_sub(1) as usize;
        let ms = self.inter_round_delays_ms.get(idx).unwrap_or(last);
        Duration::from_millis(*ms)
    }

    /// Get the request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backoff after the `try_number`-th failed call (1-based): base, 2×base,
    /// 4×base, ... capped at the request timeout
    pub fn backoff_delay(&self, try_number: u32) -> Duration {
        let exponent = try_number.saturating_sub(1).min(20);
        let delay = Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << exponent));
        delay.min(self.request_timeout())
    }

    /// Get the provider switch delay as a Duration
    pub fn provider_switch_delay(&self) -> Duration {
        Duration::from_millis(self.provider_switch_delay_ms)
    }

    /// Provider ids in priority order
    pub fn providers(&self) -> Vec<ProviderId> {
        self.provider_priority.iter().map(ProviderId::new).collect()
    }

    /// Upper bound on provider calls for one item over a whole run
    pub fn max_calls_per_item(&self) -> u64 {
        u64::from(self.max_rounds)
            * self.provider_priority.len() as u64
            * u64::from(self.per_provider_retries)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.max_rounds == 0 {
            return Err(DispatchError::Config("max_rounds must be at least 1".to_string()));
        }
        if self.per_provider_retries == 0 {
            return Err(DispatchError::Config(
                "per_provider_retries must be at least 1".to_string(),
            ));
        }
        if self.concurrency_limit == 0 {
            return Err(DispatchError::Config(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(DispatchError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.provider_priority.is_empty() {
            return Err(DispatchError::Config("provider_priority is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for provider in &self.provider_priority {
            if provider.trim().is_empty() {
                return Err(DispatchError::Config("provider id cannot be blank".to_string()));
            }
            if !seen.insert(provider.as_str()) {
                return Err(DispatchError::Config(format!(
                    "provider '{}' listed more than once",
                    provider
                )));
            }
        }
        if self.inter_round_delays_ms.windows(2).any(|w| w[1] < w[0]) {
            return Err(DispatchError::Config(
                "inter_round_delays_ms must be non-decreasing".to_string(),
            ));
        }
        if self.rate_limit_per_minute == Some(0) {
            return Err(DispatchError::Config(
                "rate_limit_per_minute must be greater than 0 when set".to_string(),
            ));
        }
        if self.rate_limit_burst == 0 {
            return Err(DispatchError::Config("rate_limit_burst must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, DispatchError> {
        toml::from_str(toml_str)
            .map_err(|e| DispatchError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, DispatchError> {
        toml::to_string_pretty(self)
            .map_err(|e| DispatchError::Config(format!("Failed to serialize to TOML: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(DispatchConfig::default().validate().is_ok());
        assert!(DispatchConfig::aggressive().validate().is_ok());
        assert!(DispatchConfig::lenient().validate().is_ok());
    }

    #[test]
    fn test_empty_provider_list_rejected() {
        let config = DispatchConfig {
            provider_priority: vec![],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DispatchError::Config(_))));
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let config = DispatchConfig {
            provider_priority: vec!["a".into(), "b".into(), "a".into()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_counts_rejected() {
        for config in [
            DispatchConfig { max_rounds: 0, ..Default::default() },
            DispatchConfig { per_provider_retries: 0, ..Default::default() },
            DispatchConfig { concurrency_limit: 0, ..Default::default() },
            DispatchConfig { request_timeout_secs: 0, ..Default::default() },
            DispatchConfig { rate_limit_per_minute: Some(0), ..Default::default() },
        ] {
            assert!(config.validate().is_err(), "{:?} should be invalid", config);
        }
    }

    #[test]
    fn test_decreasing_delays_rejected() {
        let config = DispatchConfig {
            inter_round_delays_ms: vec![10_000, 5_000],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inter_round_delay_reuses_last_value() {
        let config = DispatchConfig {
            inter_round_delays_ms: vec![100, 200, 300],
            ..Default::default()
        };
        assert_eq!(config.inter_round_delay(1), Duration::from_millis(100));
        assert_eq!(config.inter_round_delay(3), Duration::from_millis(300));
        assert_eq!(config.inter_round_delay(9), Duration::from_millis(300));

        let none = DispatchConfig {
            inter_round_delays_ms: vec![],
            ..Default::default()
        };
        assert_eq!(none.inter_round_delay(1), Duration::ZERO);
    }

    #[test]
    fn test_backoff_doubles_and_is_capped() {
        let config = DispatchConfig {
            backoff_base_ms: 1_000,
            request_timeout_secs: 5,
            ..Default::default()
        };
        assert_eq!(config.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(config.backoff_delay(4), Duration::from_secs(5));
        assert_eq!(config.backoff_delay(60), Duration::from_secs(5));
    }

    #[test]
    fn test_max_calls_per_item() {
        let config = DispatchConfig {
            max_rounds: 3,
            per_provider_retries: 2,
            provider_priority: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        assert_eq!(config.max_calls_per_item(), 12);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = DispatchConfig::lenient();
        let toml_str = config.to_toml().unwrap();
        let parsed = DispatchConfig::from_toml(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = DispatchConfig::from_toml("max_rounds = 7\n").unwrap();
        assert_eq!(parsed.max_rounds, 7);
        assert_eq!(parsed.per_provider_retries, 3);
        assert_eq!(parsed.provider_priority, vec![DEFAULT_PROVIDER.to_string()]);
    }
}
