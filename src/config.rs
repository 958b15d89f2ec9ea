//! Immutable, validated configuration for a single limiter.
//!
//! A [`Configuration`] is built once per limiter through [`ConfigurationBuilder`]
//! and never mutates afterwards; algorithm state carries everything that
//! changes over time.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One of the four supported pacing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Burst-capable admission with continuous refill. See [`crate::algorithm::token_bucket`].
    TokenBucket,
    /// Smooth admission; fill-on-admit, drain-at-rate. See [`crate::algorithm::leaky_bucket`].
    LeakyBucket,
    /// Counter per discrete window, hard reset at the boundary. See [`crate::algorithm::fixed_window`].
    FixedWindow,
    /// Rolling count of timestamps within a trailing window. See [`crate::algorithm::sliding_window`].
    SlidingWindow,
}

impl Algorithm {
    /// The external string tag used in configuration and cache keys.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::TokenBucket => "token_bucket",
            Self::LeakyBucket => "leaky_bucket",
            Self::FixedWindow => "fixed_window",
            Self::SlidingWindow => "sliding_window",
        }
    }

    /// Two-letter prefix used in the `four_rl_<prefix>_<hash>` cache key format.
    pub(crate) fn cache_prefix(&self) -> &'static str {
        match self {
            Self::TokenBucket => "tb",
            Self::LeakyBucket => "lb",
            Self::FixedWindow => "fw",
            Self::SlidingWindow => "sw",
        }
    }

    /// Parse one of the four literal algorithm tags.
    pub fn parse(tag: &str) -> std::result::Result<Self, ConfigError> {
        match tag {
            "token_bucket" => Ok(Self::TokenBucket),
            "leaky_bucket" => Ok(Self::LeakyBucket),
            "fixed_window" => Ok(Self::FixedWindow),
            "sliding_window" => Ok(Self::SlidingWindow),
            other => Err(ConfigError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// The internal header field names a [`Configuration`] may map to
/// remote-service-specific header names via `header_mappings`.
pub mod header_field {
    /// Authoritative limit (requests per window, or bucket capacity).
    pub const LIMIT: &str = "limit";
    /// Authoritative remaining count.
    pub const REMAINING: &str = "remaining";
    /// Seconds (or epoch) until the remote window resets.
    pub const RESET: &str = "reset";
    /// Seconds (or HTTP-date) to wait before retrying, on 429.
    pub const RETRY_AFTER: &str = "retry_after";
    /// Fixed-window only: authoritative daily rate.
    pub const DAILY_LIMIT: &str = "daily_limit";
    /// Fixed-window only: authoritative hourly rate.
    pub const HOURLY_LIMIT: &str = "hourly_limit";
    /// Fixed-window only: authoritative remaining count for the day.
    pub const DAILY_REMAINING: &str = "daily_remaining";
}

fn default_header_mappings() -> HashMap<String, String> {
    [
        (header_field::LIMIT, "X-RateLimit-Limit"),
        (header_field::REMAINING, "X-RateLimit-Remaining"),
        (header_field::RESET, "X-RateLimit-Reset"),
        (header_field::RETRY_AFTER, "Retry-After"),
        (header_field::DAILY_LIMIT, "X-RateLimit-Limit-Day"),
        (header_field::HOURLY_LIMIT, "X-RateLimit-Limit-Hour"),
        (header_field::DAILY_REMAINING, "X-RateLimit-Remaining-Day"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Immutable, validated parameter bundle for one limiter.
///
/// Construct through [`Configuration::builder`]; there is no public way to
/// obtain an unvalidated instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub(crate) algorithm: Algorithm,
    pub(crate) rate_per_second: f64,
    pub(crate) burst_capacity: u64,
    pub(crate) safety_buffer: f64,
    pub(crate) endpoint_limits: HashMap<String, f64>,
    pub(crate) header_mappings: HashMap<String, String>,
    pub(crate) window_size_ms: u64,
    pub(crate) persist_state: bool,
    pub(crate) state_file: Option<PathBuf>,
    pub(crate) cleanup_interval_seconds: u64,
}

impl Configuration {
    /// Start building a configuration for the given algorithm.
    pub fn builder(algorithm: Algorithm) -> ConfigurationBuilder {
        ConfigurationBuilder::new(algorithm)
    }

    /// The selected pacing algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The configured steady-state rate, before the safety buffer.
    pub fn rate_per_second(&self) -> f64 {
        self.rate_per_second
    }

    /// The configured burst capacity.
    pub fn burst_capacity(&self) -> u64 {
        self.burst_capacity
    }

    /// The safety-buffer multiplier in `(0, 1]`.
    pub fn safety_buffer(&self) -> f64 {
        self.safety_buffer
    }

    /// The configured window length, for window-based algorithms.
    pub fn window_size_ms(&self) -> u64 {
        self.window_size_ms
    }

    /// Window length in fractional seconds, a convenience for the
    /// per-second formulas in §4.4/§4.5.
    pub fn window_size_seconds(&self) -> f64 {
        self.window_size_ms as f64 / 1000.0
    }

    /// Whether this limiter should load/save state across process restarts.
    pub fn persist_state(&self) -> bool {
        self.persist_state
    }

    /// The configured file-backend path, if any.
    pub fn state_file(&self) -> Option<&PathBuf> {
        self.state_file.as_ref()
    }

    /// Age after which dormant keys may be reclaimed by `cleanup`.
    pub fn cleanup_interval_seconds(&self) -> u64 {
        self.cleanup_interval_seconds
    }

    /// The response header name mapped to an internal field, if configured.
    pub fn header_name(&self, field: &str) -> Option<&str> {
        self.header_mappings.get(field).map(String::as_str)
    }

    /// The base (pre-safety-buffer, pre-overlay) rate for a key: the
    /// per-endpoint override if one is configured, else the default rate.
    pub(crate) fn base_rate_for(&self, key: &str) -> f64 {
        self.endpoint_limits.get(key).copied().unwrap_or(self.rate_per_second)
    }

    /// Effective rate precedence (§4.2): dynamic overlay for key, then
    /// per-endpoint override × safety-buffer, then default rate ×
    /// safety-buffer. Dynamic overlay values are already safety-buffered
    /// when they are inserted (§4.7), so they are used as-is here.
    pub(crate) fn effective_rate(&self, key: &str, dynamic_limits: &HashMap<String, f64>) -> f64 {
        if let Some(rate) = dynamic_limits.get(key) {
            return *rate;
        }
        self.base_rate_for(key) * self.safety_buffer
    }
}

/// Builder for [`Configuration`], validating every numeric field on `build`.
#[derive(Debug, Clone)]
pub struct ConfigurationBuilder {
    algorithm: Algorithm,
    rate_per_second: f64,
    burst_capacity: u64,
    safety_buffer: f64,
    endpoint_limits: HashMap<String, f64>,
    header_mappings: HashMap<String, String>,
    window_size_ms: u64,
    persist_state: bool,
    state_file: Option<PathBuf>,
    cleanup_interval_seconds: u64,
}

impl ConfigurationBuilder {
    /// Create a new builder, defaulted per §3 (`safety_buffer = 0.8`,
    /// `window_size_ms = 1000`, `cleanup_interval_seconds = 3600`).
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            rate_per_second: 1.0,
            burst_capacity: 1,
            safety_buffer: 0.8,
            endpoint_limits: HashMap::new(),
            header_mappings: default_header_mappings(),
            window_size_ms: 1000,
            persist_state: false,
            state_file: None,
            cleanup_interval_seconds: 3600,
        }
    }

    /// Set the steady-state admission rate, before the safety factor.
    pub fn rate_per_second(mut self, rate: f64) -> Self {
        self.rate_per_second = rate;
        self
    }

    /// Set the maximum burst size.
    pub fn burst_capacity(mut self, capacity: u64) -> Self {
        self.burst_capacity = capacity;
        self
    }

    /// Set the safety-buffer multiplier.
    pub fn safety_buffer(mut self, buffer: f64) -> Self {
        self.safety_buffer = buffer;
        self
    }

    /// Add (or replace) a per-key rate override, pre-safety-buffer.
    pub fn endpoint_limit(mut self, key: impl Into<String>, rate: f64) -> Self {
        self.endpoint_limits.insert(key.into(), rate);
        self
    }

    /// Replace the whole `header_mappings` table.
    pub fn header_mappings(mut self, mappings: HashMap<String, String>) -> Self {
        self.header_mappings = mappings;
        self
    }

    /// Remap a single internal header field to a remote header name.
    pub fn header_mapping(mut self, field: impl Into<String>, header_name: impl Into<String>) -> Self {
        self.header_mappings.insert(field.into(), header_name.into());
        self
    }

    /// Set the window length for window-based algorithms.
    pub fn window_size_ms(mut self, millis: u64) -> Self {
        self.window_size_ms = millis;
        self
    }

    /// Enable state persistence and select the file backend.
    pub fn state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self.persist_state = true;
        self
    }

    /// Enable or disable persistence without changing the backend choice.
    pub fn persist_state(mut self, persist: bool) -> Self {
        self.persist_state = persist;
        self
    }

    /// Set the dormancy cutoff used by automatic and explicit cleanup.
    pub fn cleanup_interval_seconds(mut self, seconds: u64) -> Self {
        self.cleanup_interval_seconds = seconds;
        self
    }

    /// Validate and produce the immutable [`Configuration`].
    pub fn build(self) -> std::result::Result<Configuration, ConfigError> {
        if !(self.rate_per_second > 0.0) {
            return Err(ConfigError::InvalidRate(self.rate_per_second));
        }
        if self.burst_capacity < 1 {
            return Err(ConfigError::InvalidBurst(self.burst_capacity));
        }
        if !(self.safety_buffer > 0.0) || self.safety_buffer > 1.0 {
            return Err(ConfigError::InvalidSafetyBuffer(self.safety_buffer));
        }
        if self.window_size_ms == 0 {
            return Err(ConfigError::InvalidWindow(self.window_size_ms));
        }
        if self.cleanup_interval_seconds < 1 {
            return Err(ConfigError::InvalidCleanupInterval(self.cleanup_interval_seconds));
        }
        for (key, rate) in &self.endpoint_limits {
            if !(*rate > 0.0) {
                return Err(ConfigError::InvalidEndpointRate(key.clone(), *rate));
            }
        }

        Ok(Configuration {
            algorithm: self.algorithm,
            rate_per_second: self.rate_per_second,
            burst_capacity: self.burst_capacity,
            safety_buffer: self.safety_buffer,
            endpoint_limits: self.endpoint_limits,
            header_mappings: self.header_mappings,
            window_size_ms: self.window_size_ms,
            persist_state: self.persist_state,
            state_file: self.state_file,
            cleanup_interval_seconds: self.cleanup_interval_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Configuration::builder(Algorithm::TokenBucket)
            .rate_per_second(5.0)
            .burst_capacity(10)
            .build()
            .unwrap();
        assert_eq!(cfg.safety_buffer(), 0.8);
        assert_eq!(cfg.window_size_ms(), 1000);
        assert_eq!(cfg.cleanup_interval_seconds(), 3600);
        assert!(!cfg.persist_state());
    }

    #[test]
    fn test_algorithm_tag_roundtrip() {
        for algo in [
            Algorithm::TokenBucket,
            Algorithm::LeakyBucket,
            Algorithm::FixedWindow,
            Algorithm::SlidingWindow,
        ] {
            assert_eq!(Algorithm::parse(algo.tag()).unwrap(), algo);
        }
        assert!(Algorithm::parse("not_a_real_algorithm").is_err());
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let err = Configuration::builder(Algorithm::TokenBucket)
            .rate_per_second(0.0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidRate(0.0));
    }

    #[test]
    fn test_invalid_burst_rejected() {
        let err = Configuration::builder(Algorithm::TokenBucket)
            .rate_per_second(1.0)
            .burst_capacity(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidBurst(0));
    }

    #[test]
    fn test_invalid_safety_buffer_rejected() {
        for bad in [0.0, -0.1, 1.5] {
            let err = Configuration::builder(Algorithm::TokenBucket)
                .rate_per_second(1.0)
                .burst_capacity(1)
                .safety_buffer(bad)
                .build()
                .unwrap_err();
            assert_eq!(err, ConfigError::InvalidSafetyBuffer(bad));
        }
    }

    #[test]
    fn test_invalid_window_rejected() {
        let err = Configuration::builder(Algorithm::FixedWindow)
            .rate_per_second(1.0)
            .burst_capacity(1)
            .window_size_ms(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidWindow(0));
    }

    #[test]
    fn test_invalid_cleanup_interval_rejected() {
        let err = Configuration::builder(Algorithm::TokenBucket)
            .rate_per_second(1.0)
            .burst_capacity(1)
            .cleanup_interval_seconds(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidCleanupInterval(0));
    }

    #[test]
    fn test_effective_rate_precedence() {
        let cfg = Configuration::builder(Algorithm::TokenBucket)
            .rate_per_second(10.0)
            .burst_capacity(5)
            .safety_buffer(0.5)
            .endpoint_limit("search", 4.0)
            .build()
            .unwrap();

        // default rate * safety buffer
        assert_eq!(cfg.effective_rate("anything", &HashMap::new()), 5.0);
        // endpoint override * safety buffer
        assert_eq!(cfg.effective_rate("search", &HashMap::new()), 2.0);
        // dynamic overlay wins over everything, used as-is
        let mut dynamic = HashMap::new();
        dynamic.insert("search".to_string(), 1.25);
        assert_eq!(cfg.effective_rate("search", &dynamic), 1.25);
    }

    #[test]
    fn test_default_header_mappings_present() {
        let cfg = Configuration::builder(Algorithm::TokenBucket)
            .rate_per_second(1.0)
            .burst_capacity(1)
            .build()
            .unwrap();
        assert_eq!(cfg.header_name(header_field::LIMIT), Some("X-RateLimit-Limit"));
        assert_eq!(cfg.header_name(header_field::RETRY_AFTER), Some("Retry-After"));
    }
}
