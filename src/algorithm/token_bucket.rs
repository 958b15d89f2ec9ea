//! Token bucket: continuous refill, hard burst capacity (§4.2).

use serde::{Deserialize, Serialize};

use crate::base::AlgorithmState;
use crate::config::{Algorithm, Configuration};
use crate::headers::ReconcileFields;
use crate::status::StatusRaw;

/// Per-key token bucket state. `capacity_override` is set by header
/// reconciliation when the server reports a smaller `limit` than
/// configured — it only ever shrinks, never grows back on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBucketState {
    tokens: f64,
    last_refill: u64,
    last_request: Option<u64>,
    capacity_override: Option<u64>,
    #[serde(default = "default_true")]
    initialized: bool,
}

fn default_true() -> bool {
    true
}

impl TokenBucketState {
    fn capacity(&self, config: &Configuration) -> u64 {
        match self.capacity_override {
            Some(cap) => cap.min(config.burst_capacity()),
            None => config.burst_capacity(),
        }
    }
}

impl AlgorithmState for TokenBucketState {
    const ALGORITHM: Algorithm = Algorithm::TokenBucket;
    const SLEEP_CAP_MS: u64 = 1000;

    fn new(now_ms: u64) -> Self {
        Self { tokens: 0.0, last_refill: now_ms, last_request: None, capacity_override: None, initialized: false }
    }

    fn touch(&mut self, now_ms: u64, effective_rate: f64, config: &Configuration) {
        let capacity = self.capacity(config) as f64;

        if !self.initialized {
            // Start full, per the uniform "full admission capacity" initial
            // state (§3 invariants).
            self.tokens = capacity;
            self.last_refill = now_ms;
            self.initialized = true;
            return;
        }

        let elapsed_secs = now_ms.saturating_sub(self.last_refill) as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed_secs * effective_rate).min(capacity);
        self.last_refill = now_ms;
    }

    fn try_admit(&mut self, tokens: u64, now_ms: u64, _effective_rate: f64, config: &Configuration) -> bool {
        let capacity = self.capacity(config);
        if tokens > capacity {
            return false;
        }
        if self.tokens >= tokens as f64 {
            self.tokens -= tokens as f64;
            self.last_request = Some(now_ms);
            true
        } else {
            false
        }
    }

    fn wait_time_ms(&self, tokens: u64, _now_ms: u64, effective_rate: f64, config: &Configuration) -> u64 {
        if tokens > self.capacity(config) {
            return 30_000;
        }
        if !(effective_rate > 0.0) {
            return 30_000;
        }
        if self.tokens >= tokens as f64 {
            return 0;
        }
        (((tokens as f64 - self.tokens) / effective_rate) * 1000.0).ceil() as u64
    }

    fn usage_percent(&self, _effective_rate: f64, config: &Configuration) -> f64 {
        let capacity = self.capacity(config) as f64;
        if capacity <= 0.0 {
            return 100.0;
        }
        (((capacity - self.tokens) / capacity) * 100.0).clamp(0.0, 100.0)
    }

    fn raw_status(&self, _effective_rate: f64, config: &Configuration) -> StatusRaw {
        StatusRaw::TokenBucket { tokens: self.tokens, capacity: self.capacity(config) }
    }

    fn reconcile(&mut self, key: &str, fields: &ReconcileFields, config: &Configuration) -> Vec<(String, f64)> {
        let mut overlays = Vec::new();

        if let Some(limit) = fields.limit {
            self.capacity_override =
                Some(self.capacity_override.map_or(limit as u64, |existing| existing.min(limit as u64)));
            overlays.push((key.to_string(), limit * config.safety_buffer()));
        }

        if let Some(remaining) = fields.remaining {
            self.tokens = self.tokens.min(remaining);
        }

        overlays
    }

    fn last_activity_ms(&self) -> u64 {
        self.last_refill
    }

    fn last_request_ms(&self) -> Option<u64> {
        self.last_request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rate: f64, burst: u64) -> Configuration {
        Configuration::builder(Algorithm::TokenBucket)
            .rate_per_second(rate)
            .burst_capacity(burst)
            .safety_buffer(1.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_capacity_equals_burst_not_max_of_burst_and_rate() {
        // rate=100, burst=10: capacity must stay 10, never max(burst, rate).
        let config = config(100.0, 10);
        let mut state = TokenBucketState::new(0);
        state.touch(0, 100.0, &config);
        assert_eq!(state.capacity(&config), 10);
        assert_eq!(state.tokens, 10.0);
    }

    #[test]
    fn test_burst_then_deny() {
        let config = config(1.0, 5);
        let mut state = TokenBucketState::new(0);
        state.touch(0, 1.0, &config);
        for _ in 0..5 {
            assert!(state.try_admit(1, 0, 1.0, &config));
        }
        assert!(!state.try_admit(1, 0, 1.0, &config));
    }

    #[test]
    fn test_refill_over_time() {
        let config = config(10.0, 1);
        let mut state = TokenBucketState::new(0);
        state.touch(0, 10.0, &config);
        assert!(state.try_admit(1, 0, 10.0, &config));
        assert!(!state.try_admit(1, 0, 10.0, &config));

        state.touch(150, 10.0, &config);
        assert!(state.try_admit(1, 150, 10.0, &config));
    }

    #[test]
    fn test_oversized_request_always_denied_with_fallback_wait() {
        let config = config(10.0, 5);
        let mut state = TokenBucketState::new(0);
        state.touch(0, 10.0, &config);
        assert!(!state.try_admit(6, 0, 10.0, &config));
        assert_eq!(state.wait_time_ms(6, 0, 10.0, &config), 30_000);
    }

    #[test]
    fn test_reconcile_limit_never_raises_capacity() {
        let config = config(10.0, 20);
        let mut state = TokenBucketState::new(0);
        state.touch(0, 10.0, &config);
        let fields = ReconcileFields { limit: Some(5.0), ..Default::default() };
        let overlays = state.reconcile("k", &fields, &config);
        assert_eq!(state.capacity(&config), 5);
        assert_eq!(overlays.len(), 1);
    }

    #[test]
    fn test_reconcile_remaining_never_raises_tokens() {
        let config = config(10.0, 10);
        let mut state = TokenBucketState::new(0);
        state.touch(0, 10.0, &config);
        let fields = ReconcileFields { remaining: Some(2.0), ..Default::default() };
        state.reconcile("k", &fields, &config);
        assert_eq!(state.tokens, 2.0);

        // A subsequent, larger "remaining" never raises it back up.
        let fields = ReconcileFields { remaining: Some(9.0), ..Default::default() };
        state.reconcile("k", &fields, &config);
        assert_eq!(state.tokens, 2.0);
    }
}
