//! Leaky bucket: starts empty, fills on admit, drains continuously (§4.3).

use serde::{Deserialize, Serialize};

use crate::base::AlgorithmState;
use crate::config::{Algorithm, Configuration};
use crate::headers::ReconcileFields;
use crate::status::StatusRaw;

/// Per-key leaky bucket state. Capacity always equals `burst_capacity`: §4.7
/// scopes header-driven capacity shrinkage to token-bucket only, so leaky
/// bucket carries no `capacity_override`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakyBucketState {
    level: f64,
    last_leak: u64,
    last_request: Option<u64>,
}

impl LeakyBucketState {
    fn capacity(&self, config: &Configuration) -> u64 {
        config.burst_capacity()
    }
}

impl AlgorithmState for LeakyBucketState {
    const ALGORITHM: Algorithm = Algorithm::LeakyBucket;
    const SLEEP_CAP_MS: u64 = 1000;

    fn new(now_ms: u64) -> Self {
        Self { level: 0.0, last_leak: now_ms, last_request: None }
    }

    fn touch(&mut self, now_ms: u64, effective_rate: f64, _config: &Configuration) {
        let elapsed_secs = now_ms.saturating_sub(self.last_leak) as f64 / 1000.0;
        // Update last_leak even at level 0, so no unbounded "debt" accrues.
        self.level = (self.level - elapsed_secs * effective_rate).max(0.0);
        self.last_leak = now_ms;
    }

    fn try_admit(&mut self, tokens: u64, now_ms: u64, _effective_rate: f64, config: &Configuration) -> bool {
        let capacity = self.capacity(config) as f64;
        let requested = tokens as f64;
        if requested > capacity {
            return false;
        }
        if self.level + requested <= capacity {
            self.level += requested;
            self.last_request = Some(now_ms);
            true
        } else {
            false
        }
    }

    fn wait_time_ms(&self, tokens: u64, _now_ms: u64, effective_rate: f64, config: &Configuration) -> u64 {
        let capacity = self.capacity(config) as f64;
        let requested = tokens as f64;
        if requested > capacity {
            return 30_000;
        }
        if !(effective_rate > 0.0) {
            return 30_000;
        }
        let available = capacity - self.level;
        if requested <= available {
            return 0;
        }
        (((requested - available) / effective_rate) * 1000.0).ceil() as u64
    }

    fn usage_percent(&self, _effective_rate: f64, config: &Configuration) -> f64 {
        let capacity = self.capacity(config) as f64;
        if capacity <= 0.0 {
            return 100.0;
        }
        ((self.level / capacity) * 100.0).clamp(0.0, 100.0)
    }

    fn raw_status(&self, _effective_rate: f64, config: &Configuration) -> StatusRaw {
        StatusRaw::LeakyBucket { level: self.level, capacity: self.capacity(config) }
    }

    fn reconcile(&mut self, key: &str, fields: &ReconcileFields, config: &Configuration) -> Vec<(String, f64)> {
        let mut overlays = Vec::new();

        if let Some(limit) = fields.limit {
            // §4.7: `limit` sets the dynamic effective rate for leaky bucket;
            // capacity reduction is token-bucket-only.
            overlays.push((key.to_string(), limit * config.safety_buffer()));
        }

        if let Some(remaining) = fields.remaining {
            // Less remaining capacity means a higher level; only ever raise it.
            let capacity = self.capacity(config) as f64;
            let implied_level = (capacity - remaining).max(0.0);
            self.level = self.level.max(implied_level);
        }

        overlays
    }

    fn last_activity_ms(&self) -> u64 {
        self.last_leak
    }

    fn last_request_ms(&self) -> Option<u64> {
        self.last_request
    }

    fn is_dormant(&self, cutoff_ms: u64) -> bool {
        self.level <= 0.0
            && self.last_leak <= cutoff_ms
            && self.last_request.map_or(true, |t| t <= cutoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rate: f64, burst: u64) -> Configuration {
        Configuration::builder(Algorithm::LeakyBucket)
            .rate_per_second(rate)
            .burst_capacity(burst)
            .safety_buffer(1.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_starts_empty_first_burst_admissible() {
        let config = config(1.0, 5);
        let mut state = LeakyBucketState::new(0);
        state.touch(0, 1.0, &config);
        for _ in 0..5 {
            assert!(state.try_admit(1, 0, 1.0, &config));
        }
        assert!(!state.try_admit(1, 0, 1.0, &config));
    }

    #[test]
    fn test_leak_over_time_frees_space() {
        let config = config(10.0, 1);
        let mut state = LeakyBucketState::new(0);
        state.touch(0, 10.0, &config);
        assert!(state.try_admit(1, 0, 10.0, &config));
        assert!(!state.try_admit(1, 0, 10.0, &config));

        state.touch(150, 10.0, &config);
        assert!(state.try_admit(1, 150, 10.0, &config));
    }

    #[test]
    fn test_last_leak_updates_even_at_zero_level() {
        let config = config(10.0, 5);
        let mut state = LeakyBucketState::new(0);
        state.touch(0, 10.0, &config);
        state.touch(5000, 10.0, &config);
        assert_eq!(state.last_leak, 5000);
        assert_eq!(state.level, 0.0);
    }

    #[test]
    fn test_reconcile_remaining_never_lowers_level() {
        let config = config(10.0, 10);
        let mut state = LeakyBucketState::new(0);
        state.touch(0, 10.0, &config);
        state.try_admit(2, 0, 10.0, &config);
        assert_eq!(state.level, 2.0);

        // server says only 3 remaining => implied level 7, raises our level
        let fields = ReconcileFields { remaining: Some(3.0), ..Default::default() };
        state.reconcile("k", &fields, &config);
        assert_eq!(state.level, 7.0);

        // a later, higher "remaining" never lowers it back
        let fields = ReconcileFields { remaining: Some(9.0), ..Default::default() };
        state.reconcile("k", &fields, &config);
        assert_eq!(state.level, 7.0);
    }

    #[test]
    fn test_dormancy_requires_zero_level() {
        let config = config(1.0, 5);
        let mut state = LeakyBucketState::new(0);
        state.touch(0, 1.0, &config);
        state.try_admit(5, 0, 1.0, &config);
        assert!(!state.is_dormant(10_000));
    }
}
