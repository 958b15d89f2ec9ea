//! Fixed window: discrete counter reset at the window boundary (§4.4).
//!
//! Known behavior: admissions cluster up to 2x the configured rate around a
//! window boundary ("bunny-hop"). This is the algorithm's accepted
//! contract, not a bug — callers who need smooth pacing pick sliding window.

use serde::{Deserialize, Serialize};

use crate::base::AlgorithmState;
use crate::config::{Algorithm, Configuration};
use crate::headers::ReconcileFields;
use crate::status::StatusRaw;

/// Per-key fixed window state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedWindowState {
    window_start: u64,
    window_end: u64,
    count: u64,
    last_request: Option<u64>,
    #[serde(default)]
    initialized: bool,
}

fn effective_limit(effective_rate: f64, window_size_seconds: f64) -> u64 {
    ((effective_rate * window_size_seconds).ceil() as u64).max(1)
}

impl FixedWindowState {
    fn start_new_window(&mut self, now_ms: u64, config: &Configuration) {
        self.window_start = now_ms;
        self.window_end = now_ms.saturating_add(config.window_size_ms());
        self.count = 0;
    }
}

impl AlgorithmState for FixedWindowState {
    const ALGORITHM: Algorithm = Algorithm::FixedWindow;
    const SLEEP_CAP_MS: u64 = 2000;

    fn new(now_ms: u64) -> Self {
        Self { window_start: now_ms, window_end: now_ms, count: 0, last_request: None, initialized: false }
    }

    fn touch(&mut self, now_ms: u64, _effective_rate: f64, config: &Configuration) {
        if !self.initialized {
            self.start_new_window(now_ms, config);
            self.initialized = true;
            return;
        }
        if now_ms >= self.window_end {
            self.start_new_window(now_ms, config);
        }
    }

    fn try_admit(&mut self, tokens: u64, now_ms: u64, effective_rate: f64, config: &Configuration) -> bool {
        let limit = effective_limit(effective_rate, config.window_size_seconds());
        if tokens > limit {
            return false;
        }
        if self.count + tokens <= limit {
            self.count += tokens;
            self.last_request = Some(now_ms);
            true
        } else {
            false
        }
    }

    fn wait_time_ms(&self, tokens: u64, now_ms: u64, effective_rate: f64, config: &Configuration) -> u64 {
        let limit = effective_limit(effective_rate, config.window_size_seconds());
        if tokens > limit {
            return 30_000;
        }
        if self.count + tokens <= limit {
            return 0;
        }
        self.window_end.saturating_sub(now_ms)
    }

    fn usage_percent(&self, effective_rate: f64, config: &Configuration) -> f64 {
        let limit = effective_limit(effective_rate, config.window_size_seconds()) as f64;
        if limit <= 0.0 {
            return 100.0;
        }
        ((self.count as f64 / limit) * 100.0).clamp(0.0, 100.0)
    }

    fn raw_status(&self, effective_rate: f64, config: &Configuration) -> StatusRaw {
        StatusRaw::FixedWindow {
            count: self.count,
            limit: effective_limit(effective_rate, config.window_size_seconds()),
            window_start_ms: self.window_start,
            window_end_ms: self.window_end,
        }
    }

    fn reconcile(&mut self, key: &str, fields: &ReconcileFields, config: &Configuration) -> Vec<(String, f64)> {
        let mut overlays = Vec::new();

        if let Some(limit) = fields.limit {
            overlays.push((key.to_string(), (limit / config.window_size_seconds()) * config.safety_buffer()));
        }

        if let Some(remaining) = fields.remaining {
            let limit = self.raw_limit_hint(config);
            let implied_count = (limit as f64 - remaining).max(0.0) as u64;
            self.count = self.count.max(implied_count);
        }

        if let Some(daily_limit) = fields.daily_limit {
            overlays.push((format!("{key}_daily"), (daily_limit / 86400.0) * config.safety_buffer()));
        }

        if let Some(hourly_limit) = fields.hourly_limit {
            overlays.push((format!("{key}_hourly"), (hourly_limit / 3600.0) * config.safety_buffer()));
        }

        if let Some(daily_remaining) = fields.daily_remaining {
            // Project the daily remaining onto the current window
            // conservatively, never raising local availability.
            let ratio = config.window_size_seconds() / 86400.0;
            let projected_remaining = daily_remaining * ratio;
            let limit = self.raw_limit_hint(config);
            let implied_count = (limit as f64 - projected_remaining).max(0.0) as u64;
            self.count = self.count.max(implied_count);
        }

        overlays
    }

    fn last_activity_ms(&self) -> u64 {
        self.window_end
    }

    fn last_request_ms(&self) -> Option<u64> {
        self.last_request
    }
}

impl FixedWindowState {
    fn raw_limit_hint(&self, config: &Configuration) -> u64 {
        let window_secs = (self.window_end.saturating_sub(self.window_start)) as f64 / 1000.0;
        let window_secs = if window_secs > 0.0 { window_secs } else { config.window_size_seconds() };
        ((config.rate_per_second() * window_secs).ceil() as u64).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rate: f64, window_ms: u64) -> Configuration {
        Configuration::builder(Algorithm::FixedWindow)
            .rate_per_second(rate)
            .burst_capacity(1)
            .window_size_ms(window_ms)
            .safety_buffer(1.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_window_admits_up_to_limit_then_denies() {
        let config = config(5.0, 1000);
        let mut state = FixedWindowState::new(0);
        state.touch(0, 5.0, &config);
        for _ in 0..5 {
            assert!(state.try_admit(1, 0, 5.0, &config));
        }
        assert!(!state.try_admit(1, 0, 5.0, &config));
    }

    #[test]
    fn test_new_window_resets_counter() {
        let config = config(2.0, 1000);
        let mut state = FixedWindowState::new(0);
        state.touch(0, 2.0, &config);
        assert!(state.try_admit(2, 0, 2.0, &config));
        assert!(!state.try_admit(1, 0, 2.0, &config));

        state.touch(1000, 2.0, &config);
        assert!(state.try_admit(1, 1000, 2.0, &config));
    }

    #[test]
    fn test_daily_limit_reconcile_produces_overlay() {
        let config = config(5.0, 1000);
        let mut state = FixedWindowState::new(0);
        state.touch(0, 5.0, &config);
        let fields = ReconcileFields { daily_limit: Some(864_00.0), ..Default::default() };
        let overlays = state.reconcile("k", &fields, &config);
        assert!(overlays.iter().any(|(name, _)| name == "k_daily"));
        let (_, rate) = overlays.iter().find(|(name, _)| name == "k_daily").unwrap();
        assert_eq!(*rate, 1.0);
    }
}
