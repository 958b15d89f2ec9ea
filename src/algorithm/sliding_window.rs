//! Sliding window: a rolling log of admission timestamps within the
//! trailing window (§4.5). The oldest timestamp must be reachable in O(1),
//! so the log is a `VecDeque` kept in insertion (and therefore time) order
//! rather than scanned in full on every call.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::base::AlgorithmState;
use crate::config::{Algorithm, Configuration};
use crate::headers::ReconcileFields;
use crate::status::StatusRaw;

/// Per-key sliding window state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidingWindowState {
    timestamps: VecDeque<u64>,
    last_activity: u64,
    last_request: Option<u64>,
}

fn effective_limit(effective_rate: f64, window_size_seconds: f64) -> usize {
    ((effective_rate * window_size_seconds).floor() as i64).max(1) as usize
}

impl SlidingWindowState {
    fn expire(&mut self, now_ms: u64, window_size_ms: u64) {
        let cutoff = now_ms.saturating_sub(window_size_ms);
        while let Some(&oldest) = self.timestamps.front() {
            if oldest <= cutoff {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

impl AlgorithmState for SlidingWindowState {
    const ALGORITHM: Algorithm = Algorithm::SlidingWindow;
    const SLEEP_CAP_MS: u64 = 2000;

    fn new(now_ms: u64) -> Self {
        Self { timestamps: VecDeque::new(), last_activity: now_ms, last_request: None }
    }

    fn touch(&mut self, now_ms: u64, _effective_rate: f64, config: &Configuration) {
        self.expire(now_ms, config.window_size_ms());
        self.last_activity = now_ms;
    }

    fn try_admit(&mut self, tokens: u64, now_ms: u64, effective_rate: f64, config: &Configuration) -> bool {
        let limit = effective_limit(effective_rate, config.window_size_seconds());
        let requested = tokens as usize;
        if requested > limit {
            return false;
        }
        if self.timestamps.len() + requested <= limit {
            for i in 0..requested {
                // Staggered insertion keeps ordering strict even when many
                // tokens are admitted at the same millisecond.
                self.timestamps.push_back(now_ms + i as u64);
            }
            self.last_request = Some(now_ms);
            true
        } else {
            false
        }
    }

    fn wait_time_ms(&self, tokens: u64, now_ms: u64, effective_rate: f64, config: &Configuration) -> u64 {
        let limit = effective_limit(effective_rate, config.window_size_seconds());
        let requested = tokens as usize;
        if requested > limit {
            return 30_000;
        }
        if self.timestamps.len() + requested <= limit {
            return 0;
        }
        let Some(&oldest) = self.timestamps.front() else {
            return 0;
        };
        let expires_at = oldest.saturating_add(config.window_size_ms());
        expires_at.saturating_sub(now_ms)
    }

    fn usage_percent(&self, effective_rate: f64, config: &Configuration) -> f64 {
        let limit = effective_limit(effective_rate, config.window_size_seconds()) as f64;
        if limit <= 0.0 {
            return 100.0;
        }
        ((self.timestamps.len() as f64 / limit) * 100.0).clamp(0.0, 100.0)
    }

    fn raw_status(&self, effective_rate: f64, config: &Configuration) -> StatusRaw {
        StatusRaw::SlidingWindow {
            count: self.timestamps.len() as u64,
            limit: effective_limit(effective_rate, config.window_size_seconds()) as u64,
            window_size_ms: config.window_size_ms(),
        }
    }

    fn reconcile(&mut self, key: &str, fields: &ReconcileFields, config: &Configuration) -> Vec<(String, f64)> {
        let mut overlays = Vec::new();

        if let Some(limit) = fields.limit {
            overlays.push((key.to_string(), (limit / config.window_size_seconds()) * config.safety_buffer()));
        }

        if let Some(remaining) = fields.remaining {
            let local_remaining = {
                let limit = effective_limit(config.rate_per_second(), config.window_size_seconds());
                limit.saturating_sub(self.timestamps.len()) as f64
            };
            if remaining < local_remaining {
                let deficit = (local_remaining - remaining).floor() as u64;
                // Anchor after the current tail, not just `now` — a prior
                // multi-token admission may have already staggered real
                // entries past `last_activity`, and a phantom landing behind
                // them would never expire (`expire` only pops the front).
                let base = self.last_activity.max(self.timestamps.back().map_or(0, |&t| t + 1));
                for i in 0..deficit {
                    // Phantom timestamps staggered 1ms apart to preserve
                    // strict ordering without colliding with real entries.
                    self.timestamps.push_back(base + i);
                }
            }
        }

        overlays
    }

    fn last_activity_ms(&self) -> u64 {
        self.last_activity
    }

    fn last_request_ms(&self) -> Option<u64> {
        self.last_request
    }

    fn is_dormant(&self, cutoff_ms: u64) -> bool {
        self.timestamps.back().map_or(true, |&latest| latest <= cutoff_ms)
            && self.last_request.map_or(true, |t| t <= cutoff_ms)
    }
}
