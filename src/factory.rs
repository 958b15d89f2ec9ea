//! The factory (§4.8): takes a [`Configuration`] and an optional shared
//! cache, selects the algorithm implementation, and returns an opaque
//! handle satisfying the [`Limiter`] contract.
//!
//! Async trait methods (`impl Future` return types) aren't object-safe, so
//! a `Box<dyn Limiter>` isn't available here. Instead the four concrete
//! [`LimiterCore`] instantiations are unified behind an enum and
//! [`Limiter`] is implemented once for it by dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use crate::algorithm::{FixedWindowState, LeakyBucketState, SlidingWindowState, TokenBucketState};
use crate::base::{Limiter, LimiterCore};
use crate::config::{Algorithm, Configuration};
use crate::error::Result;
use crate::headers::HeaderMap;
use crate::status::StatusDTO;
use crate::storage::SharedCache;

/// An opaque limiter handle, dispatching to the algorithm selected by
/// `Configuration::algorithm`.
pub enum AnyLimiter<C: SharedCache> {
    TokenBucket(LimiterCore<TokenBucketState, C>),
    LeakyBucket(LimiterCore<LeakyBucketState, C>),
    FixedWindow(LimiterCore<FixedWindowState, C>),
    SlidingWindow(LimiterCore<SlidingWindowState, C>),
}

/// Build a limiter for `config`, loading any persisted state from the file
/// backend or `cache`. The algorithm tag in `config` selects the
/// implementation; there is no separate "unsupported algorithm" error path
/// here because [`Algorithm`] is a closed enum validated at config-build
/// time (§4.8's invalid-argument error is [`crate::error::ConfigError::UnknownAlgorithm`],
/// raised by [`crate::config::Algorithm::parse`] for callers building a
/// configuration from an external string tag).
pub async fn create<C: SharedCache>(config: Configuration, cache: Option<Arc<C>>) -> AnyLimiter<C> {
    match config.algorithm() {
        Algorithm::TokenBucket => {
            let core = LimiterCore::<TokenBucketState, C>::new(config, cache);
            core.load().await;
            AnyLimiter::TokenBucket(core)
        }
        Algorithm::LeakyBucket => {
            let core = LimiterCore::<LeakyBucketState, C>::new(config, cache);
            core.load().await;
            AnyLimiter::LeakyBucket(core)
        }
        Algorithm::FixedWindow => {
            let core = LimiterCore::<FixedWindowState, C>::new(config, cache);
            core.load().await;
            AnyLimiter::FixedWindow(core)
        }
        Algorithm::SlidingWindow => {
            let core = LimiterCore::<SlidingWindowState, C>::new(config, cache);
            core.load().await;
            AnyLimiter::SlidingWindow(core)
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            AnyLimiter::TokenBucket(core) => core.$method($($arg),*).await,
            AnyLimiter::LeakyBucket(core) => core.$method($($arg),*).await,
            AnyLimiter::FixedWindow(core) => core.$method($($arg),*).await,
            AnyLimiter::SlidingWindow(core) => core.$method($($arg),*).await,
        }
    };
}

impl<C: SharedCache> Limiter for AnyLimiter<C> {
    async fn is_allowed(&self, key: &str, tokens: u64) -> bool {
        dispatch!(self, is_allowed, key, tokens)
    }

    async fn wait_for_allowed(&self, key: &str, tokens: u64, max_wait_ms: u64) -> bool {
        dispatch!(self, wait_for_allowed, key, tokens, max_wait_ms)
    }

    async fn get_wait_time(&self, key: &str) -> u64 {
        dispatch!(self, get_wait_time, key)
    }

    async fn reset(&self, key: &str) {
        dispatch!(self, reset, key)
    }

    async fn reset_all(&self) {
        dispatch!(self, reset_all)
    }

    async fn get_status(&self, key: &str) -> HashMap<String, serde_json::Value> {
        dispatch!(self, get_status, key)
    }

    async fn get_typed_status(&self, key: &str) -> StatusDTO {
        dispatch!(self, get_typed_status, key)
    }

    async fn get_all_statuses(&self) -> HashMap<String, HashMap<String, serde_json::Value>> {
        dispatch!(self, get_all_statuses)
    }

    async fn get_all_typed_statuses(&self) -> HashMap<String, StatusDTO> {
        dispatch!(self, get_all_typed_statuses)
    }

    async fn cleanup(&self, max_age_seconds: u64) -> usize {
        dispatch!(self, cleanup, max_age_seconds)
    }

    async fn update_from_headers(&self, key: &str, headers: &HeaderMap) {
        dispatch!(self, update_from_headers, key, headers)
    }

    async fn flush_state(&self) -> Result<()> {
        dispatch!(self, flush_state)
    }

    fn retry_after_header_name(&self) -> &str {
        match self {
            AnyLimiter::TokenBucket(core) => core.retry_after_header_name(),
            AnyLimiter::LeakyBucket(core) => core.retry_after_header_name(),
            AnyLimiter::FixedWindow(core) => core.retry_after_header_name(),
            AnyLimiter::SlidingWindow(core) => core.retry_after_header_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryCache;

    #[tokio::test]
    async fn test_factory_dispatches_to_selected_algorithm() {
        let config = Configuration::builder(Algorithm::TokenBucket)
            .rate_per_second(5.0)
            .burst_capacity(5)
            .build()
            .unwrap();
        let limiter = create::<InMemoryCache>(config, None).await;

        for _ in 0..5 {
            assert!(limiter.is_allowed("k", 1).await);
        }
        assert!(!limiter.is_allowed("k", 1).await);

        let status = limiter.get_typed_status("k").await;
        assert_eq!(status.algorithm, Algorithm::TokenBucket);
    }

    #[tokio::test]
    async fn test_factory_sliding_window() {
        let config = Configuration::builder(Algorithm::SlidingWindow)
            .rate_per_second(2.0)
            .burst_capacity(1)
            .window_size_ms(1000)
            .build()
            .unwrap();
        let limiter = create::<InMemoryCache>(config, None).await;

        assert!(limiter.is_allowed("k", 1).await);
        assert!(limiter.is_allowed("k", 1).await);
        assert!(!limiter.is_allowed("k", 1).await);
    }
}
