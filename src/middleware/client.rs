//! The outbound HTTP middleware (§4.9): pre-admission wait, reconciliation
//! from the response, and 429-driven backoff-and-retry.
//!
//! Follows the tower `Layer`/`Service` wrapping pattern — an inner async
//! capability wrapped with cross-cutting behavior — adapted from an inbound
//! `Service` to an outbound "send a request" closure.

use std::future::Future;

use tracing::debug;

use crate::base::Limiter;
use crate::error::{RateLimitError, Result};
use crate::headers::{flatten_headers, parse_retry_after, MultiHeaderMap};

/// What the middleware needs from a caller's response type. Implement this
/// for your HTTP client's response (or adapt one with
/// [`MultiHeaderMap`]'s `FromIterator` impl) — the middleware never
/// depends on a concrete HTTP client crate.
pub trait RateLimitResponse {
    /// The HTTP status code of the response.
    fn status_code(&self) -> u16;

    /// The response's headers, as a possibly multi-valued map.
    fn headers(&self) -> MultiHeaderMap;
}

/// Tuning knobs for [`RateLimitMiddleware::execute`] (§4.9).
#[derive(Debug, Clone, Copy)]
pub struct MiddlewareConfig {
    /// Retries attempted against repeated `429` responses before failing.
    pub max_retries: u32,
    /// Multiplier applied to the backoff on each successive `429`.
    pub backoff_multiplier: f64,
    /// Budget for the initial `wait_for_allowed` call.
    pub max_wait_ms: u64,
    /// Ceiling on any single backoff sleep.
    pub max_backoff_ms: u64,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self { max_retries: 3, backoff_multiplier: 2.0, max_wait_ms: 10_000, max_backoff_ms: 30_000 }
    }
}

/// Wraps a [`Limiter`] and a caller-chosen key with the pre-admission /
/// reconcile / 429-backoff flow.
pub struct RateLimitMiddleware<'a, L: Limiter> {
    limiter: &'a L,
    key: String,
    config: MiddlewareConfig,
}

impl<'a, L: Limiter> RateLimitMiddleware<'a, L> {
    /// Build a middleware instance with the default [`MiddlewareConfig`].
    pub fn new(limiter: &'a L, key: impl Into<String>) -> Self {
        Self { limiter, key: key.into(), config: MiddlewareConfig::default() }
    }

    /// Build a middleware instance with explicit tuning.
    pub fn with_config(limiter: &'a L, key: impl Into<String>, config: MiddlewareConfig) -> Self {
        Self { limiter, key: key.into(), config }
    }

    /// Run the pre-admission / send / reconcile / retry-on-429 flow (§4.9).
    ///
    /// `send_request` is invoked once per attempt; it may be called more
    /// than once when the remote service answers with `429`.
    pub async fn execute<R, E, F, Fut>(&self, mut send_request: F) -> Result<R>
    where
        R: RateLimitResponse,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
        E: std::fmt::Display,
    {
        let admitted = self.limiter.wait_for_allowed(&self.key, 1, self.config.max_wait_ms).await;
        if !admitted {
            return Err(RateLimitError::Exceeded {
                key: self.key.clone(),
                waited_ms: self.config.max_wait_ms,
                max_wait_ms: self.config.max_wait_ms,
                message: "pre-admission wait budget exhausted".to_string(),
            });
        }

        let mut attempt: u32 = 0;

        loop {
            let response = send_request().await.map_err(|err| RateLimitError::Transport(err.to_string()))?;
            let headers = flatten_headers(&response.headers());
            self.limiter.update_from_headers(&self.key, &headers).await;

            if response.status_code() != 429 {
                return Ok(response);
            }

            attempt += 1;
            let retry_after_secs = headers
                .get(self.limiter.retry_after_header_name())
                .map(|v| parse_retry_after(v))
                .unwrap_or(1);

            if attempt > self.config.max_retries {
                return Err(RateLimitError::Exceeded {
                    key: self.key.clone(),
                    waited_ms: retry_after_secs * 1000,
                    max_wait_ms: self.config.max_wait_ms,
                    message: format!("exhausted {} retries against repeated 429 responses", self.config.max_retries),
                });
            }

            let backoff_ms = ((retry_after_secs * 1000) as f64
                * self.config.backoff_multiplier.powi(attempt as i32 - 1))
            .min(self.config.max_backoff_ms as f64) as u64;

            debug!(key = %self.key, attempt, backoff_ms, "retrying after 429");
            tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Algorithm, Configuration};
    use crate::factory::{self, AnyLimiter};
    use crate::storage::InMemoryCache;
    use std::cell::Cell;
    use std::collections::HashMap;

    struct FakeResponse {
        status: u16,
        headers: MultiHeaderMap,
    }

    impl RateLimitResponse for FakeResponse {
        fn status_code(&self) -> u16 {
            self.status
        }

        fn headers(&self) -> MultiHeaderMap {
            self.headers.clone()
        }
    }

    async fn unlimited_limiter() -> AnyLimiter<InMemoryCache> {
        let config = Configuration::builder(Algorithm::TokenBucket)
            .rate_per_second(1000.0)
            .burst_capacity(1000)
            .build()
            .unwrap();
        factory::create::<InMemoryCache>(config, None).await
    }

    #[tokio::test]
    async fn test_execute_returns_ok_response_on_success() {
        let limiter = unlimited_limiter().await;
        let middleware = RateLimitMiddleware::new(&limiter, "k");

        let result = middleware
            .execute(|| async {
                std::result::Result::<_, String>::Ok(FakeResponse { status: 200, headers: HashMap::new() })
            })
            .await
            .unwrap();

        assert_eq!(result.status, 200);
    }

    #[tokio::test]
    async fn test_execute_retries_on_429_then_succeeds() {
        let limiter = unlimited_limiter().await;
        let config = MiddlewareConfig { max_retries: 3, backoff_multiplier: 1.0, max_wait_ms: 5000, max_backoff_ms: 10 };
        let middleware = RateLimitMiddleware::with_config(&limiter, "k", config);

        let calls = Cell::new(0);
        let result = middleware
            .execute(|| {
                let n = calls.get();
                calls.set(n + 1);
                async move {
                    if n == 0 {
                        let mut headers = HashMap::new();
                        headers.insert("Retry-After".to_string(), vec!["0".to_string()]);
                        std::result::Result::<_, String>::Ok(FakeResponse { status: 429, headers })
                    } else {
                        std::result::Result::<_, String>::Ok(FakeResponse { status: 200, headers: HashMap::new() })
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result.status, 200);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_execute_fails_after_exhausting_retries() {
        let limiter = unlimited_limiter().await;
        let config = MiddlewareConfig { max_retries: 1, backoff_multiplier: 1.0, max_wait_ms: 5000, max_backoff_ms: 10 };
        let middleware = RateLimitMiddleware::with_config(&limiter, "k", config);

        let result = middleware
            .execute(|| async {
                let mut headers = HashMap::new();
                headers.insert("Retry-After".to_string(), vec!["0".to_string()]);
                std::result::Result::<_, String>::Ok(FakeResponse { status: 429, headers })
            })
            .await;

        assert!(matches!(result, Err(RateLimitError::Exceeded { .. })));
    }

    #[tokio::test]
    async fn test_execute_fails_when_transport_errors() {
        let limiter = unlimited_limiter().await;
        let middleware = RateLimitMiddleware::new(&limiter, "k");

        let result: Result<FakeResponse> = middleware.execute(|| async { Err("connection refused".to_string()) }).await;
        assert!(matches!(result, Err(RateLimitError::Transport(_))));
    }
}
