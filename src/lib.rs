//! Client-side rate limiting core.
//!
//! `four-rl` paces outbound requests against a remote service's published
//! limits: pick a pacing algorithm, build a [`Configuration`], obtain a
//! [`Limiter`] from the [`factory`], and call [`Limiter::is_allowed`] or
//! [`Limiter::wait_for_allowed`] before each request. After the response
//! comes back, [`Limiter::update_from_headers`] reconciles local state
//! against the server's own view so the two never drift for long. The
//! [`middleware`] module bundles pre-admission, reconciliation, and
//! 429-driven backoff into a single `execute` call.
//!
//! # Quick start
//!
//! ```ignore
//! use four_rl::{Algorithm, Configuration, factory};
//! use four_rl::storage::InMemoryCache;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Configuration::builder(Algorithm::TokenBucket)
//!         .rate_per_second(5.0)
//!         .burst_capacity(10)
//!         .build()
//!         .unwrap();
//!
//!     let limiter = factory::create::<InMemoryCache>(config, None).await;
//!
//!     if limiter.is_allowed("search-endpoint", 1).await {
//!         // send the request
//!     }
//! }
//! ```
//!
//! # Algorithms
//!
//! | Algorithm | Burst | Smoothing |
//! |-----------|-------|-----------|
//! | Token bucket | Yes | Continuous refill |
//! | Leaky bucket | No (starts empty) | Continuous drain |
//! | Fixed window | Up to 2x at boundaries | None |
//! | Sliding window | No | Rolling timestamp log |
//!
//! # Feature flags
//!
//! - `memory` (default): the in-process [`storage::InMemoryCache`] backend.
//! - `redis`: a [`storage::RedisCache`] backend via `deadpool-redis`.
//! - `full`: both of the above.

pub mod algorithm;
pub mod base;
pub mod config;
pub mod error;
pub mod factory;
pub mod headers;
pub mod middleware;
pub mod status;
pub mod storage;

pub use base::Limiter;
pub use config::{Algorithm, Configuration, ConfigurationBuilder};
pub use error::{ConfigError, RateLimitError, Result, StorageError};
pub use factory::AnyLimiter;
pub use status::{StatusDTO, StatusRaw};

/// Convenience re-exports for the common case of building and driving a
/// limiter.
pub mod prelude {
    pub use crate::base::Limiter;
    pub use crate::config::{Algorithm, Configuration, ConfigurationBuilder};
    pub use crate::error::{RateLimitError, Result};
    pub use crate::factory::{self, AnyLimiter};
    pub use crate::middleware::{MiddlewareConfig, RateLimitMiddleware, RateLimitResponse};
    pub use crate::status::{StatusDTO, StatusRaw};
    pub use crate::storage::InMemoryCache;

    #[cfg(feature = "redis")]
    pub use crate::storage::RedisCache;
}
