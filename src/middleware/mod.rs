//! Client-side HTTP middleware: pre-admission, reconciliation, and 429
//! backoff around an outbound request (§4.9).
//!
//! # Example
//!
//! ```ignore
//! use four_rl::{Configuration, Algorithm, factory};
//! use four_rl::middleware::{RateLimitMiddleware, RateLimitResponse};
//! use four_rl::storage::InMemoryCache;
//!
//! let config = Configuration::builder(Algorithm::TokenBucket)
//!     .rate_per_second(5.0)
//!     .burst_capacity(10)
//!     .build()?;
//! let limiter = factory::create::<InMemoryCache>(config, None).await;
//! let middleware = RateLimitMiddleware::new(&limiter, "search-endpoint");
//!
//! let response = middleware.execute(|| my_http_client.get("/search")).await?;
//! ```

mod client;

pub use client::{MiddlewareConfig, RateLimitMiddleware, RateLimitResponse};
