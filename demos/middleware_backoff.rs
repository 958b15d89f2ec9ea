//! Driving an outbound call through [`RateLimitMiddleware`]: pre-admission,
//! header reconciliation, and 429-driven backoff, against a fake server
//! that rejects the first two attempts.
//!
//! Run with:
//! ```text
//! cargo run --example middleware_backoff --features memory
//! ```

use std::cell::Cell;
use std::collections::HashMap;

use four_rl::middleware::{MiddlewareConfig, RateLimitMiddleware, RateLimitResponse};
use four_rl::storage::InMemoryCache;
use four_rl::{factory, Algorithm, Configuration};

struct FakeResponse {
    status: u16,
    headers: HashMap<String, Vec<String>>,
}

impl RateLimitResponse for FakeResponse {
    fn status_code(&self) -> u16 {
        self.status
    }

    fn headers(&self) -> HashMap<String, Vec<String>> {
        self.headers.clone()
    }
}

#[tokio::main]
async fn main() {
    let config = Configuration::builder(Algorithm::TokenBucket)
        .rate_per_second(100.0)
        .burst_capacity(100)
        .build()
        .unwrap();
    let limiter = factory::create::<InMemoryCache>(config, None).await;

    let middleware = RateLimitMiddleware::with_config(
        &limiter,
        "search-endpoint",
        MiddlewareConfig { max_retries: 3, backoff_multiplier: 2.0, max_wait_ms: 10_000, max_backoff_ms: 30_000 },
    );

    let attempts = Cell::new(0);
    let result = middleware
        .execute(|| {
            let n = attempts.get();
            attempts.set(n + 1);
            async move {
                if n < 2 {
                    let mut headers = HashMap::new();
                    headers.insert("Retry-After".to_string(), vec!["1".to_string()]);
                    Ok::<_, std::convert::Infallible>(FakeResponse { status: 429, headers })
                } else {
                    let mut headers = HashMap::new();
                    headers.insert("X-RateLimit-Remaining".to_string(), vec!["42".to_string()]);
                    Ok(FakeResponse { status: 200, headers })
                }
            }
        })
        .await;

    match result {
        Ok(response) => println!("succeeded after {} attempts, status={}", attempts.get(), response.status),
        Err(err) => println!("failed: {err}"),
    }
}
