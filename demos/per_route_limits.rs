//! Per-endpoint rate overrides: a shared default rate with a stricter
//! refill rate carved out for one expensive route. Both keys burst to the
//! same capacity; the override only shows up once the bucket has been
//! drained and needs to refill.
//!
//! Run with:
//! ```text
//! cargo run --example per_route_limits --features memory
//! ```

use std::time::Duration;

use four_rl::storage::InMemoryCache;
use four_rl::{factory, Algorithm, Configuration, Limiter};

#[tokio::main]
async fn main() {
    let config = Configuration::builder(Algorithm::TokenBucket)
        .rate_per_second(10.0)
        .burst_capacity(3)
        .endpoint_limit("search", 1.0)
        .safety_buffer(1.0)
        .build()
        .unwrap();
    let limiter = factory::create::<InMemoryCache>(config, None).await;

    // Drain both buckets.
    for _ in 0..3 {
        limiter.is_allowed("search", 1).await;
        limiter.is_allowed("list", 1).await;
    }

    tokio::time::sleep(Duration::from_millis(500)).await;

    println!(
        "after 500ms, search (override 1/s) admits: {}",
        limiter.is_allowed("search", 1).await
    );
    println!(
        "after 500ms, list (default 10/s) admits: {}",
        limiter.is_allowed("list", 1).await
    );
}
