//! Compares all four pacing algorithms against the same nominal rate so
//! their admission patterns can be contrasted directly.
//!
//! Run with:
//! ```text
//! cargo run --example algorithms --features memory
//! ```

use four_rl::storage::InMemoryCache;
use four_rl::{factory, Algorithm, Configuration, Limiter};

async fn demo(algorithm: Algorithm) {
    let config = Configuration::builder(algorithm)
        .rate_per_second(5.0)
        .burst_capacity(5)
        .window_size_ms(1000)
        .safety_buffer(1.0)
        .build()
        .unwrap();
    let limiter = factory::create::<InMemoryCache>(config, None).await;

    let mut admitted = 0;
    for _ in 0..8 {
        if limiter.is_allowed("demo", 1).await {
            admitted += 1;
        }
    }

    let status = limiter.get_typed_status("demo").await;
    println!(
        "{:<15} admitted {admitted}/8, now limited={}, wait={}ms, usage={:.0}%",
        algorithm.tag(),
        status.limited,
        status.wait_time_ms,
        status.usage_percent
    );
}

#[tokio::main]
async fn main() {
    for algorithm in [Algorithm::TokenBucket, Algorithm::LeakyBucket, Algorithm::FixedWindow, Algorithm::SlidingWindow]
    {
        demo(algorithm).await;
    }
}
