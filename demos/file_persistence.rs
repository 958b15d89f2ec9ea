//! State survives a process restart when backed by the file store: build a
//! limiter, drain a key, flush, then rebuild the limiter from the same
//! path and observe the drained state come back.
//!
//! Run with:
//! ```text
//! cargo run --example file_persistence --features memory
//! ```

use four_rl::storage::InMemoryCache;
use four_rl::{factory, Algorithm, Configuration, Limiter};

#[tokio::main]
async fn main() {
    let dir = std::env::temp_dir().join("four_rl_demo");
    std::fs::create_dir_all(&dir).unwrap();
    let state_file = dir.join("search.json");
    let _ = std::fs::remove_file(&state_file);

    let config = Configuration::builder(Algorithm::TokenBucket)
        .rate_per_second(1.0)
        .burst_capacity(3)
        .state_file(state_file.clone())
        .safety_buffer(1.0)
        .build()
        .unwrap();

    {
        let limiter = factory::create::<InMemoryCache>(config.clone(), None).await;
        for _ in 0..3 {
            limiter.is_allowed("search", 1).await;
        }
        limiter.flush_state().await.unwrap();
        println!("drained bucket, flushed to {}", state_file.display());
    }

    let limiter = factory::create::<InMemoryCache>(config, None).await;
    let status = limiter.get_typed_status("search").await;
    println!("reloaded limiter reports limited={} wait_ms={}", status.limited, status.wait_time_ms);
}
