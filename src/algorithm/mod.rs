//! The four pacing algorithm state types, each implementing
//! [`crate::base::AlgorithmState`].
//!
//! | Algorithm | Burst | Smoothing | Known quirk |
//! |---|---|---|---|
//! | Token bucket | Yes, up to `burst_capacity` | Continuous refill | None |
//! | Leaky bucket | No, starts empty | Continuous drain | None |
//! | Fixed window | Up to 2x at boundaries | None | "Bunny-hop" clustering |
//! | Sliding window | No | Rolling timestamp log | None |

mod fixed_window;
mod leaky_bucket;
mod sliding_window;
mod token_bucket;

pub use fixed_window::FixedWindowState;
pub use leaky_bucket::LeakyBucketState;
pub use sliding_window::SlidingWindowState;
pub use token_bucket::TokenBucketState;
