//! State store: the `SharedCache` trait, its in-memory and Redis-backed
//! implementations, the file backend, and the persisted-state shape shared
//! by both (§4.6).
//!
//! Rather than one entry per key behind per-operation atomic ops, a limiter
//! serializes its *entire* state map under a single cache key or file path
//! and flushes it as a unit (dirty-flag coalesced, never per-call).

mod cache;
mod file;
#[cfg(feature = "redis")]
mod redis;

pub use cache::{InMemoryCache, SharedCache};
pub use file::{load_from_file, save_to_file};
#[cfg(feature = "redis")]
pub use redis::RedisCache;

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::config::Algorithm;

/// The full on-disk/in-cache representation of a limiter's state, shared by
/// the file backend and the `SharedCache` backend (§6, "Persisted state
/// format").
///
/// `state` accepts the legacy top-level names `buckets` and `windows` on
/// read (`serde(alias = ...)`); this crate always writes the `state` name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState<S> {
    #[serde(alias = "buckets", alias = "windows")]
    pub state: HashMap<String, S>,
    #[serde(default)]
    pub dynamic_limits: HashMap<String, f64>,
    #[serde(default)]
    pub timestamp: f64,
}

impl<S> Default for PersistedState<S> {
    fn default() -> Self {
        Self { state: HashMap::new(), dynamic_limits: HashMap::new(), timestamp: 0.0 }
    }
}

/// Derive the `four_rl_<algo_prefix>_<8-hex-chars>` cache key (§6) from the
/// algorithm and a piece of identity material — the configured state-file
/// path if persistence is file-backed, else the `(rate, burst, window)`
/// tuple that otherwise distinguishes one limiter's configuration from
/// another's.
pub fn derive_cache_key(algorithm: Algorithm, identity: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    identity.hash(&mut hasher);
    let hash = hasher.finish();
    format!("four_rl_{}_{:08x}", algorithm.cache_prefix(), (hash as u32))
}
