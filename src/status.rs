//! Observability snapshots returned by `get_status`/`get_typed_status`.
//!
//! [`StatusDTO`] is the uniform envelope every algorithm fills in the same
//! way; [`StatusRaw`] carries the algorithm-specific fields that only make
//! sense for one pacing strategy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::Algorithm;

/// Algorithm-specific raw fields, alongside the uniform [`StatusDTO`] envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum StatusRaw {
    TokenBucket { tokens: f64, capacity: u64 },
    LeakyBucket { level: f64, capacity: u64 },
    FixedWindow { count: u64, limit: u64, window_start_ms: u64, window_end_ms: u64 },
    SlidingWindow { count: u64, limit: u64, window_size_ms: u64 },
}

/// Uniform observability snapshot for a single key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDTO {
    /// The algorithm that produced this snapshot.
    pub algorithm: Algorithm,
    /// The key this snapshot describes.
    pub key: String,
    /// True when the next single-token admission would currently fail.
    pub limited: bool,
    /// Milliseconds until a single-token admission would succeed; zero if
    /// admissible now.
    pub wait_time_ms: u64,
    /// Usage as a percentage in `[0, 100]` of the effective capacity/limit.
    pub usage_percent: f64,
    /// Algorithm-specific fields.
    pub raw: StatusRaw,
}

impl StatusDTO {
    /// Flatten into the loosely-typed `get_status` map form, with raw
    /// fields merged alongside the uniform envelope. Numbers are carried as
    /// [`serde_json::Value`] so callers get native JSON types either way.
    pub fn to_map(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("algorithm".to_string(), serde_json::json!(self.algorithm.tag()));
        map.insert("key".to_string(), serde_json::json!(self.key));
        map.insert("limited".to_string(), serde_json::json!(self.limited));
        map.insert("wait_time_ms".to_string(), serde_json::json!(self.wait_time_ms));
        map.insert("usage_percent".to_string(), serde_json::json!(self.usage_percent));

        match &self.raw {
            StatusRaw::TokenBucket { tokens, capacity } => {
                map.insert("tokens".to_string(), serde_json::json!(tokens));
                map.insert("capacity".to_string(), serde_json::json!(capacity));
            }
            StatusRaw::LeakyBucket { level, capacity } => {
                map.insert("level".to_string(), serde_json::json!(level));
                map.insert("capacity".to_string(), serde_json::json!(capacity));
            }
            StatusRaw::FixedWindow { count, limit, window_start_ms, window_end_ms } => {
                map.insert("count".to_string(), serde_json::json!(count));
                map.insert("limit".to_string(), serde_json::json!(limit));
                map.insert("window_start_ms".to_string(), serde_json::json!(window_start_ms));
                map.insert("window_end_ms".to_string(), serde_json::json!(window_end_ms));
            }
            StatusRaw::SlidingWindow { count, limit, window_size_ms } => {
                map.insert("count".to_string(), serde_json::json!(count));
                map.insert("limit".to_string(), serde_json::json!(limit));
                map.insert("window_size_ms".to_string(), serde_json::json!(window_size_ms));
            }
        }

        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_bucket_status_to_map() {
        let dto = StatusDTO {
            algorithm: Algorithm::TokenBucket,
            key: "k".to_string(),
            limited: true,
            wait_time_ms: 250,
            usage_percent: 90.0,
            raw: StatusRaw::TokenBucket { tokens: 1.0, capacity: 10 },
        };
        let map = dto.to_map();
        assert_eq!(map.get("algorithm").unwrap(), "token_bucket");
        assert_eq!(map.get("capacity").unwrap(), 10);
        assert_eq!(map.get("limited").unwrap(), true);
    }

    #[test]
    fn test_status_raw_tagged_serialization_roundtrip() {
        let raw = StatusRaw::FixedWindow { count: 3, limit: 5, window_start_ms: 0, window_end_ms: 1000 };
        let json = serde_json::to_string(&raw).unwrap();
        let back: StatusRaw = serde_json::from_str(&json).unwrap();
        assert_eq!(raw, back);
    }
}
