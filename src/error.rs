//! Error types for rate limiting operations.
//!
//! Construction-time failures (bad configuration) are fatal and propagated to
//! the caller. Everything else a limiter does either returns a boolean
//! verdict or degrades gracefully while logging — see [`StorageError`] and
//! the malformed-header handling in [`crate::headers`].

use std::path::PathBuf;

use thiserror::Error;

/// Result type for rate limiting operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Top-level error type for rate limiting operations.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Invalid configuration, raised at construction.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A non-fatal storage fault surfaced to a caller that explicitly asked
    /// for one (e.g. `flush_state`). Algorithm operations never propagate
    /// this themselves — they log and continue in-memory.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// `wait_for_allowed` timed out, or the middleware exhausted its retry
    /// budget against repeated `429` responses.
    #[error(
        "rate limit exceeded for key `{key}`: waited {waited_ms}ms of a {max_wait_ms}ms budget ({message})"
    )]
    Exceeded {
        /// The key that could not be admitted.
        key: String,
        /// How long the caller actually waited.
        waited_ms: u64,
        /// The wait budget that was exhausted.
        max_wait_ms: u64,
        /// Human-readable detail (e.g. which retry count was hit).
        message: String,
    },

    /// The caller-supplied `send_request` future failed before a response
    /// was obtained at all.
    #[error("request failed: {0}")]
    Transport(String),
}

/// Configuration-related errors, raised only at construction time.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// `rate_per_second` was not strictly positive.
    #[error("rate_per_second must be positive, got {0}")]
    InvalidRate(f64),

    /// `burst_capacity` was zero.
    #[error("burst_capacity must be at least 1, got {0}")]
    InvalidBurst(u64),

    /// `safety_buffer` was outside `(0, 1]`.
    #[error("safety_buffer must be in (0, 1], got {0}")]
    InvalidSafetyBuffer(f64),

    /// `window_size_ms` was zero.
    #[error("window_size_ms must be positive, got {0}")]
    InvalidWindow(u64),

    /// `cleanup_interval_seconds` was zero.
    #[error("cleanup_interval_seconds must be at least 1, got {0}")]
    InvalidCleanupInterval(u64),

    /// An `endpoint_limits` override was not strictly positive.
    #[error("endpoint override for `{0}` must be positive, got {1}")]
    InvalidEndpointRate(String, f64),

    /// The algorithm tag did not match one of the four supported literals.
    #[error("unsupported algorithm tag: {0}")]
    UnknownAlgorithm(String),
}

/// Storage-backend errors. Always non-fatal: logged at `warn` and the
/// in-memory state remains authoritative for the life of the process.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A file-backend read, write, or rename failed.
    #[error("{message}")]
    OperationFailed {
        /// Description of the failure.
        message: String,
    },

    /// The persisted state could not be parsed as JSON.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A configured `state_file` path resolved outside the allowed roots
    /// (current working directory or system temp directory).
    #[error("path `{0}` is outside the allowed roots; state will not be persisted")]
    PathNotAllowed(PathBuf),

    /// The shared cache backend could not be reached.
    #[error("shared cache unavailable: {0}")]
    CacheUnavailable(String),
}
