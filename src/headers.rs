//! Header reconciliation support: flattening multi-valued header maps,
//! extracting the internal fields a [`crate::config::Configuration`] maps
//! to remote header names, and parsing `Retry-After`.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::config::{header_field, Configuration};

/// A single-valued header map, as the algorithms consume it.
pub type HeaderMap = HashMap<String, String>;

/// A possibly multi-valued header map, as callers typically receive it from
/// an HTTP client (repeated header names collected into a `Vec`).
pub type MultiHeaderMap = HashMap<String, Vec<String>>;

/// Join repeated header values with `, `, the standard HTTP combination
/// rule, producing the single-valued form the algorithms operate on.
pub fn flatten_headers(headers: &MultiHeaderMap) -> HeaderMap {
    headers
        .iter()
        .map(|(name, values)| (name.clone(), values.join(", ")))
        .collect()
}

/// Internal fields extracted from a response header map via a
/// configuration's `header_mappings`. A field is `None` when its header is
/// absent, or present but malformed (unparseable / non-positive where a
/// positive value is required) — malformed values are treated as absent
/// per the reconciliation contract, and logged at `debug`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReconcileFields {
    pub limit: Option<f64>,
    pub remaining: Option<f64>,
    pub reset: Option<f64>,
    pub daily_limit: Option<f64>,
    pub hourly_limit: Option<f64>,
    pub daily_remaining: Option<f64>,
}

fn parse_positive(field: &str, raw: &str) -> Option<f64> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value > 0.0 => Some(value),
        Ok(value) => {
            debug!(field, raw, value, "non-positive header value treated as absent");
            None
        }
        Err(_) => {
            debug!(field, raw, "unparseable header value treated as absent");
            None
        }
    }
}

/// Extract the reconciliation-relevant fields from a flattened header map,
/// according to `config`'s `header_mappings`.
pub fn extract_reconcile_fields(config: &Configuration, headers: &HeaderMap) -> ReconcileFields {
    let get = |field: &str| -> Option<f64> {
        let header_name = config.header_name(field)?;
        let raw = headers.get(header_name)?;
        parse_positive(field, raw)
    };

    ReconcileFields {
        limit: get(header_field::LIMIT),
        remaining: get(header_field::REMAINING),
        reset: get(header_field::RESET),
        daily_limit: get(header_field::DAILY_LIMIT),
        hourly_limit: get(header_field::HOURLY_LIMIT),
        daily_remaining: get(header_field::DAILY_REMAINING),
    }
}

/// Parse a `Retry-After` header value per §4.9: a non-negative integer
/// (seconds, floored to a minimum of 1), an HTTP date (`max(1, epoch -
/// now)` seconds), or a 1-second fallback for anything else.
pub fn parse_retry_after(raw: &str) -> u64 {
    let trimmed = raw.trim();

    if let Ok(seconds) = trimmed.parse::<i64>() {
        return seconds.max(1) as u64;
    }

    if let Ok(when) = httpdate::parse_http_date(trimmed) {
        let now = SystemTime::now();
        let delta = when.duration_since(now).unwrap_or_default().as_secs();
        return delta.max(1);
    }

    1
}

/// Current wall-clock time in whole seconds since the Unix epoch, used for
/// the persisted-state `timestamp` field.
pub fn now_epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
