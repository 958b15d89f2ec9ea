//! The file state backend: path-safety whitelisting and atomic
//! write-temp-then-rename flush (§4.6).

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::StorageError;
use crate::storage::PersistedState;

/// Resolve `path` against the current working directory if relative,
/// normalize away `.`/`..` segments, and confirm the result lives under one
/// of the allowed roots (cwd or the system temp directory). Returns `None`
/// (silently, per §4.6) when the path falls outside the whitelist.
pub(crate) fn resolve_allowed(path: &Path) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let absolute = if path.is_absolute() { path.to_path_buf() } else { cwd.join(path) };
    let normalized = normalize(&absolute);

    let temp_dir = normalize(&std::env::temp_dir());
    if normalized.starts_with(&cwd) || normalized.starts_with(&temp_dir) {
        Some(normalized)
    } else {
        None
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Load persisted state from `path`. Missing or malformed files yield an
/// empty state with a `warn`-level log, never an error — the limiter simply
/// starts cold.
pub fn load_from_file<S: DeserializeOwned>(path: &Path) -> PersistedState<S> {
    let Some(resolved) = resolve_allowed(path) else {
        warn!(path = %path.display(), "state file path outside allowed roots, starting with empty state");
        return PersistedState::default();
    };

    match fs::read(&resolved) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(err) => {
                warn!(path = %resolved.display(), error = %err, "failed to parse persisted state, starting empty");
                PersistedState::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
        Err(err) => {
            warn!(path = %resolved.display(), error = %err, "failed to read persisted state, starting empty");
            PersistedState::default()
        }
    }
}

/// Atomically write `state` to `path`: serialize compactly to a temp file
/// named with a process-id suffix in the target directory, then rename over
/// the target. Returns a `StorageError` on failure — the caller logs it and
/// continues in memory, never propagating it out of normal operation.
pub fn save_to_file<S: Serialize>(path: &Path, state: &PersistedState<S>) -> std::result::Result<(), StorageError> {
    let resolved = resolve_allowed(path).ok_or_else(|| StorageError::PathNotAllowed(path.to_path_buf()))?;

    let bytes = serde_json::to_vec(state).map_err(|err| StorageError::Serialization(err.to_string()))?;

    let dir = resolved.parent().unwrap_or_else(|| Path::new("."));
    let file_name = resolved.file_name().and_then(|n| n.to_str()).unwrap_or("state.json");
    let temp_path = dir.join(format!("{file_name}.{}.tmp", std::process::id()));

    fs::write(&temp_path, &bytes).map_err(|err| StorageError::OperationFailed { message: err.to_string() })?;

    fs::rename(&temp_path, &resolved).map_err(|err| {
        let _ = fs::remove_file(&temp_path);
        StorageError::OperationFailed { message: err.to_string() }
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_outside_whitelist_rejected() {
        assert!(resolve_allowed(Path::new("/etc/passwd")).is_none());
    }

    #[test]
    fn test_relative_path_resolves_under_cwd() {
        let resolved = resolve_allowed(Path::new("four_rl_state.json")).unwrap();
        assert!(resolved.starts_with(std::env::current_dir().unwrap()));
    }

    #[test]
    fn test_parent_segments_normalized() {
        let resolved = resolve_allowed(Path::new("a/../b.json")).unwrap();
        assert!(resolved.ends_with("b.json"));
        assert!(!resolved.to_string_lossy().contains(".."));
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state: PersistedState<f64> = PersistedState::default();
        state.state.insert("k".to_string(), 3.5);
        state.dynamic_limits.insert("k".to_string(), 2.0);
        state.timestamp = 100.0;

        save_to_file(&path, &state).unwrap();
        let loaded: PersistedState<f64> = load_from_file(&path);

        assert_eq!(loaded.state.get("k"), Some(&3.5));
        assert_eq!(loaded.dynamic_limits.get("k"), Some(&2.0));
    }

    #[test]
    fn test_load_missing_file_yields_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does_not_exist.json");
        let loaded: PersistedState<f64> = load_from_file(&path);
        assert!(loaded.state.is_empty());
    }

    #[test]
    fn test_load_malformed_file_yields_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"not json").unwrap();
        let loaded: PersistedState<f64> = load_from_file(&path);
        assert!(loaded.state.is_empty());
    }
}
