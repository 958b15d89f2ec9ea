//! The shared "algorithm base" the four pacing algorithms delegate to:
//! state map, dirty-flag flush, cleanup, path safety, header flattening,
//! and the dynamic-limits overlay (§4.6), generalized once over a single
//! [`AlgorithmState`] implementation instead of duplicating the lifecycle
//! per algorithm.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{Algorithm, Configuration};
use crate::error::{Result, StorageError};
use crate::headers::{extract_reconcile_fields, now_epoch_seconds, HeaderMap as Headers, ReconcileFields};
use crate::status::{StatusDTO, StatusRaw};
use crate::storage::{derive_cache_key, load_from_file, save_to_file, PersistedState, SharedCache};

/// Per-algorithm state hooks, mapped 1:1 onto the shared lifecycle
/// (`initialize_key`, `refill_or_decay`, `admit`, `compute_wait_time`,
/// `compute_status_raw`, `reconcile_from_headers`, `doclean`).
///
/// All timestamps are epoch milliseconds (§5, "Clock"): the core computes
/// `now_ms` from a monotonic anchor so elapsed time never regresses, while
/// state remains serializable across process restarts.
pub trait AlgorithmState: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The algorithm tag this state belongs to.
    const ALGORITHM: Algorithm;

    /// Cap on a single `wait_for_allowed` sleep, per §4.1 ("no single sleep
    /// exceeds 1-2s per algorithm").
    const SLEEP_CAP_MS: u64 = 1000;

    /// `initialize_key`: create fresh state as of `now_ms`.
    fn new(now_ms: u64) -> Self;

    /// `refill_or_decay`: bring the state up to date as of `now_ms` using
    /// the current effective rate. Idempotent when called twice at the
    /// same `now_ms`.
    fn touch(&mut self, now_ms: u64, effective_rate: f64, config: &Configuration);

    /// `admit`: attempt to charge `tokens`, assuming `touch` already ran
    /// for this `now_ms`. Mutates only on success.
    fn try_admit(&mut self, tokens: u64, now_ms: u64, effective_rate: f64, config: &Configuration) -> bool;

    /// `compute_wait_time`: milliseconds until a `tokens`-sized admission
    /// would succeed, assuming `touch` already ran for `now_ms`.
    fn wait_time_ms(&self, tokens: u64, now_ms: u64, effective_rate: f64, config: &Configuration) -> u64;

    /// Usage as a percentage of effective capacity/limit, in `[0, 100]`.
    fn usage_percent(&self, effective_rate: f64, config: &Configuration) -> f64;

    /// `compute_status_raw`: algorithm-specific observability fields.
    fn raw_status(&self, effective_rate: f64, config: &Configuration) -> StatusRaw;

    /// `reconcile_from_headers`: apply server-reported fields, mutating
    /// local state downward-only, and returning any dynamic-limits overlay
    /// entries to merge (keyed by the exact map key to insert, e.g. `key`
    /// itself or `{key}_daily`).
    fn reconcile(&mut self, key: &str, fields: &ReconcileFields, config: &Configuration) -> Vec<(String, f64)>;

    /// The timestamp of the last refill/decay/window-boundary touch.
    fn last_activity_ms(&self) -> u64;

    /// The timestamp of the last successful admission, if any.
    fn last_request_ms(&self) -> Option<u64>;

    /// `doclean`: whether this key is dormant as of `cutoff_ms`. The
    /// default checks `last_activity_ms`/`last_request_ms`; algorithms with
    /// extra structure (leaky bucket's residual level, sliding window's
    /// newest timestamp) refine it further.
    fn is_dormant(&self, cutoff_ms: u64) -> bool {
        self.last_activity_ms() <= cutoff_ms && self.last_request_ms().map_or(true, |t| t <= cutoff_ms)
    }
}

struct CoreInner<T> {
    states: HashMap<String, T>,
    dynamic_limits: HashMap<String, f64>,
    dirty: bool,
}

impl<T> Default for CoreInner<T> {
    fn default() -> Self {
        Self { states: HashMap::new(), dynamic_limits: HashMap::new(), dirty: false }
    }
}

/// The generic limiter core: one per algorithm instantiation, owning the
/// per-key state map and the dynamic-limits overlay, and implementing the
/// uniform [`Limiter`] contract once for every `T: AlgorithmState`.
pub struct LimiterCore<T: AlgorithmState, C: SharedCache> {
    config: Configuration,
    cache: Option<Arc<C>>,
    cache_key: String,
    inner: Mutex<CoreInner<T>>,
    epoch: Instant,
    epoch_wall_ms: u64,
}

impl<T: AlgorithmState, C: SharedCache> LimiterCore<T, C> {
    /// Construct a limiter core. Does not load persisted state — call
    /// [`LimiterCore::load`] once after construction (the factory does this
    /// for you).
    pub fn new(config: Configuration, cache: Option<Arc<C>>) -> Self {
        let identity = config
            .state_file()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| {
                format!("{}:{}:{}", config.rate_per_second(), config.burst_capacity(), config.window_size_ms())
            });
        let cache_key = derive_cache_key(T::ALGORITHM, &identity);
        let epoch_wall_ms = (now_epoch_seconds() * 1000.0) as u64;

        Self {
            config,
            cache,
            cache_key,
            inner: Mutex::new(CoreInner::default()),
            epoch: Instant::now(),
            epoch_wall_ms,
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch_wall_ms.saturating_add(self.epoch.elapsed().as_millis() as u64)
    }

    /// The response header name configured for the `retry_after` internal
    /// field (§6), falling back to the conventional `Retry-After` when the
    /// caller left `header_mappings` at its default.
    pub fn retry_after_header_name(&self) -> &str {
        self.config.header_name(crate::config::header_field::RETRY_AFTER).unwrap_or("Retry-After")
    }

    fn effective_rate(&self, key: &str, inner: &CoreInner<T>) -> f64 {
        self.config.effective_rate(key, &inner.dynamic_limits)
    }

    /// Load persisted state: file backend if configured, else the shared
    /// cache if one is attached. Also runs automatic cleanup using
    /// `cleanup_interval_seconds`, per §4.6. Non-fatal on any failure.
    pub async fn load(&self) {
        let mut loaded = false;

        if self.config.persist_state() {
            if let Some(path) = self.config.state_file() {
                let persisted: PersistedState<T> = load_from_file(path);
                self.apply_persisted(persisted);
                loaded = true;
            }
        }

        if !loaded {
            if let Some(cache) = &self.cache {
                match cache.get(&self.cache_key).await {
                    Some(bytes) => match serde_json::from_slice::<PersistedState<T>>(&bytes) {
                        Ok(persisted) => self.apply_persisted(persisted),
                        Err(err) => warn!(error = %err, "failed to parse cached state, starting empty"),
                    },
                    None => {}
                }
            }
        }

        self.cleanup(self.config.cleanup_interval_seconds()).await;
    }

    fn apply_persisted(&self, persisted: PersistedState<T>) {
        let mut inner = self.inner.lock();
        inner.states = persisted.state;
        inner.dynamic_limits = persisted.dynamic_limits;
        inner.dirty = false;
    }

    fn snapshot(&self) -> Option<PersistedState<T>> {
        let mut inner = self.inner.lock();
        if !inner.dirty {
            return None;
        }
        inner.dirty = false;
        Some(PersistedState {
            state: inner.states.clone(),
            dynamic_limits: inner.dynamic_limits.clone(),
            timestamp: now_epoch_seconds(),
        })
    }

    /// Flush state if dirty: to the file backend if configured, else to
    /// the shared cache if attached. A no-write is not an error.
    pub async fn flush_state(&self) -> Result<()> {
        let Some(persisted) = self.snapshot() else {
            return Ok(());
        };

        if let Some(path) = self.config.state_file() {
            if let Err(err) = save_to_file(path, &persisted) {
                warn!(error = %err, "failed to persist state to file");
            }
            return Ok(());
        }

        if let Some(cache) = &self.cache {
            let bytes = serde_json::to_vec(&persisted).map_err(|err| StorageError::Serialization(err.to_string()))?;
            let ttl = Duration::from_secs(self.config.cleanup_interval_seconds().saturating_mul(2));
            if let Err(err) = cache.set(&self.cache_key, bytes, ttl).await {
                warn!(error = %err, "failed to persist state to cache");
            }
        }

        Ok(())
    }

    pub async fn is_allowed(&self, key: &str, tokens: u64) -> bool {
        let tokens = tokens.max(1);
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        let rate = self.effective_rate(key, &inner);
        let state = inner.states.entry(key.to_string()).or_insert_with(|| T::new(now));
        state.touch(now, rate, &self.config);
        let admitted = state.try_admit(tokens, now, rate, &self.config);
        if admitted {
            inner.dirty = true;
        } else {
            debug!(key, algorithm = T::ALGORITHM.tag(), tokens, "admission denied");
        }
        admitted
    }

    pub async fn wait_for_allowed(&self, key: &str, tokens: u64, max_wait_ms: u64) -> bool {
        let start = Instant::now();
        loop {
            if self.is_allowed(key, tokens).await {
                return true;
            }

            let elapsed_ms = start.elapsed().as_millis() as u64;
            if elapsed_ms >= max_wait_ms {
                return false;
            }

            let reported_wait = self.get_wait_time(key).await;
            let remaining_budget = max_wait_ms.saturating_sub(elapsed_ms);
            let sleep_ms = reported_wait.min(T::SLEEP_CAP_MS).max(1).min(remaining_budget.max(1));
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        }
    }

    pub async fn get_wait_time(&self, key: &str) -> u64 {
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        let rate = self.effective_rate(key, &inner);
        if !(rate > 0.0) {
            return 30_000;
        }
        let state = inner.states.entry(key.to_string()).or_insert_with(|| T::new(now));
        state.touch(now, rate, &self.config);
        state.wait_time_ms(1, now, rate, &self.config)
    }

    pub async fn reset(&self, key: &str) {
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        inner.states.insert(key.to_string(), T::new(now));
        inner.dirty = true;
    }

    pub async fn reset_all(&self) {
        let mut inner = self.inner.lock();
        inner.states.clear();
        inner.dynamic_limits.clear();
        inner.dirty = true;
    }

    pub async fn get_typed_status(&self, key: &str) -> StatusDTO {
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        let rate = self.effective_rate(key, &inner);
        let state = inner.states.entry(key.to_string()).or_insert_with(|| T::new(now));
        state.touch(now, rate, &self.config);
        let wait = state.wait_time_ms(1, now, rate, &self.config);

        StatusDTO {
            algorithm: T::ALGORITHM,
            key: key.to_string(),
            limited: wait > 0,
            wait_time_ms: wait,
            usage_percent: state.usage_percent(rate, &self.config),
            raw: state.raw_status(rate, &self.config),
        }
    }

    pub async fn get_status(&self, key: &str) -> HashMap<String, serde_json::Value> {
        self.get_typed_status(key).await.to_map()
    }

    pub async fn get_all_typed_statuses(&self) -> HashMap<String, StatusDTO> {
        let keys: Vec<String> = self.inner.lock().states.keys().cloned().collect();
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            out.insert(key.clone(), self.get_typed_status(&key).await);
        }
        out
    }

    pub async fn get_all_statuses(&self) -> HashMap<String, HashMap<String, serde_json::Value>> {
        self.get_all_typed_statuses().await.into_iter().map(|(k, v)| (k, v.to_map())).collect()
    }

    pub async fn cleanup(&self, max_age_seconds: u64) -> usize {
        let now = self.now_ms();
        let cutoff = now.saturating_sub(max_age_seconds.saturating_mul(1000));
        let mut inner = self.inner.lock();
        let before = inner.states.len();
        inner.states.retain(|_, state| !state.is_dormant(cutoff));
        let removed = before - inner.states.len();
        if removed > 0 {
            inner.dirty = true;
            debug!(removed, algorithm = T::ALGORITHM.tag(), "cleanup pruned dormant keys");
        }
        removed
    }

    pub async fn update_from_headers(&self, key: &str, headers: &Headers) {
        let fields = extract_reconcile_fields(&self.config, headers);
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        let rate = self.effective_rate(key, &inner);
        let state = inner.states.entry(key.to_string()).or_insert_with(|| T::new(now));
        state.touch(now, rate, &self.config);
        let overlays = state.reconcile(key, &fields, &self.config);

        if !overlays.is_empty() {
            for (overlay_key, overlay_rate) in overlays {
                inner.dynamic_limits.insert(overlay_key, overlay_rate);
            }
            inner.dirty = true;
            debug!(key, algorithm = T::ALGORITHM.tag(), "dynamic limits updated from header reconciliation");
        }
    }
}

impl<T: AlgorithmState, C: SharedCache> Drop for LimiterCore<T, C> {
    /// Best-effort flush on teardown (§4.6: "teardown is tied to the
    /// limiter's destruction path"). The file backend flushes
    /// synchronously; the cache backend is flushed on a detached task when
    /// a Tokio runtime is reachable from the dropping thread, since `Drop`
    /// cannot itself be `async`. Callers that need a guaranteed final flush
    /// should call `flush_state().await` explicitly before dropping.
    fn drop(&mut self) {
        let Some(persisted) = self.snapshot() else {
            return;
        };

        if let Some(path) = self.config.state_file() {
            if let Err(err) = save_to_file(path, &persisted) {
                warn!(error = %err, "failed to persist state on teardown");
            }
            return;
        }

        if let Some(cache) = self.cache.clone() {
            let cache_key = self.cache_key.clone();
            let ttl = Duration::from_secs(self.config.cleanup_interval_seconds().saturating_mul(2));
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Ok(bytes) = serde_json::to_vec(&persisted) {
                        if let Err(err) = cache.set(&cache_key, bytes, ttl).await {
                            warn!(error = %err, "failed to persist state to cache on teardown");
                        }
                    }
                });
            } else {
                warn!("no tokio runtime reachable on teardown, dropping unflushed cache-backed state");
            }
        }
    }
}

/// The uniform limiter contract (§4.1), implemented once for every
/// `LimiterCore<T, C>` below and dispatched over the four algorithms by
/// [`crate::factory::AnyLimiter`].
pub trait Limiter: Send + Sync {
    fn is_allowed(&self, key: &str, tokens: u64) -> impl Future<Output = bool> + Send;
    fn wait_for_allowed(&self, key: &str, tokens: u64, max_wait_ms: u64) -> impl Future<Output = bool> + Send;
    fn get_wait_time(&self, key: &str) -> impl Future<Output = u64> + Send;
    fn reset(&self, key: &str) -> impl Future<Output = ()> + Send;
    fn reset_all(&self) -> impl Future<Output = ()> + Send;
    fn get_status(&self, key: &str) -> impl Future<Output = HashMap<String, serde_json::Value>> + Send;
    fn get_typed_status(&self, key: &str) -> impl Future<Output = StatusDTO> + Send;
    fn get_all_statuses(&self) -> impl Future<Output = HashMap<String, HashMap<String, serde_json::Value>>> + Send;
    fn get_all_typed_statuses(&self) -> impl Future<Output = HashMap<String, StatusDTO>> + Send;
    fn cleanup(&self, max_age_seconds: u64) -> impl Future<Output = usize> + Send;
    fn update_from_headers(&self, key: &str, headers: &Headers) -> impl Future<Output = ()> + Send;
    fn flush_state(&self) -> impl Future<Output = Result<()>> + Send;

    /// The response header name configured for the `retry_after` internal
    /// field (§6), so callers consulting `Retry-After` honor a
    /// non-default `header_mappings` entry instead of assuming the
    /// conventional header name.
    fn retry_after_header_name(&self) -> &str;
}

impl<T: AlgorithmState, C: SharedCache> Limiter for LimiterCore<T, C> {
    async fn is_allowed(&self, key: &str, tokens: u64) -> bool {
        LimiterCore::is_allowed(self, key, tokens).await
    }

    async fn wait_for_allowed(&self, key: &str, tokens: u64, max_wait_ms: u64) -> bool {
        LimiterCore::wait_for_allowed(self, key, tokens, max_wait_ms).await
    }

    async fn get_wait_time(&self, key: &str) -> u64 {
        LimiterCore::get_wait_time(self, key).await
    }

    async fn reset(&self, key: &str) {
        LimiterCore::reset(self, key).await
    }

    async fn reset_all(&self) {
        LimiterCore::reset_all(self).await
    }

    async fn get_status(&self, key: &str) -> HashMap<String, serde_json::Value> {
        LimiterCore::get_status(self, key).await
    }

    async fn get_typed_status(&self, key: &str) -> StatusDTO {
        LimiterCore::get_typed_status(self, key).await
    }

    async fn get_all_statuses(&self) -> HashMap<String, HashMap<String, serde_json::Value>> {
        LimiterCore::get_all_statuses(self).await
    }

    async fn get_all_typed_statuses(&self) -> HashMap<String, StatusDTO> {
        LimiterCore::get_all_typed_statuses(self).await
    }

    async fn cleanup(&self, max_age_seconds: u64) -> usize {
        LimiterCore::cleanup(self, max_age_seconds).await
    }

    async fn update_from_headers(&self, key: &str, headers: &Headers) {
        LimiterCore::update_from_headers(self, key, headers).await
    }

    async fn flush_state(&self) -> Result<()> {
        LimiterCore::flush_state(self).await
    }

    fn retry_after_header_name(&self) -> &str {
        LimiterCore::retry_after_header_name(self)
    }
}
