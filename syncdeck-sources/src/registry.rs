//! The source registry: fetch, cache, poll, retry and cancel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use syncdeck_types::{
    current_timestamp_ms, FetchOptions, FetchResponse, Params, SourceConfig, SourceEvent,
    SourceKind, SourceState,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, ResponseCache};
use crate::error::TransformError;
use crate::transform::TransformRegistry;
use crate::transport::{
    http_client, GraphqlTransport, RestTransport, Transport, Transports, WebSocketTransport,
};
use crate::{SourceError, MAX_WAIT};

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Holds named data sources and serves reads from them.
///
/// Cloning is cheap; clones share the same sources, cache and timers.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use syncdeck_sources::SourceRegistry;
/// use syncdeck_types::{FetchOptions, SourceConfig, SourceKind};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let registry = SourceRegistry::new();
/// registry.register(
///     SourceConfig::new("targets", SourceKind::Static).body(json!({"mrr": 10_000})),
/// );
///
/// let response = registry.fetch("targets", FetchOptions::default()).await;
/// assert!(response.success);
/// assert_eq!(response.data, Some(json!({"mrr": 10_000})));
///
/// registry.dispose();
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    sources: RwLock<HashMap<String, Source>>,
    cache: ResponseCache,
    in_flight: Mutex<HashMap<String, InFlight>>,
    pollers: Mutex<HashMap<String, JoinHandle<()>>>,
    transports: Transports,
    transforms: TransformRegistry,
    events: broadcast::Sender<SourceEvent>,
    next_request: AtomicU64,
    disposed: AtomicBool,
}

#[derive(Debug)]
struct Source {
    config: Arc<SourceConfig>,
    state: SourceState,
}

#[derive(Debug)]
struct InFlight {
    request: u64,
    token: CancellationToken,
}

impl SourceRegistry {
    /// Create a registry with the default HTTP and WebSocket transports and
    /// no transforms.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> SourceRegistryBuilder {
        SourceRegistryBuilder::default()
    }

    /// Register (or replace) a source.
    ///
    /// A request still running against the old config is cancelled, state is
    /// reset, cached entries of the source are dropped, and polling is
    /// (re)started if the config enables it. Polling needs a tokio
    /// runtime; without one the source is registered but not polled.
    pub fn register(&self, config: SourceConfig) {
        if self.inner.disposed.load(Ordering::Acquire) {
            warn!(source = %config.id, "registry disposed, ignoring registration");
            return;
        }

        if config.kind.is_remote() && config.endpoint.is_empty() {
            warn!(source = %config.id, kind = ?config.kind, "remote source has no endpoint");
        }

        let id = config.id.clone();
        let interval = config.polling.interval();

        let replaced = self
            .inner
            .sources
            .write()
            .insert(
                id.clone(),
                Source {
                    config: Arc::new(config),
                    state: SourceState::default(),
                },
            )
            .is_some();

        if let Some(in_flight) = self.inner.in_flight.lock().remove(&id) {
            in_flight.token.cancel();
        }
        self.inner.cache.invalidate(Some(&id));
        self.inner.stop_polling(&id);
        if let Some(period) = interval {
            self.start_polling(&id, period);
        }

        info!(source = %id, replaced, polling = interval.is_some(), "registered data source");
    }

    /// Remove a source: stop polling, abort its in-flight request and drop
    /// its config, state and cache entries.
    ///
    /// Returns `false` if no such source was registered.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.inner.sources.write().remove(id).is_some();
        self.inner.stop_polling(id);
        if let Some(in_flight) = self.inner.in_flight.lock().remove(id) {
            in_flight.token.cancel();
        }
        self.inner.cache.invalidate(Some(id));

        if removed {
            info!(source = %id, "unregistered data source");
        }
        removed
    }

    /// Fetch a source, from cache when permitted.
    ///
    /// Never fails: errors are reported through the returned response. A
    /// newer fetch of the same source cancels this one, which then resolves
    /// with `"request cancelled"`.
    pub async fn fetch(&self, id: &str, options: FetchOptions) -> FetchResponse {
        let started = Instant::now();

        if self.inner.disposed.load(Ordering::Acquire) {
            return FetchResponse::failure(SourceError::Disposed.to_string(), None);
        }

        let Some(config) = self.inner.config(id) else {
            return FetchResponse::failure(SourceError::NotFound(id.to_string()).to_string(), None);
        };

        let mut params = config.params.clone();
        params.extend(options.params);

        let cache_key = config
            .cache
            .enabled
            .then(|| CacheKey::new(id, &config.cache, &params));

        if !options.force {
            if let Some(data) = cache_key.as_ref().and_then(|key| self.inner.cache.get(key)) {
                debug!(source = %id, "serving cached response");
                return FetchResponse::cached(data);
            }
        }

        let request = self.inner.begin_request(id);
        let outcome = self
            .inner
            .run(&config, &params, cache_key, &request.token)
            .await;
        drop(request);

        let latency_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(data) => FetchResponse::success(data, latency_ms),
            Err(error) => FetchResponse::failure(error.to_string(), Some(latency_ms)),
        }
    }

    /// Drop the cached entries of one source, or of all sources.
    pub fn invalidate_cache(&self, id: Option<&str>) {
        self.inner.cache.invalidate(id);
    }

    /// Stop all polling, abort all in-flight requests and clear the cache.
    ///
    /// Later fetches fail with `"registry disposed"`.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for (_, task) in self.inner.pollers.lock().drain() {
            task.abort();
        }
        for (_, in_flight) in self.inner.in_flight.lock().drain() {
            in_flight.token.cancel();
        }
        self.inner.cache.invalidate(None);
        info!("source registry disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Current runtime state of a source.
    pub fn state(&self, id: &str) -> Option<SourceState> {
        self.inner.sources.read().get(id).map(|s| s.state.clone())
    }

    pub fn config(&self, id: &str) -> Option<SourceConfig> {
        self.inner.config(id).map(|config| (*config).clone())
    }

    /// Ids of all registered sources, sorted.
    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.sources.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Receive `data-update` / `data-error` events for every source.
    pub fn subscribe(&self) -> broadcast::Receiver<SourceEvent> {
        self.inner.events.subscribe()
    }

    fn start_polling(&self, id: &str, period: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(source = %id, "no tokio runtime, polling not started");
            return;
        };

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let source_id = id.to_string();
        let period = period.min(MAX_WAIT);

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let registry = SourceRegistry { inner };
                let response = registry.fetch(&source_id, FetchOptions::default()).await;
                if !response.success {
                    debug!(source = %source_id, error = ?response.error, "poll failed");
                }
            }
        });

        debug!(source = %id, period_ms = period.as_millis() as u64, "polling started");
        if let Some(previous) = self.inner.pollers.lock().insert(id.to_string(), task) {
            previous.abort();
        }
    }

    #[cfg(feature = "inspect")]
    pub fn inspect(&self) -> crate::inspect::RegistryInspection {
        use crate::inspect::{RegistryInspection, SourceInspection};

        let sources = self
            .inner
            .sources
            .read()
            .iter()
            .map(|(id, source)| {
                (
                    id.clone(),
                    SourceInspection {
                        kind: source.config.kind,
                        endpoint: source.config.endpoint.clone(),
                        state: source.state.clone(),
                    },
                )
            })
            .collect();

        let mut in_flight: Vec<String> = self.inner.in_flight.lock().keys().cloned().collect();
        in_flight.sort();
        let mut polling: Vec<String> = self.inner.pollers.lock().keys().cloned().collect();
        polling.sort();

        RegistryInspection {
            sources,
            cache_keys: self.inner.cache.keys(),
            in_flight,
            polling,
            disposed: self.is_disposed(),
        }
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn config(&self, id: &str) -> Option<Arc<SourceConfig>> {
        self.sources.read().get(id).map(|s| s.config.clone())
    }

    fn update_state<R>(&self, id: &str, f: impl FnOnce(&mut SourceState) -> R) -> Option<R> {
        self.sources.write().get_mut(id).map(|s| f(&mut s.state))
    }

    fn emit(&self, event: SourceEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn stop_polling(&self, id: &str) {
        if let Some(task) = self.pollers.lock().remove(id) {
            task.abort();
            debug!(source = %id, "polling stopped");
        }
    }

    /// Claim the in-flight slot of a source, cancelling whoever held it.
    fn begin_request<'a>(&'a self, id: &'a str) -> RequestGuard<'a> {
        let request = self.next_request.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let previous = self.in_flight.lock().insert(
            id.to_string(),
            InFlight {
                request,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            debug!(source = %id, "cancelling superseded request");
            previous.token.cancel();
        }

        RequestGuard {
            inner: self,
            id,
            request,
            token,
        }
    }

    /// The fetch pipeline: transport, shaping, cache, state, events, retry.
    async fn run(
        &self,
        config: &SourceConfig,
        params: &Params,
        cache_key: Option<CacheKey>,
        token: &CancellationToken,
    ) -> Result<Value, SourceError> {
        let id = config.id.as_str();

        loop {
            self.update_state(id, |state| state.loading = true);

            let attempt = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(SourceError::Cancelled),
                result = self.execute(config, params) => result,
            };
            if token.is_cancelled() {
                return Err(SourceError::Cancelled);
            }

            let now = current_timestamp_ms();
            match attempt {
                Ok(data) => {
                    let data = self.shape(config, data);
                    if let Some(key) = cache_key {
                        self.cache
                            .insert(key, data.clone(), config.cache.ttl_duration());
                    }
                    self.update_state(id, |state| state.record_success(now));
                    self.emit(SourceEvent::DataUpdate {
                        source_id: id.to_string(),
                        data: data.clone(),
                        timestamp: now,
                    });
                    return Ok(data);
                }
                Err(error) => {
                    let message = error.to_string();
                    let failures = self
                        .update_state(id, |state| state.record_failure(message.clone(), now))
                        .unwrap_or(u32::MAX);
                    self.emit(SourceEvent::DataError {
                        source_id: id.to_string(),
                        error: message,
                        timestamp: now,
                    });

                    let Some(delay) = config.retry.as_ref().and_then(|r| r.delay_for(failures))
                    else {
                        warn!(source = %id, %error, failures, "fetch failed");
                        return Err(error);
                    };

                    warn!(
                        source = %id,
                        %error,
                        failures,
                        delay_ms = delay.as_millis() as u64,
                        "fetch failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(SourceError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn execute(&self, config: &SourceConfig, params: &Params) -> Result<Value, SourceError> {
        match config.kind {
            SourceKind::Rest => self.transports.rest.fetch(config, params).await,
            SourceKind::Graphql => self.transports.graphql.fetch(config, params).await,
            SourceKind::Websocket => self.transports.websocket.fetch(config, params).await,
            SourceKind::Static => Ok(config.body.clone().unwrap_or(Value::Null)),
            SourceKind::Computed => {
                let name = config.transform.as_deref().ok_or_else(|| {
                    SourceError::InvalidConfig(format!(
                        "computed source '{}' requires a transform",
                        config.id
                    ))
                })?;
                let input = Value::Object(params.clone().into_iter().collect());
                Ok(self.transforms.apply(name, input)?)
            }
        }
    }

    /// Apply the configured transform, falling back to the raw data if it
    /// fails. Computed sources were produced by their transform already.
    fn shape(&self, config: &SourceConfig, data: Value) -> Value {
        if config.kind == SourceKind::Computed {
            return data;
        }
        let Some(name) = config.transform.as_deref() else {
            return data;
        };
        match self.transforms.apply(name, data.clone()) {
            Ok(shaped) => shaped,
            Err(error) => {
                warn!(source = %config.id, %error, "transform failed, returning untransformed data");
                data
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for (_, task) in self.pollers.get_mut().drain() {
            task.abort();
        }
    }
}

/// Releases the in-flight slot when the fetch finishes or is dropped, unless
/// a newer request has taken it over.
struct RequestGuard<'a> {
    inner: &'a Inner,
    id: &'a str,
    request: u64,
    token: CancellationToken,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.inner.in_flight.lock();
        let current = in_flight
            .get(self.id)
            .is_some_and(|f| f.request == self.request);
        if current {
            in_flight.remove(self.id);
            drop(in_flight);
            self.inner.update_state(self.id, |state| state.loading = false);
        }
    }
}

/// Builder for [`SourceRegistry`].
#[derive(Debug)]
pub struct SourceRegistryBuilder {
    rest: Option<Arc<dyn Transport>>,
    graphql: Option<Arc<dyn Transport>>,
    websocket: Option<Arc<dyn Transport>>,
    transforms: TransformRegistry,
    http_timeout: Option<Duration>,
    websocket_timeout: Option<Duration>,
    event_capacity: usize,
    sources: Vec<SourceConfig>,
}

impl Default for SourceRegistryBuilder {
    fn default() -> Self {
        Self {
            rest: None,
            graphql: None,
            websocket: None,
            transforms: TransformRegistry::new(),
            http_timeout: None,
            websocket_timeout: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            sources: Vec::new(),
        }
    }
}

impl SourceRegistryBuilder {
    /// Register a named transform that sources can refer to.
    pub fn transform<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, TransformError> + Send + Sync + 'static,
    {
        self.transforms.insert(name, f);
        self
    }

    /// Replace the transport used for `rest` sources.
    pub fn rest_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.rest = Some(transport);
        self
    }

    /// Replace the transport used for `graphql` sources.
    pub fn graphql_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.graphql = Some(transport);
        self
    }

    /// Replace the transport used for `websocket` sources.
    pub fn websocket_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.websocket = Some(transport);
        self
    }

    /// Request timeout for the default REST and GraphQL transports (default: 30 seconds).
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Watchdog for the default WebSocket transport (default: 30 seconds).
    pub fn websocket_timeout(mut self, timeout: Duration) -> Self {
        self.websocket_timeout = Some(timeout);
        self
    }

    /// Buffer size of the event channel (default: 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Register a source as part of building.
    pub fn source(mut self, config: SourceConfig) -> Self {
        self.sources.push(config);
        self
    }

    /// Build the registry and register the configured sources.
    pub fn build(self) -> SourceRegistry {
        let defaults = match self.http_timeout {
            Some(timeout) => {
                let client = http_client(timeout);
                Transports {
                    rest: Arc::new(RestTransport::with_client(client.clone())),
                    graphql: Arc::new(GraphqlTransport::with_client(client)),
                    websocket: Arc::new(WebSocketTransport::new()),
                }
            }
            None => Transports::default(),
        };

        let websocket = self.websocket.unwrap_or_else(|| match self.websocket_timeout {
            Some(timeout) => Arc::new(WebSocketTransport::with_timeout(timeout)),
            None => defaults.websocket.clone(),
        });

        let transports = Transports {
            rest: self.rest.unwrap_or(defaults.rest),
            graphql: self.graphql.unwrap_or(defaults.graphql),
            websocket,
        };

        let (events, _) = broadcast::channel(self.event_capacity);

        let registry = SourceRegistry {
            inner: Arc::new(Inner {
                sources: RwLock::new(HashMap::new()),
                cache: ResponseCache::new(),
                in_flight: Mutex::new(HashMap::new()),
                pollers: Mutex::new(HashMap::new()),
                transports,
                transforms: self.transforms,
                events,
                next_request: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            }),
        };

        for config in self.sources {
            registry.register(config);
        }
        registry
    }
}
