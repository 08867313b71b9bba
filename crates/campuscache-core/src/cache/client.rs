//! The shared query cache.
//!
//! One `QueryClient` is built at startup and cloned into every view. Entries
//! are keyed by `CacheKey`; each entry owns a watch channel its subscribers
//! read from. All bookkeeping happens under a single mutex that is never held
//! across an `.await`: fetches run as spawned tasks and re-enter the lock
//! only to publish their result.

use std::any::TypeId;
use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use super::options::{CacheConfig, RetryPolicy};
use super::query::{ErasedFetcher, Query};
use super::state::{EntrySnapshot, ErasedData, QueryState, QueryStatus};
use super::subscription::QuerySubscription;
use super::{CacheError, CacheKey, InvalidationRequest};
use crate::api::ApiError;

/// A fetch that has been started and not yet published.
struct InFlight {
    epoch: u64,
    handle: AbortHandle,
    /// Set once the task calls the fetcher.
    started: Arc<AtomicBool>,
    /// Started by an invalidation; later invalidations queue behind it
    /// instead of cancelling it.
    coalesce: bool,
    /// An invalidation arrived while this fetch was running.
    rerun: bool,
}

struct Entry {
    /// Distinguishes this entry from a later one created under the same key
    /// after `remove`.
    id: u64,
    type_id: TypeId,
    type_name: &'static str,
    state: watch::Sender<EntrySnapshot>,
    fetcher: ErasedFetcher,
    retry: RetryPolicy,
    stale_time: Duration,
    /// All live subscriptions.
    subscribers: usize,
    /// Subscriptions that currently allow fetching.
    active: usize,
    in_flight: Option<InFlight>,
    /// Bumped on every subscribe so a pending eviction can tell it is outdated.
    gc_generation: u64,
}

impl Entry {
    fn new<T>(id: u64, query: &Query<T>, config: &CacheConfig) -> Self {
        let (state, _) = watch::channel(EntrySnapshot::idle());
        Self {
            id,
            type_id: query.type_id,
            type_name: query.type_name,
            state,
            fetcher: Arc::clone(&query.fetcher),
            retry: RetryPolicy::resolve(&query.options, config),
            stale_time: query.options.stale_time.unwrap_or(config.stale_time),
            subscribers: 0,
            active: 0,
            in_flight: None,
            gc_generation: 0,
        }
    }

    /// Data is present, was not invalidated, and is younger than `stale_time`.
    fn is_fresh(&self) -> bool {
        let snap = self.state.borrow();
        if snap.is_stale || snap.data.is_none() || snap.status == QueryStatus::Error {
            return false;
        }
        snap.fetched_at
            .map(|at| at.elapsed() < self.stale_time)
            .unwrap_or(false)
    }

    fn check_type<T: 'static>(&self, key: &CacheKey) -> Result<(), CacheError> {
        if self.type_id == TypeId::of::<T>() {
            Ok(())
        } else {
            Err(CacheError::TypeMismatch {
                key: key.clone(),
                expected: std::any::type_name::<T>(),
                found: self.type_name,
            })
        }
    }
}

/// Counters for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub fetches_started: u64,
    pub responses_discarded: u64,
    pub invalidations: u64,
}

#[derive(Default)]
struct Counters {
    fetches_started: AtomicU64,
    responses_discarded: AtomicU64,
    invalidations: AtomicU64,
}

struct Inner {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    config: CacheConfig,
    runtime: Handle,
    next_epoch: AtomicU64,
    next_entry_id: AtomicU64,
    closed: AtomicBool,
    counters: Counters,
}

/// Process-wide query cache. Clone is cheap and shares the same entries.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<Inner>,
}

impl QueryClient {
    /// Create a cache bound to the current Tokio runtime.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        Ok(Self::with_runtime(config, runtime))
    }

    pub fn with_runtime(config: CacheConfig, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                config,
                runtime,
                next_epoch: AtomicU64::new(0),
                next_entry_id: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register interest in a query. Starts a fetch unless one is already in
    /// flight for the key or the cached data is still fresh.
    pub fn subscribe<T: Send + Sync + 'static>(
        &self,
        query: Query<T>,
    ) -> Result<QuerySubscription<T>, CacheError> {
        let (rx, entry_id) = self.attach(&query)?;
        let poller = query
            .options
            .refetch_interval
            .and_then(|interval| self.spawn_poller(query.key.clone(), interval));
        Ok(QuerySubscription::new(
            self.clone(),
            query.key,
            entry_id,
            query.options.enabled,
            rx,
            poller,
        ))
    }

    /// Count a new subscriber on the query's entry, creating it if needed.
    /// Returns the entry's state channel and its id.
    pub(crate) fn attach<T: Send + Sync + 'static>(
        &self,
        query: &Query<T>,
    ) -> Result<(watch::Receiver<EntrySnapshot>, u64), CacheError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(CacheError::Closed);
        }

        let config = &self.inner.config;
        let mut entries = self.lock();
        let entry = match entries.entry(query.key.clone()) {
            MapEntry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                entry.check_type::<T>(&query.key)?;
                entry
            }
            MapEntry::Vacant(vacant) => {
                trace!(key = %query.key, "Creating cache entry");
                let id = self.inner.next_entry_id.fetch_add(1, Ordering::Relaxed) + 1;
                vacant.insert(Entry::new(id, query, config))
            }
        };

        // The most recent registration defines how the key is fetched.
        entry.fetcher = Arc::clone(&query.fetcher);
        entry.retry = RetryPolicy::resolve(&query.options, config);
        entry.stale_time = query.options.stale_time.unwrap_or(config.stale_time);
        entry.subscribers += 1;
        entry.gc_generation += 1;
        let rx = entry.state.subscribe();

        if query.options.enabled {
            entry.active += 1;
            if entry.in_flight.is_none() && !entry.is_fresh() {
                self.start_fetch(&query.key, entry, "subscribe");
            }
        }
        Ok((rx, entry.id))
    }

    /// Release one subscriber. A subscription whose entry was removed (and
    /// possibly recreated) no longer counts toward the entry under `key`.
    pub(crate) fn detach(&self, key: &CacheKey, entry_id: u64, enabled: bool) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key).filter(|e| e.id == entry_id) else {
            trace!(key = %key, entry_id, "Detach from a removed entry ignored");
            return;
        };

        entry.subscribers = entry.subscribers.saturating_sub(1);
        if enabled {
            entry.active = entry.active.saturating_sub(1);
        }
        if entry.active == 0 {
            self.cancel_in_flight(key, entry);
        }
        if entry.subscribers > 0 {
            return;
        }

        let gc_time = self.inner.config.gc_time;
        if gc_time.is_zero() {
            entries.remove(key);
            debug!(key = %key, "Evicted cache entry with no subscribers");
            return;
        }

        let generation = entry.gc_generation;
        let weak = Arc::downgrade(&self.inner);
        let key = key.clone();
        self.inner.runtime.spawn(async move {
            tokio::time::sleep(gc_time).await;
            if let Some(inner) = weak.upgrade() {
                QueryClient { inner }.collect(&key, entry_id, generation);
            }
        });
    }

    fn collect(&self, key: &CacheKey, entry_id: u64, generation: u64) {
        let mut entries = self.lock();
        let idle = entries
            .get(key)
            .map(|e| e.id == entry_id && e.subscribers == 0 && e.gc_generation == generation)
            .unwrap_or(false);
        if idle {
            entries.remove(key);
            debug!(key = %key, "Evicted idle cache entry");
        }
    }

    pub(crate) fn set_enabled(&self, key: &CacheKey, entry_id: u64, enabled: bool) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key).filter(|e| e.id == entry_id) else {
            return;
        };
        if enabled {
            entry.active += 1;
            if entry.in_flight.is_none() {
                self.start_fetch(key, entry, "enabled");
            }
        } else {
            entry.active = entry.active.saturating_sub(1);
            if entry.active == 0 {
                self.cancel_in_flight(key, entry);
            }
        }
    }

    /// Start a fetch for `key` unless one is already running.
    pub(crate) fn refetch(&self, key: &CacheKey, require_active: bool) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if entry.in_flight.is_some() || (require_active && entry.active == 0) {
            return;
        }
        self.start_fetch(key, entry, "refetch");
    }

    pub(crate) fn spawn_poller(&self, key: CacheKey, interval: Duration) -> Option<AbortHandle> {
        if interval.is_zero() {
            warn!(key = %key, "Ignoring zero refetch interval");
            return None;
        }
        let weak = Arc::downgrade(&self.inner);
        let handle = self.inner.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                QueryClient { inner }.refetch(&key, true);
            }
        });
        Some(handle.abort_handle())
    }

    // =========================================================================
    // Fetch lifecycle
    // =========================================================================

    /// Spawn a fetch for `entry`, superseding any fetch already in flight.
    fn start_fetch(&self, key: &CacheKey, entry: &mut Entry, reason: &'static str) {
        if let Some(previous) = entry.in_flight.take() {
            previous.handle.abort();
            self.inner
                .counters
                .responses_discarded
                .fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, epoch = previous.epoch, "Cancelled superseded fetch");
        }

        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        entry.state.send_modify(|s| {
            s.status = QueryStatus::Loading;
            s.is_fetching = true;
        });

        let fetcher = Arc::clone(&entry.fetcher);
        let retry = entry.retry;
        let weak = Arc::downgrade(&self.inner);
        let task_key = key.clone();
        let started = Arc::new(AtomicBool::new(false));
        let task_started = Arc::clone(&started);
        let handle = self.inner.runtime.spawn(async move {
            task_started.store(true, Ordering::SeqCst);
            let result = run_fetch(&fetcher, retry, &task_key).await;
            if let Some(inner) = weak.upgrade() {
                QueryClient { inner }.complete_fetch(&task_key, epoch, result);
            }
        });

        entry.in_flight = Some(InFlight {
            epoch,
            handle: handle.abort_handle(),
            started,
            coalesce: matches!(reason, "invalidated" | "rerun"),
            rerun: false,
        });
        self.inner
            .counters
            .fetches_started
            .fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, epoch, reason, "Fetch started");
    }

    fn complete_fetch(&self, key: &CacheKey, epoch: u64, result: Result<ErasedData, ApiError>) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            trace!(key = %key, epoch, "Entry evicted before fetch completed");
            return;
        };

        let current = entry.in_flight.as_ref().map(|f| f.epoch);
        if current != Some(epoch) {
            self.inner
                .counters
                .responses_discarded
                .fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, epoch, ?current, "Discarding stale response");
            return;
        }
        let rerun = entry.in_flight.take().map(|f| f.rerun).unwrap_or(false);

        match result {
            Ok(data) => {
                entry.state.send_modify(|s| {
                    s.status = QueryStatus::Success;
                    s.data = Some(data);
                    s.error = None;
                    s.updated_at = Some(Utc::now());
                    s.fetched_at = Some(Instant::now());
                    s.is_fetching = false;
                    s.is_stale = rerun;
                });
                debug!(key = %key, epoch, "Fetch succeeded");
            }
            Err(e) => {
                warn!(key = %key, epoch, error = %e, "Fetch failed");
                entry.state.send_modify(|s| {
                    s.status = QueryStatus::Error;
                    s.error = Some(Arc::new(e));
                    s.is_fetching = false;
                });
            }
        }

        if rerun && entry.active > 0 {
            self.start_fetch(key, entry, "rerun");
        }
    }

    fn cancel_in_flight(&self, key: &CacheKey, entry: &mut Entry) {
        let Some(in_flight) = entry.in_flight.take() else {
            return;
        };
        in_flight.handle.abort();
        entry.state.send_modify(|s| {
            s.is_fetching = false;
            s.status = s.settled_status();
            // The requested refresh never happened.
            s.is_stale = s.data.is_some();
        });
        debug!(key = %key, epoch = in_flight.epoch, "Cancelled fetch with no active subscribers");
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Mark every matching entry stale. Entries with active subscribers
    /// refetch immediately; the rest refetch on their next subscription.
    ///
    /// Returns the number of matching entries.
    pub fn invalidate(&self, request: &InvalidationRequest) -> usize {
        if request.is_empty() {
            return 0;
        }

        let mut entries = self.lock();
        let mut matched = 0;
        let mut refetched = 0;
        for (key, entry) in entries.iter_mut() {
            if !request.matches(key) {
                continue;
            }
            matched += 1;
            entry.state.send_modify(|s| s.is_stale = true);
            if entry.active > 0 {
                self.refetch_invalidated(key, entry);
                refetched += 1;
            }
        }
        self.inner
            .counters
            .invalidations
            .fetch_add(1, Ordering::Relaxed);
        debug!(matched, refetched, "Applied invalidation");
        matched
    }

    /// A fetch that has not sent its request yet already sees the change and
    /// is kept. A running fetch that an earlier invalidation started gets one
    /// follow-up fetch once it publishes. Anything else is superseded.
    fn refetch_invalidated(&self, key: &CacheKey, entry: &mut Entry) {
        if let Some(in_flight) = entry.in_flight.as_mut() {
            if !in_flight.started.load(Ordering::SeqCst) {
                trace!(key = %key, epoch = in_flight.epoch, "Invalidation joins pending fetch");
                return;
            }
            if in_flight.coalesce {
                in_flight.rerun = true;
                trace!(key = %key, epoch = in_flight.epoch, "Invalidation queued behind running fetch");
                return;
            }
        }
        self.start_fetch(key, entry, "invalidated");
    }

    /// Invalidate every entry, e.g. after a token refresh.
    pub fn invalidate_all(&self) -> usize {
        self.invalidate(&InvalidationRequest::all())
    }

    /// Background refetch trigger for "the user came back": refetch every
    /// active entry whose data is no longer fresh.
    pub fn on_focus(&self) -> usize {
        if !self.inner.config.refetch_on_focus {
            return 0;
        }
        let mut entries = self.lock();
        let mut refetched = 0;
        for (key, entry) in entries.iter_mut() {
            if entry.active > 0 && entry.in_flight.is_none() && !entry.is_fresh() {
                self.start_fetch(key, entry, "focus");
                refetched += 1;
            }
        }
        refetched
    }

    // =========================================================================
    // Direct access
    // =========================================================================

    pub fn state<T: Send + Sync + 'static>(
        &self,
        key: &CacheKey,
    ) -> Result<Option<QueryState<T>>, CacheError> {
        let entries = self.lock();
        match entries.get(key) {
            Some(entry) => {
                entry.check_type::<T>(key)?;
                Ok(Some(entry.state.borrow().typed()))
            }
            None => Ok(None),
        }
    }

    pub fn get_query_data<T: Send + Sync + 'static>(&self, key: &CacheKey) -> Option<Arc<T>> {
        self.state::<T>(key).ok().flatten().and_then(|s| s.data)
    }

    /// Overwrite an existing entry's data, e.g. with a mutation's response.
    /// Returns `Ok(false)` if no entry exists for `key`.
    pub fn set_query_data<T: Send + Sync + 'static>(
        &self,
        key: &CacheKey,
        data: T,
    ) -> Result<bool, CacheError> {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };
        entry.check_type::<T>(key)?;
        let data: ErasedData = Arc::new(data);
        entry.state.send_modify(|s| {
            s.data = Some(data);
            s.error = None;
            s.updated_at = Some(Utc::now());
            s.fetched_at = Some(Instant::now());
            s.is_stale = false;
            if !s.is_fetching {
                s.status = QueryStatus::Success;
            }
        });
        Ok(true)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn entry_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop an entry regardless of subscribers. Live subscriptions stop
    /// receiving updates and no longer count toward a later entry under the
    /// same key.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let removed = self.lock().remove(key);
        match removed {
            Some(entry) => {
                if let Some(in_flight) = entry.in_flight {
                    in_flight.handle.abort();
                }
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            entries: self.entry_count(),
            fetches_started: counters.fetches_started.load(Ordering::Relaxed),
            responses_discarded: counters.responses_discarded.load(Ordering::Relaxed),
            invalidations: counters.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Abort all in-flight fetches and drop every entry. Further subscriptions fail.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let mut entries = self.lock();
        for entry in entries.values_mut() {
            if let Some(in_flight) = entry.in_flight.take() {
                in_flight.handle.abort();
            }
        }
        let count = entries.len();
        entries.clear();
        debug!(entries = count, "Query cache shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Run a fetcher, retrying per `retry`. Unauthorized responses are never
/// retried: the token refresh path owns them.
async fn run_fetch(
    fetcher: &ErasedFetcher,
    retry: RetryPolicy,
    key: &CacheKey,
) -> Result<ErasedData, ApiError> {
    let mut attempt = 0;
    loop {
        match fetcher().await {
            Ok(data) => return Ok(data),
            Err(e) if attempt < retry.retries && !e.is_unauthorized() => {
                attempt += 1;
                let delay = retry.delay_for(attempt);
                warn!(
                    key = %key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
