use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::debug;

use super::client::QueryClient;
use super::query::Query;
use super::state::{EntrySnapshot, QueryState};
use super::{CacheError, CacheKey};

/// A view's binding to one cache entry.
///
/// Dropping the subscription releases it: the entry's subscriber count goes
/// down, a fetch nobody is waiting for is cancelled, and an entry left with
/// no subscribers is evicted after the cache's `gc_time`.
pub struct QuerySubscription<T> {
    client: QueryClient,
    key: CacheKey,
    entry_id: u64,
    enabled: bool,
    rx: watch::Receiver<EntrySnapshot>,
    poller: Option<AbortHandle>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> QuerySubscription<T> {
    pub(crate) fn new(
        client: QueryClient,
        key: CacheKey,
        entry_id: u64,
        enabled: bool,
        rx: watch::Receiver<EntrySnapshot>,
        poller: Option<AbortHandle>,
    ) -> Self {
        Self {
            client,
            key,
            entry_id,
            enabled,
            rx,
            poller,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current snapshot of the entry.
    pub fn state(&self) -> QueryState<T> {
        self.rx.borrow().typed()
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.state().data
    }

    /// Wait for the next change to the entry.
    pub async fn changed(&mut self) -> Result<QueryState<T>, CacheError> {
        self.rx
            .changed()
            .await
            .map_err(|_| CacheError::EntryRemoved(self.key.clone()))?;
        Ok(self.rx.borrow_and_update().typed())
    }

    /// Wait until no fetch is running and return the settled state.
    pub async fn wait_settled(&mut self) -> QueryState<T> {
        loop {
            {
                let snap = self.rx.borrow_and_update();
                if !snap.is_fetching {
                    return snap.typed();
                }
            }
            if self.rx.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Ask for fresh data. Joins a fetch that is already running.
    pub fn refetch(&self) {
        self.client.refetch(&self.key, false);
    }

    /// Toggle whether this subscription allows fetching. Re-enabling always
    /// refetches.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;
        self.client.set_enabled(&self.key, self.entry_id, enabled);
    }

    /// Rebind to a different query (new filters, next page).
    ///
    /// The new entry is attached before the old one is released, so an entry
    /// shared by both keys never loses its last subscriber in between. A
    /// response still pending for the old key can only land in the old entry.
    pub fn switch_to(&mut self, query: Query<T>) -> Result<(), CacheError> {
        if query.key == self.key {
            self.set_enabled(query.options.enabled);
            return Ok(());
        }

        let (rx, entry_id) = self.client.attach(&query)?;
        let old_key = std::mem::replace(&mut self.key, query.key.clone());
        let old_entry = std::mem::replace(&mut self.entry_id, entry_id);
        let old_enabled = std::mem::replace(&mut self.enabled, query.options.enabled);
        self.rx = rx;

        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        self.poller = query
            .options
            .refetch_interval
            .and_then(|interval| self.client.spawn_poller(query.key.clone(), interval));

        self.client.detach(&old_key, old_entry, old_enabled);
        debug!(from = %old_key, to = %self.key, "Subscription switched key");
        Ok(())
    }
}

impl<T> Drop for QuerySubscription<T> {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        self.client.detach(&self.key, self.entry_id, self.enabled);
    }
}

impl<T> std::fmt::Debug for QuerySubscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySubscription")
            .field("key", &self.key)
            .field("enabled", &self.enabled)
            .finish()
    }
}
