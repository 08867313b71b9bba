use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::channels;
use super::transport::{HandlerId, RealtimeTransport};
use super::RealtimeError;
use crate::cache::{InvalidationRequest, KeyFilter, QueryClient};

/// One event channel and the cache keys it invalidates.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBinding {
    pub event: String,
    pub invalidates: InvalidationRequest,
}

impl ChannelBinding {
    pub fn new(event: impl Into<String>, filter: impl Into<KeyFilter>) -> Self {
        Self {
            event: event.into(),
            invalidates: InvalidationRequest::of(filter),
        }
    }

    pub fn and(mut self, filter: impl Into<KeyFilter>) -> Self {
        self.invalidates = self.invalidates.and(filter);
        self
    }
}

/// Connects a realtime transport to the query cache.
#[derive(Clone)]
pub struct RealtimeBridge {
    transport: Arc<dyn RealtimeTransport>,
    cache: QueryClient,
}

impl RealtimeBridge {
    pub fn new(transport: Arc<dyn RealtimeTransport>, cache: QueryClient) -> Self {
        Self { transport, cache }
    }

    /// Subscribe every binding. If any subscription fails, the ones already
    /// made are released before the error is returned.
    pub fn bind(
        &self,
        bindings: impl IntoIterator<Item = ChannelBinding>,
    ) -> Result<RealtimeGuard, RealtimeError> {
        let mut guard = RealtimeGuard {
            transport: Arc::clone(&self.transport),
            handlers: Vec::new(),
        };

        for binding in bindings {
            if !channels::is_known(&binding.event) {
                warn!(event = %binding.event, "Binding to an unrecognised realtime event");
            }
            let cache = self.cache.clone();
            let request = binding.invalidates;
            let id = self.transport.subscribe(
                &binding.event,
                Arc::new(move |event| {
                    let matched = cache.invalidate(&request);
                    debug!(event = %event.name, matched, "Realtime invalidation");
                }),
            )?;
            guard.handlers.push((binding.event, id));
        }

        debug!(channels = guard.handlers.len(), "Realtime bridge bound");
        Ok(guard)
    }
}

/// Live realtime subscriptions. Dropping the guard unsubscribes all of them.
#[must_use = "dropping the guard unsubscribes immediately"]
pub struct RealtimeGuard {
    transport: Arc<dyn RealtimeTransport>,
    handlers: Vec<(String, HandlerId)>,
}

impl RealtimeGuard {
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|(event, _)| event.as_str())
    }
}

impl Drop for RealtimeGuard {
    fn drop(&mut self) {
        for (event, id) in self.handlers.drain(..) {
            // Teardown is best-effort.
            if let Err(e) = self.transport.unsubscribe(&event, id) {
                trace!(event = %event, handler = %id, error = %e, "Ignoring unsubscribe failure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::*;
    use crate::cache::{CacheConfig, CacheKey, Query};
    use crate::realtime::transport::{EventHandler, LocalTransport};

    fn counting_query(calls: &Arc<AtomicUsize>) -> Query<usize> {
        let calls = Arc::clone(calls);
        Query::new(
            CacheKey::new("/api/courses").with(json!({"page": 1, "limit": 10})),
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(n)
                }
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_refetches_bound_keys() {
        let cache = QueryClient::new(CacheConfig::default()).unwrap();
        let transport = Arc::new(LocalTransport::new());
        let bridge = RealtimeBridge::new(transport.clone(), cache.clone());
        let _guard = bridge
            .bind([ChannelBinding::new(channels::COURSES_UPDATE, "/api/courses")])
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut view = cache.subscribe(counting_query(&calls)).unwrap();
        view.wait_settled().await;

        transport.emit(channels::PRODUCTS_UPDATE, Value::Null);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        transport.emit(channels::COURSES_UPDATE, json!({"id": "c-1"}));
        assert!(view.state().is_loading());
        assert_eq!(*view.wait_settled().await.data.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_event_fetches_once() {
        let cache = QueryClient::new(CacheConfig::default()).unwrap();
        let transport = Arc::new(LocalTransport::new());
        let bridge = RealtimeBridge::new(transport.clone(), cache.clone());
        let _guard = bridge
            .bind([ChannelBinding::new(channels::COURSES_UPDATE, "/api/courses")])
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut view = cache.subscribe(counting_query(&calls)).unwrap();
        view.wait_settled().await;

        transport.emit(channels::COURSES_UPDATE, Value::Null);
        transport.emit(channels::COURSES_UPDATE, Value::Null);
        let state = view.wait_settled().await;

        assert!(state.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*state.data.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let cache = QueryClient::new(CacheConfig::default()).unwrap();
        let transport = Arc::new(LocalTransport::new());
        let bridge = RealtimeBridge::new(transport.clone(), cache);

        let guard = bridge
            .bind([
                ChannelBinding::new(channels::COURSES_UPDATE, "/api/courses"),
                ChannelBinding::new(channels::PRODUCTS_UPDATE, "/api/products"),
            ])
            .unwrap();
        assert_eq!(guard.len(), 2);
        assert_eq!(transport.handler_count(channels::COURSES_UPDATE), 1);

        drop(guard);
        assert_eq!(transport.handler_count(channels::COURSES_UPDATE), 0);
        assert_eq!(transport.handler_count(channels::PRODUCTS_UPDATE), 0);
    }

    /// Accepts `limit` subscriptions, then fails. Unsubscribe always fails.
    struct Flaky {
        inner: LocalTransport,
        limit: usize,
        released: Mutex<Vec<String>>,
    }

    impl RealtimeTransport for Flaky {
        fn subscribe(&self, event: &str, handler: EventHandler) -> Result<HandlerId, RealtimeError> {
            if self.inner.handler_count(event) >= self.limit {
                return Err(RealtimeError::Subscribe {
                    event: event.to_string(),
                    reason: "socket disconnected".to_string(),
                });
            }
            self.inner.subscribe(event, handler)
        }

        fn unsubscribe(&self, event: &str, id: HandlerId) -> Result<(), RealtimeError> {
            self.inner.unsubscribe(event, id)?;
            self.released.lock().unwrap().push(event.to_string());
            Err(RealtimeError::Closed)
        }
    }

    #[tokio::test]
    async fn test_failed_bind_releases_acquired() {
        let cache = QueryClient::new(CacheConfig::default()).unwrap();
        let transport = Arc::new(Flaky {
            inner: LocalTransport::new(),
            limit: 1,
            released: Mutex::new(Vec::new()),
        });
        let bridge = RealtimeBridge::new(transport.clone(), cache);

        let result = bridge.bind([
            ChannelBinding::new(channels::COURSES_UPDATE, "/api/courses"),
            ChannelBinding::new(channels::COURSES_UPDATE, "/api/admin/courses"),
        ]);

        assert!(matches!(result, Err(RealtimeError::Subscribe { .. })));
        assert_eq!(transport.inner.handler_count(channels::COURSES_UPDATE), 0);
        assert_eq!(
            *transport.released.lock().unwrap(),
            vec![channels::COURSES_UPDATE.to_string()]
        );
    }
}
