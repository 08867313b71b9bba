use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::client::QueryClient;
use super::{InvalidationRequest, KeyFilter};
use crate::api::ApiError;

type Writer<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, ApiError>> + Send + Sync>;
type Validator<I> = Arc<dyn Fn(&I) -> Result<(), String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

#[derive(Debug)]
pub struct MutationState<O> {
    pub status: MutationStatus,
    pub data: Option<Arc<O>>,
    pub error: Option<Arc<ApiError>>,
}

impl<O> Clone for MutationState<O> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
        }
    }
}

impl<O> MutationState<O> {
    fn idle() -> Self {
        Self {
            status: MutationStatus::Idle,
            data: None,
            error: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == MutationStatus::Pending
    }
}

/// A write against the backend plus the cache keys it makes stale.
///
/// The writer is never retried; a view that wants a retry calls `mutate`
/// again.
pub struct Mutation<I, O> {
    client: QueryClient,
    name: &'static str,
    writer: Writer<I, O>,
    validator: Option<Validator<I>>,
    invalidates: InvalidationRequest,
    state: watch::Sender<MutationState<O>>,
}

impl<I, O> Mutation<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    pub fn new<F, Fut>(client: &QueryClient, name: &'static str, writer: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
    {
        let (state, _) = watch::channel(MutationState::idle());
        Self {
            client: client.clone(),
            name,
            writer: Arc::new(move |input| writer(input).boxed()),
            validator: None,
            invalidates: InvalidationRequest::new(),
            state,
        }
    }

    /// Mark entries matching `filter` stale after a successful write.
    pub fn invalidates(mut self, filter: impl Into<KeyFilter>) -> Self {
        self.invalidates = self.invalidates.and(filter);
        self
    }

    /// Check the input before any network call. A failure is reported as
    /// `ApiError::Validation` and touches neither the backend nor the cache.
    pub fn validate<V>(mut self, validator: V) -> Self
    where
        V: Fn(&I) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn invalidation(&self) -> &InvalidationRequest {
        &self.invalidates
    }

    pub async fn mutate(&self, input: I) -> Result<Arc<O>, Arc<ApiError>> {
        if let Some(validator) = &self.validator {
            if let Err(message) = validator(&input) {
                debug!(mutation = self.name, %message, "Mutation input rejected");
                return Err(self.fail(ApiError::Validation(message)));
            }
        }

        self.state.send_replace(MutationState {
            status: MutationStatus::Pending,
            data: None,
            error: None,
        });

        match (self.writer)(input).await {
            Ok(output) => {
                let output = Arc::new(output);
                let matched = self.client.invalidate(&self.invalidates);
                debug!(mutation = self.name, matched, "Mutation succeeded");
                self.state.send_replace(MutationState {
                    status: MutationStatus::Success,
                    data: Some(Arc::clone(&output)),
                    error: None,
                });
                Ok(output)
            }
            Err(e) => {
                warn!(mutation = self.name, error = %e, "Mutation failed");
                Err(self.fail(e))
            }
        }
    }

    fn fail(&self, error: ApiError) -> Arc<ApiError> {
        let error = Arc::new(error);
        self.state.send_replace(MutationState {
            status: MutationStatus::Error,
            data: None,
            error: Some(Arc::clone(&error)),
        });
        error
    }

    pub fn state(&self) -> MutationState<O> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState<O>> {
        self.state.subscribe()
    }

    /// Return to `Idle`, e.g. when a dialog closes.
    pub fn reset(&self) {
        self.state.send_replace(MutationState::idle());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::cache::{CacheConfig, CacheKey, Query, QueryStatus};

    fn list_query(calls: &Arc<AtomicUsize>) -> Query<usize> {
        let calls = Arc::clone(calls);
        Query::new(
            CacheKey::new("/api/courses").with(json!({"page": 1, "limit": 10})),
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok(n) }
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_invalidates_matching_entries() {
        let client = QueryClient::new(CacheConfig::default()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut view = client.subscribe(list_query(&calls)).unwrap();
        view.wait_settled().await;

        let approve = Mutation::new(&client, "approve_course", |id: String| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(format!("approved {}", id))
        })
        .invalidates("/api/courses");

        let mut states = approve.subscribe();
        let out = approve.mutate("c-1".to_string()).await.unwrap();
        assert_eq!(*out, "approved c-1");
        assert_eq!(approve.state().status, MutationStatus::Success);
        assert!(states.has_changed().unwrap());

        assert_eq!(view.state().status, QueryStatus::Loading);
        assert_eq!(*view.wait_settled().await.data.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_leaves_cache_untouched() {
        let client = QueryClient::new(CacheConfig::default()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut view = client.subscribe(list_query(&calls)).unwrap();
        view.wait_settled().await;
        let invalidations_before = client.stats().invalidations;

        let approve: Mutation<String, ()> =
            Mutation::new(&client, "approve_course", |_id: String| async {
                Err(ApiError::AccessDenied("Only admins can approve courses".to_string()))
            })
            .invalidates("/api/courses");

        let err = approve.mutate("c-1".to_string()).await.unwrap_err();
        assert_eq!(err.user_message(), "Only admins can approve courses");
        assert_eq!(approve.state().status, MutationStatus::Error);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let state = view.state();
        assert!(state.is_success());
        assert!(!state.is_stale);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.stats().invalidations, invalidations_before);
    }

    #[tokio::test]
    async fn test_validation_runs_before_writer() {
        let client = QueryClient::new(CacheConfig::default()).unwrap();
        let writes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&writes);

        let create = Mutation::new(&client, "create_course", move |title: String| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(title) }
        })
        .validate(|title: &String| {
            if title.trim().is_empty() {
                Err("Title is required".to_string())
            } else {
                Ok(())
            }
        })
        .invalidates("/api/courses");

        let err = create.mutate("   ".to_string()).await.unwrap_err();
        assert!(matches!(*err, ApiError::Validation(_)));
        assert_eq!(writes.load(Ordering::SeqCst), 0);
        assert_eq!(client.stats().invalidations, 0);

        create.mutate("Rust 101".to_string()).await.unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 1);

        create.reset();
        assert_eq!(create.state().status, MutationStatus::Idle);
    }
}
