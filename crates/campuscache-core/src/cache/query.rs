use std::any::TypeId;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

use super::options::QueryOptions;
use super::state::ErasedData;
use super::CacheKey;
use crate::api::ApiError;

pub(crate) type ErasedFetcher =
    Arc<dyn Fn() -> BoxFuture<'static, Result<ErasedData, ApiError>> + Send + Sync>;

/// A cache key, the function that fetches it, and per-query options.
///
/// Built once per view and handed to `QueryClient::subscribe`.
pub struct Query<T> {
    pub(crate) key: CacheKey,
    pub(crate) fetcher: ErasedFetcher,
    pub(crate) options: QueryOptions,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Query<T> {
    pub fn new<F, Fut>(key: CacheKey, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let fetcher: ErasedFetcher = Arc::new(move || {
            let fut = fetch();
            async move { fut.await.map(|data| Arc::new(data) as ErasedData) }.boxed()
        });
        Self {
            key,
            fetcher,
            options: QueryOptions::new(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Gate fetching, typically on a token being present.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.options.enabled = enabled;
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.options.stale_time = Some(stale_time);
        self
    }

    pub fn retry(mut self, retries: u32) -> Self {
        self.options.retry = Some(retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.options.retry_delay = Some(delay);
        self
    }

    /// Poll the entry while this subscription lives.
    pub fn refetch_interval(mut self, interval: Duration) -> Self {
        self.options.refetch_interval = Some(interval);
        self
    }
}

impl<T> Query<T> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            fetcher: Arc::clone(&self.fetcher),
            options: self.options.clone(),
            type_id: self.type_id,
            type_name: self.type_name,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.key)
            .field("type", &self.type_name)
            .field("options", &self.options)
            .finish()
    }
}
