use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::api::{ApiError, GENERIC_ERROR_MESSAGE};

/// Type-erased payload stored in an entry.
pub(crate) type ErasedData = Arc<dyn Any + Send + Sync>;

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    /// No fetch has been requested (disabled or not yet subscribed).
    Idle,
    /// A fetch is running. Previous data, if any, is still available.
    Loading,
    Success,
    Error,
}

/// What an entry broadcasts to its subscribers.
#[derive(Clone)]
pub(crate) struct EntrySnapshot {
    pub status: QueryStatus,
    pub data: Option<ErasedData>,
    pub error: Option<Arc<ApiError>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Monotonic twin of `updated_at`, used for freshness checks.
    pub fetched_at: Option<Instant>,
    pub is_fetching: bool,
    pub is_stale: bool,
}

impl EntrySnapshot {
    pub fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            updated_at: None,
            fetched_at: None,
            is_fetching: false,
            is_stale: false,
        }
    }

    /// Status to fall back to when a fetch is abandoned.
    pub fn settled_status(&self) -> QueryStatus {
        if self.error.is_some() && self.data.is_none() {
            QueryStatus::Error
        } else if self.data.is_some() {
            QueryStatus::Success
        } else {
            QueryStatus::Idle
        }
    }

    pub fn typed<T: Send + Sync + 'static>(&self) -> QueryState<T> {
        QueryState {
            status: self.status,
            data: self
                .data
                .clone()
                .and_then(|d| d.downcast::<T>().ok()),
            error: self.error.clone(),
            updated_at: self.updated_at,
            is_fetching: self.is_fetching,
            is_stale: self.is_stale,
        }
    }
}

/// A subscriber's view of one cache entry.
#[derive(Debug)]
pub struct QueryState<T> {
    pub status: QueryStatus,
    /// Latest successful payload. Kept while refetching and after a failed refetch.
    pub data: Option<Arc<T>>,
    pub error: Option<Arc<ApiError>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_fetching: bool,
    /// Invalidated since the last successful fetch.
    pub is_stale: bool,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            updated_at: self.updated_at,
            is_fetching: self.is_fetching,
            is_stale: self.is_stale,
        }
    }
}

impl<T> QueryState<T> {
    pub fn is_idle(&self) -> bool {
        self.status == QueryStatus::Idle
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// Error text for display, if the entry is in the error state.
    pub fn error_message(&self) -> Option<String> {
        if !self.is_error() {
            return None;
        }
        Some(
            self.error
                .as_ref()
                .map(|e| e.user_message())
                .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_downcast() {
        let mut snap = EntrySnapshot::idle();
        snap.data = Some(Arc::new(vec![1u32, 2, 3]));
        snap.status = QueryStatus::Success;

        let typed: QueryState<Vec<u32>> = snap.typed();
        assert_eq!(typed.data.as_deref(), Some(&vec![1, 2, 3]));
        assert!(typed.is_success());

        let wrong: QueryState<String> = snap.typed();
        assert!(wrong.data.is_none());
    }

    #[test]
    fn test_settled_status() {
        let mut snap = EntrySnapshot::idle();
        assert_eq!(snap.settled_status(), QueryStatus::Idle);

        snap.error = Some(Arc::new(ApiError::Timeout));
        assert_eq!(snap.settled_status(), QueryStatus::Error);

        snap.data = Some(Arc::new(1u8));
        assert_eq!(snap.settled_status(), QueryStatus::Success);
    }

    #[test]
    fn test_error_message_only_in_error_state() {
        let mut snap = EntrySnapshot::idle();
        snap.error = Some(Arc::new(ApiError::Validation("Title is required".into())));
        assert!(snap.typed::<u8>().error_message().is_none());

        snap.status = QueryStatus::Error;
        assert_eq!(
            snap.typed::<u8>().error_message().as_deref(),
            Some("Title is required")
        );
    }
}
