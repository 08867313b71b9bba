//! Client-side query cache.
//!
//! This module provides the `QueryClient`, a shared cache of server
//! responses keyed by `CacheKey`. Views subscribe with a `Query` and read
//! `QueryState` snapshots; `Mutation`s write to the backend and invalidate
//! the keys they affect.
//!
//! Guarantees:
//! - at most one fetch in flight per key; later subscribers join it
//! - every fetch carries an epoch and only the newest one may publish
//! - invalidation refetches entries with active subscribers and marks the
//!   rest stale for their next subscription
//! - entries with no subscribers are evicted after `CacheConfig::gc_time`

pub mod client;
pub mod error;
pub mod key;
pub mod mutation;
pub mod options;
pub mod query;
pub mod state;
pub mod subscription;


pub use client::{CacheStats, QueryClient};
pub use error::CacheError;
pub use key::{CacheKey, InvalidationRequest, KeyFilter};
pub use mutation::{Mutation, MutationState, MutationStatus};
pub use options::{CacheConfig, QueryOptions};
pub use query::Query;
pub use state::{QueryState, QueryStatus};
pub use subscription::QuerySubscription;
