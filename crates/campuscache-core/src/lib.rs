//! Client-side data layer for the campus LMS.
//!
//! This crate provides:
//! - `api`: the authenticated fetch wrapper and typed endpoint helpers
//! - `auth`: token providers, session persistence and 401 recovery
//! - `cache`: the shared query cache, subscriptions and mutations
//! - `realtime`: push events mapped to cache invalidations
//! - `queries`: the key, query and mutation catalogue used by the dashboards
//! - `config`, `prefs`: file-backed settings

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod prefs;
pub mod queries;
pub mod realtime;

pub use api::{build_api_url, ApiClient, ApiError};
pub use auth::{AuthProvider, RefreshCoordinator, SessionAuth, StaticToken};
pub use cache::{
    CacheConfig, CacheError, CacheKey, InvalidationRequest, KeyFilter, Mutation, MutationStatus,
    Query, QueryClient, QueryState, QueryStatus, QuerySubscription,
};
pub use config::Config;
pub use prefs::Preferences;
pub use realtime::{ChannelBinding, LocalTransport, RealtimeBridge, RealtimeGuard};
