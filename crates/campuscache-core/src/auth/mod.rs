//! Authentication module: bearer tokens and their refresh.
//!
//! This module provides:
//! - `AuthProvider`: the token source the `ApiClient` reads on every request
//! - `StaticToken`: a fixed token (CLI flags, tests)
//! - `SessionAuth`: login/refresh against the backend with a session persisted to disk
//! - `RefreshCoordinator`: refreshes the token after a 401 and invalidates the query cache
//!
//! Sessions are persisted to disk and access tokens expire after 30 minutes.

pub mod provider;
pub mod refresh;
pub mod session;

pub use provider::{AuthProvider, StaticToken};
pub use refresh::{RefreshCoordinator, MIN_REFRESH_INTERVAL};
pub use session::{SessionAuth, SessionData};
