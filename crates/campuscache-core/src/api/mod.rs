//! HTTP access to the LMS backend.
//!
//! `ApiClient` is the single fetch wrapper: it builds URLs from the configured
//! base, attaches the bearer token and turns non-2xx responses into `ApiError`
//! carrying the server's `message`. It never retries; retry policy lives in the
//! query cache.

pub mod client;
pub mod error;
pub mod url;

pub use client::{ApiClient, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::{ApiError, GENERIC_ERROR_MESSAGE};
pub use url::build_api_url;
