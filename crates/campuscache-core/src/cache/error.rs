use thiserror::Error;

use super::CacheKey;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache key {key} holds {found}, not {expected}")]
    TypeMismatch {
        key: CacheKey,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Query client must be created inside a Tokio runtime")]
    NoRuntime,

    #[error("Query client has been shut down")]
    Closed,

    #[error("Cache entry {0} was removed")]
    EntryRemoved(CacheKey),
}
