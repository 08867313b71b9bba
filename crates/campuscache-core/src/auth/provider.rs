use std::sync::RwLock;

use futures::future::{self, BoxFuture, FutureExt};

use crate::api::ApiError;

/// Source of bearer tokens for the `ApiClient`.
///
/// The token may become available asynchronously (after login); callers gate
/// queries on `access_token().is_some()` rather than issuing anonymous calls.
pub trait AuthProvider: Send + Sync {
    /// Current access token, if signed in.
    fn access_token(&self) -> Option<String>;

    /// Obtain a fresh access token, replacing the current one.
    fn refresh(&self) -> BoxFuture<'_, Result<String, ApiError>>;
}

/// A token that never changes. Refreshing it always fails.
#[derive(Debug, Default)]
pub struct StaticToken {
    token: RwLock<Option<String>>,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn set(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }
}

impl AuthProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    fn refresh(&self) -> BoxFuture<'_, Result<String, ApiError>> {
        future::ready(Err(ApiError::Unauthorized)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let auth = StaticToken::new("abc");
        assert_eq!(auth.access_token().as_deref(), Some("abc"));
        assert!(auth.refresh().await.unwrap_err().is_unauthorized());

        auth.set(None);
        assert!(auth.access_token().is_none());
        assert!(StaticToken::anonymous().access_token().is_none());
    }
}
