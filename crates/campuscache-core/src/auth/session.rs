use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::AuthProvider;
use crate::api::{build_api_url, ApiError};
use crate::models::User;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Access token lifetime in minutes.
const TOKEN_EXPIRY_MINUTES: i64 = 30;

/// Buffer time before expiry to trigger refresh (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

const LOGIN_ENDPOINT: &str = "/api/auth/login";
const REFRESH_ENDPOINT: &str = "/api/auth/refresh";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(access_token: String, refresh_token: Option<String>, user: Option<User>) -> Self {
        Self {
            access_token,
            refresh_token,
            user,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        let expiry = self.created_at + Duration::minutes(TOKEN_EXPIRY_MINUTES);
        Utc::now() > expiry
    }

    /// Check if the session will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        let refresh_at = self.created_at
            + Duration::minutes(TOKEN_EXPIRY_MINUTES - TOKEN_REFRESH_BUFFER_MINUTES);
        Utc::now() > refresh_at
    }

    pub fn time_until_expiry(&self) -> Duration {
        let expiry = self.created_at + Duration::minutes(TOKEN_EXPIRY_MINUTES);
        expiry - Utc::now()
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.time_until_expiry().num_minutes().max(0)
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    #[serde(alias = "token")]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<User>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Token provider backed by the backend's login and refresh endpoints.
pub struct SessionAuth {
    http: Client,
    base_url: String,
    cache_dir: Option<PathBuf>,
    data: RwLock<Option<SessionData>>,
}

impl SessionAuth {
    pub fn new(base_url: impl Into<String>, timeout: StdDuration) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            cache_dir: None,
            data: RwLock::new(None),
        })
    }

    /// Persist the session under `cache_dir`.
    pub fn with_cache_dir(mut self, cache_dir: PathBuf) -> Self {
        self.cache_dir = Some(cache_dir);
        self
    }

    /// Load session from disk. Returns true if a non-expired session was found.
    pub fn load(&self) -> Result<bool> {
        let Some(path) = self.session_path() else {
            return Ok(false);
        };
        if path.exists() {
            let contents =
                std::fs::read_to_string(&path).context("Failed to read session file")?;
            let data: SessionData =
                serde_json::from_str(&contents).context("Failed to parse session file")?;

            // An expired access token is still useful if it can be refreshed.
            if !data.is_expired() || data.refresh_token.is_some() {
                self.update(data);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        let (Some(path), Some(data)) = (self.session_path(), self.data()) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&data)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Clear session data
    pub fn clear(&self) -> Result<()> {
        *self.data.write().unwrap_or_else(|e| e.into_inner()) = None;
        if let Some(path) = self.session_path() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Update session with new data
    pub fn update(&self, data: SessionData) {
        *self.data.write().unwrap_or_else(|e| e.into_inner()) = Some(data);
    }

    pub fn data(&self) -> Option<SessionData> {
        self.data.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Check if session is valid (exists and not expired)
    pub fn is_valid(&self) -> bool {
        self.data().map(|d| !d.is_expired()).unwrap_or(false)
    }

    pub fn user(&self) -> Option<User> {
        self.data().and_then(|d| d.user)
    }

    /// Sign in with email and password.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionData, ApiError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(ApiError::Validation(
                "Email and password required".to_string(),
            ));
        }

        let url = build_api_url(&self.base_url, LOGIN_ENDPOINT);
        let response = self
            .http
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let tokens: TokenResponse = Self::read_json(response).await?;
        let data = SessionData::new(tokens.access_token, tokens.refresh_token, tokens.user);
        self.update(data.clone());
        self.persist();
        info!("Login successful");
        Ok(data)
    }

    async fn refresh_token(&self) -> Result<String, ApiError> {
        let Some(refresh_token) = self.data().and_then(|d| d.refresh_token) else {
            debug!("No refresh token available");
            return Err(ApiError::Unauthorized);
        };

        let url = build_api_url(&self.base_url, REFRESH_ENDPOINT);
        let response = self
            .http
            .post(&url)
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await?;

        let tokens: TokenResponse = Self::read_json(response).await?;
        let previous_user = self.user();
        let data = SessionData::new(
            tokens.access_token.clone(),
            tokens.refresh_token.or(Some(refresh_token)),
            tokens.user.or(previous_user),
        );
        self.update(data);
        self.persist();
        debug!("Access token refreshed");
        Ok(tokens.access_token)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!(error = %e, "Failed to save session");
        }
    }

    fn session_path(&self) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join(SESSION_FILE))
    }
}

impl AuthProvider for SessionAuth {
    fn access_token(&self) -> Option<String> {
        self.data().map(|d| d.access_token)
    }

    fn refresh(&self) -> BoxFuture<'_, Result<String, ApiError>> {
        self.refresh_token().boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn auth_for(server: &MockServer) -> SessionAuth {
        SessionAuth::new(server.uri(), StdDuration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_session_expiry() {
        let fresh = SessionData::new("t".to_string(), None, None);
        assert!(!fresh.is_expired());
        assert!(!fresh.needs_refresh());
        assert!(fresh.minutes_until_expiry() <= TOKEN_EXPIRY_MINUTES);

        let mut old = fresh.clone();
        old.created_at = Utc::now() - Duration::minutes(26);
        assert!(old.needs_refresh());
        assert!(!old.is_expired());

        old.created_at = Utc::now() - Duration::minutes(31);
        assert!(old.is_expired());
        assert_eq!(old.minutes_until_expiry(), 0);
    }

    #[test]
    fn test_save_load_clear_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let auth = SessionAuth::new("http://localhost", StdDuration::from_secs(5))
            .unwrap()
            .with_cache_dir(dir.path().to_path_buf());

        auth.update(SessionData::new("abc".to_string(), Some("r1".to_string()), None));
        auth.save().unwrap();

        let other = SessionAuth::new("http://localhost", StdDuration::from_secs(5))
            .unwrap()
            .with_cache_dir(dir.path().to_path_buf());
        assert!(other.load().unwrap());
        assert_eq!(other.access_token().as_deref(), Some("abc"));

        other.clear().unwrap();
        assert!(other.access_token().is_none());
        assert!(!dir.path().join(SESSION_FILE).exists());
    }

    #[tokio::test]
    async fn test_login_requires_credentials() {
        let auth = SessionAuth::new("http://localhost", StdDuration::from_secs(5)).unwrap();
        let err = auth.login("", "secret").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_login_and_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "first",
                "refreshToken": "r1",
                "user": {"id": "u1", "name": "Ada", "email": "ada@example.edu", "role": "admin"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .and(body_json(serde_json::json!({"refreshToken": "r1"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"accessToken": "second"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let auth = auth_for(&server);
        let session = auth.login("ada@example.edu", "pw").await.unwrap();
        assert_eq!(session.access_token, "first");

        let token = auth.refresh().await.unwrap();
        assert_eq!(token, "second");
        assert_eq!(auth.access_token().as_deref(), Some("second"));
        // Refresh token and user survive a response that omits them.
        let data = auth.data().unwrap();
        assert_eq!(data.refresh_token.as_deref(), Some("r1"));
        assert_eq!(data.user.map(|u| u.name).as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_is_unauthorized() {
        let server = MockServer::start().await;
        let auth = auth_for(&server);
        auth.update(SessionData::new("only-access".to_string(), None, None));
        assert!(auth.refresh().await.unwrap_err().is_unauthorized());
    }

    #[tokio::test]
    async fn test_login_surfaces_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"message": "Invalid credentials"})),
            )
            .mount(&server)
            .await;

        let err = auth_for(&server).login("a@b.c", "bad").await.unwrap_err();
        assert_eq!(err.user_message(), "Invalid credentials");
    }
}
