//! API client for the LMS backend.
//!
//! This module provides the `ApiClient` struct: the authenticated fetch
//! wrapper every query and mutation goes through, plus typed helpers for the
//! endpoints the dashboards use.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::{build_api_url, ApiError};
use crate::auth::AuthProvider;
use crate::models::{Course, CourseFilter, ListPage, Product, ProductFilter, Role, User, UserFilter};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const COURSES_ENDPOINT: &str = "/api/courses";
pub const USERS_ENDPOINT: &str = "/api/admin/users";
pub const PRODUCTS_ENDPOINT: &str = "/api/products";

/// API client for the LMS backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    auth: Arc<dyn AuthProvider>,
    unauthorized: Option<Arc<Notify>>,
}

impl ApiClient {
    /// Create a new API client with the default request timeout
    pub fn new(base_url: impl Into<String>, auth: Arc<dyn AuthProvider>) -> Result<Self, ApiError> {
        Self::with_timeout(
            base_url,
            auth,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        auth: Arc<dyn AuthProvider>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: Arc::from(base_url),
            auth,
            unauthorized: None,
        })
    }

    /// Signal `notify` whenever a request comes back 401.
    pub fn with_unauthorized_notifier(mut self, notify: Arc<Notify>) -> Self {
        self.unauthorized = Some(notify);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, endpoint: &str) -> String {
        build_api_url(&self.base_url, endpoint)
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    /// Whether requests will carry a bearer token. Queries gate on this.
    pub fn has_token(&self) -> bool {
        self.auth.access_token().is_some()
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        if let Some(token) = self.auth.access_token() {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ApiError::InvalidResponse(format!("invalid bearer token: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn request(&self, method: Method, endpoint: &str) -> Result<(String, RequestBuilder), ApiError> {
        let url = self.url(endpoint);
        let builder = self
            .client
            .request(method, &url)
            .headers(self.auth_headers()?);
        Ok((url, builder))
    }

    /// Send a request and decode the JSON body, mapping non-2xx responses to
    /// `ApiError` with the server's `message`.
    async fn send<T: DeserializeOwned>(&self, url: &str, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let err = ApiError::from_status(status, &body);
            if err.is_unauthorized() {
                if let Some(notify) = &self.unauthorized {
                    notify.notify_one();
                }
            }
            warn!(url = url, status = status.as_u16(), error = %err, "Request failed");
            return Err(err);
        }

        debug!(url = url, status = status.as_u16(), bytes = body.len(), "Request succeeded");
        // 204 and other empty bodies decode as JSON null, which fits `()` and `Option<T>`.
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| ApiError::Decode(format!("{} ({})", e, url)))
    }

    /// The generic authenticated fetch: any method, optional JSON body.
    pub async fn authenticated_fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let (url, mut builder) = self.request(method, endpoint)?;
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.send(&url, builder).await
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let (url, builder) = self.request(Method::GET, endpoint)?;
        self.send(&url, builder).await
    }

    pub async fn get_with_query<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        query: &Q,
    ) -> Result<T, ApiError> {
        let (url, builder) = self.request(Method::GET, endpoint)?;
        self.send(&url, builder.query(query)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let (url, builder) = self.request(Method::POST, endpoint)?;
        self.send(&url, builder.json(body)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let (url, builder) = self.request(Method::PUT, endpoint)?;
        self.send(&url, builder.json(body)).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let (url, builder) = self.request(Method::PATCH, endpoint)?;
        self.send(&url, builder.json(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let (url, builder) = self.request(Method::DELETE, endpoint)?;
        self.send(&url, builder).await
    }

    // ===== Courses =====

    pub async fn fetch_courses(&self, filter: &CourseFilter) -> Result<ListPage<Course>, ApiError> {
        let value: Value = self.get_with_query(COURSES_ENDPOINT, filter).await?;
        ListPage::from_envelope(value, "courses")
    }

    pub async fn fetch_course(&self, id: &str) -> Result<Course, ApiError> {
        let value: Value = self.get(&format!("{}/{}", COURSES_ENDPOINT, id)).await?;
        unwrap_item(value, "course")
    }

    pub async fn approve_course(&self, id: &str) -> Result<Course, ApiError> {
        let value: Value = self
            .patch(
                &format!("{}/{}/approve", COURSES_ENDPOINT, id),
                &serde_json::json!({}),
            )
            .await?;
        unwrap_item(value, "course")
    }

    pub async fn reject_course(&self, id: &str, reason: &str) -> Result<Course, ApiError> {
        let value: Value = self
            .patch(
                &format!("{}/{}/reject", COURSES_ENDPOINT, id),
                &serde_json::json!({ "reason": reason }),
            )
            .await?;
        unwrap_item(value, "course")
    }

    // ===== Users =====

    pub async fn fetch_users(&self, filter: &UserFilter) -> Result<ListPage<User>, ApiError> {
        let value: Value = self.get_with_query(USERS_ENDPOINT, filter).await?;
        ListPage::from_envelope(value, "users")
    }

    pub async fn update_user_role(&self, id: &str, role: Role) -> Result<User, ApiError> {
        let value: Value = self
            .patch(
                &format!("{}/{}/role", USERS_ENDPOINT, id),
                &serde_json::json!({ "role": role }),
            )
            .await?;
        unwrap_item(value, "user")
    }

    pub async fn set_user_active(&self, id: &str, active: bool) -> Result<User, ApiError> {
        let value: Value = self
            .patch(
                &format!("{}/{}/status", USERS_ENDPOINT, id),
                &serde_json::json!({ "isActive": active }),
            )
            .await?;
        unwrap_item(value, "user")
    }

    // ===== Store =====

    pub async fn fetch_products(&self, filter: &ProductFilter) -> Result<ListPage<Product>, ApiError> {
        let value: Value = self.get_with_query(PRODUCTS_ENDPOINT, filter).await?;
        ListPage::from_envelope(value, "products")
    }

    pub async fn delete_product(&self, id: &str) -> Result<(), ApiError> {
        let _: Value = self.delete(&format!("{}/{}", PRODUCTS_ENDPOINT, id)).await?;
        Ok(())
    }
}

/// Single-item responses come either bare or wrapped (`{"course": {...}}`).
fn unwrap_item<T: DeserializeOwned>(value: Value, field: &str) -> Result<T, ApiError> {
    let value = match value {
        Value::Object(mut map) if map.contains_key(field) => map.remove(field).unwrap_or(Value::Null),
        other => other,
    };
    Ok(serde_json::from_value(value)?)
}
