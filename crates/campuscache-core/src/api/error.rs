use serde::Deserialize;
use thiserror::Error;

/// Fallback text shown to the user when the server gave no usable message.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Any other 4xx, such as 409 Conflict.
    #[error("Request rejected ({status}): {message}")]
    Client { status: u16, message: String },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error bodies from the backend carry at least a `message` field.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err)
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Pull the `message` field out of a JSON error body, falling back to the
    /// (truncated) raw body.
    fn extract_message(body: &str) -> String {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { message: Some(m) }) if !m.trim().is_empty() => m,
            _ => Self::truncate_body(body.trim()),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::extract_message(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            400 | 422 => ApiError::Validation(message),
            402..=499 => ApiError::Client {
                status: status.as_u16(),
                message,
            },
            500..=599 => ApiError::Server {
                status: status.as_u16(),
                message,
            },
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Text suitable for a toast or inline alert.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::AccessDenied(m)
            | ApiError::NotFound(m)
            | ApiError::Validation(m)
            | ApiError::Client { message: m, .. }
            | ApiError::Server { message: m, .. }
                if !m.is_empty() =>
            {
                m.clone()
            }
            ApiError::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            ApiError::RateLimited => "Too many requests. Please wait a moment.".to_string(),
            ApiError::Timeout => "The server took too long to respond.".to_string(),
            ApiError::Network(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            _ => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_conflict_keeps_server_message() {
        let err = ApiError::from_status(
            StatusCode::CONFLICT,
            r#"{"message":"Course title already exists"}"#,
        );
        assert!(matches!(err, ApiError::Client { status: 409, .. }));
        assert_eq!(err.user_message(), "Course title already exists");

        let gone = ApiError::from_status(StatusCode::GONE, "");
        assert_eq!(gone.user_message(), GENERIC_ERROR_MESSAGE);

        let redirect = ApiError::from_status(StatusCode::FOUND, "moved");
        assert!(matches!(redirect, ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_from_status_uses_message_field() {
        let err = ApiError::from_status(
            StatusCode::NOT_FOUND,
            r#"{"message":"Course not found","code":"E_NOT_FOUND"}"#,
        );
        match err {
            ApiError::NotFound(m) => assert_eq!(m, "Course not found"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_from_status_falls_back_to_body() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream exploded");
        match err {
            ApiError::Server { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_from_status_401_is_unauthorized() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, r#"{"message":"jwt expired"}"#);
        assert!(err.is_unauthorized());
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(2000);
        let err = ApiError::from_status(StatusCode::FORBIDDEN, &body);
        let ApiError::AccessDenied(m) = err else {
            panic!("expected AccessDenied");
        };
        assert!(m.contains("truncated, 2000 total bytes"));
        assert!(m.len() < 600);
    }

    #[test]
    fn test_user_message_fallbacks() {
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, r#"{"message":"DB down"}"#);
        assert_eq!(err.user_message(), "DB down");

        let err = ApiError::Server {
            status: 500,
            message: String::new(),
        };
        assert_eq!(err.user_message(), GENERIC_ERROR_MESSAGE);
    }
}
