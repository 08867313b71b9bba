use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::ApiError;

/// Pagination block returned alongside list payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

impl Pagination {
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.limit))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }
}

/// One page of a collection endpoint.
///
/// The backend wraps lists in a named field (`{"courses": [...]}`) with an
/// optional `pagination` object next to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub pagination: Option<Pagination>,
}

impl<T> Default for ListPage<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            pagination: None,
        }
    }
}

impl<T: DeserializeOwned> ListPage<T> {
    /// Decode a list envelope, reading the items from `field`.
    ///
    /// A bare JSON array is accepted as an unpaginated page.
    pub fn from_envelope(value: Value, field: &str) -> Result<Self, ApiError> {
        match value {
            Value::Array(_) => Ok(Self {
                items: serde_json::from_value(value)?,
                pagination: None,
            }),
            Value::Object(mut map) => {
                let items = match map.remove(field) {
                    Some(v) => serde_json::from_value(v)?,
                    None => {
                        return Err(ApiError::InvalidResponse(format!(
                            "missing `{}` field in list response",
                            field
                        )))
                    }
                };
                let pagination = match map.remove("pagination") {
                    Some(Value::Null) | None => None,
                    Some(v) => Some(serde_json::from_value(v)?),
                };
                Ok(Self { items, pagination })
            }
            other => Err(ApiError::InvalidResponse(format!(
                "expected list envelope, got {}",
                json_kind(&other)
            ))),
        }
    }
}

impl<T> ListPage<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.pagination
            .map(|p| p.total)
            .unwrap_or(self.items.len() as u64)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_named_envelope_with_pagination() {
        let value = json!({
            "courses": [1, 2, 3],
            "pagination": {"page": 1, "limit": 10, "total": 25}
        });
        let page: ListPage<u32> = ListPage::from_envelope(value, "courses").unwrap();
        assert_eq!(page.items, vec![1, 2, 3]);
        let pagination = page.pagination.unwrap();
        assert_eq!(pagination.total_pages(), 3);
        assert!(pagination.has_next());
        assert_eq!(page.total(), 25);
    }

    #[test]
    fn test_decode_bare_array() {
        let page: ListPage<String> = ListPage::from_envelope(json!(["a", "b"]), "users").unwrap();
        assert_eq!(page.len(), 2);
        assert!(page.pagination.is_none());
        assert_eq!(page.total(), 2);
    }

    #[test]
    fn test_missing_field_is_invalid_response() {
        let err = ListPage::<u32>::from_envelope(json!({"items": []}), "courses").unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_wrong_item_type_is_decode_error() {
        let err = ListPage::<u32>::from_envelope(json!({"courses": ["x"]}), "courses").unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn test_last_page_has_no_next() {
        let p = Pagination { page: 3, limit: 10, total: 25 };
        assert!(!p.has_next());
        let empty = Pagination { page: 1, limit: 0, total: 0 };
        assert_eq!(empty.total_pages(), 0);
    }
}
