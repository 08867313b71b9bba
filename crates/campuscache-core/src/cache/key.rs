use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// Identity of a cached query: an endpoint followed by its parameters.
///
/// Equality and hashing are structural. Object segments are canonicalised
/// with sorted keys, so two filter objects with the same fields produce the
/// same key regardless of how they were built.
#[derive(Clone)]
pub struct CacheKey {
    segments: Vec<Value>,
    canonical: String,
}

impl CacheKey {
    /// A key with a single endpoint segment, e.g. `["/api/courses"]`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::from_segments(vec![Value::String(endpoint.into())])
    }

    pub fn from_segments(segments: Vec<Value>) -> Self {
        let segments: Vec<Value> = segments.into_iter().map(canonicalize).collect();
        let canonical = render(&segments);
        Self {
            segments,
            canonical,
        }
    }

    /// Append a parameter segment (filter object, id, page number).
    pub fn with(self, segment: impl Serialize) -> Self {
        let value = match serde_json::to_value(segment) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = %self, error = %e, "Failed to serialize cache key segment");
                Value::Null
            }
        };
        self.with_value(value)
    }

    pub fn with_value(self, segment: Value) -> Self {
        let mut segments = self.segments;
        segments.push(segment);
        Self::from_segments(segments)
    }

    pub fn segments(&self) -> &[Value] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The leading endpoint segment, if it is a string.
    pub fn endpoint(&self) -> Option<&str> {
        self.segments.first().and_then(Value::as_str)
    }

    /// True if `prefix`'s segments are a leading run of this key's segments.
    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        prefix.segments.len() <= self.segments.len()
            && prefix
                .segments
                .iter()
                .zip(&self.segments)
                .all(|(a, b)| a == b)
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.canonical)
    }
}

impl From<&str> for CacheKey {
    fn from(endpoint: &str) -> Self {
        Self::new(endpoint)
    }
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

fn render(segments: &[Value]) -> String {
    let parts: Vec<String> = segments.iter().map(Value::to_string).collect();
    format!("[{}]", parts.join(","))
}

/// Selects cache entries for invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    /// Only the entry with exactly this key.
    Exact(CacheKey),
    /// Every entry whose key begins with these segments.
    Prefix(CacheKey),
    /// Every entry.
    All,
}

impl KeyFilter {
    pub fn exact(key: impl Into<CacheKey>) -> Self {
        KeyFilter::Exact(key.into())
    }

    pub fn prefix(key: impl Into<CacheKey>) -> Self {
        KeyFilter::Prefix(key.into())
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            KeyFilter::Exact(k) => k == key,
            KeyFilter::Prefix(p) => key.starts_with(p),
            KeyFilter::All => true,
        }
    }
}

/// Prefix matching, mirroring how list invalidations are usually declared.
impl From<CacheKey> for KeyFilter {
    fn from(key: CacheKey) -> Self {
        KeyFilter::Prefix(key)
    }
}

impl From<&str> for KeyFilter {
    fn from(endpoint: &str) -> Self {
        KeyFilter::Prefix(CacheKey::new(endpoint))
    }
}

/// A set of filters marking cache entries stale. Has no identity beyond the
/// moment it is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationRequest {
    filters: Vec<KeyFilter>,
}

impl InvalidationRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            filters: vec![KeyFilter::All],
        }
    }

    pub fn of(filter: impl Into<KeyFilter>) -> Self {
        Self::new().and(filter)
    }

    pub fn and(mut self, filter: impl Into<KeyFilter>) -> Self {
        let filter = filter.into();
        if !self.filters.contains(&filter) {
            self.filters.push(filter);
        }
        self
    }

    pub fn filters(&self) -> &[KeyFilter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        self.filters.iter().any(|f| f.matches(key))
    }
}

impl<F: Into<KeyFilter>> FromIterator<F> for InvalidationRequest {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        iter.into_iter()
            .fold(InvalidationRequest::new(), |req, f| req.and(f))
    }
}
