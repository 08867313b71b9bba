//! Persisted UI preferences.
//!
//! A flat key/value string store for things like remembered filters and
//! column choices. It is not part of the query cache and losing it is
//! harmless.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

const PREFS_FILE: &str = "preferences.json";

#[derive(Debug, Clone, Default)]
pub struct Preferences {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

impl Preferences {
    /// An in-memory store that is never written.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load preferences from `dir`. A corrupt file is logged and replaced
    /// with an empty store.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(PREFS_FILE);
        let values = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(values) => values,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding unreadable preferences");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: Some(path),
            values,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Set a value and write the store.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.values.insert(key.into(), value.into());
        self.save()
    }

    pub fn remove(&mut self, key: &str) -> Result<bool> {
        let removed = self.values.remove(key).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    /// Read a JSON-encoded value, e.g. a saved filter.
    pub fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|raw| serde_json::from_str(raw).ok())
    }

    pub fn set_json<T: serde::Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, raw)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CourseFilter;

    #[test]
    fn test_values_persist() {
        let dir = tempfile::tempdir().unwrap();
        let mut prefs = Preferences::open(dir.path()).unwrap();
        prefs.set("courses.columns", "title,status").unwrap();
        prefs.set_json("courses.filter", &CourseFilter::page(3, 25)).unwrap();

        let reopened = Preferences::open(dir.path()).unwrap();
        assert_eq!(reopened.get("courses.columns"), Some("title,status"));
        let filter: CourseFilter = reopened.get_json("courses.filter").unwrap();
        assert_eq!(filter.page, 3);
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PREFS_FILE), "{not json").unwrap();
        let mut prefs = Preferences::open(dir.path()).unwrap();
        assert!(prefs.is_empty());

        prefs.set("theme", "dark").unwrap();
        assert!(prefs.remove("theme").unwrap());
        assert!(!prefs.remove("theme").unwrap());
    }

    #[test]
    fn test_in_memory_never_writes() {
        let mut prefs = Preferences::in_memory();
        prefs.set("k", "v").unwrap();
        assert_eq!(prefs.iter().collect::<Vec<_>>(), vec![("k", "v")]);
    }
}
