use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("storage is not available")]
    Unavailable,
    #[error("failed to write {key}: {reason}")]
    Write { key: String, reason: String },
    #[error("storage file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode storage contents: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Device-local string key/value storage.
///
/// Writes are best effort: callers log failures and keep the in-memory
/// value authoritative.
pub trait Storage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError>;
    fn remove(&mut self, key: &str) -> Result<(), PersistenceError>;
}

/// Storage that lives as long as the session, used in tests and by hosts
/// without persistent storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistenceError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Storage that rejects every write, like a browser in private mode with
/// a full quota.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyStorage;

impl Storage for ReadOnlyStorage {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&mut self, key: &str, _value: &str) -> Result<(), PersistenceError> {
        Err(PersistenceError::Write {
            key: key.to_string(),
            reason: String::from("storage is read-only"),
        })
    }

    fn remove(&mut self, _key: &str) -> Result<(), PersistenceError> {
        Err(PersistenceError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage() {
        let mut storage = MemoryStorage::new().with_entry("a", "1");
        assert_eq!(storage.get("a").as_deref(), Some("1"));
        storage.set("b", "2").unwrap();
        storage.remove("a").unwrap();
        assert_eq!(storage.keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_read_only_storage_fails_writes() {
        let mut storage = ReadOnlyStorage;
        assert!(matches!(
            storage.set("k", "v"),
            Err(PersistenceError::Write { .. })
        ));
        assert!(storage.get("k").is_none());
    }
}
