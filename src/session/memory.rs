use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

use super::SessionStore;
use crate::error::StoreError;

/// In-process store. Values are kept serialized so reads behave like the
/// durable backends (every `get` hands out a fresh copy).
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // A panic while holding the lock cannot leave a half-applied write.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn encode(key: &str, value: &Value) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Value {
        key: key.to_string(),
        source,
    })
}

impl SessionStore for MemoryStore {
    fn set_value(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let encoded = encode(key, &value)?;
        self.entries().insert(key.to_string(), encoded);
        Ok(())
    }

    fn set_many(&self, batch: Vec<(String, Value)>) -> Result<(), StoreError> {
        let encoded = batch
            .iter()
            .map(|(key, value)| Ok((key.clone(), encode(key, value)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.entries().extend(encoded);
        Ok(())
    }

    fn get_value(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let Some(raw) = self.entries().get(key).cloned() else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Value {
                key: key.to_string(),
                source,
            })
    }

    fn delete(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut entries = self.entries();
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries().keys().cloned().collect())
    }
}
