use redis::Commands;
use serde_json::Value;

use super::SessionStore;
use crate::error::StoreError;

/// Session store backed by a Redis server, one string key per entry.
///
/// A connection is opened per operation and dropped when it returns; steps
/// are spaced far apart by network calls, so nothing is pooled.
pub struct RedisStore {
    client: redis::Client,
}

fn backend(source: redis::RedisError) -> StoreError {
    StoreError::Backend {
        backend: "redis",
        source: Box::new(source),
    }
}

impl RedisStore {
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(backend)?;
        Ok(Self { client })
    }

    fn connection(&self) -> Result<redis::Connection, StoreError> {
        self.client.get_connection().map_err(backend)
    }
}

fn encode(key: &str, value: &Value) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Value {
        key: key.to_string(),
        source,
    })
}

impl SessionStore for RedisStore {
    fn set_value(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let encoded = encode(key, &value)?;
        self.connection()?
            .set::<_, _, ()>(key, encoded)
            .map_err(backend)
    }

    fn set_many(&self, batch: Vec<(String, Value)>) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in &batch {
            pipe.set(key, encode(key, value)?).ignore();
        }
        pipe.query::<()>(&mut self.connection()?).map_err(backend)
    }

    fn get_value(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let raw: Option<String> = self.connection()?.get(key).map_err(backend)?;
        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|source| StoreError::Value {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    fn delete(&self, keys: &[&str]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.connection()?.del::<_, ()>(keys).map_err(backend)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self.connection()?.keys("*").map_err(backend)?;
        keys.sort();
        Ok(keys)
    }
}
