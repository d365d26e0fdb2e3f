//! Session module: the cross-step key/value store and its typed context.
//!
//! Test steps run as separate invocations, so every intermediate value the
//! handshake needs (bearer token, server public key, last cryptogram, ...)
//! goes through a [`SessionStore`]. Values are stored as JSON. A missing key
//! reads as `None`, which is distinct from a stored JSON `null`.
//!
//! Callers normally go through [`Session`], which only accepts the
//! [`SessionKey`] names the harness actually uses.

mod file;
mod memory;
#[cfg(feature = "redis-store")]
mod redis_store;

use std::fmt;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{HarnessError, StoreError};

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "redis-store")]
pub use redis_store::RedisStore;

/// Raw key/value contract implemented by every backend.
///
/// Each call acquires and releases its backing handle (file or connection)
/// for the duration of that one call.
pub trait SessionStore {
    /// Persist `value` under `key`, overwriting any previous value.
    fn set_value(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Persist a batch. Either every entry becomes visible or the call fails
    /// before any of them does.
    fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError>;

    /// `Ok(None)` when the key was never set (or was deleted).
    fn get_value(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Remove keys. Missing keys are ignored.
    fn delete(&self, keys: &[&str]) -> Result<(), StoreError>;

    /// All keys currently present, sorted.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

impl<S: SessionStore + ?Sized> SessionStore for Box<S> {
    fn set_value(&self, key: &str, value: Value) -> Result<(), StoreError> {
        (**self).set_value(key, value)
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError> {
        (**self).set_many(entries)
    }

    fn get_value(&self, key: &str) -> Result<Option<Value>, StoreError> {
        (**self).get_value(key)
    }

    fn delete(&self, keys: &[&str]) -> Result<(), StoreError> {
        (**self).delete(keys)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        (**self).keys()
    }
}

impl<S: SessionStore + ?Sized> SessionStore for &S {
    fn set_value(&self, key: &str, value: Value) -> Result<(), StoreError> {
        (**self).set_value(key, value)
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError> {
        (**self).set_many(entries)
    }

    fn get_value(&self, key: &str) -> Result<Option<Value>, StoreError> {
        (**self).get_value(key)
    }

    fn delete(&self, keys: &[&str]) -> Result<(), StoreError> {
        (**self).delete(keys)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        (**self).keys()
    }
}

/// Typed `set`/`get` on top of the JSON contract.
pub trait SessionStoreExt: SessionStore {
    fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Value {
            key: key.to_string(),
            source,
        })?;
        self.set_value(key, value)
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get_value(key)? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StoreError::Value {
                    key: key.to_string(),
                    source,
                }),
        }
    }
}

impl<S: SessionStore + ?Sized> SessionStoreExt for S {}

/// Prefixes every key with `<namespace>:` so independent flows can share one
/// backend without clobbering each other.
pub struct Namespaced<S> {
    inner: S,
    prefix: String,
}

impl<S: SessionStore> Namespaced<S> {
    pub fn new(inner: S, namespace: &str) -> Self {
        Self {
            inner,
            prefix: format!("{namespace}:"),
        }
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl<S: SessionStore> SessionStore for Namespaced<S> {
    fn set_value(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.inner.set_value(&self.scoped(key), value)
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError> {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (self.scoped(&key), value))
            .collect();
        self.inner.set_many(entries)
    }

    fn get_value(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get_value(&self.scoped(key))
    }

    fn delete(&self, keys: &[&str]) -> Result<(), StoreError> {
        let scoped: Vec<String> = keys.iter().map(|k| self.scoped(k)).collect();
        let refs: Vec<&str> = scoped.iter().map(String::as_str).collect();
        self.inner.delete(&refs)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .inner
            .keys()?
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }
}

/// Open the store described by `location`.
///
/// `None` selects the default JSON file under the user cache directory. A
/// `redis://` or `rediss://` URL selects Redis (requires the `redis-store`
/// feature). Anything else is a file path.
pub fn open_store(
    location: Option<&str>,
    namespace: Option<&str>,
) -> Result<Box<dyn SessionStore>, StoreError> {
    let store: Box<dyn SessionStore> = match location {
        Some(url) if url.starts_with("redis://") || url.starts_with("rediss://") => {
            open_redis(url)?
        }
        Some(path) => Box::new(FileStore::new(PathBuf::from(path))),
        None => Box::new(FileStore::new(FileStore::default_path()?)),
    };
    Ok(match namespace {
        Some(ns) if !ns.is_empty() => Box::new(Namespaced::new(store, ns)),
        _ => store,
    })
}

#[cfg(feature = "redis-store")]
fn open_redis(url: &str) -> Result<Box<dyn SessionStore>, StoreError> {
    Ok(Box::new(RedisStore::open(url)?))
}

#[cfg(not(feature = "redis-store"))]
fn open_redis(url: &str) -> Result<Box<dyn SessionStore>, StoreError> {
    Err(StoreError::Unsupported(url.to_string()))
}

/// Every session entry the harness reads or writes.
///
/// The wire names are the keys used in the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Token,
    ServerPublicKey,
    Cryptogram,
    NextStep,
    ClientPublicKey,
    ClientPrivateKey,
    SessionGuid,
    CardAccounts,
    PayerCard,
    IosReleaseDevice,
    IosDebugDevice,
}

impl SessionKey {
    pub const ALL: [SessionKey; 11] = [
        SessionKey::Token,
        SessionKey::ServerPublicKey,
        SessionKey::Cryptogram,
        SessionKey::NextStep,
        SessionKey::ClientPublicKey,
        SessionKey::ClientPrivateKey,
        SessionKey::SessionGuid,
        SessionKey::CardAccounts,
        SessionKey::PayerCard,
        SessionKey::IosReleaseDevice,
        SessionKey::IosDebugDevice,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            SessionKey::Token => "token",
            SessionKey::ServerPublicKey => "serverPublicKey",
            SessionKey::Cryptogram => "cryptogram",
            SessionKey::NextStep => "nextStep",
            SessionKey::ClientPublicKey => "clientPublicKey",
            SessionKey::ClientPrivateKey => "clientPrivateKey",
            SessionKey::SessionGuid => "sessionGuid",
            SessionKey::CardAccounts => "cardAccounts",
            SessionKey::PayerCard => "payerCard",
            SessionKey::IosReleaseDevice => "iosReleaseDevice",
            SessionKey::IosDebugDevice => "iosDebugDevice",
        }
    }

    /// Look up a key by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Entries that hold secrets and must not be echoed to a terminal.
    pub const fn is_secret(self) -> bool {
        matches!(self, SessionKey::ClientPrivateKey | SessionKey::Token)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed view of a store, passed explicitly from step to step.
#[derive(Clone, Copy)]
pub struct Session<'s> {
    store: &'s dyn SessionStore,
}

impl<'s> Session<'s> {
    pub fn new(store: &'s dyn SessionStore) -> Self {
        Self { store }
    }

    pub fn put<T: Serialize + ?Sized>(&self, key: SessionKey, value: &T) -> Result<(), StoreError> {
        tracing::debug!(key = key.as_str(), "session set");
        self.store.set(key.as_str(), value)
    }

    pub fn put_many(&self, entries: Vec<(SessionKey, Value)>) -> Result<(), StoreError> {
        tracing::debug!(count = entries.len(), "session set_many");
        self.store.set_many(
            entries
                .into_iter()
                .map(|(key, value)| (key.as_str().to_string(), value))
                .collect(),
        )
    }

    /// `Ok(None)` when the entry is absent.
    pub fn get<T: DeserializeOwned>(&self, key: SessionKey) -> Result<Option<T>, StoreError> {
        self.store.get(key.as_str())
    }

    /// Like [`Session::get`], but an absent entry is [`HarnessError::KeyNotFound`].
    pub fn require<T: DeserializeOwned>(&self, key: SessionKey) -> Result<T, HarnessError> {
        self.get(key)?.ok_or(HarnessError::KeyNotFound(key))
    }

    pub fn clear(&self, keys: &[SessionKey]) -> Result<(), StoreError> {
        let names: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        tracing::debug!(keys = ?names, "session delete");
        self.store.delete(&names)
    }

    pub fn token(&self) -> Result<String, HarnessError> {
        self.require(SessionKey::Token)
    }

    pub fn cryptogram(&self) -> Result<String, HarnessError> {
        self.require(SessionKey::Cryptogram)
    }

    pub fn session_guid(&self) -> Result<String, HarnessError> {
        self.require(SessionKey::SessionGuid)
    }

    pub fn store(&self) -> &'s dyn SessionStore {
        self.store
    }
}
