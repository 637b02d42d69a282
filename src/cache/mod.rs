//! Record cache stores.
//!
//! The cache is a hint, never a source of truth: records write to it only
//! after the database write succeeded, and a failing cache degrades reads to
//! the database instead of blocking them.
//!
//! Entries are keyed by primary key (see [`Value::to_key`]) and grouped by
//! table slug. The stored payload is the record's raw attribute map.
//!
//! Three stores ship with the crate:
//!
//! - [`MemoryCache`] keeps entries in process memory
//! - [`NullCache`] never stores anything (every read is a miss)
//! - [`RedisCache`] stores JSON payloads in Redis

pub mod redis;

use crate::config::CacheConfig;
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub use self::redis::RedisCache;

/// Raw attributes of one record as stored in a cache entry.
pub type CachedAttributes = BTreeMap<String, Value>;

/// Cache store error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The backing store could not be reached
    Unavailable(String),
    /// Stored payload could not be encoded or decoded
    Serialization(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Unavailable(msg) => write!(f, "Cache unavailable: {msg}"),
            CacheError::Serialization(msg) => write!(f, "Cache payload error: {msg}"),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Trait for record cache backends
///
/// `get` distinguishes a confirmed miss (`Ok(None)`) from a failed lookup
/// (`Err`); the read path only repopulates the cache after a confirmed miss.
pub trait CacheStore {
    /// Look up the cached attributes for `key` within `group`
    ///
    /// # Errors
    ///
    /// Returns `CacheError` when the store cannot answer.
    fn get(&self, key: &str, group: &str) -> Result<Option<CachedAttributes>, CacheError>;

    /// Store `attributes` under `key` within `group`, replacing any previous entry
    ///
    /// # Errors
    ///
    /// Returns `CacheError` when the store rejects the write.
    fn set(&self, key: &str, group: &str, attributes: &CachedAttributes) -> Result<(), CacheError>;

    /// Remove the entry for `key` within `group`; removing a missing entry succeeds
    ///
    /// # Errors
    ///
    /// Returns `CacheError` when the store cannot be reached.
    fn delete(&self, key: &str, group: &str) -> Result<(), CacheError>;
}

/// Process-local cache store.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RefCell<HashMap<(String, String), CachedAttributes>>,
    writes: Cell<usize>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn contains(&self, key: &str, group: &str) -> bool {
        self.entries
            .borrow()
            .contains_key(&(group.to_string(), key.to_string()))
    }

    /// Number of successful `set` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str, group: &str) -> Result<Option<CachedAttributes>, CacheError> {
        Ok(self
            .entries
            .borrow()
            .get(&(group.to_string(), key.to_string()))
            .cloned())
    }

    fn set(&self, key: &str, group: &str, attributes: &CachedAttributes) -> Result<(), CacheError> {
        self.entries
            .borrow_mut()
            .insert((group.to_string(), key.to_string()), attributes.clone());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn delete(&self, key: &str, group: &str) -> Result<(), CacheError> {
        self.entries
            .borrow_mut()
            .remove(&(group.to_string(), key.to_string()));
        Ok(())
    }
}

/// Cache store that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

impl CacheStore for NullCache {
    fn get(&self, _key: &str, _group: &str) -> Result<Option<CachedAttributes>, CacheError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _group: &str, _attributes: &CachedAttributes) -> Result<(), CacheError> {
        Ok(())
    }

    fn delete(&self, _key: &str, _group: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Build the cache store described by `config`
///
/// Disabled caching yields a [`NullCache`], a configured `redis_url` a
/// [`RedisCache`], anything else a [`MemoryCache`].
///
/// # Errors
///
/// Returns `CacheError::Unavailable` if the Redis URL cannot be parsed.
pub fn from_config(config: &CacheConfig) -> Result<Box<dyn CacheStore>, CacheError> {
    if !config.enabled {
        log::info!("Record cache disabled");
        return Ok(Box::new(NullCache));
    }
    match &config.redis_url {
        Some(url) => {
            log::info!("Using Redis record cache with prefix {:?}", config.key_prefix);
            Ok(Box::new(RedisCache::open(url, &config.key_prefix)?))
        }
        None => Ok(Box::new(MemoryCache::new())),
    }
}
