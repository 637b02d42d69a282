//! Redis-backed cache store.
//!
//! Entries live under `<prefix>:<group>:<key>` as JSON-encoded attribute
//! maps. The connection is opened on first use and dropped after any I/O
//! failure so the next call reconnects.

use super::{CacheError, CacheStore, CachedAttributes};
use ::redis::{Client, Commands, Connection, RedisError};
use std::cell::RefCell;

impl From<RedisError> for CacheError {
    fn from(err: RedisError) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

pub struct RedisCache {
    client: Client,
    prefix: String,
    connection: RefCell<Option<Connection>>,
}

impl RedisCache {
    /// Create a store for the Redis server at `url`
    ///
    /// No connection is made until the first cache operation.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Unavailable` if `url` is not a valid Redis URL.
    pub fn open(url: &str, prefix: &str) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
            connection: RefCell::new(None),
        })
    }

    /// Full Redis key for an entry.
    pub fn entry_key(&self, key: &str, group: &str) -> String {
        if self.prefix.is_empty() {
            format!("{group}:{key}")
        } else {
            format!("{}:{group}:{key}", self.prefix)
        }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, RedisError>,
    ) -> Result<T, CacheError> {
        let mut slot = self.connection.borrow_mut();
        if slot.is_none() {
            *slot = Some(self.client.get_connection()?);
        }
        let Some(connection) = slot.as_mut() else {
            return Err(CacheError::Unavailable("no connection".to_string()));
        };
        match op(connection) {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_io_error() || err.is_connection_dropped() {
                    *slot = None;
                }
                Err(err.into())
            }
        }
    }
}

impl CacheStore for RedisCache {
    fn get(&self, key: &str, group: &str) -> Result<Option<CachedAttributes>, CacheError> {
        let entry = self.entry_key(key, group);
        let payload: Option<String> = self.with_connection(|con| con.get(&entry))?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, group: &str, attributes: &CachedAttributes) -> Result<(), CacheError> {
        let entry = self.entry_key(key, group);
        let payload = serde_json::to_string(attributes)?;
        self.with_connection(|con| con.set::<_, _, ()>(&entry, payload))
    }

    fn delete(&self, key: &str, group: &str) -> Result<(), CacheError> {
        let entry = self.entry_key(key, group);
        self.with_connection(|con| con.del::<_, ()>(&entry))
    }
}
