//! Serializable record identity.
//!
//! A [`RecordIdentity`] is what survives a record being written out and read
//! back: the table, the primary key, the fillable setting and the original
//! (last-synced) values. Attributes themselves are reloaded from the cache or
//! the database by [`Record::rehydrate`].

use super::{Record, RecordError};
use crate::context::Context;
use crate::schema::Fillable;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordIdentity {
    pub table: String,
    pub primary_key: Value,
    pub fillable: Fillable,
    #[serde(default)]
    pub original: BTreeMap<String, Value>,
}

impl Record {
    /// Identity of a persisted record
    ///
    /// # Errors
    ///
    /// Returns `RecordError::PrimaryKeyRequired` when the record has no
    /// primary key yet.
    pub fn identity(&self) -> Result<RecordIdentity, RecordError> {
        let primary_key = self.primary_key();
        if self.key_for(&primary_key).is_none() {
            return Err(RecordError::PrimaryKeyRequired {
                table: self.table().to_string(),
            });
        }
        Ok(RecordIdentity {
            table: self.table().to_string(),
            primary_key,
            fillable: self.fillable.clone(),
            original: self.original.clone(),
        })
    }

    /// Reload the record an identity names
    ///
    /// Attributes come from [`Record::find`]; the fillable setting and the
    /// original values are restored from the identity, so changes made
    /// since the identity was taken show up as dirty.
    /// Returns `None` when the row is gone.
    pub fn rehydrate(ctx: &Rc<Context>, identity: &RecordIdentity) -> Result<Option<Record>, RecordError> {
        let Some(mut record) = Record::find(ctx, &identity.table, identity.primary_key.clone())? else {
            log::debug!("{} {} no longer exists", identity.table, identity.primary_key);
            return Ok(None);
        };
        record.fillable = identity.fillable.clone();
        if !identity.original.is_empty() {
            record.original = identity.original.clone();
        }
        Ok(Some(record))
    }
}
