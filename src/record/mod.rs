//! Records: attribute-tracked rows of a registered table.
//!
//! A [`Record`] stores each column's raw value alongside a lazily computed
//! typed value, remembers the raw values last synced with the database, and
//! drives the insert/update/delete lifecycle:
//!
//! ```text
//! New --fill--> New(dirty) --save--> Persisted(clean) --set--> Persisted(dirty)
//!                                          ^                          |
//!                                          +----------save------------+
//! any --delete--> Deleted
//! ```
//!
//! Relations are materialized on first access through [`Record::related`]
//! and kept on the record until it is dropped.

mod attributes;
pub mod error;
mod identity;
mod persist;
mod relations;

pub use attributes::AttributeValue;
pub use error::RecordError;
pub use identity::RecordIdentity;

use crate::cache::CachedAttributes;
use crate::context::Context;
use crate::executor::Row;
use crate::relation::LoadedRelation;
use crate::schema::{Entity, Fillable};
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub struct Record {
    ctx: Rc<Context>,
    entity: Rc<Entity>,
    attributes: IndexMap<String, AttributeValue>,
    /// Raw values as last read from or written to the database
    original: BTreeMap<String, Value>,
    exists: bool,
    fillable: Fillable,
    relations: BTreeMap<String, LoadedRelation>,
    last_error: Option<RecordError>,
}

impl Record {
    /// New, unsaved record for `table` with the schema's column defaults applied
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Configuration` when `table` is not registered.
    pub fn new(ctx: &Rc<Context>, table: &str) -> Result<Self, RecordError> {
        let entity = ctx.entity(table)?;
        let mut record = Self::blank(ctx, &entity);
        for column in entity.schema().columns() {
            if let Some(default) = &column.default {
                record
                    .attributes
                    .insert(column.name.clone(), AttributeValue::new(default.clone()));
            }
        }
        Ok(record)
    }

    /// New record filled with `data` (fillable attributes only).
    pub fn with_data<I, K, V>(ctx: &Rc<Context>, table: &str, data: I) -> Result<Self, RecordError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = Self::new(ctx, table)?;
        record.fill(data)?;
        Ok(record)
    }

    /// Hydrate a fetched row; the record exists and is clean.
    pub fn from_row(ctx: &Rc<Context>, entity: &Rc<Entity>, row: Row) -> Self {
        let mut record = Self::blank(ctx, entity);
        for (column, value) in row.into_pairs() {
            record.attributes.insert(column, AttributeValue::new(value));
        }
        record.exists = true;
        record.sync_original();
        record
    }

    /// Hydrate from a cached or event-carried attribute snapshot.
    pub fn from_attributes(ctx: &Rc<Context>, entity: &Rc<Entity>, attributes: CachedAttributes) -> Self {
        let mut record = Self::blank(ctx, entity);
        for (column, value) in attributes {
            record.attributes.insert(column, AttributeValue::new(value));
        }
        record.exists = true;
        record.sync_original();
        record
    }

    fn blank(ctx: &Rc<Context>, entity: &Rc<Entity>) -> Self {
        Self {
            ctx: Rc::clone(ctx),
            entity: Rc::clone(entity),
            attributes: IndexMap::new(),
            original: BTreeMap::new(),
            exists: false,
            fillable: entity.fillable().clone(),
            relations: BTreeMap::new(),
            last_error: None,
        }
    }

    pub fn context(&self) -> &Rc<Context> {
        &self.ctx
    }

    pub fn entity(&self) -> &Rc<Entity> {
        &self.entity
    }

    pub fn table(&self) -> &str {
        self.entity.table()
    }

    /// True once the record has been inserted or was read from the database.
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Raw primary-key value, `Value::Null` when unset.
    pub fn primary_key(&self) -> Value {
        self.attributes
            .get(self.entity.primary_key())
            .map(|a| a.raw().clone())
            .unwrap_or_default()
    }

    /// Canonical primary-key string used for cache entries and collection keys.
    pub fn key(&self) -> Option<String> {
        self.key_for(&self.primary_key())
    }

    /// Key `primary_key` would have as a primary key of this record's table.
    pub fn key_for(&self, primary_key: &Value) -> Option<String> {
        self.entity.schema().key_of(primary_key)
    }

    /// Attributes `fill` may assign on this record.
    pub fn fillable(&self) -> &Fillable {
        &self.fillable
    }

    pub fn set_fillable(&mut self, fillable: Fillable) -> &mut Self {
        self.fillable = fillable;
        self
    }

    /// Failure retained by the last `save`/`delete` that returned `Ok(false)`.
    pub fn last_error(&self) -> Option<&RecordError> {
        self.last_error.as_ref()
    }

    /// Raw attribute snapshot.
    pub fn attributes(&self) -> CachedAttributes {
        self.attributes
            .iter()
            .map(|(name, attr)| (name.clone(), attr.raw().clone()))
            .collect()
    }

    /// Attribute names in the order they were first set.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Every attribute through `get_attribute`, as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let object = self
            .attributes
            .keys()
            .map(|name| {
                let value = self.get_attribute(name).unwrap_or_default();
                (name.clone(), value.to_json())
            })
            .collect();
        serde_json::Value::Object(object)
    }
}

/// Clones carry attributes and state but not loaded relations.
impl Clone for Record {
    fn clone(&self) -> Self {
        Self {
            ctx: Rc::clone(&self.ctx),
            entity: Rc::clone(&self.entity),
            attributes: self.attributes.clone(),
            original: self.original.clone(),
            exists: self.exists,
            fillable: self.fillable.clone(),
            relations: BTreeMap::new(),
            last_error: self.last_error.clone(),
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.table())
            .field("exists", &self.exists)
            .field("attributes", &self.attributes())
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish()
    }
}
