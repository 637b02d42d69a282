//! Attribute storage, accessor hooks and dirty tracking.

use super::{Record, RecordError};
use crate::schema::ColumnType;
use crate::value::Value;
use once_cell::unsync::OnceCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// A column's raw value and its typed form, converted on first read.
#[derive(Debug, Clone)]
pub struct AttributeValue {
    raw: Value,
    typed: OnceCell<Value>,
}

impl AttributeValue {
    pub fn new(raw: Value) -> Self {
        Self {
            raw,
            typed: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Typed value, converting with `column_type` on first call.
    pub fn typed(&self, column_type: ColumnType) -> &Value {
        self.typed.get_or_init(|| column_type.to_typed(&self.raw))
    }

    /// True once the typed value has been computed and cached.
    pub fn is_converted(&self) -> bool {
        self.typed.get().is_some()
    }

    fn invalidate(&mut self) {
        self.typed = OnceCell::new();
    }
}

impl Record {
    /// Typed value of `name`, passed through its getter hook when one is registered
    ///
    /// Returns `None` for attributes that were never set. A getter is still
    /// consulted for an unset attribute (receiving `Value::Null`), which lets
    /// it compute virtual attributes; a `Null` result then counts as unset.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # fn demo(person: &mooring::Record) {
    /// use mooring::Value;
    /// if let Some(Value::Date(born)) = person.get_attribute("birth_date") {
    ///     println!("born {born}");
    /// }
    /// # }
    /// ```
    pub fn get_attribute(&self, name: &str) -> Option<Value> {
        let column_type = self.entity.schema().column_type(name);
        let typed = self
            .attributes
            .get(name)
            .map(|attr| attr.typed(column_type).clone());
        match self.entity.accessors().getter(name) {
            Some(getter) => {
                let was_set = typed.is_some();
                let value = getter(self, typed.unwrap_or_default());
                if !was_set && value.is_null() {
                    None
                } else {
                    Some(value)
                }
            }
            None => typed,
        }
    }

    /// Stored raw value of `name`, bypassing conversion and hooks.
    pub fn get_raw(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).map(AttributeValue::raw)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Assign `name`, through its setter hook when one is registered
    ///
    /// # Errors
    ///
    /// Returns `RecordError::PrimaryKeyImmutable` when changing a primary key
    /// that is already set, or whatever the setter hook returns.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self, RecordError> {
        let value = value.into();
        if let Some(attr) = self.attributes.get_mut(name) {
            attr.invalidate();
        }
        let entity = Rc::clone(&self.entity);
        match entity.accessors().setter(name) {
            Some(setter) => setter(self, value)?,
            None => self.set_raw(name, value)?,
        }
        Ok(self)
    }

    /// Store a raw value without consulting hooks
    ///
    /// # Errors
    ///
    /// Returns `RecordError::PrimaryKeyImmutable` when `name` is the primary
    /// key, it already holds a key, and `value` is a different key.
    pub fn set_raw(&mut self, name: &str, value: impl Into<Value>) -> Result<(), RecordError> {
        let value = value.into();
        if name == self.entity.primary_key() {
            let current = self.key();
            if current.is_some() && self.key_for(&value) != current {
                return Err(RecordError::PrimaryKeyImmutable {
                    table: self.table().to_string(),
                    column: name.to_string(),
                });
            }
        }
        self.attributes.insert(name.to_string(), AttributeValue::new(value));
        Ok(())
    }

    /// Assign every fillable entry of `data`; other keys are skipped.
    pub fn fill<I, K, V>(&mut self, data: I) -> Result<&mut Self, RecordError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in data {
            let name = name.as_ref();
            if self.fillable.allows(name) {
                self.set_attribute(name, value)?;
            } else {
                log::debug!("Skipping non-fillable attribute {name} on {}", self.table());
            }
        }
        Ok(self)
    }

    /// Attributes changed since the last sync, with their raw values.
    ///
    /// Values that differ only in numeric representation (`"5"` and `5`)
    /// are not dirty.
    pub fn get_dirty(&self) -> BTreeMap<String, Value> {
        self.attributes
            .iter()
            .filter(|(name, attr)| self.differs_from_original(name, attr.raw()))
            .map(|(name, attr)| (name.clone(), attr.raw().clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.attributes
            .iter()
            .any(|(name, attr)| self.differs_from_original(name, attr.raw()))
    }

    pub fn is_attribute_dirty(&self, name: &str) -> bool {
        self.attributes
            .get(name)
            .is_some_and(|attr| self.differs_from_original(name, attr.raw()))
    }

    fn differs_from_original(&self, name: &str, raw: &Value) -> bool {
        match self.original.get(name) {
            None => true,
            Some(original) => raw != original && !raw.numerically_equivalent(original),
        }
    }

    /// Make the current raw values the clean baseline.
    pub fn sync_original(&mut self) -> &mut Self {
        self.original = self.attributes();
        self
    }

    /// Raw value of `name` at the last sync.
    pub fn get_original(&self, name: &str) -> Option<&Value> {
        self.original.get(name)
    }
}
