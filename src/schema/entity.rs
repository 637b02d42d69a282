//! Entities: a table schema plus record behaviour.
//!
//! An [`Entity`] is everything a [`Record`] needs to know about its table:
//! the [`TableSchema`], which attributes `fill` may assign, the accessor
//! hooks consulted by `get_attribute`/`set_attribute`, and the relations
//! declared on the table.
//!
//! Entities are declared with an [`EntityBuilder`] and resolved by
//! [`RegistryBuilder::build`](super::RegistryBuilder::build).
//!
//! # Example
//!
//! ```rust
//! use mooring::schema::{ColumnType, EntityBuilder, TableSchema};
//! use mooring::relation::ManyToManyDef;
//! use mooring::Value;
//!
//! let people = EntityBuilder::new(
//!     TableSchema::new("people", "id").column("name", ColumnType::Text),
//! )
//! .fillable(["name"])
//! .getter("name", |_record, value| match value {
//!     Value::Text(s) => Value::Text(s.trim().to_string()),
//!     other => other,
//! })
//! .many_to_many(ManyToManyDef::new("groups", "groups"));
//! ```

use super::TableSchema;
use crate::record::{Record, RecordError};
use crate::relation::{ManyToManyDef, Relation};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

/// Getter hook: receives the record and the converted value, returns what the caller sees.
pub type Getter = Box<dyn Fn(&Record, Value) -> Value>;

/// Setter hook: receives the record and the incoming value and stores it
/// (usually through [`Record::set_raw`]).
pub type Setter = Box<dyn Fn(&mut Record, Value) -> Result<(), RecordError>>;

/// Which attributes `Record::fill` may assign.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Fillable {
    /// Every attribute
    #[default]
    Unguarded,
    /// Only the listed attributes
    Only(BTreeSet<String>),
}

impl Fillable {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Fillable::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, name: &str) -> bool {
        match self {
            Fillable::Unguarded => true,
            Fillable::Only(names) => names.contains(name),
        }
    }
}

/// Per-attribute accessor registry.
///
/// Attributes without a hook read and write their stored value unchanged.
#[derive(Default)]
pub struct Accessors {
    getters: HashMap<String, Getter>,
    setters: HashMap<String, Setter>,
}

impl Accessors {
    pub fn getter(&self, name: &str) -> Option<&Getter> {
        self.getters.get(name)
    }

    pub fn setter(&self, name: &str) -> Option<&Setter> {
        self.setters.get(name)
    }

    pub fn has_getter(&self, name: &str) -> bool {
        self.getters.contains_key(name)
    }
}

impl fmt::Debug for Accessors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut getters: Vec<_> = self.getters.keys().collect();
        let mut setters: Vec<_> = self.setters.keys().collect();
        getters.sort();
        setters.sort();
        f.debug_struct("Accessors")
            .field("getters", &getters)
            .field("setters", &setters)
            .finish()
    }
}

/// A registered table with its record behaviour.
pub struct Entity {
    schema: TableSchema,
    fillable: Fillable,
    accessors: Accessors,
    relations: BTreeMap<String, Rc<dyn Relation>>,
}

impl Entity {
    pub(crate) fn new(
        schema: TableSchema,
        fillable: Fillable,
        accessors: Accessors,
        relations: BTreeMap<String, Rc<dyn Relation>>,
    ) -> Self {
        Self {
            schema,
            fillable,
            accessors,
            relations,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn table(&self) -> &str {
        self.schema.name()
    }

    pub fn primary_key(&self) -> &str {
        self.schema.primary_key()
    }

    pub fn fillable(&self) -> &Fillable {
        &self.fillable
    }

    pub fn accessors(&self) -> &Accessors {
        &self.accessors
    }

    /// Look up a relation declared on this entity
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Configuration` if no relation is called `name`.
    pub fn relation(&self, name: &str) -> Result<Rc<dyn Relation>, RecordError> {
        self.relations.get(name).cloned().ok_or_else(|| {
            RecordError::Configuration(format!(
                "no relation {name:?} declared on {:?}",
                self.schema.name()
            ))
        })
    }

    pub fn relations(&self) -> impl Iterator<Item = (&str, &Rc<dyn Relation>)> {
        self.relations.iter().map(|(name, rel)| (name.as_str(), rel))
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("table", &self.schema.name())
            .field("fillable", &self.fillable)
            .field("accessors", &self.accessors)
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Declares an entity for the registry.
pub struct EntityBuilder {
    pub(crate) schema: TableSchema,
    pub(crate) fillable: Fillable,
    pub(crate) accessors: Accessors,
    pub(crate) relations: Vec<ManyToManyDef>,
}

impl EntityBuilder {
    /// Unguarded entity with no hooks or relations.
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            fillable: Fillable::Unguarded,
            accessors: Accessors::default(),
            relations: Vec::new(),
        }
    }

    /// Restrict `fill` to the listed attributes.
    pub fn fillable<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fillable = Fillable::only(names);
        self
    }

    /// Let `fill` assign every attribute.
    pub fn unguarded(mut self) -> Self {
        self.fillable = Fillable::Unguarded;
        self
    }

    /// Register a getter hook for `name`.
    pub fn getter<F>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&Record, Value) -> Value + 'static,
    {
        self.accessors.getters.insert(name.into(), Box::new(hook));
        self
    }

    /// Register a setter hook for `name`.
    pub fn setter<F>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&mut Record, Value) -> Result<(), RecordError> + 'static,
    {
        self.accessors.setters.insert(name.into(), Box::new(hook));
        self
    }

    /// Declare a many-to-many relation.
    pub fn many_to_many(mut self, def: ManyToManyDef) -> Self {
        self.relations.push(def);
        self
    }

    pub fn table(&self) -> &str {
        self.schema.name()
    }
}
