//! The entity registry.
//!
//! Entities are declared with [`EntityBuilder`]s and resolved together by
//! [`RegistryBuilder::build`], which validates identifiers, derives every
//! many-to-many [`AssociationLink`] and pairs each relation with its reverse
//! on the related entity.

use super::entity::{Entity, EntityBuilder};
use crate::query::validate_identifier;
use crate::record::RecordError;
use crate::relation::{AssociationLink, ManyToMany, Relation};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

/// Registered entities keyed by table name.
#[derive(Debug, Default)]
pub struct Registry {
    entities: HashMap<String, Rc<Entity>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, table: &str) -> Option<&Rc<Entity>> {
        self.entities.get(table)
    }

    /// Entity for `table`
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Configuration` when no entity is registered.
    pub fn entity(&self, table: &str) -> Result<Rc<Entity>, RecordError> {
        self.entities
            .get(table)
            .cloned()
            .ok_or_else(|| RecordError::Configuration(format!("no entity registered for table {table:?}")))
    }

    pub fn contains(&self, table: &str) -> bool {
        self.entities.contains_key(table)
    }

    /// Registered table names, sorted.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self.entities.keys().map(String::as_str).collect();
        tables.sort_unstable();
        tables
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    entities: Vec<EntityBuilder>,
}

impl RegistryBuilder {
    pub fn entity(mut self, entity: EntityBuilder) -> Self {
        self.entities.push(entity);
        self
    }

    /// Resolve every declared entity and relation
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Configuration` for duplicate tables or relation
    /// names, relations to unregistered tables, and colliding foreign-key
    /// columns; `RecordError::Build` for invalid identifiers.
    pub fn build(self) -> Result<Registry, RecordError> {
        let mut seen = HashSet::new();
        for builder in &self.entities {
            let schema = &builder.schema;
            validate_identifier(schema.name())?;
            for column in schema.columns() {
                validate_identifier(&column.name)?;
            }
            if !seen.insert(schema.name().to_string()) {
                return Err(RecordError::Configuration(format!(
                    "table {:?} registered twice",
                    schema.name()
                )));
            }
        }

        let schemas: HashMap<&str, &super::TableSchema> = self
            .entities
            .iter()
            .map(|b| (b.schema.name(), &b.schema))
            .collect();

        // (owner table, relation name) -> link
        let mut links: Vec<(String, String, AssociationLink)> = Vec::new();
        for builder in &self.entities {
            let mut names = HashSet::new();
            for def in &builder.relations {
                if !names.insert(def.name()) {
                    return Err(RecordError::Configuration(format!(
                        "relation {:?} declared twice on {:?}",
                        def.name(),
                        builder.table()
                    )));
                }
                let related = schemas.get(def.related_table()).ok_or_else(|| {
                    RecordError::Configuration(format!(
                        "relation {:?} on {:?} targets unregistered table {:?}",
                        def.name(),
                        builder.table(),
                        def.related_table()
                    ))
                })?;
                let link = AssociationLink::derive(&builder.schema, related, def)?;
                links.push((builder.table().to_string(), def.name().to_string(), link));
            }
        }

        let mut entities = HashMap::new();
        for builder in self.entities {
            let table = builder.table().to_string();
            let mut relations: BTreeMap<String, Rc<dyn Relation>> = BTreeMap::new();
            for (owner, name, link) in links.iter().filter(|(owner, _, _)| *owner == table) {
                let reverse = links
                    .iter()
                    .find(|(other_owner, other_name, other)| {
                        !(other_owner == owner && other_name == name) && other.is_reverse_of(link)
                    })
                    .map(|(_, other_name, _)| other_name.clone());
                log::debug!(
                    "Relation {owner}.{name} through {} (reverse: {reverse:?})",
                    link.junction
                );
                relations.insert(
                    name.clone(),
                    Rc::new(ManyToMany::new(name.clone(), link.clone(), reverse)),
                );
            }
            let entity = Entity::new(builder.schema, builder.fillable, builder.accessors, relations);
            entities.insert(table, Rc::new(entity));
        }
        Ok(Registry { entities })
    }
}
