//! Relation access on records.

use super::{Record, RecordError};
use crate::collection::ResultCollection;
use crate::relation::{LoadedRelation, Relation};
use std::rc::Rc;

impl Record {
    /// Related records for `name`, loaded on first access
    ///
    /// The collection tracks changes: records passed to
    /// [`ResultCollection::add`] and keys passed to
    /// [`ResultCollection::remove`] are written on the owner's next
    /// [`save`](Record::save). Saves and deletes of related records made
    /// elsewhere in the same context are reflected here as well.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Configuration` for an unknown relation and
    /// executor errors from the first load.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # fn demo(ctx: &std::rc::Rc<mooring::Context>) -> Result<(), mooring::RecordError> {
    /// let mut ada = ctx.find("people", 1)?.expect("seeded");
    /// let admins = ctx.find("groups", 7)?.expect("seeded");
    /// ada.related("groups")?.add(admins);
    /// ada.save()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn related(&mut self, name: &str) -> Result<&mut ResultCollection, RecordError> {
        if !self.relations.contains_key(name) {
            let relation = self.entity.relation(name)?;
            let collection = relation.fetch_results(&self.ctx, self)?;
            let loaded = LoadedRelation::new(&self.ctx, relation, self.key().as_deref(), collection);
            self.relations.insert(name.to_string(), loaded);
        }
        match self.relations.get_mut(name) {
            Some(loaded) => Ok(loaded.collection_mut()),
            None => Err(RecordError::Relation(format!("{name} failed to load"))),
        }
    }

    /// The relation's collection if it was already loaded; never queries.
    pub fn loaded(&mut self, name: &str) -> Option<&mut ResultCollection> {
        self.relations.get_mut(name).map(LoadedRelation::collection_mut)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub(crate) fn attach_loaded(&mut self, relation: Rc<dyn Relation>, collection: ResultCollection) {
        let name = relation.name().to_string();
        let loaded = LoadedRelation::new(&self.ctx, relation, self.key().as_deref(), collection);
        self.relations.insert(name, loaded);
    }

    /// Whether the database links `candidate` to this record through `name`.
    pub fn contains_related(&self, name: &str, candidate: &Record) -> Result<bool, RecordError> {
        let relation = self.entity.relation(name)?;
        relation.model_matches_relation(&self.ctx, self, candidate)
    }
}
