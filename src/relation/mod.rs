//! Relation module for record associations.
//!
//! Relations are declared on an entity with
//! [`EntityBuilder::many_to_many`](crate::schema::EntityBuilder::many_to_many)
//! and resolved by the registry into [`ManyToMany`] values behind the
//! [`Relation`] trait.
//!
//! # Architecture
//!
//! - **Link**: junction-table and foreign-key derivation (`AssociationLink`)
//! - **ManyToMany**: fetching, batched eager loading, diff persistence and
//!   association cleanup
//! - **Lazy**: the loaded collection kept on an owner record, patched by
//!   event deltas (`LoadedRelation`)
//! - **Eager**: attaching batched results to a page of owners

// Junction resolution
pub mod link;
#[doc(inline)]
pub use link::AssociationLink;

// Many-to-many engine
pub mod many_to_many;
#[doc(inline)]
pub use many_to_many::{ManyToMany, ManyToManyDef};

// Loaded collections on owner records
pub(crate) mod lazy;
pub(crate) use lazy::LoadedRelation;

// Batched loading for query results
pub(crate) mod eager;

use crate::collection::ResultCollection;
use crate::context::Context;
use crate::events::{Delta, RelationChanges, SubscriptionId};
use crate::query::Condition;
use crate::record::{Record, RecordError};
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::rc::Rc;

/// Capability shared by relation kinds.
///
/// Only many-to-many is implemented; the trait is the seam where sibling
/// kinds would plug in.
pub trait Relation {
    /// Relation name on the owning entity.
    fn name(&self) -> &str;

    fn link(&self) -> &AssociationLink;

    /// Name of the matching relation on the related entity, if declared.
    fn reverse_name(&self) -> Option<&str>;

    fn owner_table(&self) -> &str {
        &self.link().owner_table
    }

    fn related_table(&self) -> &str {
        &self.link().related_table
    }

    /// Related records of `owner` as a change-tracking collection
    ///
    /// An owner without a primary key has no related rows; no query is sent.
    fn fetch_results(&self, ctx: &Rc<Context>, owner: &Record) -> Result<ResultCollection, RecordError>;

    /// Related records of every owner in one query, keyed by owner key
    ///
    /// Every owner with a primary key gets an entry, possibly empty.
    fn fetch_results_for_eager_load(
        &self,
        ctx: &Rc<Context>,
        owners: &[&Record],
        constraint: Option<&Condition>,
    ) -> Result<HashMap<String, ResultCollection>, RecordError>;

    /// Write the collection's changes for `owner` and start a new baseline
    ///
    /// Returns the changes that were written, keyed as the members are
    /// after saving.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::PrimaryKeyRequired` if `owner` was never saved,
    /// or the first failing write.
    fn persist(
        &self,
        ctx: &Rc<Context>,
        owner: &Record,
        collection: &mut ResultCollection,
    ) -> Result<RelationChanges, RecordError>;

    /// Remove every association row referencing `owner`; returns rows deleted.
    fn on_delete(&self, ctx: &Rc<Context>, owner: &Record) -> Result<u64, RecordError>;

    /// Whether an association row links `owner` and `candidate`.
    fn model_matches_relation(
        &self,
        ctx: &Rc<Context>,
        owner: &Record,
        candidate: &Record,
    ) -> Result<bool, RecordError>;

    /// Subscribe the owner's loaded collection to related-record events.
    fn subscribe(&self, ctx: &Rc<Context>, owner_key: &str, outbox: Sender<Delta>) -> Vec<SubscriptionId>;
}
