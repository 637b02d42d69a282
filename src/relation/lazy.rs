//! Relations materialized on an owner record.
//!
//! A [`LoadedRelation`] is created the first time a record's relation is
//! read (or when a query eager-loads it). It owns the collection, the
//! receiving end of its delta channel and the event subscriptions feeding
//! that channel. Queued deltas are applied whenever the collection is
//! accessed; dropping the loaded relation cancels its subscriptions.

use super::Relation;
use crate::collection::ResultCollection;
use crate::context::Context;
use crate::events::{Delta, SubscriptionId};
use crate::record::Record;
use crossbeam_channel::{Receiver, Sender};
use std::fmt;
use std::rc::{Rc, Weak};

pub(crate) struct LoadedRelation {
    relation: Rc<dyn Relation>,
    collection: ResultCollection,
    inbox: Receiver<Delta>,
    /// Held until the owner has a key to subscribe with
    outbox: Option<Sender<Delta>>,
    subscriptions: Vec<SubscriptionId>,
    ctx: Weak<Context>,
}

impl LoadedRelation {
    pub fn new(
        ctx: &Rc<Context>,
        relation: Rc<dyn Relation>,
        owner_key: Option<&str>,
        collection: ResultCollection,
    ) -> Self {
        let (outbox, inbox) = crossbeam_channel::unbounded();
        let mut loaded = Self {
            relation,
            collection,
            inbox,
            outbox: Some(outbox),
            subscriptions: Vec::new(),
            ctx: Rc::downgrade(ctx),
        };
        if let Some(key) = owner_key {
            loaded.subscribe(ctx, key);
        }
        loaded
    }

    /// Start listening for related-record events; later calls are no-ops.
    pub fn subscribe(&mut self, ctx: &Rc<Context>, owner_key: &str) {
        if let Some(outbox) = self.outbox.take() {
            self.subscriptions = self.relation.subscribe(ctx, owner_key, outbox);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    pub fn relation(&self) -> &Rc<dyn Relation> {
        &self.relation
    }

    /// Collection as last patched, without draining the inbox.
    pub fn collection(&self) -> &ResultCollection {
        &self.collection
    }

    pub fn collection_mut(&mut self) -> &mut ResultCollection {
        self.apply_pending();
        &mut self.collection
    }

    /// Apply queued deltas; returns how many were applied.
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(delta) = self.inbox.try_recv() {
            match delta {
                Delta::Add { key, attributes } => {
                    let Some(ctx) = self.ctx.upgrade() else { continue };
                    match ctx.entity(self.relation.related_table()) {
                        Ok(entity) => {
                            let record = Record::from_attributes(&ctx, &entity, attributes);
                            self.collection.insert_synced(key, record);
                        }
                        Err(err) => {
                            log::warn!("Dropping delta for {}: {err}", self.relation.name());
                            continue;
                        }
                    }
                }
                Delta::Remove { key } => {
                    self.collection.forget(&key);
                }
            }
            applied += 1;
        }
        applied
    }
}

impl Drop for LoadedRelation {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.upgrade() {
            for id in self.subscriptions.drain(..) {
                ctx.events().unsubscribe(id);
            }
        }
    }
}

impl fmt::Debug for LoadedRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedRelation")
            .field("relation", &self.relation.name())
            .field("members", &self.collection.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}
