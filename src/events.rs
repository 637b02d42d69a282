//! Record event bus.
//!
//! Records publish a [`RecordEvent`] after every successful save and delete.
//! Subscribers are keyed by table and [`EventKind`] and run synchronously,
//! in subscription order, on the publishing call's stack; an error returned
//! by a handler propagates to the `save()`/`delete()` caller.
//!
//! Handlers never touch other records directly. They read the immutable
//! event and may return a [`Delta`], which the bus sends through the
//! subscriber's outbox channel. Loaded relations own the receiving end and
//! apply queued deltas the next time they are accessed. A subscriber whose
//! receiver is gone is dropped on the next delivery attempt.

use crate::record::RecordError;
use crate::value::Value;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Saved,
    Deleted,
}

/// Keys added to and removed from one loaded relation since its baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationChanges {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl RelationChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Snapshot of a record at the moment it was saved or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEvent {
    pub table: String,
    pub kind: EventKind,
    /// Canonical primary-key string, when the record has one
    pub key: Option<String>,
    pub primary_key: Value,
    /// Raw attributes after the write
    pub attributes: BTreeMap<String, Value>,
    /// Changes written for each relation loaded on the record, keyed as
    /// the members were after saving
    pub relation_changes: BTreeMap<String, RelationChanges>,
}

/// Change a handler asks a subscriber to apply to its own loaded collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    /// Insert the record described by `attributes` under `key`
    Add {
        key: String,
        attributes: BTreeMap<String, Value>,
    },
    /// Drop the member stored under `key`
    Remove { key: String },
}

pub type Handler = Box<dyn Fn(&RecordEvent) -> Result<Option<Delta>, RecordError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    table: String,
    kind: EventKind,
    handler: Handler,
    outbox: Option<Sender<Delta>>,
}

/// Synchronous publish/subscribe bus for record events.
///
/// Subscribing or unsubscribing from inside a handler is allowed; the
/// change takes effect once the outermost publish returns.
#[derive(Default)]
pub struct EventBus {
    subscribers: RefCell<Vec<Subscriber>>,
    pending: RefCell<Vec<Subscriber>>,
    cancelled: RefCell<Vec<SubscriptionId>>,
    next_id: Cell<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind` events on `table`
    ///
    /// Deltas returned by the handler are sent to `outbox`; without an
    /// outbox they are discarded.
    pub fn subscribe(
        &self,
        table: &str,
        kind: EventKind,
        outbox: Option<Sender<Delta>>,
        handler: Handler,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let subscriber = Subscriber {
            id,
            table: table.to_string(),
            kind,
            handler,
            outbox,
        };
        match self.subscribers.try_borrow_mut() {
            Ok(mut subscribers) => subscribers.push(subscriber),
            Err(_) => self.pending.borrow_mut().push(subscriber),
        }
        id
    }

    /// Register a plain observer that returns no delta.
    pub fn listen<F>(&self, table: &str, kind: EventKind, observer: F) -> SubscriptionId
    where
        F: Fn(&RecordEvent) -> Result<(), RecordError> + 'static,
    {
        self.subscribe(
            table,
            kind,
            None,
            Box::new(move |event| observer(event).map(|()| None)),
        )
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        match self.subscribers.try_borrow_mut() {
            Ok(mut subscribers) => {
                subscribers.retain(|s| s.id != id);
                self.pending.borrow_mut().retain(|s| s.id != id);
            }
            Err(_) => self.cancelled.borrow_mut().push(id),
        }
    }

    /// Number of live subscriptions for `table`.
    pub fn subscriber_count(&self, table: &str) -> usize {
        let cancelled = self.cancelled.borrow();
        let live = |s: &&Subscriber| s.table == table && !cancelled.contains(&s.id);
        self.subscribers.borrow().iter().filter(live).count()
            + self.pending.borrow().iter().filter(live).count()
    }

    /// Deliver `event` to every matching subscriber
    ///
    /// Returns how many handlers ran.
    ///
    /// # Errors
    ///
    /// Returns the first handler error; later handlers do not run.
    pub fn publish(&self, event: &RecordEvent) -> Result<usize, RecordError> {
        log::debug!(
            "Publishing {:?} for {} {}",
            event.kind,
            event.table,
            event.key.as_deref().unwrap_or("<new>")
        );
        let mut delivered = 0;
        let mut disconnected = Vec::new();
        let result = self.dispatch(event, &mut delivered, &mut disconnected);
        self.settle(disconnected);
        result.map(|()| delivered)
    }

    fn dispatch(
        &self,
        event: &RecordEvent,
        delivered: &mut usize,
        disconnected: &mut Vec<SubscriptionId>,
    ) -> Result<(), RecordError> {
        let subscribers = self.subscribers.borrow();
        for subscriber in subscribers
            .iter()
            .filter(|s| s.table == event.table && s.kind == event.kind)
        {
            if self.cancelled.borrow().contains(&subscriber.id) {
                continue;
            }
            let delta = (subscriber.handler)(event)?;
            *delivered += 1;
            if let (Some(delta), Some(outbox)) = (delta, &subscriber.outbox) {
                if outbox.send(delta).is_err() {
                    disconnected.push(subscriber.id);
                }
            }
        }
        Ok(())
    }

    fn settle(&self, disconnected: Vec<SubscriptionId>) {
        self.cancelled.borrow_mut().extend(disconnected);
        let Ok(mut subscribers) = self.subscribers.try_borrow_mut() else {
            return;
        };
        subscribers.append(&mut self.pending.borrow_mut());
        let mut cancelled = self.cancelled.borrow_mut();
        if !cancelled.is_empty() {
            subscribers.retain(|s| !cancelled.contains(&s.id));
            cancelled.clear();
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.borrow().len())
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn event(table: &str, kind: EventKind) -> RecordEvent {
        RecordEvent {
            table: table.to_string(),
            kind,
            key: Some("1".to_string()),
            primary_key: Value::Int(1),
            attributes: BTreeMap::new(),
            relation_changes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let seen = Rc::clone(&seen);
            bus.listen("people", EventKind::Saved, move |_| {
                seen.borrow_mut().push(n);
                Ok(())
            });
        }
        assert_eq!(bus.publish(&event("people", EventKind::Saved)).unwrap(), 3);
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_filters_by_table_and_kind() {
        let bus = EventBus::new();
        bus.listen("people", EventKind::Deleted, |_| Ok(()));
        bus.listen("groups", EventKind::Saved, |_| Ok(()));
        assert_eq!(bus.publish(&event("people", EventKind::Saved)).unwrap(), 0);
        assert_eq!(bus.publish(&event("people", EventKind::Deleted)).unwrap(), 1);
    }

    #[test]
    fn test_handler_error_propagates() {
        let bus = EventBus::new();
        bus.listen("people", EventKind::Saved, |_| Err(RecordError::Other("nope".into())));
        assert_eq!(
            bus.publish(&event("people", EventKind::Saved)),
            Err(RecordError::Other("nope".into()))
        );
    }

    #[test]
    fn test_deltas_reach_the_outbox() {
        let bus = EventBus::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        bus.subscribe(
            "people",
            EventKind::Deleted,
            Some(tx),
            Box::new(|e| Ok(e.key.clone().map(|key| Delta::Remove { key }))),
        );
        bus.publish(&event("people", EventKind::Deleted)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Delta::Remove { key: "1".into() });
    }

    #[test]
    fn test_disconnected_subscribers_are_pruned() {
        let bus = EventBus::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        bus.subscribe(
            "people",
            EventKind::Deleted,
            Some(tx),
            Box::new(|_| Ok(Some(Delta::Remove { key: "1".into() }))),
        );
        drop(rx);
        assert_eq!(bus.subscriber_count("people"), 1);
        bus.publish(&event("people", EventKind::Deleted)).unwrap();
        assert_eq!(bus.subscriber_count("people"), 0);
    }

    #[test]
    fn test_subscribe_from_inside_a_handler() {
        let bus = Rc::new(EventBus::new());
        let inner = Rc::clone(&bus);
        bus.listen("people", EventKind::Saved, move |_| {
            inner.listen("groups", EventKind::Saved, |_| Ok(()));
            Ok(())
        });
        bus.publish(&event("people", EventKind::Saved)).unwrap();
        assert_eq!(bus.subscriber_count("groups"), 1);
        assert_eq!(bus.publish(&event("groups", EventKind::Saved)).unwrap(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let id = bus.listen("people", EventKind::Saved, |_| Ok(()));
        bus.unsubscribe(id);
        assert_eq!(bus.publish(&event("people", EventKind::Saved)).unwrap(), 0);
    }
}
