//! Ordered, primary-key-indexed record collections.
//!
//! A [`ResultCollection`] keeps records in query order, keyed by their
//! canonical primary-key string ([`Value::to_key`]). Members without a
//! primary key (not yet inserted) are stored under a synthetic `#n` key
//! until [`rekey`](ResultCollection::rekey) runs after they are saved.
//!
//! Collections returned by relations *track* changes: [`add`] and
//! [`remove`] record the keys added and removed since the last baseline,
//! and the two sets never overlap. Plain query results do not track.
//!
//! [`add`]: ResultCollection::add
//! [`remove`]: ResultCollection::remove

use crate::events::RelationChanges;
use crate::record::Record;
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};

#[derive(Debug, Clone, Default)]
pub struct ResultCollection {
    items: IndexMap<String, Record>,
    added: IndexSet<String>,
    /// key -> primary key, for junction deletes
    removed: IndexMap<String, Value>,
    tracking: bool,
    next_anonymous: u64,
}

impl ResultCollection {
    /// Untracked collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Change-tracking collection.
    pub fn tracked() -> Self {
        Self {
            tracking: true,
            ..Self::default()
        }
    }

    /// Turn on change tracking, keeping the current members as baseline.
    pub fn track(mut self) -> Self {
        self.tracking = true;
        self
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    fn key_for(&mut self, record: &Record) -> String {
        record.key().unwrap_or_else(|| {
            self.next_anonymous += 1;
            format!("#{}", self.next_anonymous)
        })
    }

    /// Insert a member as part of the baseline (hydration); no change is recorded.
    pub fn push(&mut self, record: Record) -> String {
        let key = self.key_for(&record);
        self.items.insert(key.clone(), record);
        key
    }

    /// Add a member; returns the key it is stored under.
    ///
    /// Re-adding a removed member cancels the removal. Adding a member that is
    /// already present replaces it without recording a change.
    pub fn add(&mut self, record: Record) -> String {
        let key = self.key_for(&record);
        let present = self.items.contains_key(&key);
        self.items.insert(key.clone(), record);
        if self.tracking && !present && self.removed.shift_remove(&key).is_none() {
            self.added.insert(key.clone());
        }
        key
    }

    /// Remove the member stored under `key`.
    ///
    /// Removing a member that was added since the baseline just cancels the
    /// add; removing a member without a primary key records nothing.
    pub fn remove(&mut self, key: &str) -> Option<Record> {
        let record = self.items.shift_remove(key)?;
        if self.tracking && !self.added.shift_remove(key) {
            let pk = record.primary_key();
            if pk.is_null() {
                log::debug!("Removed member {key} has no primary key; nothing to detach");
            } else {
                self.removed.insert(key.to_string(), pk);
            }
        }
        Some(record)
    }

    /// Remove the member whose primary key is `primary_key`.
    pub fn remove_pk(&mut self, primary_key: impl Into<Value>) -> Option<Record> {
        let key = self.key_of(&primary_key.into())?;
        self.remove(&key)
    }

    /// Members share a table, so any of them can type a key value.
    fn key_of(&self, primary_key: &Value) -> Option<String> {
        self.items.values().next()?.key_for(primary_key)
    }

    /// Insert a member announced by another record's save.
    ///
    /// Not recorded as a change. A member removed locally and not yet
    /// persisted stays removed.
    pub(crate) fn insert_synced(&mut self, key: String, record: Record) {
        if self.removed.contains_key(&key) {
            return;
        }
        self.items.insert(key, record);
    }

    /// Drop a member that no longer belongs here (deleted, or detached by
    /// the other side); no change is recorded.
    pub(crate) fn forget(&mut self, key: &str) -> Option<Record> {
        self.added.shift_remove(key);
        self.removed.shift_remove(key);
        self.items.shift_remove(key)
    }

    /// Re-key members that received a primary key since they were added.
    pub(crate) fn rekey(&mut self) {
        if !self.items.keys().any(|k| k.starts_with('#')) {
            return;
        }
        let items = std::mem::take(&mut self.items);
        for (old, record) in items {
            let key = match record.key() {
                Some(key) if key != old => {
                    if self.added.shift_remove(&old) {
                        self.added.insert(key.clone());
                    }
                    key
                }
                _ => old,
            };
            self.items.insert(key, record);
        }
    }

    /// Keys added and removed since the baseline.
    pub fn changes(&self) -> RelationChanges {
        RelationChanges {
            added: self.added.iter().cloned().collect(),
            removed: self.removed.keys().cloned().collect(),
        }
    }

    /// Make the current members the new baseline.
    pub fn reset_changes(&mut self) {
        self.added.clear();
        self.removed.clear();
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.items.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Record> {
        self.items.get_mut(key)
    }

    /// Member by primary key value, converted by the key column's type
    /// (`5`, `"5"` and `5.0` are the same key of an integer-keyed table).
    pub fn find(&self, primary_key: impl Into<Value>) -> Option<&Record> {
        let key = self.key_of(&primary_key.into())?;
        self.items.get(&key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.items.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        self.items.values_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn first(&self) -> Option<&Record> {
        self.items.first().map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Members added since the baseline.
    pub fn added(&self) -> impl Iterator<Item = &Record> {
        self.added.iter().filter_map(|key| self.items.get(key))
    }

    /// Primary keys of members removed since the baseline.
    pub fn removed_primary_keys(&self) -> impl Iterator<Item = &Value> {
        self.removed.values()
    }

    /// Each member's attributes as a JSON object, in order.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.items.values().map(Record::to_json).collect())
    }
}

impl IntoIterator for ResultCollection {
    type Item = Record;
    type IntoIter = indexmap::map::IntoValues<String, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_values()
    }
}

impl<'a> IntoIterator for &'a ResultCollection {
    type Item = &'a Record;
    type IntoIter = indexmap::map::Values<'a, String, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.values()
    }
}

impl FromIterator<Record> for ResultCollection {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut collection = Self::new();
        for record in iter {
            collection.push(record);
        }
        collection
    }
}
