//! Insert, update, delete and the cached read path.

use super::attributes::AttributeValue;
use super::{Record, RecordError};
use crate::context::Context;
use crate::events::{EventKind, RecordEvent, RelationChanges};
use crate::executor::DbError;
use crate::query::{DeleteStatement, Filter, InsertStatement, UpdateStatement};
use crate::relation::LoadedRelation;
use crate::value::Value;
use std::collections::BTreeMap;
use std::rc::Rc;

impl Record {
    /// Write the record, its loaded relations, and publish a `Saved` event
    ///
    /// Existing records UPDATE exactly their dirty columns (nothing is sent
    /// when clean). New records INSERT every set attribute, take the
    /// generated primary key and re-read the row so server defaults are
    /// filled in. The cache is written after the database succeeded.
    ///
    /// Returns `Ok(false)` when the database rejects a write; the failure is
    /// kept in [`last_error`](Record::last_error).
    ///
    /// # Errors
    ///
    /// Returns configuration and build errors, and errors raised by event
    /// handlers.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # fn demo(ctx: &std::rc::Rc<mooring::Context>) -> Result<(), mooring::RecordError> {
    /// let mut ada = mooring::Record::with_data(ctx, "people", [("name", "Ada")])?;
    /// if !ada.save()? {
    ///     eprintln!("insert failed: {:?}", ada.last_error());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn save(&mut self) -> Result<bool, RecordError> {
        self.save_excluding(None)
    }

    /// `save`, leaving the loaded relation named `skip` unpersisted.
    pub(crate) fn save_excluding(&mut self, skip: Option<&str>) -> Result<bool, RecordError> {
        #[cfg(feature = "tracing")]
        let _span = crate::tracing_helpers::record_write_span(self.table(), "save").entered();

        self.last_error = None;
        let outcome = self.write().and_then(|()| self.persist_relations(skip));
        let changes = match outcome {
            Ok(changes) => changes,
            Err(err) if err.is_persistence() => {
                log::warn!("Saving {} {:?} failed: {err}", self.table(), self.key());
                self.last_error = Some(err);
                return Ok(false);
            }
            Err(err) => return Err(err),
        };
        self.publish(EventKind::Saved, changes)?;
        Ok(true)
    }

    fn write(&mut self) -> Result<(), RecordError> {
        if self.exists {
            self.update()
        } else {
            self.insert()
        }
    }

    fn update(&mut self) -> Result<(), RecordError> {
        let dirty = self.get_dirty();
        if dirty.is_empty() {
            return Ok(());
        }
        let pk = self.primary_key();
        if pk.is_null() {
            return Err(RecordError::PrimaryKeyRequired {
                table: self.table().to_string(),
            });
        }
        let mut statement = UpdateStatement::new(self.table());
        for (column, value) in dirty {
            statement = statement.set(column, value);
        }
        let (sql, params) = statement.where_eq(self.entity.primary_key(), pk).render()?;
        self.ctx.run(&sql, &params)?;
        self.sync_original();
        self.store_in_cache();
        Ok(())
    }

    fn insert(&mut self) -> Result<(), RecordError> {
        let pk_column = self.entity.primary_key().to_string();
        let (columns, values): (Vec<String>, Vec<Value>) = self
            .attributes
            .iter()
            .filter(|(name, attr)| !(**name == pk_column && attr.raw().is_null()))
            .map(|(name, attr)| (name.clone(), attr.raw().clone()))
            .unzip();

        let mut statement = InsertStatement::new(self.table())
            .columns(columns)
            .returning(&pk_column);
        if !values.is_empty() {
            statement = statement.values(values);
        }
        let (sql, params) = statement.render()?;
        let pk = self
            .ctx
            .fetch(&sql, &params)?
            .into_iter()
            .next()
            .and_then(|mut row| row.remove(&pk_column))
            .filter(|pk| !pk.is_null())
            .ok_or_else(|| {
                RecordError::Database(DbError::Other(format!(
                    "INSERT into {} returned no {pk_column}",
                    self.table()
                )))
            })?;
        self.attributes.insert(pk_column.clone(), AttributeValue::new(pk.clone()));

        // Columns the caller left out take whatever the database filled in.
        match self.ctx.query(self.table()).where_eq(&pk_column, pk).take(1).rows() {
            Ok(rows) => {
                if let Some(row) = rows.into_iter().next() {
                    for (column, value) in row.into_pairs() {
                        if !self.attributes.contains_key(&column) {
                            self.attributes.insert(column, AttributeValue::new(value));
                        }
                    }
                }
            }
            Err(err) => log::warn!("Re-reading inserted {} row failed: {err}", self.table()),
        }

        self.exists = true;
        self.sync_original();
        self.store_in_cache();
        Ok(())
    }

    fn persist_relations(&mut self, skip: Option<&str>) -> Result<BTreeMap<String, RelationChanges>, RecordError> {
        if self.relations.is_empty() {
            return Ok(BTreeMap::new());
        }
        let mut relations = std::mem::take(&mut self.relations);
        let result = self.persist_each(&mut relations, skip);
        self.relations = relations;
        result
    }

    fn persist_each(
        &self,
        relations: &mut BTreeMap<String, LoadedRelation>,
        skip: Option<&str>,
    ) -> Result<BTreeMap<String, RelationChanges>, RecordError> {
        let key = self.key();
        let mut changes = BTreeMap::new();
        for (name, loaded) in relations.iter_mut() {
            if let Some(key) = &key {
                loaded.subscribe(&self.ctx, key);
            }
            let relation = Rc::clone(loaded.relation());
            let collection = loaded.collection_mut();
            let written = if skip == Some(name.as_str()) {
                collection.changes()
            } else {
                relation.persist(&self.ctx, self, collection)?
            };
            changes.insert(name.clone(), written);
        }
        Ok(changes)
    }

    /// DELETE the row, drop its cache entry and association rows, then
    /// publish a `Deleted` event
    ///
    /// Returns `Ok(false)` when the database rejects the delete; the
    /// failure is kept in [`last_error`](Record::last_error).
    ///
    /// # Errors
    ///
    /// Returns `RecordError::PrimaryKeyRequired` for a record without a
    /// primary key, and errors raised by event handlers.
    pub fn delete(&mut self) -> Result<bool, RecordError> {
        #[cfg(feature = "tracing")]
        let _span = crate::tracing_helpers::record_write_span(self.table(), "delete").entered();

        self.last_error = None;
        let pk = self.primary_key();
        let Some(key) = self.key_for(&pk) else {
            return Err(RecordError::PrimaryKeyRequired {
                table: self.table().to_string(),
            });
        };
        match self.remove_row(pk, &key) {
            Ok(()) => {}
            Err(err) if err.is_persistence() => {
                log::warn!("Deleting {} {key} failed: {err}", self.table());
                self.last_error = Some(err);
                return Ok(false);
            }
            Err(err) => return Err(err),
        }
        self.publish(EventKind::Deleted, BTreeMap::new())?;
        Ok(true)
    }

    /// Association rows go first so the row itself is only deleted once
    /// nothing references it.
    fn remove_row(&mut self, pk: Value, key: &str) -> Result<(), RecordError> {
        let entity = Rc::clone(&self.entity);
        for (_, relation) in entity.relations() {
            relation.on_delete(&self.ctx, self)?;
        }

        let (sql, params) = DeleteStatement::new(self.table())
            .where_eq(self.entity.primary_key(), pk)
            .render()?;
        self.ctx.run(&sql, &params)?;
        self.exists = false;
        self.relations.clear();

        if let Err(err) = self.ctx.cache().delete(key, &self.entity.schema().slug()) {
            log::warn!("Cache delete for {} {key} failed: {err}", self.table());
        }
        Ok(())
    }

    fn publish(&self, kind: EventKind, relation_changes: BTreeMap<String, RelationChanges>) -> Result<usize, RecordError> {
        let event = RecordEvent {
            table: self.table().to_string(),
            kind,
            key: self.key(),
            primary_key: self.primary_key(),
            attributes: self.attributes(),
            relation_changes,
        };
        self.ctx.events().publish(&event)
    }

    pub(crate) fn store_in_cache(&self) {
        let Some(key) = self.key() else { return };
        if let Err(err) = self
            .ctx
            .cache()
            .set(&key, &self.entity.schema().slug(), &self.attributes())
        {
            log::warn!("Cache write for {} {key} failed: {err}", self.table());
        }
    }

    /// Look a record up by primary key
    ///
    /// A cache hit is returned without touching the database. On a miss the
    /// row is read and cached; when the cache itself fails the row is read
    /// but not cached.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Configuration` for an unregistered table and
    /// executor failures unchanged.
    pub fn find(ctx: &Rc<Context>, table: &str, primary_key: impl Into<Value>) -> Result<Option<Record>, RecordError> {
        let entity = ctx.entity(table)?;
        let primary_key = primary_key.into();
        let Some(key) = entity.schema().key_of(&primary_key) else {
            return Ok(None);
        };
        let cache_usable = match ctx.cache().get(&key, &entity.schema().slug()) {
            Ok(Some(attributes)) => {
                log::debug!("Cache hit for {table} {key}");
                return Ok(Some(Record::from_attributes(ctx, &entity, attributes)));
            }
            Ok(None) => true,
            Err(err) => {
                log::warn!("Cache read for {table} {key} failed, reading from the database: {err}");
                false
            }
        };
        let record = ctx
            .query(table)
            .where_eq(entity.primary_key(), primary_key)
            .first()?;
        if let (Some(record), true) = (&record, cache_usable) {
            record.store_in_cache();
        }
        Ok(record)
    }

    /// Re-read every attribute from the database; returns `false` when the
    /// row no longer exists.
    pub fn refresh(&mut self) -> Result<bool, RecordError> {
        let pk = self.primary_key();
        if pk.is_null() {
            return Err(RecordError::PrimaryKeyRequired {
                table: self.table().to_string(),
            });
        }
        let rows = self
            .ctx
            .query(self.table())
            .where_eq(self.entity.primary_key(), pk)
            .take(1)
            .rows()?;
        let Some(row) = rows.into_iter().next() else {
            self.exists = false;
            return Ok(false);
        };
        self.attributes.clear();
        for (column, value) in row.into_pairs() {
            self.attributes.insert(column, AttributeValue::new(value));
        }
        self.exists = true;
        self.sync_original();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::events::EventKind;
    use crate::executor::{DbError, Row};
    use crate::record::RecordError;
    use crate::test_helpers::{people_context, people_registry, FailingCache, ScriptedExecutor};
    use crate::schema::{ColumnType, EntityBuilder, Registry, TableSchema};
    use crate::value::Value;
    use crate::{Context, Record};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ada_row(id: i64) -> Row {
        Row::from_pairs([
            ("id", Value::Int(id)),
            ("name", Value::from("Ada")),
            ("birth_date", Value::Null),
            ("email", Value::Null),
            ("age", Value::Int(36)),
        ])
    }

    #[test]
    fn test_insert_takes_generated_key_and_server_defaults() {
        let (executor, script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        script.push_rows(vec![Row::from_pairs([("id", Value::Int(1))])]);
        script.push_rows(vec![ada_row(1)]);

        let mut ada = Record::with_data(&ctx, "people", [("name", "Ada")]).unwrap();
        assert!(ada.save().unwrap());
        assert!(ada.exists());
        assert!(!ada.is_dirty());
        assert_eq!(ada.primary_key(), Value::Int(1));
        assert_eq!(ada.get_attribute("age"), Some(Value::Int(36)));

        let statements = script.statements();
        assert_eq!(
            statements[0],
            r#"INSERT INTO "people" ("name") VALUES ($1) RETURNING "id""#
        );
        assert_eq!(
            statements[1],
            r#"SELECT "people".* FROM "people" WHERE ("id" = $1) LIMIT 1"#
        );
        assert!(ctx.cache().get("1", "people").unwrap().is_some());
    }

    #[test]
    fn test_update_sends_only_dirty_columns() {
        let (executor, script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        let entity = ctx.entity("people").unwrap();
        let mut ada = Record::from_row(&ctx, &entity, ada_row(4));

        assert!(ada.save().unwrap());
        assert!(script.statements().is_empty());

        ada.set_attribute("name", "Grace").unwrap();
        ada.set_attribute("age", "36").unwrap();
        assert!(ada.save().unwrap());
        assert_eq!(
            script.statements(),
            vec![r#"UPDATE "people" SET "name" = $1 WHERE ("id" = $2)"#.to_string()]
        );
        assert_eq!(script.params(0), vec![Value::from("Grace"), Value::Int(4)]);
        assert!(!ada.is_dirty());
    }

    #[test]
    fn test_write_failure_is_retained() {
        let (executor, script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        script.push_failure(DbError::Query("duplicate key".into()));

        let mut ada = Record::with_data(&ctx, "people", [("name", "Ada")]).unwrap();
        assert!(!ada.save().unwrap());
        assert!(!ada.exists());
        assert_eq!(
            ada.last_error(),
            Some(&RecordError::Database(DbError::Query("duplicate key".into())))
        );
    }

    #[test]
    fn test_save_publishes_after_write() {
        let (executor, script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        ctx.events().listen("people", EventKind::Saved, move |event| {
            sink.borrow_mut().push(event.key.clone());
            Ok(())
        });
        script.push_rows(vec![Row::from_pairs([("id", Value::Int(3))])]);

        let mut ada = Record::with_data(&ctx, "people", [("name", "Ada")]).unwrap();
        ada.save().unwrap();
        assert_eq!(*seen.borrow(), vec![Some("3".to_string())]);
    }

    #[test]
    fn test_handler_error_reaches_caller() {
        let (executor, _script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        ctx.events()
            .listen("people", EventKind::Saved, |_| Err(RecordError::Other("veto".into())));
        let entity = ctx.entity("people").unwrap();
        let mut ada = Record::from_row(&ctx, &entity, ada_row(1));
        assert_eq!(ada.save(), Err(RecordError::Other("veto".into())));
    }

    #[test]
    fn test_delete() {
        let (executor, script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        let entity = ctx.entity("people").unwrap();
        let mut ada = Record::from_row(&ctx, &entity, ada_row(9));
        ada.store_in_cache();

        assert!(ada.delete().unwrap());
        assert!(!ada.exists());
        assert!(ctx.cache().get("9", "people").unwrap().is_none());
        assert_eq!(
            script.statements(),
            vec![
                r#"DELETE FROM "groups_to_people" WHERE ("person_id" = $1)"#.to_string(),
                r#"DELETE FROM "people" WHERE ("id" = $1)"#.to_string(),
            ]
        );
    }

    #[test]
    fn test_failed_association_cleanup_keeps_the_row() {
        let (executor, script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        let entity = ctx.entity("people").unwrap();
        let mut ada = Record::from_row(&ctx, &entity, ada_row(9));
        ada.store_in_cache();
        script.push_failure(DbError::Query("junction locked".into()));

        assert!(!ada.delete().unwrap());
        assert!(ada.exists());
        assert!(matches!(ada.last_error(), Some(RecordError::Database(_))));
        assert!(ctx.cache().get("9", "people").unwrap().is_some());
        assert_eq!(
            script.statements(),
            vec![r#"DELETE FROM "groups_to_people" WHERE ("person_id" = $1)"#.to_string()]
        );
    }

    #[test]
    fn test_delete_requires_primary_key() {
        let (executor, _script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        let mut ada = Record::new(&ctx, "people").unwrap();
        assert!(matches!(ada.delete(), Err(RecordError::PrimaryKeyRequired { .. })));
    }

    #[test]
    fn test_find_prefers_cache() {
        let (executor, script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        script.push_rows(vec![ada_row(5)]);

        let first = Record::find(&ctx, "people", 5).unwrap().unwrap();
        assert_eq!(first.get_attribute("name"), Some(Value::from("Ada")));
        assert_eq!(script.statements().len(), 1);

        let second = ctx.find("people", "5").unwrap().unwrap();
        assert!(second.exists());
        assert_eq!(second.primary_key(), Value::Int(5));
        assert_eq!(script.statements().len(), 1);
    }

    #[test]
    fn test_text_keys_are_not_read_as_numbers() {
        let registry = Registry::builder()
            .entity(EntityBuilder::new(
                TableSchema::new("skus", "code")
                    .column("code", ColumnType::Text)
                    .column("label", ColumnType::Text),
            ))
            .build()
            .unwrap();
        let (executor, script) = ScriptedExecutor::new();
        let ctx = Context::new(executor, registry);
        let sku = |code: &str, label: &str| Row::from_pairs([("code", Value::from(code)), ("label", Value::from(label))]);
        script.push_rows(vec![sku("7", "seven")]);
        script.push_rows(vec![sku("007", "licensed")]);

        let seven = ctx.find("skus", "7").unwrap().unwrap();
        let bond = ctx.find("skus", "007").unwrap().unwrap();
        assert_eq!(script.statements().len(), 2);
        assert_eq!(seven.get_attribute("label"), Some(Value::from("seven")));
        assert_eq!(bond.get_attribute("label"), Some(Value::from("licensed")));
        assert_eq!(bond.key().as_deref(), Some("007"));

        let both: crate::ResultCollection = [seven, bond].into_iter().collect();
        assert_eq!(both.len(), 2);
        assert!(both.find("007").is_some());
    }

    #[test]
    fn test_find_with_failing_cache_reads_database() {
        let (executor, script) = ScriptedExecutor::new();
        let cache = FailingCache::default();
        let ctx = Context::builder(executor, people_registry())
            .cache(cache.clone())
            .build();
        script.push_rows(vec![ada_row(5)]);
        assert!(Record::find(&ctx, "people", 5).unwrap().is_some());
        assert_eq!(script.statements().len(), 1);
        assert_eq!(cache.set_attempts(), 0);
    }

    #[test]
    fn test_find_missing_row() {
        let (executor, _script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        assert!(Record::find(&ctx, "people", 404).unwrap().is_none());
        assert!(Record::find(&ctx, "people", Value::Null).unwrap().is_none());
        assert!(matches!(
            Record::find(&ctx, "planets", 1),
            Err(RecordError::Configuration(_))
        ));
    }

    #[test]
    fn test_refresh() {
        let (executor, script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        let entity = ctx.entity("people").unwrap();
        let mut ada = Record::from_row(&ctx, &entity, ada_row(2));
        ada.set_attribute("name", "Changed").unwrap();

        script.push_rows(vec![ada_row(2)]);
        assert!(ada.refresh().unwrap());
        assert_eq!(ada.get_attribute("name"), Some(Value::from("Ada")));
        assert!(!ada.is_dirty());

        assert!(!ada.refresh().unwrap());
        assert!(!ada.exists());
    }
}
