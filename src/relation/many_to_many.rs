//! The many-to-many relation engine.

use super::link::AssociationLink;
use super::Relation;
use crate::collection::ResultCollection;
use crate::context::Context;
use crate::events::{Delta, EventKind, RelationChanges, SubscriptionId};
use crate::query::{Condition, DeleteStatement, Filter, InsertStatement, JoinKind, Operator};
use crate::record::{Record, RecordError};
use crate::value::Value;
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::rc::Rc;

/// Select-list alias carrying the owner key through an eager-load query.
const OWNER_ALIAS: &str = "mooring_owner_key";

/// Declaration of a many-to-many relation on an entity.
///
/// The junction table and both foreign-key columns are derived from the
/// table names unless overridden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManyToManyDef {
    name: String,
    related_table: String,
    junction: Option<String>,
    owner_column: Option<String>,
    related_column: Option<String>,
}

impl ManyToManyDef {
    pub fn new(name: impl Into<String>, related_table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            related_table: related_table.into(),
            junction: None,
            owner_column: None,
            related_column: None,
        }
    }

    pub fn junction(mut self, table: impl Into<String>) -> Self {
        self.junction = Some(table.into());
        self
    }

    pub fn owner_column(mut self, column: impl Into<String>) -> Self {
        self.owner_column = Some(column.into());
        self
    }

    pub fn related_column(mut self, column: impl Into<String>) -> Self {
        self.related_column = Some(column.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn related_table(&self) -> &str {
        &self.related_table
    }

    pub(crate) fn junction_override(&self) -> Option<&str> {
        self.junction.as_deref()
    }

    pub(crate) fn owner_column_override(&self) -> Option<&str> {
        self.owner_column.as_deref()
    }

    pub(crate) fn related_column_override(&self) -> Option<&str> {
        self.related_column.as_deref()
    }
}

/// A resolved many-to-many relation.
#[derive(Debug, Clone, PartialEq)]
pub struct ManyToMany {
    name: String,
    link: AssociationLink,
    reverse: Option<String>,
}

impl ManyToMany {
    pub fn new(name: impl Into<String>, link: AssociationLink, reverse: Option<String>) -> Self {
        Self {
            name: name.into(),
            link,
            reverse,
        }
    }
}

impl Relation for ManyToMany {
    fn name(&self) -> &str {
        &self.name
    }

    fn link(&self) -> &AssociationLink {
        &self.link
    }

    fn reverse_name(&self) -> Option<&str> {
        self.reverse.as_deref()
    }

    fn fetch_results(&self, ctx: &Rc<Context>, owner: &Record) -> Result<ResultCollection, RecordError> {
        let owner_key = owner.primary_key();
        if owner_key.is_null() {
            return Ok(ResultCollection::tracked());
        }
        let link = &self.link;
        let owner_column = link.qualified_owner_column();
        let collection = ctx
            .query(&link.related_table)
            .distinct()
            .join_with(
                &link.junction,
                &link.qualified_related_key(),
                Operator::Eq,
                &link.qualified_related_column(),
                JoinKind::Inner,
                move |c| c.where_eq(&owner_column, owner_key),
            )
            .results()?;
        Ok(collection.track())
    }

    fn fetch_results_for_eager_load(
        &self,
        ctx: &Rc<Context>,
        owners: &[&Record],
        constraint: Option<&Condition>,
    ) -> Result<HashMap<String, ResultCollection>, RecordError> {
        let mut loaded = HashMap::new();
        let mut keys: Vec<Value> = Vec::new();
        for owner in owners {
            if let Some(key) = owner.key() {
                if !loaded.contains_key(&key) {
                    loaded.insert(key, ResultCollection::tracked());
                    keys.push(owner.primary_key());
                }
            }
        }
        if keys.is_empty() {
            return Ok(loaded);
        }

        let link = &self.link;
        let entity = ctx.entity(&link.related_table)?;
        let constraint = constraint.cloned().unwrap_or_default();
        let rows = ctx
            .query(&link.related_table)
            .columns([
                format!("{}.*", link.related_table),
                format!("{} AS {OWNER_ALIAS}", link.qualified_owner_column()),
            ])
            .join_with(
                &link.junction,
                &link.qualified_related_key(),
                Operator::Eq,
                &link.qualified_related_column(),
                JoinKind::Left,
                move |_| constraint,
            )
            .where_in(&link.qualified_owner_column(), keys)
            .rows()?;

        for mut row in rows {
            let owner_key = row
                .remove(OWNER_ALIAS)
                .and_then(|v| owners.first().and_then(|owner| owner.key_for(&v)));
            if let Some(collection) = owner_key.and_then(|key| loaded.get_mut(&key)) {
                collection.push(Record::from_row(ctx, &entity, row));
            }
        }
        Ok(loaded)
    }

    fn persist(
        &self,
        ctx: &Rc<Context>,
        owner: &Record,
        collection: &mut ResultCollection,
    ) -> Result<RelationChanges, RecordError> {
        let owner_key = owner.primary_key();
        if owner_key.is_null() {
            return Err(RecordError::PrimaryKeyRequired {
                table: owner.table().to_string(),
            });
        }
        let link = &self.link;

        let removed: Vec<Value> = collection.removed_primary_keys().cloned().collect();
        if !removed.is_empty() {
            let (sql, params) = DeleteStatement::new(&link.junction)
                .where_eq(&link.owner_column, owner_key.clone())
                .where_in(&link.related_column, removed)
                .render()?;
            let deleted = ctx.run(&sql, &params)?;
            log::debug!("Detached {deleted} {} from {} {owner_key}", self.name, link.owner_table);
        }

        for member in collection.iter_mut() {
            if !member.save_excluding(self.reverse.as_deref())? {
                return Err(member.last_error().cloned().unwrap_or_else(|| {
                    RecordError::Relation(format!("saving a member of {} failed", self.name))
                }));
            }
        }
        collection.rekey();

        let added: Vec<Value> = collection
            .added()
            .map(Record::primary_key)
            .filter(|pk| !pk.is_null())
            .collect();
        if !added.is_empty() {
            let mut insert = InsertStatement::new(&link.junction)
                .columns([&link.owner_column, &link.related_column])
                .on_conflict_do_nothing();
            for pk in added {
                insert = insert.values(vec![owner_key.clone(), pk]);
            }
            let (sql, params) = insert.render()?;
            ctx.run(&sql, &params)?;
        }

        let written = collection.changes();
        collection.reset_changes();
        Ok(written)
    }

    fn on_delete(&self, ctx: &Rc<Context>, owner: &Record) -> Result<u64, RecordError> {
        let owner_key = owner.primary_key();
        if owner_key.is_null() {
            return Ok(0);
        }
        let (sql, params) = DeleteStatement::new(&self.link.junction)
            .where_eq(&self.link.owner_column, owner_key)
            .render()?;
        Ok(ctx.run(&sql, &params)?)
    }

    fn model_matches_relation(
        &self,
        ctx: &Rc<Context>,
        owner: &Record,
        candidate: &Record,
    ) -> Result<bool, RecordError> {
        let link = &self.link;
        if candidate.table() != link.related_table {
            return Ok(false);
        }
        let (owner_key, candidate_key) = (owner.primary_key(), candidate.primary_key());
        if owner_key.is_null() || candidate_key.is_null() {
            return Ok(false);
        }
        let rows = ctx
            .query(&link.junction)
            .columns([link.owner_column.clone()])
            .where_eq(&link.owner_column, owner_key)
            .where_eq(&link.related_column, candidate_key)
            .take(1)
            .rows()?;
        Ok(!rows.is_empty())
    }

    fn subscribe(&self, ctx: &Rc<Context>, owner_key: &str, outbox: Sender<Delta>) -> Vec<SubscriptionId> {
        let events = ctx.events();
        let table = &self.link.related_table;

        let reverse = self.reverse.clone();
        let owner = owner_key.to_string();
        let saved = events.subscribe(
            table,
            EventKind::Saved,
            Some(outbox.clone()),
            Box::new(move |event| {
                let (Some(member), Some(reverse)) = (&event.key, &reverse) else {
                    return Ok(None);
                };
                let Some(changes) = event.relation_changes.get(reverse) else {
                    return Ok(None);
                };
                if changes.added.contains(&owner) {
                    Ok(Some(Delta::Add {
                        key: member.clone(),
                        attributes: event.attributes.clone(),
                    }))
                } else if changes.removed.contains(&owner) {
                    Ok(Some(Delta::Remove { key: member.clone() }))
                } else {
                    Ok(None)
                }
            }),
        );
        let deleted = events.subscribe(
            table,
            EventKind::Deleted,
            Some(outbox),
            Box::new(|event| Ok(event.key.clone().map(|key| Delta::Remove { key }))),
        );
        vec![saved, deleted]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Row;
    use crate::test_helpers::{people_context, ScriptedExecutor};

    fn person(ctx: &Rc<Context>, id: i64) -> Record {
        let entity = ctx.entity("people").unwrap();
        Record::from_row(ctx, &entity, Row::from_pairs([("id", Value::Int(id)), ("name", Value::from("Ada"))]))
    }

    #[test]
    fn test_fetch_results_sql() {
        let (executor, script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        let relation = ctx.entity("people").unwrap().relation("groups").unwrap();
        script.push_rows(vec![Row::from_pairs([("id", Value::Int(10)), ("name", Value::from("admins"))])]);

        let groups = relation.fetch_results(&ctx, &person(&ctx, 1)).unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups.is_tracking());
        assert_eq!(
            script.statements()[0],
            r#"SELECT DISTINCT "groups".* FROM "groups" INNER JOIN "groups_to_people" ON ("groups"."id" = "groups_to_people"."group_id" AND ("groups_to_people"."person_id" = $1))"#
        );
        assert_eq!(script.params(0), vec![Value::Int(1)]);
    }

    #[test]
    fn test_fetch_results_for_new_owner_issues_no_sql() {
        let (executor, script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        let relation = ctx.entity("people").unwrap().relation("groups").unwrap();
        let owner = Record::new(&ctx, "people").unwrap();
        assert!(relation.fetch_results(&ctx, &owner).unwrap().is_empty());
        assert!(script.statements().is_empty());
    }

    #[test]
    fn test_eager_load_groups_rows_by_owner() {
        let (executor, script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        let relation = ctx.entity("people").unwrap().relation("groups").unwrap();
        script.push_rows(vec![
            Row::from_pairs([
                ("id", Value::Int(10)),
                ("name", Value::from("admins")),
                (OWNER_ALIAS, Value::Int(1)),
            ]),
            Row::from_pairs([
                ("id", Value::Int(10)),
                ("name", Value::from("admins")),
                (OWNER_ALIAS, Value::Int(2)),
            ]),
        ]);
        let (a, b, c) = (person(&ctx, 1), person(&ctx, 2), person(&ctx, 3));
        let loaded = relation
            .fetch_results_for_eager_load(&ctx, &[&a, &b, &c], None)
            .unwrap();

        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded["1"].len(), 1);
        assert_eq!(loaded["2"].len(), 1);
        assert!(loaded["3"].is_empty());
        let member = loaded["1"].get("10").unwrap();
        assert!(member.get_raw(OWNER_ALIAS).is_none());
        assert_eq!(
            script.statements()[0],
            r#"SELECT "groups".*, "groups_to_people"."person_id" AS "mooring_owner_key" FROM "groups" LEFT JOIN "groups_to_people" ON ("groups"."id" = "groups_to_people"."group_id") WHERE ("groups_to_people"."person_id" IN ($1, $2, $3))"#
        );
    }

    #[test]
    fn test_persist_diff() {
        let (executor, script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        let relation = ctx.entity("people").unwrap().relation("groups").unwrap();
        let owner = person(&ctx, 1);
        let groups = ctx.entity("groups").unwrap();

        let mut collection = ResultCollection::tracked();
        collection.push(Record::from_row(&ctx, &groups, Row::from_pairs([("id", Value::Int(10))])));
        collection.push(Record::from_row(&ctx, &groups, Row::from_pairs([("id", Value::Int(11))])));
        collection.remove("10");
        collection.add(Record::from_row(&ctx, &groups, Row::from_pairs([("id", Value::Int(12))])));

        let written = relation.persist(&ctx, &owner, &mut collection).unwrap();
        assert_eq!(written.added.iter().collect::<Vec<_>>(), vec!["12"]);
        assert_eq!(written.removed.iter().collect::<Vec<_>>(), vec!["10"]);
        let statements = script.statements();
        assert_eq!(
            statements.first().map(String::as_str),
            Some(r#"DELETE FROM "groups_to_people" WHERE ("person_id" = $1 AND "group_id" IN ($2))"#)
        );
        assert_eq!(
            statements.last().map(String::as_str),
            Some(r#"INSERT INTO "groups_to_people" ("person_id", "group_id") VALUES ($1, $2) ON CONFLICT DO NOTHING"#)
        );
        assert!(collection.changes().is_empty());
    }

    #[test]
    fn test_persist_without_changes_issues_no_junction_sql() {
        let (executor, script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        let relation = ctx.entity("people").unwrap().relation("groups").unwrap();
        let mut collection = ResultCollection::tracked();
        relation.persist(&ctx, &person(&ctx, 1), &mut collection).unwrap();
        assert!(script.statements().is_empty());
    }

    #[test]
    fn test_on_delete_clears_owner_rows() {
        let (executor, script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        let relation = ctx.entity("people").unwrap().relation("groups").unwrap();
        script.push_affected(2);
        assert_eq!(relation.on_delete(&ctx, &person(&ctx, 1)).unwrap(), 2);
        assert_eq!(
            script.statements()[0],
            r#"DELETE FROM "groups_to_people" WHERE ("person_id" = $1)"#
        );
    }

    #[test]
    fn test_subscription_turns_events_into_deltas() {
        let (executor, _script) = ScriptedExecutor::new();
        let ctx = people_context(executor);
        let relation = ctx.entity("people").unwrap().relation("groups").unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let ids = relation.subscribe(&ctx, "1", tx);
        assert_eq!(ids.len(), 2);

        let mut event = crate::events::RecordEvent {
            table: "groups".into(),
            kind: EventKind::Saved,
            key: Some("10".into()),
            primary_key: Value::Int(10),
            attributes: Default::default(),
            relation_changes: Default::default(),
        };
        ctx.events().publish(&event).unwrap();
        assert!(rx.try_recv().is_err());

        event.relation_changes.entry("people".into()).or_default().added.insert("1".into());
        ctx.events().publish(&event).unwrap();
        assert!(matches!(rx.try_recv(), Ok(Delta::Add { key, .. }) if key == "10"));

        let changes = event.relation_changes.entry("people".into()).or_default();
        changes.added.clear();
        changes.removed.insert("1".into());
        ctx.events().publish(&event).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Delta::Remove { key: "10".into() });

        event.kind = EventKind::Deleted;
        ctx.events().publish(&event).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Delta::Remove { key: "10".into() });
    }
}
