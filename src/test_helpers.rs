//! Shared fixtures for unit tests: a scripted executor, the people/groups
//! registry and a cache that always fails.

use crate::cache::{CacheError, CacheStore, CachedAttributes};
use crate::context::Context;
use crate::executor::{DbError, Executor, Row};
use crate::relation::ManyToManyDef;
use crate::schema::{ColumnType, EntityBuilder, Registry, TableSchema};
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

enum Response {
    Rows(Vec<Row>),
    Affected(u64),
    Failure(DbError),
}

#[derive(Default)]
struct ScriptState {
    responses: VecDeque<Response>,
    log: Vec<(String, Vec<Value>)>,
}

/// Test handle for queuing responses and reading back what was sent.
///
/// Responses are consumed in order by whichever call comes next. With the
/// queue empty, queries return no rows and statements report one row
/// affected.
#[derive(Clone, Default)]
pub(crate) struct Script(Rc<RefCell<ScriptState>>);

impl Script {
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.0.borrow_mut().responses.push_back(Response::Rows(rows));
    }

    pub fn push_affected(&self, affected: u64) {
        self.0.borrow_mut().responses.push_back(Response::Affected(affected));
    }

    pub fn push_failure(&self, error: DbError) {
        self.0.borrow_mut().responses.push_back(Response::Failure(error));
    }

    pub fn statements(&self) -> Vec<String> {
        self.0.borrow().log.iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub fn params(&self, index: usize) -> Vec<Value> {
        self.0
            .borrow()
            .log
            .get(index)
            .map(|(_, params)| params.clone())
            .unwrap_or_default()
    }

    fn next(&self, sql: &str, params: &[Value]) -> Option<Response> {
        let mut state = self.0.borrow_mut();
        state.log.push((sql.to_string(), params.to_vec()));
        state.responses.pop_front()
    }
}

pub(crate) struct ScriptedExecutor {
    script: Script,
}

impl ScriptedExecutor {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (ScriptedExecutor, Script) {
        let script = Script::default();
        (
            ScriptedExecutor {
                script: script.clone(),
            },
            script,
        )
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        match self.script.next(sql, params) {
            None => Ok(1),
            Some(Response::Affected(n)) => Ok(n),
            Some(Response::Rows(rows)) => Ok(rows.len() as u64),
            Some(Response::Failure(err)) => Err(err),
        }
    }

    fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        match self.script.next(sql, params) {
            None | Some(Response::Affected(_)) => Ok(Vec::new()),
            Some(Response::Rows(rows)) => Ok(rows),
            Some(Response::Failure(err)) => Err(err),
        }
    }
}

/// `people` and `groups` joined through `groups_to_people`.
pub(crate) fn people_registry() -> Registry {
    let people = EntityBuilder::new(
        TableSchema::new("people", "id")
            .column("name", ColumnType::Text)
            .column("birth_date", ColumnType::Date)
            .column("email", ColumnType::Text)
            .column("age", ColumnType::Integer),
    )
    .many_to_many(ManyToManyDef::new("groups", "groups").owner_column("person_id"));
    let groups = EntityBuilder::new(TableSchema::new("groups", "id").column("name", ColumnType::Text))
        .many_to_many(ManyToManyDef::new("people", "people").related_column("person_id"));
    Registry::builder()
        .entity(people)
        .entity(groups)
        .build()
        .expect("fixture registry is valid")
}

pub(crate) fn people_context(executor: ScriptedExecutor) -> Rc<Context> {
    Context::new(executor, people_registry())
}

/// Cache whose every call fails; counts attempted writes.
#[derive(Clone, Default)]
pub(crate) struct FailingCache {
    sets: Rc<Cell<usize>>,
}

impl FailingCache {
    pub fn set_attempts(&self) -> usize {
        self.sets.get()
    }
}

impl CacheStore for FailingCache {
    fn get(&self, _key: &str, _group: &str) -> Result<Option<CachedAttributes>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    fn set(&self, _key: &str, _group: &str, _attributes: &CachedAttributes) -> Result<(), CacheError> {
        self.sets.set(self.sets.get() + 1);
        Err(CacheError::Unavailable("connection refused".into()))
    }

    fn delete(&self, _key: &str, _group: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}
