//! SQLite-backed executor and the people/groups fixture shared by the
//! integration tests.

#![allow(dead_code)]

use fake::faker::internet::en::SafeEmail;
use fake::Fake;
use mooring::relation::ManyToManyDef;
use mooring::{ColumnType, Context, DbError, EntityBuilder, Executor, Registry, Row, TableSchema, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::cell::RefCell;
use std::rc::Rc;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(\d+)").expect("valid placeholder pattern"));

const SCHEMA: &str = "
    CREATE TABLE people (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        birth_date TEXT,
        email TEXT,
        age INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE groups (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE groups_to_people (
        group_id INTEGER NOT NULL,
        person_id INTEGER NOT NULL,
        PRIMARY KEY (person_id, group_id)
    );
";

/// [`Executor`] over an in-memory SQLite database.
///
/// `$n` placeholders are rewritten to SQLite's `?n` form. Every statement
/// is recorded so tests can count round trips.
pub struct SqliteExecutor {
    conn: Rc<Connection>,
    log: Rc<RefCell<Vec<String>>>,
}

impl SqliteExecutor {
    fn prepare_sql(&self, sql: &str) -> String {
        self.log.borrow_mut().push(sql.to_string());
        PLACEHOLDER.replace_all(sql, "?${1}").into_owned()
    }
}

fn to_sql_value(value: &Value) -> Result<SqlValue, DbError> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Json(j) => SqlValue::Text(j.to_string()),
        Value::Array(_) => return Err(DbError::Query("arrays cannot be bound in SQLite".into())),
        other => SqlValue::Text(other.to_string()),
    })
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::bytes(b),
    }
}

fn bind(params: &[Value]) -> Result<Vec<SqlValue>, DbError> {
    params.iter().map(to_sql_value).collect()
}

fn db_error(err: rusqlite::Error) -> DbError {
    DbError::Query(err.to_string())
}

impl Executor for SqliteExecutor {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        let sql = self.prepare_sql(sql);
        let affected = self
            .conn
            .execute(&sql, params_from_iter(bind(params)?))
            .map_err(db_error)?;
        Ok(affected as u64)
    }

    fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let sql = self.prepare_sql(sql);
        let mut stmt = self.conn.prepare(&sql).map_err(db_error)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(bind(params)?)).map_err(db_error)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(db_error)? {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                values.push(from_sql_value(row.get_ref(idx).map_err(db_error)?));
            }
            out.push(Row::new(columns.clone(), values));
        }
        Ok(out)
    }
}

/// Handle on the fixture database for seeding and direct inspection.
pub struct Fixture {
    pub ctx: Rc<Context>,
    pub conn: Rc<Connection>,
    log: Rc<RefCell<Vec<String>>>,
}

impl Fixture {
    /// Statements sent through the executor so far.
    pub fn statement_count(&self) -> usize {
        self.log.borrow().len()
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn person(&self, name: &str, birth_date: &str) -> i64 {
        let email: String = SafeEmail().fake();
        self.conn
            .execute(
                "INSERT INTO people (name, birth_date, email) VALUES (?1, ?2, ?3)",
                rusqlite::params![name, birth_date, email],
            )
            .expect("seed person");
        self.conn.last_insert_rowid()
    }

    pub fn group(&self, name: &str) -> i64 {
        self.conn
            .execute("INSERT INTO groups (name) VALUES (?1)", rusqlite::params![name])
            .expect("seed group");
        self.conn.last_insert_rowid()
    }

    pub fn link(&self, person_id: i64, group_id: i64) {
        self.conn
            .execute(
                "INSERT INTO groups_to_people (group_id, person_id) VALUES (?1, ?2)",
                rusqlite::params![group_id, person_id],
            )
            .expect("seed link");
    }

    /// Junction rows for `person_id`, as sorted group ids.
    pub fn group_ids_of(&self, person_id: i64) -> Vec<i64> {
        let mut stmt = self
            .conn
            .prepare("SELECT group_id FROM groups_to_people WHERE person_id = ?1 ORDER BY group_id")
            .expect("prepare");
        stmt.query_map(rusqlite::params![person_id], |row| row.get(0))
            .expect("query")
            .collect::<Result<Vec<i64>, _>>()
            .expect("rows")
    }

    pub fn junction_rows(&self) -> i64 {
        self.conn
            .query_row("SELECT COUNT(*) FROM groups_to_people", [], |row| row.get(0))
            .expect("count")
    }
}

pub fn registry() -> Registry {
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
        .expect("fixture registry")
}

pub fn fixture() -> Fixture {
    let conn = Rc::new(Connection::open_in_memory().expect("open sqlite"));
    conn.execute_batch(SCHEMA).expect("create schema");
    let log = Rc::new(RefCell::new(Vec::new()));
    let executor = SqliteExecutor {
        conn: Rc::clone(&conn),
        log: Rc::clone(&log),
    };
    Fixture {
        ctx: Context::new(executor, registry()),
        conn,
        log,
    }
}
