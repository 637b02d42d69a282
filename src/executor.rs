//! Executor Module
//!
//! Provides the [`Executor`] trait, the single seam between mooring and a
//! physical SQL transport, together with the [`Row`] shape every transport
//! hands back.
//!
//! Statements always arrive with `$1`, `$2`, ... placeholders and a matching
//! parameter slice. Identifiers in the statement text are already validated
//! and quoted by the query builder.

use crate::value::Value;
use std::fmt;

/// Executor error type
#[derive(Debug, Clone, PartialEq)]
pub enum DbError {
    /// Connecting to the database failed
    Connection(String),
    /// Statement execution error (syntax, constraint violation, ...)
    Query(String),
    /// Row parsing/conversion error
    Parse(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Connection(s) => {
                write!(f, "Connection error: {s}")
            }
            DbError::Query(s) => {
                write!(f, "Query error: {s}")
            }
            DbError::Parse(s) => {
                write!(f, "Parse error: {s}")
            }
            DbError::Other(s) => {
                write!(f, "Execution error: {s}")
            }
        }
    }
}

impl std::error::Error for DbError {}

/// One fetched row: column names in select order with their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row from parallel column/value vectors.
    ///
    /// Surplus entries on either side are dropped.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        let len = columns.len().min(values.len());
        let mut columns = columns;
        let mut values = values;
        columns.truncate(len);
        values.truncate(len);
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, values) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self { columns, values }
    }

    /// Value of the first column called `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Remove every column called `name`, returning the first value found.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let mut found = None;
        let mut i = 0;
        while i < self.columns.len() {
            if self.columns[i] == name {
                self.columns.remove(i);
                let value = self.values.remove(i);
                found.get_or_insert(value);
            } else {
                i += 1;
            }
        }
        found
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate `(column, value)` pairs in select order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn into_pairs(self) -> impl Iterator<Item = (String, Value)> {
        self.columns.into_iter().zip(self.values)
    }
}

/// Trait for executing database operations
///
/// This trait abstracts database execution, allowing different transports
/// (a PostgreSQL client, an embedded SQLite connection, a scripted test
/// double) to be used interchangeably by the query builder and records.
///
/// # Examples
///
/// ```no_run
/// use mooring::executor::{DbError, Executor, Row};
/// use mooring::Value;
///
/// fn count_people(executor: &dyn Executor) -> Result<i64, DbError> {
///     let rows = executor.query_all(r#"SELECT COUNT(*) AS "n" FROM "people""#, &[])?;
///     Ok(rows.first().and_then(|r| r.get("n")).and_then(Value::as_i64).unwrap_or(0))
/// }
/// ```
pub trait Executor {
    /// Execute a SQL statement and return the number of rows affected
    ///
    /// # Arguments
    ///
    /// * `sql` - SQL statement (parameters are `$1`, `$2`, etc.)
    /// * `params` - Parameters to bind, in placeholder order
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError>;

    /// Execute a query and return all rows
    ///
    /// Also used for `INSERT ... RETURNING`.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails.
    fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError>;

    /// Execute a query and return the first row, if any
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails.
    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, DbError> {
        Ok(self.query_all(sql, params)?.into_iter().next())
    }
}
