//! Error types for record, query execution and relation operations.
//!
//! `RecordError` is what most public operations return. It wraps the lower
//! layers ([`DbError`], [`BuildError`], [`CacheError`]) and adds the failures
//! that only make sense once records and entities are involved.

use crate::cache::CacheError;
use crate::executor::DbError;
use crate::query::BuildError;

/// Error type for record operations
#[derive(Debug, Clone, PartialEq)]
pub enum RecordError {
    /// No entity registered for the table, or an unknown relation name
    Configuration(String),
    /// Query construction failed before execution
    Build(BuildError),
    /// The executor reported a failure
    Database(DbError),
    /// Cache store failure surfaced to the caller
    Cache(CacheError),
    /// Operation needs a primary key the record does not have yet
    PrimaryKeyRequired { table: String },
    /// Attempt to change a primary key that is already set
    PrimaryKeyImmutable { table: String, column: String },
    /// Relation bookkeeping failed
    Relation(String),
    /// Other error, typically raised by an accessor or event handler
    Other(String),
}

impl RecordError {
    /// True for write failures that `save`/`delete` report as `Ok(false)`.
    pub fn is_persistence(&self) -> bool {
        matches!(self, RecordError::Database(_))
    }
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            RecordError::Build(e) => write!(f, "Build error: {e}"),
            RecordError::Database(e) => write!(f, "Database error: {e}"),
            RecordError::Cache(e) => write!(f, "Cache error: {e}"),
            RecordError::PrimaryKeyRequired { table } => {
                write!(f, "Primary key is required for this operation on {table:?}")
            }
            RecordError::PrimaryKeyImmutable { table, column } => {
                write!(f, "Primary key {table}.{column} is already set and cannot change")
            }
            RecordError::Relation(msg) => write!(f, "Relation error: {msg}"),
            RecordError::Other(msg) => write!(f, "Record error: {msg}"),
        }
    }
}

impl std::error::Error for RecordError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecordError::Build(e) => Some(e),
            RecordError::Database(e) => Some(e),
            RecordError::Cache(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DbError> for RecordError {
    fn from(err: DbError) -> Self {
        RecordError::Database(err)
    }
}

impl From<BuildError> for RecordError {
    fn from(err: BuildError) -> Self {
        RecordError::Build(err)
    }
}

impl From<CacheError> for RecordError {
    fn from(err: CacheError) -> Self {
        RecordError::Cache(err)
    }
}
