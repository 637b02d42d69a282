//! Query construction errors.
//!
//! A [`BuildError`] is raised while a statement is being assembled or rendered,
//! always before anything reaches the executor.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Table or column name fails identifier validation
    InvalidIdentifier(String),
    /// Column is not part of the registered table schema
    UnknownColumn { table: String, column: String },
    /// Operator text outside the supported set
    UnknownOperator(String),
    /// Value cannot be used with the operator (an array with `<`, ...)
    InvalidValue(String),
    /// Nested group closure produced no predicate
    MalformedGroup(String),
    /// Statement requires a predicate but none was given
    EmptyPredicate(String),
    /// UPDATE with nothing to set
    EmptyAssignment(String),
    /// Page size of zero passed to paged iteration
    InvalidPageSize,
    /// `skip` used without `take`
    OffsetWithoutLimit,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::InvalidIdentifier(ident) => write!(f, "Invalid identifier: {ident:?}"),
            BuildError::UnknownColumn { table, column } => {
                write!(f, "Unknown column {column:?} on table {table:?}")
            }
            BuildError::UnknownOperator(op) => write!(f, "Unknown operator: {op:?}"),
            BuildError::InvalidValue(msg) => write!(f, "Invalid value: {msg}"),
            BuildError::MalformedGroup(msg) => write!(f, "Malformed nested constraint: {msg}"),
            BuildError::EmptyPredicate(stmt) => write!(f, "{stmt} requires a predicate"),
            BuildError::EmptyAssignment(table) => {
                write!(f, "UPDATE on {table:?} has no columns to set")
            }
            BuildError::InvalidPageSize => write!(f, "Page size must be greater than zero"),
            BuildError::OffsetWithoutLimit => write!(f, "An offset requires a limit"),
        }
    }
}

impl std::error::Error for BuildError {}
