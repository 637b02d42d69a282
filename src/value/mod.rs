//! Value type system for mooring
//!
//! All data moving between records, the query builder and the executor is a
//! [`Value`]. Conversion from raw scalars to typed forms is driven by the
//! column's [`ColumnType`](crate::schema::ColumnType).

pub mod types;

pub use types::Value;
