//! Query building and execution.
//!
//! This module turns declarative filters into parameterized SQL and runs it
//! through the context's [`Executor`](crate::Executor).
//!
//! # Architecture
//!
//! - **Condition**: predicate trees (`Condition`, `Filter`) shared by every statement
//! - **Select**: the fluent SELECT builder (`Query`) and its plain description (`QuerySpec`)
//! - **Statement**: INSERT/UPDATE/DELETE used by the record and relation layers
//! - **Execution**: `results`, `first`, `each`, `chunk`, `rows`, `count`, `exists`
//!
//! # Examples
//!
//! ```no_run
//! use mooring::query::{Filter, Order};
//! # fn demo(ctx: &std::rc::Rc<mooring::Context>) -> Result<(), mooring::RecordError> {
//! let admins = ctx
//!     .query("people")
//!     .where_("name", "LIKE", "John%")
//!     .where_group(|g| g.where_eq("role", "admin").or_where_eq("role", "owner"))
//!     .order_by("name", Order::Asc)
//!     .results()?;
//! # Ok(())
//! # }
//! ```

// Predicate trees
pub mod condition;
#[doc(inline)]
pub use condition::{Condition, ConditionNode, Conjunction, Filter, Operator, Predicate};

// Errors raised before any SQL is sent
pub mod error;
#[doc(inline)]
pub use error::BuildError;

// SELECT builder
pub mod select;
#[doc(inline)]
pub use select::{JoinKind, JoinSpec, Order, OrderBy, Query, QuerySpec};

// Write statements
pub mod statement;
#[doc(inline)]
pub use statement::{DeleteStatement, InsertStatement, UpdateStatement};

// Identifier quoting and parameter binding
pub mod sql;
#[doc(inline)]
pub use sql::{quote_identifier, validate_identifier, SqlWriter};

// Execution methods on `Query`
mod execution;
