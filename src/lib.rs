//! # Mooring
//!
//! Record, query and many-to-many relation core for SQL databases.
//!
//! Tables are described once in a [`Registry`](schema::Registry) and shared
//! through a [`Context`] together with an [`Executor`], a [`CacheStore`] and
//! an [`EventBus`]. On top of that:
//!
//! - [`Query`] builds parameterized SELECTs with nested predicate groups and
//!   runs them as rows, records, pages or counts
//! - [`Record`] tracks raw and typed attribute values, dirty state and the
//!   insert/update/delete lifecycle, with a read-through cache on `find`
//! - [`ResultCollection`] holds query results and the add/remove changes of
//!   a loaded relation
//! - [`relation::ManyToMany`] loads, eager-loads and persists associations
//!   through a junction table and keeps loaded collections in sync with
//!   saves made elsewhere
//!
//! ```no_run
//! use mooring::query::Filter;
//! # fn demo(ctx: &std::rc::Rc<mooring::Context>) -> Result<(), mooring::RecordError> {
//! let mut john = ctx
//!     .query("people")
//!     .where_("name", "LIKE", "John%")
//!     .with("groups")
//!     .first()?
//!     .expect("seeded");
//! john.set_attribute("email", "john@example.com")?;
//! john.save()?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod collection;
pub mod config;
pub mod context;
pub mod events;
pub mod executor;
pub mod query;
pub mod record;
pub mod relation;
pub mod schema;
pub mod value;

#[cfg(feature = "tracing")]
pub(crate) mod tracing_helpers;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(test)]
mod test_helpers;

pub use cache::{CacheError, CacheStore, MemoryCache, NullCache, RedisCache};
pub use collection::ResultCollection;
pub use config::MooringConfig;
pub use context::{Context, ContextBuilder};
pub use events::{EventBus, EventKind, RecordEvent};
pub use executor::{DbError, Executor, Row};
pub use query::{BuildError, Filter, Operator, Order, Query};
pub use record::{Record, RecordError, RecordIdentity};
pub use schema::{ColumnType, EntityBuilder, Registry, TableSchema};
pub use value::Value;

#[cfg(feature = "postgres")]
pub use postgres::MayPostgresExecutor;
