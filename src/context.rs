//! The shared [`Context`]: executor, cache, registry, event bus and settings.
//!
//! Every query and record holds an `Rc<Context>`; nothing here is global.
//!
//! # Example
//!
//! ```no_run
//! use mooring::schema::{ColumnType, EntityBuilder, Registry, TableSchema};
//! use mooring::{Context, MemoryCache};
//! # fn demo(executor: impl mooring::Executor + 'static) -> Result<(), mooring::RecordError> {
//! let registry = Registry::builder()
//!     .entity(EntityBuilder::new(
//!         TableSchema::new("people", "id").column("name", ColumnType::Text),
//!     ))
//!     .build()?;
//! let ctx = Context::builder(executor, registry)
//!     .cache(MemoryCache::new())
//!     .page_size(50)
//!     .build();
//! let ada = ctx.find("people", 1)?;
//! # Ok(())
//! # }
//! ```

use crate::cache::{self, CacheStore, MemoryCache};
use crate::config::MooringConfig;
use crate::events::EventBus;
use crate::executor::{DbError, Executor, Row};
use crate::query::Query;
use crate::record::{Record, RecordError};
use crate::schema::{Entity, Registry};
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

pub(crate) const DEFAULT_PAGE_SIZE: usize = 100;

pub struct Context {
    executor: Box<dyn Executor>,
    cache: Box<dyn CacheStore>,
    registry: Registry,
    events: EventBus,
    page_size: usize,
}

impl Context {
    /// Context with a process-local [`MemoryCache`] and default settings.
    pub fn new(executor: impl Executor + 'static, registry: Registry) -> Rc<Self> {
        Self::builder(executor, registry).build()
    }

    pub fn builder(executor: impl Executor + 'static, registry: Registry) -> ContextBuilder {
        ContextBuilder {
            executor: Box::new(executor),
            registry,
            cache: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    pub fn cache(&self) -> &dyn CacheStore {
        self.cache.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Page size used by [`Query::each_default`].
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Entity registered for `table`
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Configuration` when the table is not registered.
    pub fn entity(&self, table: &str) -> Result<Rc<Entity>, RecordError> {
        self.registry.entity(table)
    }

    /// Start a SELECT on `table`.
    pub fn query(self: &Rc<Self>, table: &str) -> Query {
        Query::new(Rc::clone(self), table)
    }

    /// New, unsaved record for `table`.
    pub fn record(self: &Rc<Self>, table: &str) -> Result<Record, RecordError> {
        Record::new(self, table)
    }

    /// Find a record by primary key, consulting the cache first.
    pub fn find(self: &Rc<Self>, table: &str, primary_key: impl Into<Value>) -> Result<Option<Record>, RecordError> {
        Record::find(self, table, primary_key)
    }

    /// Fill a new record with `data` and save it
    ///
    /// # Errors
    ///
    /// Returns the retained write failure when the INSERT does not succeed.
    pub fn create<I, K, V>(self: &Rc<Self>, table: &str, data: I) -> Result<Record, RecordError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = Record::with_data(self, table, data)?;
        if record.save()? {
            Ok(record)
        } else {
            Err(record
                .last_error()
                .cloned()
                .unwrap_or_else(|| RecordError::Other(format!("insert into {table} failed"))))
        }
    }

    pub(crate) fn fetch(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        #[cfg(feature = "tracing")]
        let _span = crate::tracing_helpers::execute_query_span(sql).entered();
        log::debug!("{sql} {params:?}");
        self.executor.query_all(sql, params)
    }

    pub(crate) fn run(&self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        #[cfg(feature = "tracing")]
        let _span = crate::tracing_helpers::execute_query_span(sql).entered();
        log::debug!("{sql} {params:?}");
        self.executor.execute(sql, params)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("tables", &self.registry.tables())
            .field("events", &self.events)
            .field("page_size", &self.page_size)
            .finish()
    }
}

pub struct ContextBuilder {
    executor: Box<dyn Executor>,
    registry: Registry,
    cache: Option<Box<dyn CacheStore>>,
    page_size: usize,
}

impl ContextBuilder {
    pub fn cache(mut self, cache: impl CacheStore + 'static) -> Self {
        self.cache = Some(Box::new(cache));
        self
    }

    pub fn boxed_cache(mut self, cache: Box<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Apply the cache and query sections of a loaded configuration
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Cache` if the configured Redis URL is invalid.
    pub fn config(mut self, config: &MooringConfig) -> Result<Self, RecordError> {
        self.cache = Some(cache::from_config(&config.cache)?);
        self.page_size = config.query.page_size;
        Ok(self)
    }

    pub fn build(self) -> Rc<Context> {
        Rc::new(Context {
            executor: self.executor,
            cache: self
                .cache
                .unwrap_or_else(|| Box::new(MemoryCache::new())),
            registry: self.registry,
            events: EventBus::new(),
            page_size: self.page_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, MooringConfig};
    use crate::test_helpers::{people_registry, ScriptedExecutor};

    #[test]
    fn test_defaults() {
        let (executor, _script) = ScriptedExecutor::new();
        let ctx = Context::new(executor, people_registry());
        assert_eq!(ctx.page_size(), DEFAULT_PAGE_SIZE);
        assert!(ctx.entity("people").is_ok());
        assert!(matches!(ctx.entity("planets"), Err(RecordError::Configuration(_))));
    }

    #[test]
    fn test_config_sets_page_size_and_cache() {
        let (executor, _script) = ScriptedExecutor::new();
        let mut config = MooringConfig::default();
        config.query.page_size = 7;
        config.cache = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        let ctx = Context::builder(executor, people_registry())
            .config(&config)
            .unwrap()
            .build();
        assert_eq!(ctx.page_size(), 7);
        assert_eq!(ctx.cache().get("1", "people").unwrap(), None);
    }

    #[test]
    fn test_fetch_goes_through_executor() {
        let (executor, script) = ScriptedExecutor::new();
        let ctx = Context::new(executor, people_registry());
        ctx.fetch("SELECT 1", &[Value::Int(1)]).unwrap();
        assert_eq!(script.statements(), vec!["SELECT 1".to_string()]);
    }
}
