//! Query execution methods for [`Query`].
//!
//! Everything here renders the builder's [`QuerySpec`](super::QuerySpec),
//! hands the statement to the context's executor and shapes the rows:
//! plain [`Row`]s, hydrated [`Record`]s, pages of records, or a count.

use super::error::BuildError;
use super::select::Query;
use crate::collection::ResultCollection;
use crate::executor::Row;
use crate::record::{Record, RecordError};
use crate::relation::eager::eager_load;

impl Query {
    /// Execute the query and return the raw rows
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Build` when the statement cannot be rendered
    /// and `RecordError::Database` when the executor fails.
    pub fn rows(&self) -> Result<Vec<Row>, RecordError> {
        let (sql, params) = self.to_sql()?;
        Ok(self.ctx.fetch(&sql, &params)?)
    }

    /// Execute the query and hydrate every row as a record of the table
    ///
    /// Relations requested with [`with`](Query::with) are loaded with one
    /// extra query each and attached to the records.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Configuration` for an unregistered table or an
    /// unknown eager relation, before any SQL is sent.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use mooring::query::Filter;
    /// # fn demo(ctx: &std::rc::Rc<mooring::Context>) -> Result<(), mooring::RecordError> {
    /// let johns = ctx.query("people").where_("name", "LIKE", "John%").results()?;
    /// for person in &johns {
    ///     println!("{:?}", person.get_attribute("name"));
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn results(&self) -> Result<ResultCollection, RecordError> {
        Ok(self.hydrate()?.into_iter().collect())
    }

    /// One record per returned row, in row order, with eager relations
    /// attached. Rows sharing a primary key stay separate records.
    fn hydrate(&self) -> Result<Vec<Record>, RecordError> {
        let entity = self.ctx.entity(self.table())?;
        let relations = self
            .eager
            .iter()
            .map(|load| Ok((entity.relation(&load.relation)?, load.constraint.as_ref())))
            .collect::<Result<Vec<_>, RecordError>>()?;

        let rows = self.rows()?;
        let mut records: Vec<Record> = rows
            .into_iter()
            .map(|row| Record::from_row(&self.ctx, &entity, row))
            .collect();
        for (relation, constraint) in relations {
            eager_load(&self.ctx, &relation, &mut records, constraint)?;
        }
        Ok(records)
    }

    /// First record of the query, or `None` when it matches nothing.
    pub fn first(&self) -> Result<Option<Record>, RecordError> {
        let mut limited = self.clone();
        limited.spec.limit = Some(1);
        Ok(limited.results()?.into_iter().next())
    }

    /// Visit every matching record, fetching `page_size` rows per query
    ///
    /// A limit set with [`take`](Query::take) caps the total visited and an
    /// offset set with [`skip`](Query::skip) is where the first page starts.
    /// Returns the number of records visited.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::InvalidPageSize` for a page size of zero.
    pub fn each<F>(&self, page_size: usize, mut visit: F) -> Result<usize, RecordError>
    where
        F: FnMut(Record),
    {
        self.paginate(page_size, |page| {
            page.into_iter().for_each(&mut visit);
            true
        })
    }

    /// `each` with the context's configured page size.
    pub fn each_default<F>(&self, visit: F) -> Result<usize, RecordError>
    where
        F: FnMut(Record),
    {
        self.each(self.ctx.page_size(), visit)
    }

    /// Hand matching records to `on_page` one page at a time; returning
    /// `false` stops before the next query.
    pub fn chunk<F>(&self, page_size: usize, mut on_page: F) -> Result<usize, RecordError>
    where
        F: FnMut(ResultCollection) -> bool,
    {
        self.paginate(page_size, |page| on_page(page.into_iter().collect()))
    }

    /// Pages are sized and advanced by raw row count, so rows repeating a
    /// primary key (joins) never look like a short page.
    fn paginate<F>(&self, page_size: usize, mut on_page: F) -> Result<usize, RecordError>
    where
        F: FnMut(Vec<Record>) -> bool,
    {
        if page_size == 0 {
            return Err(BuildError::InvalidPageSize.into());
        }
        let start = self.spec.offset.unwrap_or(0);
        let cap = self.spec.limit;
        let mut fetched: u64 = 0;
        loop {
            let want = match cap {
                Some(cap) if fetched >= cap => break,
                Some(cap) => (page_size as u64).min(cap - fetched),
                None => page_size as u64,
            };
            let mut page = self.clone();
            page.spec.limit = Some(want);
            let offset = start + fetched;
            page.spec.offset = (offset > 0).then_some(offset);

            let records = page.hydrate()?;
            let returned = records.len() as u64;
            if returned == 0 {
                break;
            }
            fetched += returned;
            log::debug!("Fetched page of {returned} {} rows ({fetched} total)", self.table());
            if !on_page(records) || returned < want {
                break;
            }
        }
        Ok(fetched as usize)
    }

    /// Number of rows the query matches, ignoring ordering, limit and offset.
    pub fn count(&self) -> Result<u64, RecordError> {
        let (sql, params) = self.spec.render_count(self.ctx.registry())?;
        let count = self
            .ctx
            .fetch(&sql, &params)?
            .first()
            .and_then(|row| row.get("count"))
            .and_then(|value| value.as_i64())
            .unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Whether at least one row matches.
    pub fn exists(&self) -> Result<bool, RecordError> {
        let mut probe = self.clone();
        probe.spec.limit = Some(1);
        Ok(!probe.rows()?.is_empty())
    }
}
