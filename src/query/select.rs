//! SELECT construction.
//!
//! [`Query`] is the fluent builder; it owns a [`QuerySpec`] (the plain data
//! describing the statement) and the [`Context`] it will run against.
//! Rendering validates every identifier, and every column of a registered
//! table against its schema, before producing SQL.
//!
//! Generated shape:
//!
//! ```text
//! SELECT [DISTINCT] <cols> FROM <table> [<join> ...] [WHERE <tree>]
//!     [ORDER BY <col> <dir>[, ...]] [LIMIT <n>[ OFFSET <m>]]
//! ```

use super::condition::{Condition, Filter, Operator};
use super::error::BuildError;
use super::sql::{quote_column, quote_identifier, split_alias, validate_identifier, ColumnRef, SqlWriter};
use crate::context::Context;
use crate::schema::Registry;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

impl JoinKind {
    fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    /// Parse `"asc"` / `"desc"` (any case).
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "ASC" => Some(Order::Asc),
            "DESC" => Some(Order::Desc),
            _ => None,
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub table: String,
    pub left: String,
    pub operator: Operator,
    pub right: String,
    /// Extra predicates ANDed into the ON clause
    pub constraint: Option<Condition>,
    pub kind: JoinKind,
}

impl JoinSpec {
    fn render(&self, w: &mut SqlWriter) -> Result<(), BuildError> {
        if !self.operator.is_comparison() {
            return Err(BuildError::InvalidValue(format!(
                "join on {} cannot use operator {}",
                self.table, self.operator
            )));
        }
        w.push(" ")
            .push(self.kind.as_sql())
            .push(" ")
            .push(&quote_identifier(&self.table)?)
            .push(" ON (")
            .push(&quote_column(&self.left)?)
            .push(" ")
            .push(self.operator.as_sql())
            .push(" ")
            .push(&quote_column(&self.right)?);
        if let Some(constraint) = &self.constraint {
            if !constraint.is_empty() || constraint.error().is_some() {
                w.push(" AND ");
                constraint.render(w)?;
            }
        }
        w.push(")");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Order,
}

/// Plain description of a SELECT.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySpec {
    pub table: String,
    pub condition: Condition,
    pub joins: Vec<JoinSpec>,
    pub orders: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: bool,
    /// Select list; empty means `"<table>".*`. Entries may carry `AS alias`.
    pub columns: Vec<String>,
}

impl QuerySpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Render the SELECT statement
    ///
    /// # Errors
    ///
    /// Returns `BuildError` for invalid identifiers, columns unknown to a
    /// registered table, malformed predicates, or an offset without a limit.
    pub fn render(&self, registry: &Registry) -> Result<(String, Vec<Value>), BuildError> {
        self.validate(registry)?;
        if self.offset.is_some() && self.limit.is_none() {
            return Err(BuildError::OffsetWithoutLimit);
        }
        let mut w = SqlWriter::new();
        w.push("SELECT ");
        if self.distinct {
            w.push("DISTINCT ");
        }
        w.push(&self.select_list()?);
        self.render_source(&mut w)?;

        if !self.orders.is_empty() {
            let mut parts = Vec::with_capacity(self.orders.len());
            for order in &self.orders {
                let column = match self.alias_named(&order.column) {
                    Some(alias) => format!("\"{alias}\""),
                    None => quote_column(&order.column)?,
                };
                parts.push(format!("{column} {}", order.direction.as_sql()));
            }
            w.push(" ORDER BY ").push(&parts.join(", "));
        }
        if let Some(limit) = self.limit {
            w.push(&format!(" LIMIT {limit}"));
            if let Some(offset) = self.offset {
                w.push(&format!(" OFFSET {offset}"));
            }
        }
        Ok(w.finish())
    }

    /// Render `SELECT COUNT(*) AS "count"` over the same rows, ignoring
    /// ordering, limit and offset.
    pub fn render_count(&self, registry: &Registry) -> Result<(String, Vec<Value>), BuildError> {
        self.validate(registry)?;
        if !self.distinct && self.columns.is_empty() {
            let mut w = SqlWriter::new();
            w.push("SELECT COUNT(*) AS \"count\"");
            self.render_source(&mut w)?;
            return Ok(w.finish());
        }
        let mut inner = self.clone();
        inner.orders.clear();
        inner.limit = None;
        inner.offset = None;
        let (sql, params) = inner.render(registry)?;
        Ok((
            format!("SELECT COUNT(*) AS \"count\" FROM ({sql}) AS \"counted\""),
            params,
        ))
    }

    /// ` FROM <table> <joins> WHERE <tree>`
    fn render_source(&self, w: &mut SqlWriter) -> Result<(), BuildError> {
        w.push(" FROM ").push(&quote_identifier(&self.table)?);
        for join in &self.joins {
            join.render(w)?;
        }
        if !self.condition.is_empty() || self.condition.error().is_some() {
            w.push(" WHERE ");
            self.condition.render(w)?;
        }
        Ok(())
    }

    fn select_list(&self) -> Result<String, BuildError> {
        if self.columns.is_empty() {
            return Ok(format!("{}.*", quote_identifier(&self.table)?));
        }
        let mut parts = Vec::with_capacity(self.columns.len());
        for entry in &self.columns {
            let (column, alias) = split_alias(entry)?;
            let rendered = quote_column(column)?;
            parts.push(match alias {
                Some(alias) => format!("{rendered} AS \"{alias}\""),
                None => rendered,
            });
        }
        Ok(parts.join(", "))
    }

    fn alias_named(&self, name: &str) -> Option<&str> {
        self.columns.iter().find_map(|entry| match split_alias(entry) {
            Ok((_, Some(alias))) if alias == name => Some(alias),
            _ => None,
        })
    }

    fn validate(&self, registry: &Registry) -> Result<(), BuildError> {
        let mut tables = vec![self.table.as_str()];
        tables.extend(self.joins.iter().map(|j| j.table.as_str()));
        for table in &tables {
            validate_identifier(table)?;
        }

        let check = |reference: &str| -> Result<(), BuildError> {
            check_column(registry, &self.table, &tables, ColumnRef::parse(reference)?)
        };

        for predicate in self.condition.predicates() {
            check(&predicate.column)?;
        }
        for join in &self.joins {
            check(&join.left)?;
            check(&join.right)?;
            if let Some(constraint) = &join.constraint {
                for predicate in constraint.predicates() {
                    check(&predicate.column)?;
                }
            }
        }
        for entry in &self.columns {
            check(split_alias(entry)?.0)?;
        }
        for order in &self.orders {
            if self.alias_named(&order.column).is_none() {
                check(&order.column)?;
            }
        }
        Ok(())
    }
}

/// Check a column reference against the registered schemas.
///
/// Qualified references are checked against their table when it is
/// registered. Unqualified references must exist on at least one table of
/// the query, unless one of those tables is unregistered.
fn check_column(
    registry: &Registry,
    base: &str,
    tables: &[&str],
    reference: ColumnRef<'_>,
) -> Result<(), BuildError> {
    if reference.is_wildcard() {
        return Ok(());
    }
    match reference.table {
        Some(table) => match registry.get(table) {
            Some(entity) if !entity.schema().has_column(reference.column) => {
                Err(BuildError::UnknownColumn {
                    table: table.to_string(),
                    column: reference.column.to_string(),
                })
            }
            _ => Ok(()),
        },
        None => {
            let entities: Option<Vec<_>> = tables.iter().map(|t| registry.get(t)).collect();
            match entities {
                Some(entities)
                    if !entities
                        .iter()
                        .any(|e| e.schema().has_column(reference.column)) =>
                {
                    Err(BuildError::UnknownColumn {
                        table: base.to_string(),
                        column: reference.column.to_string(),
                    })
                }
                _ => Ok(()),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EagerLoad {
    pub relation: String,
    pub constraint: Option<Condition>,
}

/// Fluent SELECT builder bound to a [`Context`].
///
/// Builder methods consume and return the query; execution methods
/// (`results`, `first`, `each`, ...) borrow it, so a built query can run
/// more than once.
///
/// # Example
///
/// ```no_run
/// use mooring::query::{Filter, Order};
/// # fn demo(ctx: &std::rc::Rc<mooring::Context>) -> Result<(), mooring::RecordError> {
/// let youngest = ctx
///     .query("people")
///     .where_("name", "LIKE", "%Smith")
///     .order_by("birth_date", Order::Desc)
///     .take(1)
///     .results()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Query {
    pub(crate) ctx: Rc<Context>,
    pub(crate) spec: QuerySpec,
    pub(crate) eager: Vec<EagerLoad>,
}

impl Query {
    pub fn new(ctx: Rc<Context>, table: impl Into<String>) -> Self {
        Self {
            ctx,
            spec: QuerySpec::new(table),
            eager: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.spec.table
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn context(&self) -> &Rc<Context> {
        &self.ctx
    }

    /// INNER JOIN `table` ON `left <operator> right`.
    pub fn join(self, table: &str, left: &str, operator: Operator, right: &str) -> Self {
        self.push_join(table, left, operator, right, JoinKind::Inner, None)
    }

    /// LEFT JOIN `table` ON `left <operator> right`.
    pub fn left_join(self, table: &str, left: &str, operator: Operator, right: &str) -> Self {
        self.push_join(table, left, operator, right, JoinKind::Left, None)
    }

    /// Join with extra predicates in the ON clause, built by `constrain`.
    pub fn join_with<F>(
        self,
        table: &str,
        left: &str,
        operator: Operator,
        right: &str,
        kind: JoinKind,
        constrain: F,
    ) -> Self
    where
        F: FnOnce(Condition) -> Condition,
    {
        let constraint = constrain(Condition::new());
        self.push_join(table, left, operator, right, kind, Some(constraint))
    }

    pub(crate) fn push_join(
        mut self,
        table: &str,
        left: &str,
        operator: Operator,
        right: &str,
        kind: JoinKind,
        constraint: Option<Condition>,
    ) -> Self {
        self.spec.joins.push(JoinSpec {
            table: table.to_string(),
            left: left.to_string(),
            operator,
            right: right.to_string(),
            constraint,
            kind,
        });
        self
    }

    /// Append an ordering term; earlier terms take precedence.
    pub fn order_by(mut self, column: &str, direction: Order) -> Self {
        self.spec.orders.push(OrderBy {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn take(mut self, limit: u64) -> Self {
        self.spec.limit = Some(limit);
        self
    }

    /// Skip `offset` rows; requires [`take`](Self::take).
    pub fn skip(mut self, offset: u64) -> Self {
        self.spec.offset = Some(offset);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.spec.distinct = true;
        self
    }

    /// Replace the select list (`"table.column"`, `"table.*"`, `"col AS alias"`).
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Eager-load `relation` for every record `results` returns.
    pub fn with(mut self, relation: &str) -> Self {
        self.eager.push(EagerLoad {
            relation: relation.to_string(),
            constraint: None,
        });
        self
    }

    /// Eager-load `relation`, filtering the related rows with `constrain`.
    pub fn with_constrained<F>(mut self, relation: &str, constrain: F) -> Self
    where
        F: FnOnce(Condition) -> Condition,
    {
        self.eager.push(EagerLoad {
            relation: relation.to_string(),
            constraint: Some(constrain(Condition::new())),
        });
        self
    }

    /// Rendered SELECT and its parameters.
    pub fn to_sql(&self) -> Result<(String, Vec<Value>), BuildError> {
        self.spec.render(self.ctx.registry())
    }
}

impl Filter for Query {
    fn condition_mut(&mut self) -> &mut Condition {
        &mut self.spec.condition
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("spec", &self.spec)
            .field("eager", &self.eager)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{people_context, ScriptedExecutor};

    fn query(table: &str) -> Query {
        let (executor, _log) = ScriptedExecutor::new();
        people_context(executor).query(table)
    }

    #[test]
    fn test_default_select_list() {
        let (sql, params) = query("people").to_sql().unwrap();
        assert_eq!(sql, r#"SELECT "people".* FROM "people""#);
        assert!(params.is_empty());
    }

    #[test]
    fn test_full_statement_shape() {
        let (sql, params) = query("people")
            .distinct()
            .where_("name", "LIKE", "%Smith")
            .order_by("birth_date", Order::Desc)
            .order_by("id", Order::Asc)
            .take(10)
            .skip(20)
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            r#"SELECT DISTINCT "people".* FROM "people" WHERE ("name" LIKE $1) ORDER BY "birth_date" DESC, "id" ASC LIMIT 10 OFFSET 20"#
        );
        assert_eq!(params, vec![Value::from("%Smith")]);
    }

    #[test]
    fn test_join_with_nested_constraint() {
        let (sql, params) = query("groups")
            .join_with(
                "groups_to_people",
                "groups.id",
                Operator::Eq,
                "groups_to_people.group_id",
                JoinKind::Left,
                |c| c.where_eq("groups_to_people.person_id", 3),
            )
            .where_eq("groups.name", "admins")
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            r#"SELECT "groups".* FROM "groups" LEFT JOIN "groups_to_people" ON ("groups"."id" = "groups_to_people"."group_id" AND ("groups_to_people"."person_id" = $1)) WHERE ("groups"."name" = $2)"#
        );
        assert_eq!(params, vec![Value::Int(3), Value::from("admins")]);
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let err = query("people").where_eq("shoe_size", 44).to_sql().unwrap_err();
        assert_eq!(
            err,
            BuildError::UnknownColumn {
                table: "people".into(),
                column: "shoe_size".into()
            }
        );
        let err = query("people").order_by("people.shoe_size", Order::Asc).to_sql().unwrap_err();
        assert!(matches!(err, BuildError::UnknownColumn { .. }));
    }

    #[test]
    fn test_unregistered_tables_only_check_syntax() {
        let (sql, _) = query("groups_to_people")
            .columns(["group_id"])
            .where_eq("person_id", 1)
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            r#"SELECT "group_id" FROM "groups_to_people" WHERE ("person_id" = $1)"#
        );
        assert!(query("bad table").to_sql().is_err());
    }

    #[test]
    fn test_column_aliases() {
        let (sql, _) = query("people")
            .columns(["people.*", "people.id AS person_key"])
            .order_by("person_key", Order::Asc)
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            r#"SELECT "people".*, "people"."id" AS "person_key" FROM "people" ORDER BY "person_key" ASC"#
        );
    }

    #[test]
    fn test_offset_requires_limit() {
        assert_eq!(
            query("people").skip(5).to_sql(),
            Err(BuildError::OffsetWithoutLimit)
        );
    }

    #[test]
    fn test_join_rejects_like_operator() {
        let result = query("people")
            .join("groups", "people.id", Operator::Like, "groups.id")
            .to_sql();
        assert!(matches!(result, Err(BuildError::InvalidValue(_))));
    }

    #[test]
    fn test_count_sql() {
        let q = query("people").where_eq("name", "Ada").order_by("id", Order::Asc).take(3);
        let (sql, _) = q.spec().render_count(q.context().registry()).unwrap();
        assert_eq!(sql, r#"SELECT COUNT(*) AS "count" FROM "people" WHERE ("name" = $1)"#);

        let q = query("people").distinct().where_eq("name", "Ada");
        let (sql, _) = q.spec().render_count(q.context().registry()).unwrap();
        assert_eq!(
            sql,
            r#"SELECT COUNT(*) AS "count" FROM (SELECT DISTINCT "people".* FROM "people" WHERE ("name" = $1)) AS "counted""#
        );
    }

    #[test]
    fn test_order_parse() {
        assert_eq!(Order::parse("desc"), Some(Order::Desc));
        assert_eq!(Order::parse(" ASC "), Some(Order::Asc));
        assert_eq!(Order::parse("sideways"), None);
    }
}
