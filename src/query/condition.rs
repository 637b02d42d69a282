//! Boolean predicate trees.
//!
//! A [`Condition`] is built incrementally: every `where_*` call appends a
//! leaf, combined with the tree so far through AND or OR. The tree grows
//! left-deep in call order and is never rebalanced, so
//! `a.where(A).or_where(B).where(C)` means `((A OR B) AND C)`. Groups opened
//! with [`Filter::where_group`] become a single right-hand child, which is how
//! `A AND (B OR C)` is expressed.
//!
//! Rendering is fully parenthesised and every value is a bound parameter.
//!
//! # Example
//!
//! ```rust
//! use mooring::query::{Condition, Filter, Operator};
//!
//! let condition = Condition::new()
//!     .where_op("age", Operator::Gte, 18)
//!     .where_group(|g| g.where_eq("city", "Oslo").or_where_eq("city", "Bergen"));
//!
//! let (sql, params) = condition.to_sql().unwrap();
//! assert_eq!(sql, r#"("age" >= $1 AND ("city" = $2 OR "city" = $3))"#);
//! assert_eq!(params.len(), 3);
//! ```

use super::error::BuildError;
use super::sql::{ColumnRef, SqlWriter};
use crate::value::Value;
use std::fmt;
use std::str::FromStr;

/// Leaf comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
    In,
    NotIn,
}

impl Operator {
    /// Parse operator text such as `"="`, `"<>"`, `"like"` or `"NOT IN"`.
    pub fn parse(text: &str) -> Result<Self, BuildError> {
        let normalized = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        match normalized.as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::NotEq),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "LIKE" => Ok(Operator::Like),
            "NOT LIKE" => Ok(Operator::NotLike),
            "IN" => Ok(Operator::In),
            "NOT IN" => Ok(Operator::NotIn),
            _ => Err(BuildError::UnknownOperator(text.to_string())),
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
        }
    }

    /// Equality and ordering comparisons (usable in join constraints).
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::NotEq | Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte
        )
    }
}

impl FromStr for Operator {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::parse(s)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    fn as_sql(self) -> &'static str {
        match self {
            Conjunction::And => " AND ",
            Conjunction::Or => " OR ",
        }
    }
}

/// One `(column, operator, value)` comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
}

impl Predicate {
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    /// Interpret the positional `(column, second, third)` call form.
    ///
    /// A literal `true` in second position means plain equality against
    /// `third`. Otherwise `second` must be operator text and `third` is the
    /// value, which may itself be `true`.
    pub fn positional(column: &str, second: Value, third: Value) -> Result<Self, BuildError> {
        if second == Value::Bool(true) {
            return Ok(Self::new(column, Operator::Eq, third));
        }
        match second {
            Value::Text(op) => Ok(Self::new(column, Operator::parse(&op)?, third)),
            other => Err(BuildError::UnknownOperator(other.to_string())),
        }
    }

    fn render(&self, w: &mut SqlWriter) -> Result<(), BuildError> {
        let column = ColumnRef::parse(&self.column)?;
        if column.is_wildcard() {
            return Err(BuildError::InvalidIdentifier(self.column.clone()));
        }
        let col = column.render();
        match (self.operator, &self.value) {
            (Operator::Eq, Value::Null) => {
                w.push(&format!("{col} IS NULL"));
            }
            (Operator::NotEq, Value::Null) => {
                w.push(&format!("{col} IS NOT NULL"));
            }
            (op @ (Operator::In | Operator::NotIn | Operator::Eq | Operator::NotEq), Value::Array(items)) => {
                let negated = matches!(op, Operator::NotIn | Operator::NotEq);
                render_list(w, &col, negated, items);
            }
            (op @ (Operator::In | Operator::NotIn), scalar) => {
                render_list(w, &col, op == Operator::NotIn, std::slice::from_ref(scalar));
            }
            (op, Value::Array(_)) => {
                return Err(BuildError::InvalidValue(format!(
                    "operator {op} cannot compare {} against a list",
                    self.column
                )));
            }
            (op, value) => {
                w.push(&format!("{col} {op} ")).bind(value.clone());
            }
        }
        Ok(())
    }
}

fn render_list(w: &mut SqlWriter, col: &str, negated: bool, items: &[Value]) {
    if items.is_empty() {
        w.push(if negated { "1 = 1" } else { "1 = 0" });
        return;
    }
    w.push(col).push(if negated { " NOT IN (" } else { " IN (" });
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.bind(item.clone());
    }
    w.push(")");
}

/// A node of the predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    Leaf(Predicate),
    Composite {
        left: Box<ConditionNode>,
        conjunction: Conjunction,
        right: Box<ConditionNode>,
    },
}

impl ConditionNode {
    fn render(&self, w: &mut SqlWriter) -> Result<(), BuildError> {
        match self {
            ConditionNode::Leaf(predicate) => predicate.render(w),
            ConditionNode::Composite {
                left,
                conjunction,
                right,
            } => {
                w.push("(");
                left.render(w)?;
                w.push(conjunction.as_sql());
                right.render(w)?;
                w.push(")");
                Ok(())
            }
        }
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Predicate>) {
        match self {
            ConditionNode::Leaf(predicate) => out.push(predicate),
            ConditionNode::Composite { left, right, .. } => {
                left.collect(out);
                right.collect(out);
            }
        }
    }
}

/// A predicate tree under construction.
///
/// The first construction error is kept and reported when the tree is
/// rendered, so a fluent chain never has to stop halfway.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    root: Option<ConditionNode>,
    error: Option<BuildError>,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn root(&self) -> Option<&ConditionNode> {
        self.root.as_ref()
    }

    pub fn error(&self) -> Option<&BuildError> {
        self.error.as_ref()
    }

    /// Record a construction error; only the first one is kept.
    pub(crate) fn fail(&mut self, error: BuildError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn append(&mut self, conjunction: Conjunction, node: ConditionNode) {
        self.root = Some(match self.root.take() {
            None => node,
            Some(left) => ConditionNode::Composite {
                left: Box::new(left),
                conjunction,
                right: Box::new(node),
            },
        });
    }

    pub(crate) fn push(&mut self, conjunction: Conjunction, predicate: Result<Predicate, BuildError>) {
        match predicate {
            Ok(predicate) => self.append(conjunction, ConditionNode::Leaf(predicate)),
            Err(e) => self.fail(e),
        }
    }

    pub(crate) fn push_group(&mut self, conjunction: Conjunction, group: Condition) {
        if let Some(e) = group.error {
            self.fail(e);
            return;
        }
        match group.root {
            Some(node) => self.append(conjunction, node),
            None => self.fail(BuildError::MalformedGroup(
                "nested group contains no predicate".to_string(),
            )),
        }
    }

    /// Leaves in left-to-right order.
    pub fn predicates(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            root.collect(&mut out);
        }
        out
    }

    /// Append the parenthesised tree to `w`
    ///
    /// Returns `Ok(false)` without writing anything when the tree is empty.
    ///
    /// # Errors
    ///
    /// Returns the first construction error, or a rendering error such as an
    /// invalid column reference.
    pub fn render(&self, w: &mut SqlWriter) -> Result<bool, BuildError> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        match &self.root {
            None => Ok(false),
            Some(leaf @ ConditionNode::Leaf(_)) => {
                w.push("(");
                leaf.render(w)?;
                w.push(")");
                Ok(true)
            }
            Some(node) => {
                node.render(w)?;
                Ok(true)
            }
        }
    }

    /// Render on its own, numbering parameters from `$1`.
    pub fn to_sql(&self) -> Result<(String, Vec<Value>), BuildError> {
        let mut w = SqlWriter::new();
        self.render(&mut w)?;
        Ok(w.finish())
    }
}

/// Fluent `where` family shared by queries, join constraints and groups.
pub trait Filter: Sized {
    fn condition_mut(&mut self) -> &mut Condition;

    /// Positional form: `where_(col, "LIKE", "J%")`, or `where_(col, true, value)`
    /// for plain equality.
    fn where_(self, column: &str, second: impl Into<Value>, third: impl Into<Value>) -> Self {
        self.and_where(column, second, third)
    }

    fn and_where(mut self, column: &str, second: impl Into<Value>, third: impl Into<Value>) -> Self {
        let predicate = Predicate::positional(column, second.into(), third.into());
        self.condition_mut().push(Conjunction::And, predicate);
        self
    }

    fn or_where(mut self, column: &str, second: impl Into<Value>, third: impl Into<Value>) -> Self {
        let predicate = Predicate::positional(column, second.into(), third.into());
        self.condition_mut().push(Conjunction::Or, predicate);
        self
    }

    fn where_op(mut self, column: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.condition_mut()
            .push(Conjunction::And, Ok(Predicate::new(column, operator, value)));
        self
    }

    fn or_where_op(mut self, column: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.condition_mut()
            .push(Conjunction::Or, Ok(Predicate::new(column, operator, value)));
        self
    }

    fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_op(column, Operator::Eq, value)
    }

    fn or_where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.or_where_op(column, Operator::Eq, value)
    }

    fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list = Value::Array(values.into_iter().map(Into::into).collect());
        self.where_op(column, Operator::In, list)
    }

    fn where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list = Value::Array(values.into_iter().map(Into::into).collect());
        self.where_op(column, Operator::NotIn, list)
    }

    fn where_null(self, column: &str) -> Self {
        self.where_op(column, Operator::Eq, Value::Null)
    }

    fn where_not_null(self, column: &str) -> Self {
        self.where_op(column, Operator::NotEq, Value::Null)
    }

    /// AND a parenthesised group built by `build`.
    fn where_group<F>(mut self, build: F) -> Self
    where
        F: FnOnce(Condition) -> Condition,
    {
        let group = build(Condition::new());
        self.condition_mut().push_group(Conjunction::And, group);
        self
    }

    /// OR a parenthesised group built by `build`.
    fn or_where_group<F>(mut self, build: F) -> Self
    where
        F: FnOnce(Condition) -> Condition,
    {
        let group = build(Condition::new());
        self.condition_mut().push_group(Conjunction::Or, group);
        self
    }
}

impl Filter for Condition {
    fn condition_mut(&mut self) -> &mut Condition {
        self
    }
}
