//! INSERT, UPDATE and DELETE rendering.
//!
//! Write statements share the identifier rules and the predicate tree of
//! SELECT. UPDATE and DELETE refuse to render without a predicate.

use super::condition::{Condition, Filter};
use super::error::BuildError;
use super::sql::{quote_identifier, SqlWriter};
use crate::value::Value;

/// `INSERT INTO <table> (<cols>) VALUES (...), (...) [ON CONFLICT DO NOTHING] [RETURNING <col>]`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsertStatement {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    ignore_conflicts: bool,
    returning: Option<String>,
}

impl InsertStatement {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn values(mut self, row: Vec<Value>) -> Self {
        self.rows.push(row);
        self
    }

    /// Skip rows that violate a unique constraint instead of failing.
    pub fn on_conflict_do_nothing(mut self) -> Self {
        self.ignore_conflicts = true;
        self
    }

    pub fn returning(mut self, column: impl Into<String>) -> Self {
        self.returning = Some(column.into());
        self
    }

    /// Render the statement
    ///
    /// With no columns a single `DEFAULT VALUES` row is inserted.
    ///
    /// # Errors
    ///
    /// Returns `BuildError` for invalid identifiers or rows whose width does
    /// not match the column list.
    pub fn render(&self) -> Result<(String, Vec<Value>), BuildError> {
        let mut w = SqlWriter::new();
        w.push("INSERT INTO ").push(&quote_identifier(&self.table)?);
        if self.columns.is_empty() {
            if self.rows.iter().any(|row| !row.is_empty()) {
                return Err(BuildError::InvalidValue(format!(
                    "INSERT into {} has values but no columns",
                    self.table
                )));
            }
            w.push(" DEFAULT VALUES");
        } else {
            let quoted = self
                .columns
                .iter()
                .map(|c| quote_identifier(c))
                .collect::<Result<Vec<_>, _>>()?;
            w.push(" (").push(&quoted.join(", ")).push(") VALUES ");
            if self.rows.is_empty() {
                return Err(BuildError::InvalidValue(format!(
                    "INSERT into {} has no rows",
                    self.table
                )));
            }
            for (i, row) in self.rows.iter().enumerate() {
                if row.len() != self.columns.len() {
                    return Err(BuildError::InvalidValue(format!(
                        "INSERT row {i} has {} values for {} columns",
                        row.len(),
                        self.columns.len()
                    )));
                }
                if i > 0 {
                    w.push(", ");
                }
                w.push("(");
                for (j, value) in row.iter().enumerate() {
                    if j > 0 {
                        w.push(", ");
                    }
                    w.bind(value.clone());
                }
                w.push(")");
            }
        }
        if self.ignore_conflicts {
            w.push(" ON CONFLICT DO NOTHING");
        }
        if let Some(column) = &self.returning {
            w.push(" RETURNING ").push(&quote_identifier(column)?);
        }
        Ok(w.finish())
    }
}

/// `UPDATE <table> SET <col> = $n, ... WHERE <tree>`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateStatement {
    table: String,
    assignments: Vec<(String, Value)>,
    condition: Condition,
}

impl UpdateStatement {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    pub fn render(&self) -> Result<(String, Vec<Value>), BuildError> {
        if self.assignments.is_empty() {
            return Err(BuildError::EmptyAssignment(self.table.clone()));
        }
        let mut w = SqlWriter::new();
        w.push("UPDATE ").push(&quote_identifier(&self.table)?).push(" SET ");
        for (i, (column, value)) in self.assignments.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push(&quote_identifier(column)?).push(" = ").bind(value.clone());
        }
        w.push(" WHERE ");
        if !self.condition.render(&mut w)? {
            return Err(BuildError::EmptyPredicate("UPDATE".to_string()));
        }
        Ok(w.finish())
    }
}

impl Filter for UpdateStatement {
    fn condition_mut(&mut self) -> &mut Condition {
        &mut self.condition
    }
}

/// `DELETE FROM <table> WHERE <tree>`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteStatement {
    table: String,
    condition: Condition,
}

impl DeleteStatement {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn render(&self) -> Result<(String, Vec<Value>), BuildError> {
        let mut w = SqlWriter::new();
        w.push("DELETE FROM ").push(&quote_identifier(&self.table)?).push(" WHERE ");
        if !self.condition.render(&mut w)? {
            return Err(BuildError::EmptyPredicate("DELETE".to_string()));
        }
        Ok(w.finish())
    }
}

impl Filter for DeleteStatement {
    fn condition_mut(&mut self) -> &mut Condition {
        &mut self.condition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_returning() {
        let (sql, params) = InsertStatement::new("people")
            .columns(["name", "email"])
            .values(vec![Value::from("Ada"), Value::from("ada@example.com")])
            .returning("id")
            .render()
            .unwrap();
        assert_eq!(
            sql,
            r#"INSERT INTO "people" ("name", "email") VALUES ($1, $2) RETURNING "id""#
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_insert_default_values() {
        let (sql, params) = InsertStatement::new("people").returning("id").render().unwrap();
        assert_eq!(sql, r#"INSERT INTO "people" DEFAULT VALUES RETURNING "id""#);
        assert!(params.is_empty());
    }

    #[test]
    fn test_batched_insert_or_ignore() {
        let (sql, params) = InsertStatement::new("groups_to_people")
            .columns(["person_id", "group_id"])
            .values(vec![Value::Int(1), Value::Int(10)])
            .values(vec![Value::Int(1), Value::Int(11)])
            .on_conflict_do_nothing()
            .render()
            .unwrap();
        assert_eq!(
            sql,
            r#"INSERT INTO "groups_to_people" ("person_id", "group_id") VALUES ($1, $2), ($3, $4) ON CONFLICT DO NOTHING"#
        );
        assert_eq!(params, vec![Value::Int(1), Value::Int(10), Value::Int(1), Value::Int(11)]);
    }

    #[test]
    fn test_insert_row_width_mismatch() {
        let result = InsertStatement::new("people")
            .columns(["name", "email"])
            .values(vec![Value::from("Ada")])
            .render();
        assert!(matches!(result, Err(BuildError::InvalidValue(_))));
    }

    #[test]
    fn test_update_dirty_columns() {
        let (sql, params) = UpdateStatement::new("people")
            .set("name", "Grace")
            .where_eq("id", 4)
            .render()
            .unwrap();
        assert_eq!(sql, r#"UPDATE "people" SET "name" = $1 WHERE ("id" = $2)"#);
        assert_eq!(params, vec![Value::from("Grace"), Value::Int(4)]);
    }

    #[test]
    fn test_update_requires_assignment_and_predicate() {
        assert!(matches!(
            UpdateStatement::new("people").where_eq("id", 1).render(),
            Err(BuildError::EmptyAssignment(_))
        ));
        assert!(matches!(
            UpdateStatement::new("people").set("name", "x").render(),
            Err(BuildError::EmptyPredicate(_))
        ));
    }

    #[test]
    fn test_delete_with_in_list() {
        let (sql, params) = DeleteStatement::new("groups_to_people")
            .where_eq("person_id", 1)
            .where_in("group_id", [10, 11])
            .render()
            .unwrap();
        assert_eq!(
            sql,
            r#"DELETE FROM "groups_to_people" WHERE ("person_id" = $1 AND "group_id" IN ($2, $3))"#
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_delete_requires_predicate() {
        assert_eq!(
            DeleteStatement::new("people").render(),
            Err(BuildError::EmptyPredicate("DELETE".into()))
        );
    }
}
