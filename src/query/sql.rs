//! SQL text assembly helpers.
//!
//! Identifiers are validated against a conservative pattern and always
//! emitted double-quoted; values never enter the SQL text and are bound as
//! `$n` parameters through [`SqlWriter::bind`].

use super::error::BuildError;
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

static ALIAS_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+as\s+").expect("alias pattern is valid"));

/// Check that `name` is a plain SQL identifier.
pub fn validate_identifier(name: &str) -> Result<(), BuildError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(BuildError::InvalidIdentifier(name.to_string()))
    }
}

/// Validate and double-quote an identifier.
pub fn quote_identifier(name: &str) -> Result<String, BuildError> {
    validate_identifier(name)?;
    Ok(format!("\"{name}\""))
}

/// A parsed `table.column`, `column`, `table.*` or `*` reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ColumnRef<'a> {
    pub table: Option<&'a str>,
    pub column: &'a str,
}

impl<'a> ColumnRef<'a> {
    pub fn parse(reference: &'a str) -> Result<Self, BuildError> {
        let reference = reference.trim();
        let (table, column) = match reference.split_once('.') {
            Some((table, column)) => (Some(table), column),
            None => (None, reference),
        };
        if let Some(table) = table {
            validate_identifier(table)?;
        }
        if column != "*" {
            validate_identifier(column)
                .map_err(|_| BuildError::InvalidIdentifier(reference.to_string()))?;
        }
        Ok(Self { table, column })
    }

    pub fn is_wildcard(&self) -> bool {
        self.column == "*"
    }

    pub fn render(&self) -> String {
        let column = if self.is_wildcard() {
            "*".to_string()
        } else {
            format!("\"{}\"", self.column)
        };
        match self.table {
            Some(table) => format!("\"{table}\".{column}"),
            None => column,
        }
    }
}

/// Validate and quote a column reference (`"t"."c"`, `"c"`, `"t".*`).
pub fn quote_column(reference: &str) -> Result<String, BuildError> {
    Ok(ColumnRef::parse(reference)?.render())
}

/// Split a select-list entry into its column reference and optional alias.
pub(crate) fn split_alias(entry: &str) -> Result<(&str, Option<&str>), BuildError> {
    let parts: Vec<&str> = ALIAS_SPLIT.splitn(entry.trim(), 2).collect();
    match parts.as_slice() {
        [column] => Ok((*column, None)),
        [column, alias] => {
            validate_identifier(alias)?;
            Ok((*column, Some(*alias)))
        }
        _ => Err(BuildError::InvalidIdentifier(entry.to_string())),
    }
}

/// Accumulates SQL text and the parameters bound into it.
#[derive(Debug, Default)]
pub struct SqlWriter {
    sql: String,
    params: Vec<Value>,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    /// Bind `value` and write its placeholder.
    pub fn bind(&mut self, value: Value) -> &mut Self {
        self.params.push(value);
        let placeholder = format!("${}", self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn finish(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("people").unwrap(), "\"people\"");
        assert!(quote_identifier("people; DROP TABLE x").is_err());
        assert!(quote_identifier("1abc").is_err());
        assert!(quote_identifier("").is_err());
    }

    #[test]
    fn test_quote_column_forms() {
        assert_eq!(quote_column("name").unwrap(), "\"name\"");
        assert_eq!(quote_column("people.name").unwrap(), "\"people\".\"name\"");
        assert_eq!(quote_column("people.*").unwrap(), "\"people\".*");
        assert_eq!(quote_column("*").unwrap(), "*");
        assert!(quote_column("people.na me").is_err());
        assert!(quote_column("a.b.c").is_err());
    }

    #[test]
    fn test_split_alias() {
        assert_eq!(split_alias("a.b AS owner").unwrap(), ("a.b", Some("owner")));
        assert_eq!(split_alias("a.b as owner").unwrap(), ("a.b", Some("owner")));
        assert_eq!(split_alias("a.b").unwrap(), ("a.b", None));
        assert!(split_alias("a.b AS bad alias").is_err());
    }

    #[test]
    fn test_writer_numbers_placeholders() {
        let mut w = SqlWriter::new();
        w.push("a = ").bind(Value::Int(1)).push(" AND b = ").bind(Value::from("x"));
        let (sql, params) = w.finish();
        assert_eq!(sql, "a = $1 AND b = $2");
        assert_eq!(params, vec![Value::Int(1), Value::from("x")]);
    }
}
