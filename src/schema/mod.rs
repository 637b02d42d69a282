//! Table schemas and the entity registry.
//!
//! A [`TableSchema`] describes one table: its primary-key column and the
//! column list with each column's [`ColumnType`] (the raw → typed conversion
//! rule) and optional default value. Schemas are wrapped in an
//! [`Entity`](entity::Entity) that adds the fillable list, accessor hooks and
//! relations, and entities are collected in a [`Registry`].

pub mod entity;
pub mod registry;

pub use entity::{Accessors, Entity, EntityBuilder, Fillable};
pub use registry::{Registry, RegistryBuilder};

use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use uuid::Uuid;

/// Conversion rule applied to a column's raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnType {
    Integer,
    Float,
    Decimal,
    Text,
    Boolean,
    Date,
    DateTime,
    Json,
    Uuid,
    Bytes,
    /// No conversion
    #[default]
    Any,
}

impl ColumnType {
    /// Convert a raw value to the typed form for this column
    ///
    /// Only scalar values are converted; object forms (dates, decimals, ...)
    /// and nulls pass through untouched, as does any scalar the rule cannot
    /// interpret.
    ///
    /// # Example
    ///
    /// ```rust
    /// use mooring::schema::ColumnType;
    /// use mooring::Value;
    /// use chrono::NaiveDate;
    ///
    /// let typed = ColumnType::Date.to_typed(&Value::from("1990-05-17"));
    /// assert_eq!(typed, Value::Date(NaiveDate::from_ymd_opt(1990, 5, 17).unwrap()));
    /// ```
    pub fn to_typed(&self, raw: &Value) -> Value {
        if raw.is_null() || !raw.is_scalar() {
            return raw.clone();
        }
        let converted = match self {
            ColumnType::Any => None,
            ColumnType::Integer => to_integer(raw),
            ColumnType::Float => raw.as_f64().map(Value::Float),
            ColumnType::Decimal => raw.as_decimal().map(Value::Decimal),
            ColumnType::Text => to_text(raw),
            ColumnType::Boolean => to_boolean(raw),
            ColumnType::Date => to_date(raw),
            ColumnType::DateTime => to_datetime(raw),
            ColumnType::Json => match raw {
                Value::Text(s) => serde_json::from_str(s).ok().map(Value::Json),
                _ => None,
            },
            ColumnType::Uuid => match raw {
                Value::Text(s) => Uuid::parse_str(s.trim()).ok().map(Value::Uuid),
                Value::Bytes(b) => Uuid::from_slice(b).ok().map(Value::Uuid),
                _ => None,
            },
            ColumnType::Bytes => match raw {
                Value::Text(s) => Some(Value::Bytes(s.clone().into_bytes())),
                _ => None,
            },
        };
        converted.unwrap_or_else(|| raw.clone())
    }
}

fn to_integer(raw: &Value) -> Option<Value> {
    match raw {
        Value::Int(_) => None,
        Value::Bool(b) => Some(Value::Int(i64::from(*b))),
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(Value::Int(*f as i64)),
        Value::Text(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().map(Value::Int).or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| Value::Int(f as i64))
            })
        }
        _ => None,
    }
}

fn to_text(raw: &Value) -> Option<Value> {
    match raw {
        Value::Int(i) => Some(Value::Text(i.to_string())),
        Value::Float(f) => Some(Value::Text(f.to_string())),
        Value::Bool(b) => Some(Value::Text(if *b { "1" } else { "0" }.to_string())),
        Value::Bytes(b) => String::from_utf8(b.clone()).ok().map(Value::Text),
        _ => None,
    }
}

fn to_boolean(raw: &Value) -> Option<Value> {
    match raw {
        Value::Int(i) => Some(Value::Bool(*i != 0)),
        Value::Float(f) => Some(Value::Bool(*f != 0.0)),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "t" | "yes" | "y" | "on" => Some(Value::Bool(true)),
            "0" | "false" | "f" | "no" | "n" | "off" | "" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn to_date(raw: &Value) -> Option<Value> {
    match raw {
        Value::Text(s) => {
            let s = s.trim();
            let date_part = s.get(..10).unwrap_or(s);
            NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
                .ok()
                .map(Value::Date)
        }
        Value::Int(ts) => DateTime::from_timestamp(*ts, 0).map(|dt| Value::Date(dt.date_naive())),
        _ => None,
    }
}

fn to_datetime(raw: &Value) -> Option<Value> {
    match raw {
        Value::Text(s) => parse_datetime(s.trim()).map(Value::DateTime),
        Value::Int(ts) => DateTime::from_timestamp(*ts, 0).map(|dt| Value::DateTime(dt.naive_utc())),
        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub default: Option<Value>,
}

/// Table definition: name, primary-key column and columns.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    name: String,
    primary_key: String,
    columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Start a schema for `name` whose primary key is `primary_key`
    ///
    /// The primary-key column is registered as an integer column; call
    /// [`column`](Self::column) with the same name to change its type.
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        let primary_key = primary_key.into();
        Self {
            name: name.into(),
            columns: vec![ColumnDef {
                name: primary_key.clone(),
                column_type: ColumnType::Integer,
                default: None,
            }],
            primary_key,
        }
    }

    /// Add (or redefine) a column.
    pub fn column(self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.define(name.into(), column_type, None)
    }

    /// Add (or redefine) a column with a default value.
    pub fn column_with_default(
        self,
        name: impl Into<String>,
        column_type: ColumnType,
        default: impl Into<Value>,
    ) -> Self {
        self.define(name.into(), column_type, Some(default.into()))
    }

    fn define(mut self, name: String, column_type: ColumnType, default: Option<Value>) -> Self {
        let def = ColumnDef {
            name,
            column_type,
            default,
        };
        match self.columns.iter_mut().find(|c| c.name == def.name) {
            Some(existing) => *existing = def,
            None => self.columns.push(def),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_def(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_def(name).is_some()
    }

    /// Conversion rule for `name`; unknown columns convert as [`ColumnType::Any`].
    pub fn column_type(&self, name: &str) -> ColumnType {
        self.column_def(name)
            .map(|c| c.column_type)
            .unwrap_or_default()
    }

    /// Canonical key for a primary-key value
    ///
    /// The value is first converted by the key column's rule, so `"5"` and
    /// `5` name the same row of an integer-keyed table while the text keys
    /// `"007"` and `"7"` stay distinct.
    pub fn key_of(&self, primary_key: &Value) -> Option<String> {
        self.column_type(&self.primary_key).to_typed(primary_key).to_key()
    }

    /// Cache group for this table.
    pub fn slug(&self) -> String {
        self.name.to_ascii_lowercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_")
    }

    /// Singular form of the table name, used to derive foreign-key columns.
    pub fn singular_name(&self) -> String {
        singularize(&self.name)
    }
}

/// Naive English singular of a table name.
pub fn singularize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if lower.ends_with("ies") && word.len() > 3 {
        format!("{}y", &word[..word.len() - 3])
    } else if ["sses", "xes", "ches", "shes", "zzes"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
    {
        word[..word.len() - 2].to_string()
    } else if lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is") {
        word.to_string()
    } else if lower.ends_with('s') && word.len() > 1 {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}
