//! PostgreSQL transport over `may_postgres`.
//!
//! [`MayPostgresExecutor`] implements [`Executor`] for a connected
//! `may_postgres::Client`. Parameters are encoded for whatever type the
//! server inferred for each placeholder, so an integer attribute can bind to
//! an `int4` column and a text attribute holding `"5"` can bind to `int8`.

use crate::executor::{DbError, Executor, Row};
use crate::value::Value;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use may_postgres::Client;
use postgres_types::{to_sql_checked, IsNull, ToSql, Type};
use rust_decimal::Decimal;
use std::error::Error;
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

impl From<may_postgres::Error> for DbError {
    fn from(err: may_postgres::Error) -> Self {
        DbError::Query(err.to_string())
    }
}

/// [`Executor`] backed by a `may_postgres::Client`.
pub struct MayPostgresExecutor {
    client: Client,
}

impl MayPostgresExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with a libpq-style connection string.
    pub fn connect(url: &str) -> Result<Self, DbError> {
        let client = may_postgres::connect(url).map_err(|e| DbError::Connection(e.to_string()))?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn into_client(self) -> Client {
        self.client
    }
}

impl Executor for MayPostgresExecutor {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        let params: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();
        Ok(self.client.execute(sql, &params)?)
    }

    fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let params: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();
        self.client.query(sql, &params)?.iter().map(decode_row).collect()
    }
}

fn decode_row(row: &may_postgres::Row) -> Result<Row, DbError> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        values.push(decode_column(row, idx, column.type_())?);
        columns.push(column.name().to_string());
    }
    Ok(Row::new(columns, values))
}

fn decode_column(row: &may_postgres::Row, idx: usize, ty: &Type) -> Result<Value, DbError> {
    fn get<'a, T>(row: &'a may_postgres::Row, idx: usize) -> Result<Value, DbError>
    where
        T: postgres_types::FromSql<'a> + Into<Value>,
    {
        row.try_get::<usize, Option<T>>(idx)
            .map(Value::from)
            .map_err(|e| DbError::Parse(format!("column {idx}: {e}")))
    }

    match *ty {
        Type::BOOL => get::<bool>(row, idx),
        Type::INT2 => get::<i16>(row, idx),
        Type::INT4 => get::<i32>(row, idx),
        Type::INT8 => get::<i64>(row, idx),
        Type::FLOAT4 => get::<f32>(row, idx),
        Type::FLOAT8 => get::<f64>(row, idx),
        Type::NUMERIC => get::<Decimal>(row, idx),
        Type::DATE => get::<NaiveDate>(row, idx),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx),
        Type::TIMESTAMPTZ => row
            .try_get::<usize, Option<DateTime<Utc>>>(idx)
            .map(|v| Value::from(v.map(|dt| dt.naive_utc())))
            .map_err(|e| DbError::Parse(format!("column {idx}: {e}"))),
        Type::UUID => get::<Uuid>(row, idx),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx),
        Type::BYTEA => row
            .try_get::<usize, Option<Vec<u8>>>(idx)
            .map(|v| v.map_or(Value::Null, Value::bytes))
            .map_err(|e| DbError::Parse(format!("column {idx}: {e}"))),
        _ => get::<String>(row, idx),
    }
}

fn out_of_range(value: &Value, ty: &Type) -> BoxError {
    format!("{value} does not fit a {ty} parameter").into()
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }
        match *ty {
            Type::BOOL => self.as_bool().ok_or_else(|| out_of_range(self, ty))?.to_sql(ty, out),
            Type::INT2 => {
                let i = self.as_i64().ok_or_else(|| out_of_range(self, ty))?;
                i16::try_from(i).map_err(|_| out_of_range(self, ty))?.to_sql(ty, out)
            }
            Type::INT4 => {
                let i = self.as_i64().ok_or_else(|| out_of_range(self, ty))?;
                i32::try_from(i).map_err(|_| out_of_range(self, ty))?.to_sql(ty, out)
            }
            Type::INT8 => self.as_i64().ok_or_else(|| out_of_range(self, ty))?.to_sql(ty, out),
            Type::FLOAT4 => {
                let f = self.as_f64().ok_or_else(|| out_of_range(self, ty))?;
                (f as f32).to_sql(ty, out)
            }
            Type::FLOAT8 => self.as_f64().ok_or_else(|| out_of_range(self, ty))?.to_sql(ty, out),
            Type::NUMERIC => self.as_decimal().ok_or_else(|| out_of_range(self, ty))?.to_sql(ty, out),
            _ => match self {
                Value::Date(d) => d.to_sql(ty, out),
                Value::DateTime(dt) => dt.to_sql(ty, out),
                Value::Uuid(u) => u.to_sql(ty, out),
                Value::Json(j) => j.to_sql(ty, out),
                Value::Bytes(b) => b.to_sql(ty, out),
                Value::Array(items) => items.to_sql(ty, out),
                Value::Text(s) => s.to_sql(ty, out),
                other => other.to_string().to_sql(ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
