//! tokio-postgres implementation of the database interface.
//!
//! - [`Value`] binds as a Postgres parameter (integers narrow to `int2`/`int4` columns).
//! - Result rows decode into [`Row`] by column type.
//! - [`Executor`] is implemented for `tokio_postgres::Client` and `tokio_postgres::Transaction`;
//!   `insert_and_get`/`update_and_get` append `RETURNING *` so the stored rows come back.
//! - `tokio_postgres::Transaction` is a [`Transaction`], so `create_in`/`update_in` can run
//!   inside a transaction the caller opened.

use crate::compile::{CompiledQuery, Dialect, Postgres};
use crate::database::{Executor, Inserted, Transaction};
use crate::error::{OrmError, OrmResult};
use crate::fragment::Fragment;
use crate::row::Row;
use crate::sql;
use crate::value::Value;
#[cfg(feature = "rust_decimal")]
use crate::value::FromValue;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::error::Error;
use std::future::Future;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};
use uuid::Uuid;

type PgRow = tokio_postgres::Row;

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        #[cfg(feature = "rust_decimal")]
        if *ty == Type::NUMERIC && !self.is_null() {
            return rust_decimal::Decimal::from_value(self)?.to_sql(ty, out);
        }

        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql_checked(ty, out),
            Value::Int(i) => {
                if *ty == Type::INT2 {
                    i16::try_from(*i)?.to_sql_checked(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*i)?.to_sql_checked(ty, out)
                } else {
                    i.to_sql_checked(ty, out)
                }
            }
            Value::Float(f) => {
                if *ty == Type::FLOAT4 {
                    (*f as f32).to_sql_checked(ty, out)
                } else {
                    f.to_sql_checked(ty, out)
                }
            }
            Value::Text(s) => s.to_sql_checked(ty, out),
            Value::Bytes(b) => b.to_sql_checked(ty, out),
            Value::Json(j) => j.to_sql_checked(ty, out),
            Value::Uuid(u) => u.to_sql_checked(ty, out),
            Value::Timestamp(t) => t.to_sql_checked(ty, out),
            Value::DateTime(t) => t.to_sql_checked(ty, out),
            Value::Date(d) => d.to_sql_checked(ty, out),
        }
    }

    // Each variant checks the column type itself in `to_sql`.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// A column's wire bytes, whatever its type.
struct RawCell<'a>(&'a [u8]);

impl<'a> FromSql<'a> for RawCell<'a> {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RawCell(raw))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

type DecodeResult<T> = Result<T, Box<dyn Error + Sync + Send>>;

fn cell<'a, T: FromSql<'a>>(ty: &Type, raw: Option<&'a [u8]>) -> DecodeResult<Option<T>> {
    Option::<T>::from_sql_nullable(ty, raw)
}

/// One-dimensional array as a JSON array; `NULL` elements become JSON `null`.
fn json_array<'a, T: FromSql<'a>>(
    ty: &Type,
    raw: Option<&'a [u8]>,
    element: impl Fn(T) -> serde_json::Value,
) -> DecodeResult<Option<Value>> {
    Ok(cell::<Vec<Option<T>>>(ty, raw)?.map(|items| {
        Value::Json(serde_json::Value::Array(
            items
                .into_iter()
                .map(|item| item.map_or(serde_json::Value::Null, &element))
                .collect(),
        ))
    }))
}

/// Decode one column from its wire bytes.
///
/// - `numeric` decodes to [`Value::Text`] (requires the `rust_decimal` feature).
/// - One-dimensional arrays of the scalar types decode to [`Value::Json`] arrays.
/// - Enum labels decode to [`Value::Text`].
/// - Any other type decodes to [`Value::Null`] so the rest of the row stays usable.
fn decode_cell(ty: &Type, raw: Option<&[u8]>) -> DecodeResult<Value> {
    let value = if *ty == Type::BOOL {
        cell::<bool>(ty, raw)?.map(Value::Bool)
    } else if *ty == Type::INT2 {
        cell::<i16>(ty, raw)?.map(Value::from)
    } else if *ty == Type::INT4 {
        cell::<i32>(ty, raw)?.map(Value::from)
    } else if *ty == Type::INT8 {
        cell::<i64>(ty, raw)?.map(Value::Int)
    } else if *ty == Type::OID {
        cell::<u32>(ty, raw)?.map(Value::from)
    } else if *ty == Type::CHAR {
        cell::<i8>(ty, raw)?.map(|c| Value::Text(char::from(c as u8).to_string()))
    } else if *ty == Type::FLOAT4 {
        cell::<f32>(ty, raw)?.map(Value::from)
    } else if *ty == Type::FLOAT8 {
        cell::<f64>(ty, raw)?.map(Value::Float)
    } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME].contains(ty) {
        cell::<String>(ty, raw)?.map(Value::Text)
    } else if *ty == Type::BYTEA {
        cell::<Vec<u8>>(ty, raw)?.map(Value::Bytes)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        cell::<serde_json::Value>(ty, raw)?.map(Value::Json)
    } else if *ty == Type::UUID {
        cell::<Uuid>(ty, raw)?.map(Value::Uuid)
    } else if *ty == Type::TIMESTAMPTZ {
        cell::<DateTime<Utc>>(ty, raw)?.map(Value::Timestamp)
    } else if *ty == Type::TIMESTAMP {
        cell::<NaiveDateTime>(ty, raw)?.map(Value::DateTime)
    } else if *ty == Type::DATE {
        cell::<NaiveDate>(ty, raw)?.map(Value::Date)
    } else if *ty == Type::NUMERIC {
        decode_numeric(ty, raw)?
    } else if *ty == Type::BOOL_ARRAY {
        json_array::<bool>(ty, raw, serde_json::Value::from)?
    } else if *ty == Type::INT2_ARRAY {
        json_array::<i16>(ty, raw, serde_json::Value::from)?
    } else if *ty == Type::INT4_ARRAY {
        json_array::<i32>(ty, raw, serde_json::Value::from)?
    } else if *ty == Type::INT8_ARRAY {
        json_array::<i64>(ty, raw, serde_json::Value::from)?
    } else if *ty == Type::FLOAT4_ARRAY {
        json_array::<f32>(ty, raw, serde_json::Value::from)?
    } else if *ty == Type::FLOAT8_ARRAY {
        json_array::<f64>(ty, raw, serde_json::Value::from)?
    } else if [Type::TEXT_ARRAY, Type::VARCHAR_ARRAY, Type::BPCHAR_ARRAY].contains(ty) {
        json_array::<String>(ty, raw, serde_json::Value::from)?
    } else if *ty == Type::UUID_ARRAY {
        json_array::<Uuid>(ty, raw, |u| serde_json::Value::from(u.to_string()))?
    } else if *ty == Type::JSONB_ARRAY || *ty == Type::JSON_ARRAY {
        json_array::<serde_json::Value>(ty, raw, |j| j)?
    } else if matches!(ty.kind(), Kind::Enum(_)) {
        raw.map(|bytes| String::from_utf8(bytes.to_vec()).map(Value::Text))
            .transpose()?
    } else {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            target: "sqlcrud.sql",
            column_type = %ty,
            "no value mapping for column type; decoding as NULL"
        );
        None
    };
    Ok(value.unwrap_or(Value::Null))
}

#[cfg(feature = "rust_decimal")]
fn decode_numeric(ty: &Type, raw: Option<&[u8]>) -> DecodeResult<Option<Value>> {
    Ok(cell::<rust_decimal::Decimal>(ty, raw)?.map(Value::from))
}

#[cfg(not(feature = "rust_decimal"))]
fn decode_numeric(ty: &Type, _raw: Option<&[u8]>) -> DecodeResult<Option<Value>> {
    #[cfg(feature = "tracing")]
    tracing::debug!(
        target: "sqlcrud.sql",
        column_type = %ty,
        "numeric columns need the `rust_decimal` feature; decoding as NULL"
    );
    let _ = ty;
    Ok(None)
}

/// Decode a tokio-postgres row into a [`Row`].
pub fn decode_row(row: &PgRow) -> OrmResult<Row> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let raw = row
            .try_get::<_, Option<RawCell<'_>>>(idx)?
            .map(|cell| cell.0);
        let value = decode_cell(column.type_(), raw)
            .map_err(|e| OrmError::decode(column.name(), e.to_string()))?;
        out.insert(column.name(), value);
    }
    Ok(out)
}

fn compile_logged(fragment: &Fragment, dialect: &dyn Dialect) -> CompiledQuery {
    let compiled = fragment.compile(dialect);
    #[cfg(feature = "tracing")]
    tracing::debug!(
        target: "sqlcrud.sql",
        param_count = compiled.params.len(),
        sql = %compiled.sql,
        "executing"
    );
    compiled
}

fn param_refs(compiled: &CompiledQuery) -> Vec<&(dyn ToSql + Sync)> {
    compiled
        .params
        .iter()
        .map(|p| p as &(dyn ToSql + Sync))
        .collect()
}

/// The two inherent tokio-postgres calls the executor needs, shared by clients and
/// transactions.
trait PgConn: Executor {
    fn pg_query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<Vec<PgRow>, tokio_postgres::Error>> + Send;

    fn pg_execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<u64, tokio_postgres::Error>> + Send;
}

impl PgConn for tokio_postgres::Client {
    fn pg_query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<Vec<PgRow>, tokio_postgres::Error>> + Send {
        tokio_postgres::Client::query(self, sql, params)
    }

    fn pg_execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<u64, tokio_postgres::Error>> + Send {
        tokio_postgres::Client::execute(self, sql, params)
    }
}

impl PgConn for tokio_postgres::Transaction<'_> {
    fn pg_query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<Vec<PgRow>, tokio_postgres::Error>> + Send {
        tokio_postgres::Transaction::query(self, sql, params)
    }

    fn pg_execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<u64, tokio_postgres::Error>> + Send {
        tokio_postgres::Transaction::execute(self, sql, params)
    }
}

async fn query_rows<C: PgConn>(conn: &C, fragment: &Fragment) -> OrmResult<Vec<Row>> {
    let compiled = compile_logged(fragment, conn.dialect());
    let rows = conn.pg_query(&compiled.sql, &param_refs(&compiled)).await?;
    rows.iter().map(decode_row).collect()
}

async fn execute_statement<C: PgConn>(conn: &C, fragment: &Fragment) -> OrmResult<u64> {
    let compiled = compile_logged(fragment, conn.dialect());
    Ok(conn.pg_execute(&compiled.sql, &param_refs(&compiled)).await?)
}

async fn insert_returning<C: PgConn>(conn: &C, fragment: &Fragment) -> OrmResult<Vec<Inserted>> {
    let rows = query_rows(conn, &sql!("{} RETURNING *", fragment)).await?;
    Ok(rows.into_iter().map(Inserted::Row).collect())
}

async fn update_returning<C: PgConn>(
    conn: &C,
    fragment: &Fragment,
) -> OrmResult<Option<Vec<Row>>> {
    query_rows(conn, &sql!("{} RETURNING *", fragment))
        .await
        .map(Some)
}

macro_rules! impl_pg_executor {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Executor for $ty {
                fn dialect(&self) -> &dyn Dialect {
                    &Postgres
                }

                async fn query(&self, fragment: &Fragment) -> OrmResult<Vec<Row>> {
                    query_rows(self, fragment).await
                }

                async fn insert_and_get(&self, fragment: &Fragment) -> OrmResult<Vec<Inserted>> {
                    insert_returning(self, fragment).await
                }

                async fn update_and_get(&self, fragment: &Fragment) -> OrmResult<Option<Vec<Row>>> {
                    update_returning(self, fragment).await
                }

                async fn execute(&self, fragment: &Fragment) -> OrmResult<u64> {
                    execute_statement(self, fragment).await
                }
            }
        )*
    };
}

impl_pg_executor!(tokio_postgres::Client, tokio_postgres::Transaction<'_>);

impl Transaction for tokio_postgres::Transaction<'_> {
    async fn commit(self) -> OrmResult<()> {
        Ok(tokio_postgres::Transaction::commit(self).await?)
    }

    async fn rollback(self) -> OrmResult<()> {
        Ok(tokio_postgres::Transaction::rollback(self).await?)
    }
}

#[cfg(feature = "pool")]
impl Executor for deadpool_postgres::ClientWrapper {
    fn dialect(&self) -> &dyn Dialect {
        &Postgres
    }

    async fn query(&self, fragment: &Fragment) -> OrmResult<Vec<Row>> {
        // Delegate to the deref target (tokio_postgres::Client).
        Executor::query(&**self, fragment).await
    }

    async fn insert_and_get(&self, fragment: &Fragment) -> OrmResult<Vec<Inserted>> {
        Executor::insert_and_get(&**self, fragment).await
    }

    async fn update_and_get(&self, fragment: &Fragment) -> OrmResult<Option<Vec<Row>>> {
        Executor::update_and_get(&**self, fragment).await
    }

    async fn execute(&self, fragment: &Fragment) -> OrmResult<u64> {
        Executor::execute(&**self, fragment).await
    }
}

#[cfg(feature = "pool")]
impl Executor for deadpool_postgres::Client {
    fn dialect(&self) -> &dyn Dialect {
        &Postgres
    }

    async fn query(&self, fragment: &Fragment) -> OrmResult<Vec<Row>> {
        Executor::query(&**self, fragment).await
    }

    async fn insert_and_get(&self, fragment: &Fragment) -> OrmResult<Vec<Inserted>> {
        Executor::insert_and_get(&**self, fragment).await
    }

    async fn update_and_get(&self, fragment: &Fragment) -> OrmResult<Option<Vec<Row>>> {
        Executor::update_and_get(&**self, fragment).await
    }

    async fn execute(&self, fragment: &Fragment) -> OrmResult<u64> {
        Executor::execute(&**self, fragment).await
    }
}
