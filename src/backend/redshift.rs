use crate::backend::{Backend, CellValue, ColumnMeta, RawResult};
use crate::config::{PoolConfig, WarehouseConfig};
use crate::error::SqlChatError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use secrecy::ExposeSecret;
use sqlx::pool::PoolConnection;
use sqlx::postgres::types::{Oid, PgInterval, PgTimeTz};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::types::{JsonValue, Uuid};
use sqlx::{Column, Postgres, Row as _, TypeInfo};
use std::time::Duration;

/// SQLSTATE raised when `statement_timeout` cancels a running statement.
const QUERY_CANCELED: &str = "57014";

/// Redshift (PostgreSQL wire protocol) backed by a bounded `sqlx` pool.
///
/// The pool is built once at startup. If that fails the backend stays up in a
/// degraded state and every fetch reports `ConnectionUnavailable`.
pub struct RedshiftBackend {
    pool: Option<PgPool>,
}

impl RedshiftBackend {
    pub async fn connect(warehouse: &WarehouseConfig, pool: &PoolConfig) -> Self {
        let options = Self::connect_options(warehouse);
        let result = PgPoolOptions::new()
            .min_connections(pool.min_size)
            .max_connections(pool.max_size)
            .acquire_timeout(Duration::from_secs(pool.acquire_timeout_secs))
            .connect_with(options)
            .await;

        match result {
            Ok(pool) => {
                tracing::info!(host = %warehouse.host, "warehouse connection pool initialized");
                Self { pool: Some(pool) }
            }
            Err(e) => {
                tracing::error!(host = %warehouse.host, error = %e, "failed to initialize warehouse connection pool");
                Self { pool: None }
            }
        }
    }

    /// A backend with no pool, as left behind by a failed startup connect.
    pub fn unavailable() -> Self {
        Self { pool: None }
    }

    pub fn is_connected(&self) -> bool {
        self.pool.as_ref().is_some_and(|p| !p.is_closed())
    }

    fn connect_options(warehouse: &WarehouseConfig) -> PgConnectOptions {
        let ssl_mode = if warehouse.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };
        PgConnectOptions::new()
            .host(&warehouse.host)
            .port(warehouse.port)
            .database(&warehouse.database)
            .username(&warehouse.user)
            .password(warehouse.password.expose_secret())
            .ssl_mode(ssl_mode)
    }

    async fn acquire(&self) -> Result<PoolConnection<Postgres>, SqlChatError> {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| SqlChatError::ConnectionUnavailable {
                message: "connection pool not initialized".to_string(),
            })?;
        pool.acquire()
            .await
            .map_err(|e| SqlChatError::ConnectionUnavailable {
                message: format!("failed to acquire connection: {}", e),
            })
    }

    async fn run_on(
        conn: &mut PoolConnection<Postgres>,
        sql: &str,
        params: &[String],
        timeout: Duration,
    ) -> Result<Vec<PgRow>, sqlx::Error> {
        // 0 disables the limit, so never send it.
        let set_timeout = format!("SET statement_timeout = {}", timeout.as_millis().max(1));
        sqlx::query(&set_timeout).execute(&mut **conn).await?;

        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param.as_str());
        }
        query.fetch_all(&mut **conn).await
    }
}

impl Backend for RedshiftBackend {
    async fn fetch(
        &self,
        sql: &str,
        params: &[String],
        timeout: Duration,
    ) -> Result<RawResult, SqlChatError> {
        let mut conn = self.acquire().await?;

        match Self::run_on(&mut conn, sql, params, timeout).await {
            Ok(rows) => decode_rows(&rows),
            Err(e) => {
                let failure = classify(e, timeout);
                if failure.discard_connection {
                    // The session may still be mid-cancel; never hand it to another request.
                    if let Err(close_err) = conn.close().await {
                        tracing::debug!(error = %close_err, "error closing suspect connection");
                    }
                }
                Err(failure.error)
            }
        }
    }

    async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
            tracing::info!("warehouse connection pool closed");
        }
    }
}

/// A failed statement, mapped to the crate error.
#[derive(Debug)]
pub struct Failure {
    pub error: SqlChatError,
    /// The connection must be closed rather than returned to the pool.
    pub discard_connection: bool,
}

/// Map a driver error and decide whether the connection that produced it is still usable.
///
/// Only an ordinary database error (bad column, division by zero) leaves the
/// session in a known state. A cancelled statement or a transport failure does not.
pub fn classify(e: sqlx::Error, timeout: Duration) -> Failure {
    match e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(QUERY_CANCELED) => Failure {
            error: SqlChatError::StatementTimeout {
                seconds: timeout.as_secs(),
            },
            discard_connection: true,
        },
        sqlx::Error::Database(db) => Failure {
            error: SqlChatError::Database {
                message: db.message().to_string(),
            },
            discard_connection: false,
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => Failure {
            error: SqlChatError::ConnectionUnavailable {
                message: e.to_string(),
            },
            discard_connection: true,
        },
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => Failure {
            error: SqlChatError::ConnectionUnavailable {
                message: format!("connection lost: {}", e),
            },
            discard_connection: true,
        },
        other => Failure {
            error: SqlChatError::Database {
                message: other.to_string(),
            },
            discard_connection: true,
        },
    }
}

fn decode_rows(rows: &[PgRow]) -> Result<RawResult, SqlChatError> {
    let Some(first) = rows.first() else {
        return Ok(RawResult::default());
    };

    let columns = first
        .columns()
        .iter()
        .map(|c| ColumnMeta {
            name: c.name().to_string(),
            type_name: c.type_info().name().to_string(),
        })
        .collect::<Vec<_>>();

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut cells = Vec::with_capacity(columns.len());
        for (idx, col) in columns.iter().enumerate() {
            cells.push(decode_cell(row, idx, &col.type_name)?);
        }
        out.push(cells);
    }

    Ok(RawResult { columns, rows: out })
}

fn decode_cell(row: &PgRow, idx: usize, type_name: &str) -> Result<CellValue, SqlChatError> {
    let decode_err = |e: sqlx::Error| SqlChatError::Database {
        message: format!("failed to decode column {} ({}): {}", idx, type_name, e),
    };

    let value = match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .map_err(decode_err)?
            .map(CellValue::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .map_err(decode_err)?
            .map(|v| CellValue::Int(v.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .map_err(decode_err)?
            .map(|v| CellValue::Int(v.into())),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .map_err(decode_err)?
            .map(CellValue::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .map_err(decode_err)?
            .map(|v| CellValue::Float(v.into())),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)
            .map_err(decode_err)?
            .map(CellValue::Float),
        "NUMERIC" => row
            .try_get::<Option<BigDecimal>, _>(idx)
            .map_err(decode_err)?
            .map(|v| CellValue::Decimal(v.to_string())),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)
            .map_err(decode_err)?
            .map(|v| CellValue::Timestamp(v.to_string())),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)
            .map_err(decode_err)?
            .map(|v| CellValue::Timestamp(v.to_string())),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .map_err(decode_err)?
            .map(|v| CellValue::Timestamp(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)
            .map_err(decode_err)?
            .map(|v| CellValue::Timestamp(v.to_rfc3339())),
        "TIMETZ" => row
            .try_get::<Option<PgTimeTz<NaiveTime, FixedOffset>>, _>(idx)
            .map_err(decode_err)?
            .map(|v| CellValue::Timestamp(format!("{}{}", v.time, v.offset))),
        "INTERVAL" => row
            .try_get::<Option<PgInterval>, _>(idx)
            .map_err(decode_err)?
            .map(|v| CellValue::Text(interval_text(&v))),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(idx)
            .map_err(decode_err)?
            .map(|v| CellValue::Text(v.to_string())),
        "JSON" | "JSONB" => row
            .try_get::<Option<JsonValue>, _>(idx)
            .map_err(decode_err)?
            .map(|v| CellValue::Text(v.to_string())),
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(idx)
            .map_err(decode_err)?
            .map(|v| CellValue::Text(bytea_text(&v))),
        "OID" => row
            .try_get::<Option<Oid>, _>(idx)
            .map_err(decode_err)?
            .map(|v| CellValue::Int(v.0.into())),
        _ => match row.try_get::<Option<String>, _>(idx) {
            Ok(v) => v.map(CellValue::Text),
            Err(e) => {
                return Err(SqlChatError::Database {
                    message: format!(
                        "unsupported type {} in column {}, cast it to VARCHAR: {}",
                        type_name, idx, e
                    ),
                });
            }
        },
    };

    Ok(value.unwrap_or(CellValue::Null))
}

/// ISO 8601 duration, keeping the month/day/microsecond split Postgres stores.
pub fn interval_text(interval: &PgInterval) -> String {
    let sign = if interval.microseconds < 0 { "-" } else { "" };
    let micros = interval.microseconds.unsigned_abs();
    let (secs, frac) = (micros / 1_000_000, micros % 1_000_000);
    if frac == 0 {
        format!("P{}M{}DT{}{}S", interval.months, interval.days, sign, secs)
    } else {
        format!("P{}M{}DT{}{}.{:06}S", interval.months, interval.days, sign, secs, frac)
    }
}

/// Postgres hex output format, e.g. `\xdeadbeef`.
pub fn bytea_text(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
