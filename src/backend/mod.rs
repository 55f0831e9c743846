pub mod redshift;

use crate::error::SqlChatError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Metadata for a single result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    pub type_name: String,
}

/// A single cell value from a query result.
///
/// Numeric and temporal values that have no exact JSON form are kept as
/// their canonical text so nothing is rounded on the way out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(String),
    Text(String),
    Timestamp(String),
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) | CellValue::Decimal(s) | CellValue::Timestamp(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            CellValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// One result row keyed by column name.
pub type Row = BTreeMap<String, CellValue>;

/// Rows exactly as the warehouse returned them, before any row cap.
#[derive(Debug, Default)]
pub struct RawResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawResult {
    /// Convert positional rows into name-keyed rows.
    pub fn into_rows(self) -> (Vec<ColumnMeta>, Vec<Row>) {
        let RawResult { columns, rows } = self;
        let keyed = rows
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .zip(row)
                    .map(|(col, value)| (col.name.clone(), value))
                    .collect::<Row>()
            })
            .collect();
        (columns, keyed)
    }
}

/// A warehouse reachable through a shared connection pool.
///
/// Implementations acquire one connection per call and must hand it back
/// (or discard it) before returning, whatever the outcome.
pub trait Backend: Send + Sync {
    fn fetch(
        &self,
        sql: &str,
        params: &[String],
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<RawResult, SqlChatError>> + Send;

    /// Close every pooled connection. Later fetches fail with `ConnectionUnavailable`.
    fn close(&self) -> impl std::future::Future<Output = ()> + Send;
}
