use crate::backend::{Backend, ColumnMeta, Row};
use crate::error::SqlChatError;
use crate::logging::Timer;
use crate::schema::{ColumnInfo, SchemaSnapshot, SchemaSource, TableInfo};
use std::time::Duration;

/// Timeout applied to information_schema lookups, which can be slow on large clusters.
pub const INTROSPECTION_TIMEOUT_SECS: u64 = 120;

/// Floor for any statement timeout; zero would switch the server-side limit off.
pub const MIN_STATEMENT_TIMEOUT: Duration = Duration::from_millis(1);

const TABLES_SQL: &str = "SELECT CAST(table_schema AS VARCHAR) AS table_schema, \
     CAST(table_name AS VARCHAR) AS table_name \
     FROM information_schema.tables \
     WHERE table_type = 'BASE TABLE' AND table_schema = $1 \
     ORDER BY table_name \
     LIMIT ";

const COLUMNS_SQL: &str = "SELECT CAST(column_name AS VARCHAR) AS column_name, \
     CAST(data_type AS VARCHAR) AS data_type, \
     CAST(is_nullable AS VARCHAR) AS is_nullable \
     FROM information_schema.columns \
     WHERE table_schema = $1 AND table_name = $2 \
     ORDER BY ordinal_position";

/// Outcome of one statement, after the row cap.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Row>,
    pub truncated: bool,
    pub elapsed: Duration,
}

/// Runs statements through a pooled backend with a statement timeout and a row cap.
///
/// Does no safety checking of its own: callers validate untrusted SQL first.
pub struct QueryExecutor<B> {
    backend: B,
    default_timeout: Duration,
    max_rows: usize,
    max_schema_tables: usize,
}

impl<B: Backend> QueryExecutor<B> {
    pub fn new(backend: B, default_timeout_secs: u64, max_rows: usize, max_schema_tables: usize) -> Self {
        Self {
            backend,
            default_timeout: Duration::from_secs(default_timeout_secs),
            max_rows,
            max_schema_tables,
        }
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn run(
        &self,
        sql: &str,
        params: &[String],
        timeout_override: Option<Duration>,
    ) -> Result<ExecutionResult, SqlChatError> {
        let timeout = timeout_override
            .unwrap_or(self.default_timeout)
            .max(MIN_STATEMENT_TIMEOUT);
        let timer = Timer::start();

        let raw = self.backend.fetch(sql, params, timeout).await?;
        let (columns, mut rows) = raw.into_rows();

        let truncated = rows.len() > self.max_rows;
        if truncated {
            tracing::warn!(
                returned = rows.len(),
                limit = self.max_rows,
                "query exceeded row cap, truncating"
            );
            rows.truncate(self.max_rows);
        }

        let elapsed = timer.elapsed();
        tracing::debug!(rows = rows.len(), elapsed_ms = elapsed.as_millis() as u64, "query executed");

        Ok(ExecutionResult {
            columns,
            rows,
            truncated,
            elapsed,
        })
    }

    /// Connectivity probe used by the health command.
    pub async fn ping(&self) -> bool {
        match self.run("SELECT 1 AS test", &[], None).await {
            Ok(result) => result
                .rows
                .first()
                .and_then(|r| r.get("test"))
                .and_then(|v| v.as_int())
                == Some(1),
            Err(e) => {
                tracing::error!(error = %e, "warehouse connection test failed");
                false
            }
        }
    }

    pub async fn close(&self) {
        self.backend.close().await;
    }
}

impl<B: Backend> SchemaSource for QueryExecutor<B> {
    async fn fetch_schema(&self, target_schema: &str) -> Result<SchemaSnapshot, SqlChatError> {
        let timeout = Some(Duration::from_secs(INTROSPECTION_TIMEOUT_SECS));

        let tables_sql = format!("{}{}", TABLES_SQL, self.max_schema_tables);
        let tables = self
            .run(&tables_sql, &[target_schema.to_string()], timeout)
            .await?;

        let mut snapshot = Vec::new();
        for table in &tables.rows {
            let schema_name = text_field(table, "table_schema")?;
            let table_name = text_field(table, "table_name")?;

            let columns = self
                .run(
                    COLUMNS_SQL,
                    &[schema_name.to_string(), table_name.to_string()],
                    timeout,
                )
                .await?;

            let columns = columns
                .rows
                .iter()
                .map(|c| {
                    Ok(ColumnInfo {
                        name: text_field(c, "column_name")?.to_string(),
                        data_type: text_field(c, "data_type")?.to_string(),
                        nullable: text_field(c, "is_nullable")? == "YES",
                    })
                })
                .collect::<Result<Vec<_>, SqlChatError>>()?;

            snapshot.push(TableInfo {
                qualified_name: format!("{}.{}", schema_name, table_name),
                columns,
            });
        }

        tracing::info!(tables = snapshot.len(), schema = target_schema, "retrieved warehouse schema");
        Ok(SchemaSnapshot::new(snapshot))
    }
}

fn text_field<'a>(row: &'a Row, name: &str) -> Result<&'a str, SqlChatError> {
    row.get(name)
        .and_then(|v| v.as_text())
        .ok_or_else(|| SqlChatError::Database {
            message: format!("introspection row missing text column '{}'", name),
        })
}
