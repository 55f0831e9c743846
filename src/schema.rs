use crate::error::SqlChatError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

/// How long a fetched schema is served before the next request refreshes it.
pub const SCHEMA_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub qualified_name: String,
    pub columns: Vec<ColumnInfo>,
}

/// Point-in-time view of the warehouse tables, in retrieval order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    tables: Vec<TableInfo>,
}

impl SchemaSnapshot {
    pub fn new(tables: Vec<TableInfo>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Where fresh schema metadata comes from.
pub trait SchemaSource: Send + Sync {
    fn fetch_schema(
        &self,
        target_schema: &str,
    ) -> impl std::future::Future<Output = Result<SchemaSnapshot, SqlChatError>> + Send;
}

struct CacheEntry {
    target_schema: String,
    snapshot: Arc<SchemaSnapshot>,
    fetched_at: Instant,
}

/// Memoizes the last good schema snapshot for a fixed TTL.
///
/// Expiry is the only invalidation. Refreshes are single-flight: while one
/// caller refreshes, others keep reading the previous snapshot, and only
/// callers with nothing to serve wait for the refresh to land.
pub struct SchemaCache<S> {
    source: Arc<S>,
    ttl: Duration,
    entry: RwLock<Option<CacheEntry>>,
    refresh: Mutex<()>,
}

impl<S: SchemaSource> SchemaCache<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self::with_ttl(source, SCHEMA_TTL)
    }

    pub fn with_ttl(source: Arc<S>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            entry: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    pub async fn get(&self, target_schema: &str) -> Result<Arc<SchemaSnapshot>, SqlChatError> {
        let stale = match self.lookup(target_schema).await {
            Lookup::Fresh(snapshot) => return Ok(snapshot),
            Lookup::Stale(snapshot) => Some(snapshot),
            Lookup::Missing => None,
        };

        let _guard = match (self.refresh.try_lock(), &stale) {
            (Ok(guard), _) => guard,
            (Err(_), Some(snapshot)) => {
                tracing::debug!(schema = target_schema, "schema refresh in flight, serving previous snapshot");
                return Ok(Arc::clone(snapshot));
            }
            (Err(_), None) => self.refresh.lock().await,
        };

        // Another caller may have refreshed while we waited for the lock.
        if let Lookup::Fresh(snapshot) = self.lookup(target_schema).await {
            return Ok(snapshot);
        }

        tracing::info!(schema = target_schema, "fetching warehouse schema");
        match self.source.fetch_schema(target_schema).await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *self.entry.write().await = Some(CacheEntry {
                    target_schema: target_schema.to_string(),
                    snapshot: Arc::clone(&snapshot),
                    fetched_at: Instant::now(),
                });
                Ok(snapshot)
            }
            Err(e) => match stale {
                Some(snapshot) => {
                    tracing::warn!(schema = target_schema, error = %e, "schema refresh failed, serving stale snapshot");
                    Ok(snapshot)
                }
                None => {
                    tracing::error!(schema = target_schema, error = %e, "schema fetch failed with no cached snapshot");
                    Err(SqlChatError::SchemaUnavailable {
                        source: Box::new(e),
                    })
                }
            },
        }
    }

    async fn lookup(&self, target_schema: &str) -> Lookup {
        let entry = self.entry.read().await;
        match entry.as_ref() {
            Some(e) if e.target_schema == target_schema => {
                if e.fetched_at.elapsed() < self.ttl {
                    Lookup::Fresh(Arc::clone(&e.snapshot))
                } else {
                    Lookup::Stale(Arc::clone(&e.snapshot))
                }
            }
            _ => Lookup::Missing,
        }
    }
}

enum Lookup {
    Fresh(Arc<SchemaSnapshot>),
    Stale(Arc<SchemaSnapshot>),
    Missing,
}
