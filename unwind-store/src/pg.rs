//! PostgreSQL store adapter
//!
//! Connection pooling via deadpool-postgres plus the [`SqlStore`]
//! implementation: parameterized execution with normalized outcomes and
//! catalog-backed schema introspection. The per-statement timeout is set
//! through connection options, so a slow statement fails outright rather
//! than returning a partial result.

use crate::values::{bind_params, decode_row_set};
use crate::{ColumnInfo, ExecuteOutcome, KeyKind, SqlStore, StoreResult};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime};
use postgres_types::ToSql;
use std::collections::HashMap;
use tokio_postgres::NoTls;
use tracing::debug;
use unwind_core::StoreError;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Per-statement timeout in milliseconds
    pub statement_timeout_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            statement_timeout_ms: 30_000,
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("UNWIND_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("UNWIND_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("UNWIND_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("UNWIND_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("UNWIND_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("UNWIND_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            statement_timeout_ms: std::env::var("UNWIND_DB_STATEMENT_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.statement_timeout_ms),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> StoreResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        // Wall-clock budget per statement, enforced server-side.
        cfg.options = Some(format!("-c statement_timeout={}", self.statement_timeout_ms));

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(self.max_size));

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::ConnectionFailed {
                reason: format!("failed to create pool: {e}"),
            })
    }
}

// ============================================================================
// STORE IMPLEMENTATION
// ============================================================================

/// Pooled PostgreSQL store.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Build a store from configuration.
    pub fn from_config(config: &DbConfig) -> StoreResult<Self> {
        Ok(Self {
            pool: config.create_pool()?,
        })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> StoreResult<Object> {
        self.pool.get().await.map_err(|e| StoreError::PoolError {
            reason: e.to_string(),
        })
    }
}

fn exec_err(e: tokio_postgres::Error) -> StoreError {
    StoreError::Execution {
        reason: e.to_string(),
    }
}

#[async_trait]
impl SqlStore for PgStore {
    async fn execute(&self, sql: &str, params: &[unwind_core::SqlValue]) -> StoreResult<ExecuteOutcome> {
        let conn = self.get_conn().await?;
        debug!(sql, params = params.len(), "executing statement");

        let stmt = conn.prepare(sql).await.map_err(exec_err)?;
        let bound = bind_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        if stmt.columns().is_empty() {
            let affected = conn.execute(&stmt, &refs).await.map_err(exec_err)?;
            Ok(ExecuteOutcome::Affected(affected))
        } else {
            // query() buffers the full result set; the connection goes back
            // to the pool with nothing pending.
            let rows = conn.query(&stmt, &refs).await.map_err(exec_err)?;
            Ok(ExecuteOutcome::Rows(decode_row_set(stmt.columns(), &rows)?))
        }
    }

    async fn list_schemas(&self) -> StoreResult<Vec<String>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT schema_name FROM information_schema.schemata \
                 WHERE schema_name NOT IN ('information_schema', 'pg_catalog', 'pg_toast') \
                 ORDER BY schema_name",
                &[],
            )
            .await
            .map_err(exec_err)?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn list_tables(&self, schema: &str) -> StoreResult<Vec<String>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[&schema],
            )
            .await
            .map_err(exec_err)?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn list_columns(&self, schema: &str, table: &str) -> StoreResult<Vec<ColumnInfo>> {
        let conn = self.get_conn().await?;
        // format_type renders types exactly enough to recreate the column
        // (e.g. `character varying(255)`), unlike information_schema's
        // bare data_type.
        let rows = conn
            .query(
                "SELECT a.attname, pg_catalog.format_type(a.atttypid, a.atttypmod) \
                 FROM pg_catalog.pg_attribute a \
                 JOIN pg_catalog.pg_class c ON a.attrelid = c.oid \
                 JOIN pg_catalog.pg_namespace n ON c.relnamespace = n.oid \
                 WHERE n.nspname = $1 AND c.relname = $2 \
                   AND a.attnum > 0 AND NOT a.attisdropped \
                 ORDER BY a.attnum",
                &[&schema, &table],
            )
            .await
            .map_err(exec_err)?;
        Ok(rows
            .iter()
            .map(|r| ColumnInfo {
                name: r.get(0),
                sql_type: r.get(1),
            })
            .collect())
    }

    async fn key_membership(
        &self,
        schema: &str,
        table: &str,
    ) -> StoreResult<HashMap<String, KeyKind>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT a.attname, k.kind FROM ( \
                     SELECT i.indrelid AS relid, unnest(i.indkey) AS attnum, \
                            CASE WHEN i.indisprimary THEN 'PRIMARY' ELSE 'INDEX' END AS kind \
                     FROM pg_catalog.pg_index i \
                   UNION ALL \
                     SELECT c.conrelid, unnest(c.conkey), 'FOREIGN' \
                     FROM pg_catalog.pg_constraint c WHERE c.contype = 'f' \
                 ) k \
                 JOIN pg_catalog.pg_class cl ON cl.oid = k.relid \
                 JOIN pg_catalog.pg_namespace n ON cl.relnamespace = n.oid \
                 JOIN pg_catalog.pg_attribute a \
                   ON a.attrelid = k.relid AND a.attnum = k.attnum \
                 WHERE n.nspname = $1 AND cl.relname = $2",
                &[&schema, &table],
            )
            .await
            .map_err(exec_err)?;

        let mut membership: HashMap<String, KeyKind> = HashMap::new();
        for row in &rows {
            let column: String = row.get(0);
            let kind = match row.get::<_, String>(1).as_str() {
                "PRIMARY" => KeyKind::Primary,
                "FOREIGN" => KeyKind::Foreign,
                _ => KeyKind::Index,
            };
            // Primary membership outranks foreign, which outranks index.
            let entry = membership.entry(column).or_insert(kind);
            if rank(kind) > rank(*entry) {
                *entry = kind;
            }
        }
        Ok(membership)
    }
}

fn rank(kind: KeyKind) -> u8 {
    match kind {
        KeyKind::Primary => 2,
        KeyKind::Foreign => 1,
        KeyKind::Index => 0,
    }
}

// =============================================================================
// TESTS
// =============================================================================
