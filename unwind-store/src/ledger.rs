//! PostgreSQL-backed history ledger
//!
//! Two related tables: the append-only event log keyed by `version_id` and
//! a state-payload table with an on-delete-cascade foreign key back to it,
//! so clearing history removes both consistently. `version_id` comes from
//! a BIGSERIAL, giving the total write order the revert path keys on.

use crate::{HistoryLedger, StoreResult};
use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use serde_json::Value as JsonValue;
use tracing::{debug, info};
use unwind_core::{LedgerEntry, NewEntry, OperationKind, StatePayload, StoreError, VersionId};

const SCHEMA_DDL: &str = "\
CREATE TABLE IF NOT EXISTS unwind_history (\
    version_id   BIGSERIAL PRIMARY KEY,\
    user_request TEXT NOT NULL,\
    executed_sql TEXT NOT NULL,\
    schema_name  TEXT NOT NULL,\
    kind         TEXT NOT NULL,\
    target_table TEXT,\
    recorded_at  TIMESTAMPTZ NOT NULL DEFAULT now()\
);\
CREATE TABLE IF NOT EXISTS unwind_state (\
    version_id BIGINT PRIMARY KEY \
        REFERENCES unwind_history (version_id) ON DELETE CASCADE,\
    payload    JSONB NOT NULL\
);";

const ENTRY_SELECT: &str = "\
SELECT h.version_id, h.user_request, h.executed_sql, h.schema_name, \
       h.recorded_at, h.kind, h.target_table, s.payload \
FROM unwind_history h \
LEFT JOIN unwind_state s USING (version_id)";

/// Postgres ledger over a shared connection pool.
pub struct PgLedger {
    pool: Pool,
}

impl PgLedger {
    /// Create the ledger, running the idempotent schema DDL.
    pub async fn init(pool: Pool) -> StoreResult<Self> {
        let ledger = Self { pool };
        let conn = ledger.get_conn().await?;
        conn.batch_execute(SCHEMA_DDL).await.map_err(store_err)?;
        Ok(ledger)
    }

    async fn get_conn(&self) -> StoreResult<Object> {
        self.pool.get().await.map_err(|e| StoreError::PoolError {
            reason: e.to_string(),
        })
    }
}

fn store_err(e: tokio_postgres::Error) -> StoreError {
    StoreError::Execution {
        reason: e.to_string(),
    }
}

fn entry_from_row(row: &tokio_postgres::Row) -> StoreResult<LedgerEntry> {
    let kind_text: String = row.get(5);
    let kind: OperationKind = kind_text.parse().map_err(|e: String| StoreError::RowDecode {
        column: "kind".to_string(),
        reason: e,
    })?;
    let payload: Option<StatePayload> = match row.get::<_, Option<JsonValue>>(7) {
        Some(json) => Some(serde_json::from_value(json).map_err(|e| StoreError::RowDecode {
            column: "payload".to_string(),
            reason: e.to_string(),
        })?),
        None => None,
    };
    Ok(LedgerEntry {
        version_id: row.get(0),
        user_request: row.get(1),
        executed_sql: row.get(2),
        schema_name: row.get(3),
        recorded_at: row.get(4),
        kind,
        target_table: row.get(6),
        payload,
    })
}

#[async_trait]
impl HistoryLedger for PgLedger {
    async fn append(&self, entry: NewEntry) -> StoreResult<VersionId> {
        if !entry.payload_matches_kind() {
            return Err(StoreError::PayloadKindMismatch {
                payload: entry.payload.as_ref().map(|p| p.kind()).unwrap_or(entry.kind),
                entry: entry.kind,
            });
        }

        let mut conn = self.get_conn().await?;
        // Event row and state row land together or not at all.
        let tx = conn.transaction().await.map_err(store_err)?;

        let version_id: VersionId = tx
            .query_one(
                "INSERT INTO unwind_history \
                     (user_request, executed_sql, schema_name, kind, target_table) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING version_id",
                &[
                    &entry.user_request,
                    &entry.executed_sql,
                    &entry.schema_name,
                    &entry.kind.as_str(),
                    &entry.target_table,
                ],
            )
            .await
            .map_err(store_err)?
            .get(0);

        if let Some(payload) = &entry.payload {
            let json = serde_json::to_value(payload).map_err(|e| StoreError::AppendFailed {
                reason: format!("payload serialization failed: {e}"),
            })?;
            tx.execute(
                "INSERT INTO unwind_state (version_id, payload) VALUES ($1, $2)",
                &[&version_id, &json],
            )
            .await
            .map_err(store_err)?;
        }

        tx.commit().await.map_err(|e| StoreError::AppendFailed {
            reason: e.to_string(),
        })?;

        debug!(version_id, kind = %entry.kind, "ledger entry appended");
        Ok(version_id)
    }

    async fn get(&self, version_id: VersionId) -> StoreResult<Option<LedgerEntry>> {
        let conn = self.get_conn().await?;
        let sql = format!("{ENTRY_SELECT} WHERE h.version_id = $1");
        let rows = conn.query(&sql, &[&version_id]).await.map_err(store_err)?;
        rows.first().map(entry_from_row).transpose()
    }

    async fn list(&self) -> StoreResult<Vec<LedgerEntry>> {
        let conn = self.get_conn().await?;
        let sql = format!("{ENTRY_SELECT} ORDER BY h.version_id DESC");
        let rows = conn.query(&sql, &[]).await.map_err(store_err)?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn clear(&self) -> StoreResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute("TRUNCATE unwind_history RESTART IDENTITY CASCADE")
            .await
            .map_err(store_err)?;
        info!("history ledger cleared; version numbering restarts at 1");
        Ok(())
    }
}
