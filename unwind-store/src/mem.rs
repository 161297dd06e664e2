//! In-memory history ledger
//!
//! Same contract as [`crate::PgLedger`] without a database: version ids
//! count up from 1, entries are immutable once pushed, and `clear` resets
//! the counter. Used by tests and by embeddable callers that do not wish
//! to persist history.

use crate::{HistoryLedger, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::RwLock;
use unwind_core::{LedgerEntry, NewEntry, StoreError, VersionId};

#[derive(Default)]
struct MemInner {
    entries: Vec<LedgerEntry>,
    next_version: VersionId,
}

/// In-memory ledger.
pub struct MemLedger {
    inner: RwLock<MemInner>,
}

impl MemLedger {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemInner {
                entries: Vec::new(),
                next_version: 1,
            }),
        }
    }
}

impl Default for MemLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryLedger for MemLedger {
    async fn append(&self, entry: NewEntry) -> StoreResult<VersionId> {
        if !entry.payload_matches_kind() {
            return Err(StoreError::PayloadKindMismatch {
                payload: entry.payload.as_ref().map(|p| p.kind()).unwrap_or(entry.kind),
                entry: entry.kind,
            });
        }
        let mut inner = self.inner.write().map_err(|_| StoreError::AppendFailed {
            reason: "ledger lock poisoned".to_string(),
        })?;
        let version_id = inner.next_version;
        inner.next_version += 1;
        inner.entries.push(LedgerEntry {
            version_id,
            user_request: entry.user_request,
            executed_sql: entry.executed_sql,
            schema_name: entry.schema_name,
            recorded_at: Utc::now(),
            kind: entry.kind,
            target_table: entry.target_table,
            payload: entry.payload,
        });
        Ok(version_id)
    }

    async fn get(&self, version_id: VersionId) -> StoreResult<Option<LedgerEntry>> {
        let inner = self.inner.read().map_err(|_| StoreError::Execution {
            reason: "ledger lock poisoned".to_string(),
        })?;
        Ok(inner
            .entries
            .iter()
            .find(|e| e.version_id == version_id)
            .cloned())
    }

    async fn list(&self) -> StoreResult<Vec<LedgerEntry>> {
        let inner = self.inner.read().map_err(|_| StoreError::Execution {
            reason: "ledger lock poisoned".to_string(),
        })?;
        let mut entries = inner.entries.clone();
        entries.reverse();
        Ok(entries)
    }

    async fn clear(&self) -> StoreResult<()> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Execution {
            reason: "ledger lock poisoned".to_string(),
        })?;
        inner.entries.clear();
        inner.next_version = 1;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
