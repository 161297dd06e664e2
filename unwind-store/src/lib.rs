//! UNWIND Store - Relational Store Adapter and History Ledger
//!
//! Defines the async trait seams the engine works against ([`SqlStore`],
//! [`HistoryLedger`]) and the PostgreSQL implementations of both. Also home
//! to the value normalization layer: dynamic row decoding into
//! [`SqlValue`], parameter binding against prepared-statement types, and
//! the exact-text NUMERIC wire codec.

pub mod ledger;
pub mod mem;
pub mod numeric;
pub mod pg;
pub mod values;

pub use ledger::PgLedger;
pub use mem::MemLedger;
pub use pg::{DbConfig, PgStore};

use async_trait::async_trait;
use std::collections::HashMap;
use unwind_core::{LedgerEntry, NewEntry, SqlValue, StoreError, VersionId};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// EXECUTION OUTCOME TYPES
// ============================================================================

/// A normalized row-set: column names plus decoded rows, in store order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// Outcome of executing one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteOutcome {
    /// The statement produced rows (SELECT and friends).
    Rows(RowSet),
    /// The statement reported an affected-row count.
    Affected(u64),
}

impl ExecuteOutcome {
    /// The row-set, or an execution error for statements that produced a
    /// count instead. Capture paths use this: a capture read that somehow
    /// returns no row-set is a failure, never an empty snapshot.
    pub fn into_rows(self) -> StoreResult<RowSet> {
        match self {
            ExecuteOutcome::Rows(rows) => Ok(rows),
            ExecuteOutcome::Affected(n) => Err(StoreError::Execution {
                reason: format!("expected a row-set, statement reported {n} affected rows"),
            }),
        }
    }
}

/// One column as reported by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Store-rendered type string (e.g. `character varying(255)`), exact
    /// enough to recreate the column.
    pub sql_type: String,
}

/// Key/index membership of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Primary,
    Foreign,
    Index,
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Async relational store adapter.
///
/// One logical operation uses one connection at a time and fully drains
/// each result set before the connection is reused; implementations must
/// never leave a pending result behind. Statement timeouts are enforced
/// here and surface as [`StoreError::Execution`], never as partial results.
#[async_trait]
pub trait SqlStore: Send + Sync {
    /// Execute one parameterized statement.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> StoreResult<ExecuteOutcome>;

    /// List user schemas (system schemas excluded).
    async fn list_schemas(&self) -> StoreResult<Vec<String>>;

    /// List base tables in a schema.
    async fn list_tables(&self, schema: &str) -> StoreResult<Vec<String>>;

    /// List a table's columns in ordinal order.
    async fn list_columns(&self, schema: &str, table: &str) -> StoreResult<Vec<ColumnInfo>>;

    /// Map each key-participating column to its strongest key kind
    /// (primary > foreign > plain index).
    async fn key_membership(
        &self,
        schema: &str,
        table: &str,
    ) -> StoreResult<HashMap<String, KeyKind>>;
}

// ============================================================================
// LEDGER TRAIT
// ============================================================================

/// Append-only, versioned history ledger.
///
/// `append` is the only mutation; entries are immutable once written.
/// `clear` is the administrative escape hatch: it removes every entry and
/// its state payload and resets version numbering to restart from 1.
#[async_trait]
pub trait HistoryLedger: Send + Sync {
    /// Append an entry, returning its store-assigned version id.
    /// Rejects entries whose payload shape does not match their kind.
    async fn append(&self, entry: NewEntry) -> StoreResult<VersionId>;

    /// Look up one entry by version id.
    async fn get(&self, version_id: VersionId) -> StoreResult<Option<LedgerEntry>>;

    /// All entries, most recent first.
    async fn list(&self) -> StoreResult<Vec<LedgerEntry>>;

    /// Destructive full reset (irreversible by design).
    async fn clear(&self) -> StoreResult<()>;
}

// =============================================================================
// TESTS
// =============================================================================
