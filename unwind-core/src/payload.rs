//! Captured state payloads
//!
//! One closed variant per operation kind, so "payload shape matches the
//! operation kind" is checked by the type system rather than by convention.
//! Payloads persist as JSON in the ledger's state table and must round-trip
//! exactly; see [`crate::value::SqlValue`] for the value-level guarantees.

use crate::classify::OperationKind;
use crate::value::SqlValue;
use serde::{Deserialize, Serialize};

/// A capped pre-image snapshot for UPDATE/DELETE capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSnapshot {
    /// Column names in store-returned order.
    pub columns: Vec<String>,
    /// Pre-image rows, verbatim and in store-returned order.
    pub rows: Vec<Vec<SqlValue>>,
    /// True when the capture hit the row cap and rows were left behind.
    /// Truncation is a recorded fact, never silent.
    pub truncated: bool,
}

/// Operation-kind-tagged captured state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StatePayload {
    /// Pre-image rows the UPDATE was about to modify.
    Update { rows: RowSnapshot },
    /// Pre-image rows the DELETE was about to remove.
    Delete { rows: RowSnapshot },
    /// Marker only: insertion identity is recovered at revert time by
    /// re-querying, not stored.
    Insert {},
    /// Full-fidelity snapshot of the dropped table.
    DropTable {
        /// Column names in ordinal order.
        columns: Vec<String>,
        /// Column type strings in the same order (as rendered by the store).
        types: Vec<String>,
        /// All row data, uncapped.
        rows: Vec<Vec<SqlValue>>,
    },
    /// Rename pair plus the full column list at capture time, kept for
    /// drift validation at revert time.
    RenameColumn {
        old_name: String,
        new_name: String,
        columns: Vec<String>,
    },
}

impl StatePayload {
    /// The operation kind this payload shape belongs to.
    pub fn kind(&self) -> OperationKind {
        match self {
            StatePayload::Update { .. } => OperationKind::Update,
            StatePayload::Delete { .. } => OperationKind::Delete,
            StatePayload::Insert {} => OperationKind::Insert,
            StatePayload::DropTable { .. } => OperationKind::DropTable,
            StatePayload::RenameColumn { .. } => OperationKind::AlterRenameColumn,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
