//! Ledger entry types

use crate::classify::OperationKind;
use crate::payload::StatePayload;
use crate::{Timestamp, VersionId};
use serde::{Deserialize, Serialize};

/// One immutable history version: a forward operation as recorded.
///
/// Entries are created exactly once at append time, read arbitrarily often
/// for display and revert, and destroyed only by a full administrative
/// clear — never individually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Store-assigned, monotonically increasing version id. The sole key
    /// used for revert lookup.
    pub version_id: VersionId,
    /// Original free-text user request (opaque to the engine).
    pub user_request: String,
    /// The exact statement that was run.
    pub executed_sql: String,
    /// Schema the statement targeted.
    pub schema_name: String,
    /// Store-assigned append timestamp.
    pub recorded_at: Timestamp,
    /// Operation kind; `None` when no state was captured.
    pub kind: OperationKind,
    /// Qualified target table, absent for `Other`/`None`.
    pub target_table: Option<String>,
    /// Captured pre-state, absent for `Insert`-less kinds (`Other`/`None`).
    pub payload: Option<StatePayload>,
}

/// An entry as submitted for append, before the store assigns its version
/// id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub user_request: String,
    pub executed_sql: String,
    pub schema_name: String,
    pub kind: OperationKind,
    pub target_table: Option<String>,
    pub payload: Option<StatePayload>,
}

impl NewEntry {
    /// Check the payload shape against the entry kind. Ledger
    /// implementations call this before writing anything.
    pub fn payload_matches_kind(&self) -> bool {
        match &self.payload {
            Some(p) => p.kind() == self.kind,
            None => true,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
