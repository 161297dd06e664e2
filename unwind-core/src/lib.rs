//! UNWIND Core - Data Types and SQL Classification
//!
//! Pure data structures and pure functions shared by every other crate:
//! SQL values, operation kinds, statement classification, state payloads,
//! ledger entries, configuration, and the error taxonomy. No I/O happens
//! here.

pub mod classify;
pub mod config;
pub mod entry;
pub mod error;
pub mod ident;
pub mod payload;
pub mod value;

pub use classify::{classify, Classification, OperationKind, StatementDetail, TableRef};
pub use config::EngineConfig;
pub use entry::{LedgerEntry, NewEntry};
pub use error::{
    CaptureError, ClassifyError, ConfigError, OracleError, RevertError, SessionError, StoreError,
    UnwindError, UnwindResult,
};
pub use ident::{is_valid_identifier, validate_identifier};
pub use payload::{RowSnapshot, StatePayload};
pub use value::SqlValue;

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Monotonically increasing ledger version identifier (store-assigned).
pub type VersionId = i64;
