//! Error types for UNWIND operations

use crate::classify::OperationKind;
use crate::VersionId;
use thiserror::Error;
use uuid::Uuid;

/// Statement classification errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("Statement recognized as {kind:?} but under-specified: {reason}")]
    Ambiguous { kind: OperationKind, reason: String },

    #[error("Invalid identifier {identifier:?}: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },
}

/// Pre-state capture errors. Any capture failure aborts the forward
/// statement before it executes (fail-closed).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Pre-image read failed for {table}: {reason}")]
    PreImageReadFailed { table: String, reason: String },

    #[error("Introspection returned no columns for {table}")]
    NoColumns { table: String },

    #[error("Statement classified as {kind:?} but missing the structure needed for capture")]
    UnderSpecified { kind: OperationKind },
}

/// Relational store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Connection pool error: {reason}")]
    PoolError { reason: String },

    #[error("Statement execution failed: {reason}")]
    Execution { reason: String },

    #[error("Row decode failed for column {column}: {reason}")]
    RowDecode { column: String, reason: String },

    #[error("Cannot bind {value} as parameter type {pg_type}")]
    BindMismatch { value: String, pg_type: String },

    #[error("Payload kind {payload:?} does not match entry kind {entry:?}")]
    PayloadKindMismatch {
        payload: OperationKind,
        entry: OperationKind,
    },

    #[error("Ledger append failed: {reason}")]
    AppendFailed { reason: String },
}

/// Revert-path errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RevertError {
    #[error("Version {0} not found")]
    VersionNotFound(VersionId),

    #[error("Schema drift on {table}: captured {captured} columns, table now has {current}")]
    SchemaDrift {
        table: String,
        captured: usize,
        current: usize,
    },

    #[error("Version {version} is not reversible: {reason}")]
    NotReversible { version: VersionId, reason: String },

    #[error("Partial revert: {applied} of {total} inverse statements applied before failure: {cause}")]
    PartialRevert {
        applied: usize,
        total: usize,
        cause: String,
    },
}

/// Query translator (oracle) errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("No query translator configured")]
    NotConfigured,

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Pending-confirmation session errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("No pending statement for token {0}")]
    UnknownToken(Uuid),
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Top-level error type. Every fallible operation in the workspace returns
/// one of these; raw driver errors never cross a crate boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UnwindError {
    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Revert error: {0}")]
    Revert(#[from] RevertError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for UNWIND operations.
pub type UnwindResult<T> = Result<T, UnwindError>;

// =============================================================================
// TESTS
// =============================================================================
