//! Execution orchestration
//!
//! Sequences the forward pipeline (classify, confirm if required, capture,
//! execute, record) and the revert pipeline (lookup, synthesize, execute).
//! Capture happens strictly before execution; a capture failure aborts the
//! forward statement before it can mutate anything.
//!
//! Confirmation is an explicit two-phase exchange: destructive statements
//! are parked under a token and run only when [`Orchestrator::confirm`] is
//! called with it. Nothing is ambient; cancelling drops the statement with
//! no side effects.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use unwind_core::{
    classify, Classification, ClassifyError, EngineConfig, NewEntry, OperationKind, RevertError,
    SessionError, UnwindResult, VersionId,
};
use unwind_oracle::{QueryTranslator, SchemaContext, Translation};
use unwind_store::{ExecuteOutcome, HistoryLedger, SqlStore};
use uuid::Uuid;

use crate::capture::CaptureEngine;
use crate::inverse::{synthesize, Synthesis};

// ============================================================================
// REPORT TYPES
// ============================================================================

/// What happened to a submitted statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// The statement ran and was recorded.
    Executed(ExecutionReport),
    /// The statement is parked; call `confirm` with the token to run it,
    /// or `cancel` to drop it.
    ConfirmationRequired {
        token: Uuid,
        sql: String,
        kind: OperationKind,
    },
    /// The translator needs more information before it can produce SQL.
    ClarificationNeeded(String),
}

/// A completed forward operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// Ledger version recording this operation.
    pub version_id: VersionId,
    pub kind: OperationKind,
    pub outcome: ExecuteOutcome,
}

/// A completed revert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertReport {
    /// The version that was reverted.
    pub version_id: VersionId,
    pub kind: OperationKind,
    /// Inverse statements in the plan. Zero is a benign no-op (nothing to
    /// undo), reported as success.
    pub statements_total: usize,
    pub statements_applied: usize,
    /// True when the inverse came from the query translator oracle rather
    /// than a deterministic rule.
    pub oracle_used: bool,
}

/// A statement parked for confirmation.
#[derive(Debug, Clone)]
struct PendingStatement {
    user_request: String,
    sql: String,
    schema: String,
    classification: Classification,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Ties the store, ledger, and translator together behind the forward and
/// revert pipelines. Reverts are not recorded as new ledger entries;
/// reverting a revert is unsupported.
pub struct Orchestrator {
    store: Arc<dyn SqlStore>,
    ledger: Arc<dyn HistoryLedger>,
    translator: Arc<dyn QueryTranslator>,
    config: EngineConfig,
    pending: Mutex<HashMap<Uuid, PendingStatement>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SqlStore>,
        ledger: Arc<dyn HistoryLedger>,
        translator: Arc<dyn QueryTranslator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            translator,
            config,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Translate a free-text request into SQL and submit it. Clarification
    /// replies from the translator pass straight through to the caller.
    pub async fn process_request(
        &self,
        user_text: &str,
        schema: &str,
    ) -> UnwindResult<Disposition> {
        let ctx = SchemaContext::load(self.store.as_ref(), schema).await?;
        match self.translator.translate(user_text, &ctx).await? {
            Translation::Sql(sql) => self.execute_sql(user_text, &sql, schema).await,
            Translation::ClarificationNeeded(msg) => Ok(Disposition::ClarificationNeeded(msg)),
        }
    }

    /// Submit one SQL statement. Statements whose kind is configured for
    /// confirmation are parked under a fresh token instead of running.
    pub async fn execute_sql(
        &self,
        user_request: &str,
        sql: &str,
        schema: &str,
    ) -> UnwindResult<Disposition> {
        let classification = classify(sql);
        if classification.is_under_specified() {
            return Err(ClassifyError::Ambiguous {
                kind: classification.kind,
                reason: "target table could not be determined".to_string(),
            }
            .into());
        }

        if self.config.needs_confirmation(classification.kind) {
            let token = Uuid::new_v4();
            let kind = classification.kind;
            self.pending.lock().await.insert(
                token,
                PendingStatement {
                    user_request: user_request.to_string(),
                    sql: sql.to_string(),
                    schema: schema.to_string(),
                    classification,
                },
            );
            info!(%token, %kind, "statement parked pending confirmation");
            return Ok(Disposition::ConfirmationRequired {
                token,
                sql: sql.to_string(),
                kind,
            });
        }

        let report = self
            .run_forward(user_request, sql, schema, &classification)
            .await?;
        Ok(Disposition::Executed(report))
    }

    /// Run a parked statement. The token is consumed either way: a failed
    /// confirmation does not leave the statement parked.
    pub async fn confirm(&self, token: Uuid) -> UnwindResult<ExecutionReport> {
        let pending = self
            .pending
            .lock()
            .await
            .remove(&token)
            .ok_or(SessionError::UnknownToken(token))?;
        self.run_forward(
            &pending.user_request,
            &pending.sql,
            &pending.schema,
            &pending.classification,
        )
        .await
    }

    /// Drop a parked statement without running it.
    pub async fn cancel(&self, token: Uuid) -> UnwindResult<()> {
        self.pending
            .lock()
            .await
            .remove(&token)
            .ok_or(SessionError::UnknownToken(token))?;
        info!(%token, "pending statement cancelled");
        Ok(())
    }

    /// Forward pipeline, in strict order: capture, execute, record.
    async fn run_forward(
        &self,
        user_request: &str,
        sql: &str,
        schema: &str,
        classification: &Classification,
    ) -> UnwindResult<ExecutionReport> {
        let capture = CaptureEngine::new(self.store.as_ref(), self.config.capture_row_cap);
        let payload = capture.capture(classification, schema).await?;

        let outcome = self.store.execute(sql, &[]).await?;

        let version_id = self
            .ledger
            .append(NewEntry {
                user_request: user_request.to_string(),
                executed_sql: sql.to_string(),
                schema_name: schema.to_string(),
                kind: classification.kind,
                target_table: classification.table.as_ref().map(|t| t.qualified(schema)),
                payload,
            })
            .await?;

        info!(version = version_id, kind = %classification.kind, "forward operation recorded");
        Ok(ExecutionReport {
            version_id,
            kind: classification.kind,
            outcome,
        })
    }

    /// Revert one recorded version by executing its inverse plan.
    ///
    /// A mid-sequence failure reports how many statements applied before it;
    /// already-applied inverse statements are not rolled back.
    pub async fn revert(&self, version_id: VersionId) -> UnwindResult<RevertReport> {
        let entry = self
            .ledger
            .get(version_id)
            .await?
            .ok_or(RevertError::VersionNotFound(version_id))?;

        match synthesize(&entry, self.store.as_ref()).await? {
            Synthesis::Plan(plan) => {
                let total = plan.statements.len();
                let mut applied = 0;
                for statement in &plan.statements {
                    self.store
                        .execute(&statement.sql, &statement.params)
                        .await
                        .map_err(|e| RevertError::PartialRevert {
                            applied,
                            total,
                            cause: e.to_string(),
                        })?;
                    applied += 1;
                }
                info!(version = version_id, applied, total, "revert applied");
                Ok(RevertReport {
                    version_id,
                    kind: entry.kind,
                    statements_total: total,
                    statements_applied: applied,
                    oracle_used: false,
                })
            }
            Synthesis::NeedsOracle => self.revert_via_oracle(&entry).await,
        }
    }

    /// Oracle fallback: ask the translator for a best-effort inverse of the
    /// recorded statement. A clarification reply means the oracle declined,
    /// which surfaces as a terminal non-reversible error.
    async fn revert_via_oracle(
        &self,
        entry: &unwind_core::LedgerEntry,
    ) -> UnwindResult<RevertReport> {
        let ctx = SchemaContext::load(self.store.as_ref(), &entry.schema_name).await?;
        match self
            .translator
            .generate_inverse(&entry.executed_sql, &ctx)
            .await?
        {
            Translation::Sql(sql) => {
                self.store
                    .execute(&sql, &[])
                    .await
                    .map_err(|e| RevertError::PartialRevert {
                        applied: 0,
                        total: 1,
                        cause: e.to_string(),
                    })?;
                info!(version = entry.version_id, "oracle-synthesized revert applied");
                Ok(RevertReport {
                    version_id: entry.version_id,
                    kind: entry.kind,
                    statements_total: 1,
                    statements_applied: 1,
                    oracle_used: true,
                })
            }
            Translation::ClarificationNeeded(reason) => Err(RevertError::NotReversible {
                version: entry.version_id,
                reason,
            }
            .into()),
        }
    }

    /// All recorded versions, most recent first.
    pub async fn history(&self) -> UnwindResult<Vec<unwind_core::LedgerEntry>> {
        Ok(self.ledger.list().await?)
    }

    /// Destroy the entire ledger and reset version numbering to 1.
    pub async fn clear_history(&self) -> UnwindResult<()> {
        Ok(self.ledger.clear().await?)
    }
}

// =============================================================================
// TESTS
// =============================================================================
