//! In-memory test doubles
//!
//! A scripted [`SqlStore`] and a canned [`QueryTranslator`] used by the
//! engine's own tests and available to downstream integration tests. The
//! store records every statement it receives in order, which is how tests
//! assert capture-before-execute sequencing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use unwind_core::{OracleError, SqlValue, UnwindResult};
use unwind_oracle::{QueryTranslator, SchemaContext, Translation};
use unwind_store::{ColumnInfo, ExecuteOutcome, KeyKind, SqlStore, StoreResult};

// ============================================================================
// SCRIPTED STORE
// ============================================================================

/// A [`SqlStore`] whose `execute` results are scripted in FIFO order.
///
/// Unscripted executes succeed with `Affected(0)`. Introspection answers
/// come from the configured column/key tables.
#[derive(Default)]
pub struct ScriptedStore {
    executes: Mutex<VecDeque<StoreResult<ExecuteOutcome>>>,
    log: Mutex<Vec<(String, Vec<SqlValue>)>>,
    columns: Mutex<HashMap<(String, String), Vec<ColumnInfo>>>,
    keys: Mutex<HashMap<(String, String), HashMap<String, KeyKind>>>,
    tables: Mutex<HashMap<String, Vec<String>>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next `execute` call.
    pub fn push_execute(&self, result: StoreResult<ExecuteOutcome>) {
        self.executes.lock().unwrap().push_back(result);
    }

    /// Configure `list_columns` for one table.
    pub fn set_columns(&self, schema: &str, table: &str, columns: &[(&str, &str)]) {
        let infos = columns
            .iter()
            .map(|(name, sql_type)| ColumnInfo {
                name: name.to_string(),
                sql_type: sql_type.to_string(),
            })
            .collect();
        self.columns
            .lock()
            .unwrap()
            .insert((schema.to_string(), table.to_string()), infos);
        self.tables
            .lock()
            .unwrap()
            .entry(schema.to_string())
            .or_default()
            .push(table.to_string());
    }

    /// Configure `key_membership` for one table.
    pub fn set_keys(&self, schema: &str, table: &str, keys: &[(&str, KeyKind)]) {
        let map = keys
            .iter()
            .map(|(name, kind)| (name.to_string(), *kind))
            .collect();
        self.keys
            .lock()
            .unwrap()
            .insert((schema.to_string(), table.to_string()), map);
    }

    /// Every executed statement, in order.
    pub fn statements(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    /// Every executed statement with its bound parameters, in order.
    pub fn executed(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlStore for ScriptedStore {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> StoreResult<ExecuteOutcome> {
        self.log
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        match self.executes.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(ExecuteOutcome::Affected(0)),
        }
    }

    async fn list_schemas(&self) -> StoreResult<Vec<String>> {
        let mut schemas: Vec<String> = self.tables.lock().unwrap().keys().cloned().collect();
        schemas.sort();
        Ok(schemas)
    }

    async fn list_tables(&self, schema: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(schema)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_columns(&self, schema: &str, table: &str) -> StoreResult<Vec<ColumnInfo>> {
        Ok(self
            .columns
            .lock()
            .unwrap()
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn key_membership(
        &self,
        schema: &str,
        table: &str,
    ) -> StoreResult<HashMap<String, KeyKind>> {
        Ok(self
            .keys
            .lock()
            .unwrap()
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// CANNED TRANSLATOR
// ============================================================================

/// A [`QueryTranslator`] with queued replies. Unqueued calls fail with
/// [`OracleError::NotConfigured`], so a test that never expects the oracle
/// to run will catch an accidental call.
#[derive(Default)]
pub struct CannedTranslator {
    translations: Mutex<VecDeque<UnwindResult<Translation>>>,
    inverses: Mutex<VecDeque<UnwindResult<Translation>>>,
    inverse_requests: Mutex<Vec<String>>,
}

impl CannedTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_translation(&self, result: UnwindResult<Translation>) {
        self.translations.lock().unwrap().push_back(result);
    }

    pub fn push_inverse(&self, result: UnwindResult<Translation>) {
        self.inverses.lock().unwrap().push_back(result);
    }

    /// The original statements inverse generation was asked about.
    pub fn inverse_requests(&self) -> Vec<String> {
        self.inverse_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryTranslator for CannedTranslator {
    async fn translate(&self, _user_text: &str, _ctx: &SchemaContext) -> UnwindResult<Translation> {
        match self.translations.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Err(OracleError::NotConfigured.into()),
        }
    }

    async fn generate_inverse(
        &self,
        original_sql: &str,
        _ctx: &SchemaContext,
    ) -> UnwindResult<Translation> {
        self.inverse_requests
            .lock()
            .unwrap()
            .push(original_sql.to_string());
        match self.inverses.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Err(OracleError::NotConfigured.into()),
        }
    }
}
