//! UNWIND Oracle - Query Translator Boundary
//!
//! The external natural-language-to-SQL service, modeled as an explicit
//! capability boundary: the engine consults a [`QueryTranslator`] for the
//! initial forward parse of a free-text request and as the fallback
//! inverse-generator when no deterministic inverse is derivable. The trait
//! is pluggable and mockable; nothing in the engine depends on a concrete
//! provider.

pub mod provider;
mod types;

pub use provider::ChatCompletionsTranslator;

use async_trait::async_trait;
use std::collections::HashMap;
use unwind_core::{ConfigError, OracleError, UnwindResult};
use unwind_store::SqlStore;

// ============================================================================
// TRANSLATOR TRAIT
// ============================================================================

/// Outcome of a translation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// A single plain SQL statement.
    Sql(String),
    /// The translator needs more information from the user.
    ClarificationNeeded(String),
}

/// External SQL-generation oracle.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait QueryTranslator: Send + Sync {
    /// Translate a free-text user request into one SQL statement.
    async fn translate(&self, user_text: &str, ctx: &SchemaContext) -> UnwindResult<Translation>;

    /// Produce a best-effort inverse for a statement no deterministic rule
    /// covers. A clarification reply means the oracle declined.
    async fn generate_inverse(
        &self,
        original_sql: &str,
        ctx: &SchemaContext,
    ) -> UnwindResult<Translation>;
}

// ============================================================================
// SCHEMA CONTEXT
// ============================================================================

/// Database context handed to the oracle with every request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaContext {
    /// Schema the session targets.
    pub schema: String,
    /// Tables in that schema.
    pub tables: Vec<String>,
    /// Column names per table.
    pub columns: HashMap<String, Vec<String>>,
}

impl SchemaContext {
    /// Load context for a schema via store introspection.
    pub async fn load(store: &dyn SqlStore, schema: &str) -> UnwindResult<Self> {
        let tables = store.list_tables(schema).await?;
        let mut columns = HashMap::with_capacity(tables.len());
        for table in &tables {
            let cols = store.list_columns(schema, table).await?;
            columns.insert(table.clone(), cols.into_iter().map(|c| c.name).collect());
        }
        Ok(Self {
            schema: schema.to_string(),
            tables,
            columns,
        })
    }

    /// Compact textual rendering for prompt assembly.
    pub fn describe(&self) -> String {
        let mut out = format!("schema: {}\n", self.schema);
        for table in &self.tables {
            let cols = self
                .columns
                .get(table)
                .map(|c| c.join(", "))
                .unwrap_or_default();
            out.push_str(&format!("table {table}({cols})\n"));
        }
        out
    }
}

// ============================================================================
// PROVIDER CONFIGURATION
// ============================================================================

/// Oracle provider configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleConfig {
    /// API key for the chat-completions endpoint.
    pub api_key: String,
    /// OpenAI-compatible base URL.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Maximum requests per minute.
    pub requests_per_minute: u32,
}

impl OracleConfig {
    /// Read configuration from `UNWIND_ORACLE_*` environment variables.
    /// The API key is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key =
            std::env::var("UNWIND_ORACLE_API_KEY").map_err(|_| ConfigError::MissingRequired {
                field: "UNWIND_ORACLE_API_KEY".to_string(),
            })?;
        Ok(Self {
            api_key,
            base_url: std::env::var("UNWIND_ORACLE_BASE_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string()),
            model: std::env::var("UNWIND_ORACLE_MODEL")
                .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string()),
            requests_per_minute: std::env::var("UNWIND_ORACLE_RPM")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(50),
        })
    }
}

/// Shorthand for a provider error on the configured endpoint.
pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> OracleError {
    OracleError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_context_describe() {
        let mut ctx = SchemaContext {
            schema: "sales".to_string(),
            tables: vec!["orders".to_string()],
            columns: HashMap::new(),
        };
        ctx.columns
            .insert("orders".to_string(), vec!["id".to_string(), "total".to_string()]);
        let text = ctx.describe();
        assert!(text.contains("schema: sales"));
        assert!(text.contains("table orders(id, total)"));
    }
}
