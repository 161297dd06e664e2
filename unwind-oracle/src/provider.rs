//! OpenAI-compatible chat-completions translator with rate limiting

use crate::types::{ApiError, CompletionRequest, CompletionResponse, Message};
use crate::{invalid_response, OracleConfig, QueryTranslator, SchemaContext, Translation};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::debug;
use unwind_core::{OracleError, UnwindResult};

const CLARIFY_PREFIX: &str = "CLARIFY:";

const TRANSLATE_SYSTEM_PROMPT: &str = "\
You translate user requests into SQL for a PostgreSQL database. \
Use only the tables and columns listed in the provided context, with \
lowercase identifiers. If column names are close but not exact, use the \
existing column. Return ONLY one plain SQL statement with no commentary, \
no code fences and no trailing semicolon. If the request is ambiguous or \
refers to tables or columns that do not exist, return a single line \
starting with 'CLARIFY:' followed by the question to ask the user.";

const INVERSE_SYSTEM_PROMPT: &str = "\
You write the inverse of SQL statements for a PostgreSQL database. Given \
a statement that was already executed, return ONE plain SQL statement \
that undoes its effect as closely as possible, using only the tables and \
columns listed in the provided context. Return ONLY the SQL, no \
commentary and no code fences. If the statement cannot be meaningfully \
undone, return a single line starting with 'CLARIFY:' explaining why.";

/// Chat-completions client usable against any OpenAI-compatible endpoint.
pub struct ChatCompletionsTranslator {
    client: Client,
    config: OracleConfig,
    rate_limiter: Arc<Semaphore>,
    last_request: Mutex<Option<Instant>>,
    min_request_interval: Duration,
}

impl ChatCompletionsTranslator {
    /// Create a translator from configuration.
    pub fn new(config: OracleConfig) -> Self {
        let permits = (config.requests_per_minute as usize).max(1);
        let min_interval_ms = (60_000 / u64::from(config.requests_per_minute.max(1))).max(10);
        Self {
            client: Client::new(),
            config,
            rate_limiter: Arc::new(Semaphore::new(permits)),
            last_request: Mutex::new(None),
            min_request_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Make one chat-completions request with rate limiting.
    async fn complete(&self, system: &str, user: String) -> UnwindResult<String> {
        let provider = &self.config.base_url;
        let _permit = self.rate_limiter.acquire().await.map_err(|e| {
            OracleError::InvalidResponse {
                provider: provider.clone(),
                reason: format!("rate limiter closed: {e}"),
            }
        })?;

        // Enforce minimum interval between requests.
        {
            let mut last = self.last_request.lock().await;
            if let Some(prev) = *last {
                let elapsed = prev.elapsed();
                if elapsed < self.min_request_interval {
                    tokio::time::sleep(self.min_request_interval - elapsed).await;
                }
            }
            *last = Some(Instant::now());
        }

        let body = CompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: Some(0.0),
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::RequestFailed {
                provider: provider.clone(),
                status: 0,
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            let message = serde_json::from_str::<ApiError>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => OracleError::RateLimited {
                    provider: provider.clone(),
                }
                .into(),
                _ => OracleError::RequestFailed {
                    provider: provider.clone(),
                    status: status.as_u16() as i32,
                    message,
                }
                .into(),
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(provider, format!("failed to parse response: {e}")))?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| invalid_response(provider, "response contained no choices"))?;

        debug!(model = %self.config.model, "oracle completion received");
        Ok(content)
    }
}

/// Strip code fences and collapse the reply onto one line, the way models
/// tend to decorate SQL output.
fn clean_reply(raw: &str) -> String {
    raw.replace("```sql", "")
        .replace("```", "")
        .replace('\n', " ")
        .trim()
        .to_string()
}

fn into_translation(raw: &str) -> Translation {
    let cleaned = clean_reply(raw);
    match cleaned.strip_prefix(CLARIFY_PREFIX) {
        Some(message) => Translation::ClarificationNeeded(message.trim().to_string()),
        None => Translation::Sql(cleaned),
    }
}

#[async_trait]
impl QueryTranslator for ChatCompletionsTranslator {
    async fn translate(&self, user_text: &str, ctx: &SchemaContext) -> UnwindResult<Translation> {
        let prompt = format!("Context:\n{}\nRequest: {}", ctx.describe(), user_text);
        let reply = self.complete(TRANSLATE_SYSTEM_PROMPT, prompt).await?;
        Ok(into_translation(&reply))
    }

    async fn generate_inverse(
        &self,
        original_sql: &str,
        ctx: &SchemaContext,
    ) -> UnwindResult<Translation> {
        let prompt = format!(
            "Context:\n{}\nStatement to undo: {}",
            ctx.describe(),
            original_sql
        );
        let reply = self.complete(INVERSE_SYSTEM_PROMPT, prompt).await?;
        Ok(into_translation(&reply))
    }
}

impl std::fmt::Debug for ChatCompletionsTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsTranslator")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_reply_strips_fences() {
        let raw = "```sql\nSELECT 1\n```";
        assert_eq!(clean_reply(raw), "SELECT 1");
    }

    #[test]
    fn test_clarify_reply_maps_to_clarification() {
        let t = into_translation("CLARIFY: which column did you mean?");
        assert_eq!(
            t,
            Translation::ClarificationNeeded("which column did you mean?".to_string())
        );
    }

    #[test]
    fn test_plain_reply_maps_to_sql() {
        let t = into_translation("DELETE FROM t WHERE id = 3");
        assert_eq!(t, Translation::Sql("DELETE FROM t WHERE id = 3".to_string()));
    }
}
