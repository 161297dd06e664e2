//! Restricted identifier grammar
//!
//! Table and column names extracted from user SQL are validated against a
//! deliberately narrow grammar before they are ever spliced into generated
//! SQL text. Values never pass through here; they are always bound as
//! parameters.

use crate::error::ClassifyError;
use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").unwrap());

/// Maximum identifier length accepted (matches the PostgreSQL NAMEDATALEN
/// limit of 63 bytes).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Whether `s` is a valid unquoted identifier under the restricted grammar.
pub fn is_valid_identifier(s: &str) -> bool {
    !s.is_empty() && s.len() <= MAX_IDENTIFIER_LEN && IDENTIFIER_RE.is_match(s)
}

/// Validate an identifier, returning it on success.
pub fn validate_identifier(s: &str) -> Result<&str, ClassifyError> {
    if is_valid_identifier(s) {
        Ok(s)
    } else {
        Err(ClassifyError::InvalidIdentifier {
            identifier: s.to_string(),
            reason: if s.is_empty() {
                "empty".to_string()
            } else if s.len() > MAX_IDENTIFIER_LEN {
                format!("longer than {} bytes", MAX_IDENTIFIER_LEN)
            } else {
                "contains characters outside [A-Za-z0-9_$] or starts with a digit".to_string()
            },
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
