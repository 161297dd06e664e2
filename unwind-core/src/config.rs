//! Engine configuration

use crate::classify::OperationKind;
use std::str::FromStr;

/// Default pre-image row cap for UPDATE/DELETE capture.
pub const DEFAULT_CAPTURE_ROW_CAP: usize = 100;

/// Engine-level configuration: capture bounds and confirmation policy.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Maximum pre-image rows captured for UPDATE/DELETE. DROP TABLE
    /// capture is never capped (exact reversibility requires the whole
    /// table).
    pub capture_row_cap: usize,
    /// Operation kinds that pause for explicit confirmation between
    /// classification and capture/execution.
    pub confirm_kinds: Vec<OperationKind>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capture_row_cap: DEFAULT_CAPTURE_ROW_CAP,
            confirm_kinds: vec![
                OperationKind::Update,
                OperationKind::Delete,
                OperationKind::AlterRenameColumn,
            ],
        }
    }
}

impl EngineConfig {
    /// Read configuration from `UNWIND_*` environment variables, falling
    /// back to defaults. `UNWIND_CONFIRM_KINDS` is a comma-separated list
    /// of operation kind tags (e.g. `UPDATE,DELETE,DROP_TABLE`); a value
    /// that fails to parse falls back to the default set rather than
    /// silently disabling confirmation.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capture_row_cap: std::env::var("UNWIND_CAPTURE_ROW_CAP")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|cap| *cap > 0)
                .unwrap_or(defaults.capture_row_cap),
            confirm_kinds: std::env::var("UNWIND_CONFIRM_KINDS")
                .ok()
                .and_then(|s| parse_confirm_kinds(&s))
                .unwrap_or(defaults.confirm_kinds),
        }
    }

    /// Whether statements of this kind require explicit confirmation.
    pub fn needs_confirmation(&self, kind: OperationKind) -> bool {
        self.confirm_kinds.contains(&kind)
    }
}

/// Parse a comma-separated list of operation kind tags. Any unknown tag
/// invalidates the whole list.
fn parse_confirm_kinds(raw: &str) -> Option<Vec<OperationKind>> {
    raw.split(',')
        .map(|tag| OperationKind::from_str(tag.trim()).ok())
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
