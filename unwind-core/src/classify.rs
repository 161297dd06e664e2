//! Statement classification
//!
//! Determines the operation kind of a raw SQL statement from its leading
//! keywords and extracts the structural pieces state capture needs: the
//! target table, the WHERE predicate, or the renamed column pair.
//!
//! Recognition is deliberately shallow. A statement whose leading keyword
//! matches a known pattern but whose structure fails to parse still gets
//! its kind, with the structural fields absent; callers must treat that as
//! non-capturable rather than guess.

use crate::ident::is_valid_identifier;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// OPERATION KIND
// ============================================================================

/// Operation kind of a classified statement.
///
/// `None` marks ledger entries recorded without any capture (read-only or
/// otherwise non-mutating statements); `Other` marks statements that mutate
/// (or may mutate) but match no recognized pattern and are reversible only
/// through the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Update,
    Insert,
    Delete,
    DropTable,
    AlterRenameColumn,
    Other,
    None,
}

impl OperationKind {
    /// Ledger persistence tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Update => "UPDATE",
            OperationKind::Insert => "INSERT",
            OperationKind::Delete => "DELETE",
            OperationKind::DropTable => "DROP_TABLE",
            OperationKind::AlterRenameColumn => "ALTER_RENAME_COLUMN",
            OperationKind::Other => "OTHER",
            OperationKind::None => "NONE",
        }
    }

    /// Whether this kind has a deterministic inverse given a valid payload.
    pub fn deterministically_reversible(&self) -> bool {
        matches!(
            self,
            OperationKind::Update
                | OperationKind::Insert
                | OperationKind::Delete
                | OperationKind::DropTable
                | OperationKind::AlterRenameColumn
        )
    }

    /// Default confirmation policy: destructive in-place mutations pause
    /// for an explicit confirmation before capture and execution.
    pub fn requires_confirmation(&self) -> bool {
        matches!(
            self,
            OperationKind::Update | OperationKind::Delete | OperationKind::AlterRenameColumn
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPDATE" => Ok(OperationKind::Update),
            "INSERT" => Ok(OperationKind::Insert),
            "DELETE" => Ok(OperationKind::Delete),
            "DROP_TABLE" => Ok(OperationKind::DropTable),
            "ALTER_RENAME_COLUMN" => Ok(OperationKind::AlterRenameColumn),
            "OTHER" => Ok(OperationKind::Other),
            "NONE" => Ok(OperationKind::None),
            other => Err(format!("unknown operation kind: {other}")),
        }
    }
}

// ============================================================================
// TABLE REFERENCE
// ============================================================================

/// A validated, possibly schema-qualified table reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Explicit schema qualifier, if the statement used one.
    pub schema: Option<String>,
    /// Bare table name.
    pub table: String,
}

impl TableRef {
    /// Parse `table` or `schema.table`. Both parts must pass the restricted
    /// identifier grammar; quoted identifiers are out of grammar.
    pub fn parse(raw: &str) -> Option<TableRef> {
        let mut parts = raw.split('.');
        let first = parts.next()?;
        match (parts.next(), parts.next()) {
            (None, _) if is_valid_identifier(first) => Some(TableRef {
                schema: None,
                table: first.to_string(),
            }),
            (Some(second), None)
                if is_valid_identifier(first) && is_valid_identifier(second) =>
            {
                Some(TableRef {
                    schema: Some(first.to_string()),
                    table: second.to_string(),
                })
            }
            _ => None,
        }
    }

    /// Render as `schema.table`, qualifying with `default_schema` when the
    /// statement did not name one.
    pub fn qualified(&self, default_schema: &str) -> String {
        match &self.schema {
            Some(s) => format!("{}.{}", s, self.table),
            None => format!("{}.{}", default_schema, self.table),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(s) => write!(f, "{}.{}", s, self.table),
            None => f.write_str(&self.table),
        }
    }
}

// ============================================================================
// CLASSIFICATION RESULT
// ============================================================================

/// Structural detail extracted alongside the operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementDetail {
    /// No structural detail for this kind.
    None,
    /// UPDATE/DELETE predicate: the raw text after `WHERE`, absent when the
    /// statement had no WHERE clause (whole-table operation).
    Predicate(Option<String>),
    /// ALTER ... RENAME COLUMN pair.
    Rename { old: String, new: String },
}

/// Result of classifying one SQL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: OperationKind,
    /// Absent when the kind was recognized but the table failed to parse.
    pub table: Option<TableRef>,
    pub detail: StatementDetail,
}

impl Classification {
    fn bare(kind: OperationKind) -> Self {
        Classification {
            kind,
            table: None,
            detail: StatementDetail::None,
        }
    }

    /// Recognized kind whose structure failed to parse. Callers must treat
    /// this as non-capturable and fail the forward operation.
    pub fn is_under_specified(&self) -> bool {
        self.kind.deterministically_reversible() && self.table.is_none()
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

static WHERE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bwhere\b").unwrap());
static SET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bset\b").unwrap());
static RENAME_COLUMN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\brename\s+column\s+(\S+)\s+to\s+(\S+)").unwrap()
});

/// Leading keywords that mark a statement as read-only (recorded with kind
/// `None`, no capture attempted).
const READ_ONLY_KEYWORDS: &[&str] = &["SELECT", "SHOW", "EXPLAIN", "WITH", "TABLE", "VALUES"];

/// Classify one SQL statement by its leading keywords.
///
/// Matching is case-insensitive on trimmed input; a trailing semicolon is
/// ignored. This never fails: unrecognized statements come back as
/// [`OperationKind::Other`] (or `None` for read-only forms), and recognized
/// statements with unparsable structure come back with their kind set and
/// the structural fields absent.
pub fn classify(sql: &str) -> Classification {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    let mut words = trimmed.split_whitespace();
    let first = match words.next() {
        Some(w) => w.to_ascii_uppercase(),
        None => return Classification::bare(OperationKind::None),
    };

    match first.as_str() {
        "UPDATE" => classify_update(trimmed, words.next()),
        "INSERT" => classify_insert(words.next(), words.next()),
        "DELETE" => classify_delete(trimmed, words.next(), words.next()),
        "DROP" => classify_drop(words.next(), &mut words),
        "ALTER" => classify_alter(trimmed, words.next(), words.next()),
        kw if READ_ONLY_KEYWORDS.contains(&kw) => Classification::bare(OperationKind::None),
        _ => Classification::bare(OperationKind::Other),
    }
}

fn classify_update(stmt: &str, table_token: Option<&str>) -> Classification {
    let table = table_token.and_then(table_ref_from_token);
    // An UPDATE without a SET clause is structurally broken; keep the kind
    // but drop the table so the statement is treated as under-specified.
    if table.is_none() || !SET_RE.is_match(stmt) {
        return Classification::bare(OperationKind::Update);
    }
    Classification {
        kind: OperationKind::Update,
        table,
        detail: StatementDetail::Predicate(extract_predicate(stmt)),
    }
}

fn classify_insert(into_token: Option<&str>, table_token: Option<&str>) -> Classification {
    if !matches_keyword(into_token, "INTO") {
        return Classification::bare(OperationKind::Insert);
    }
    match table_token.and_then(table_ref_from_token) {
        Some(table) => Classification {
            kind: OperationKind::Insert,
            table: Some(table),
            detail: StatementDetail::None,
        },
        None => Classification::bare(OperationKind::Insert),
    }
}

fn classify_delete(
    stmt: &str,
    from_token: Option<&str>,
    table_token: Option<&str>,
) -> Classification {
    if !matches_keyword(from_token, "FROM") {
        return Classification::bare(OperationKind::Delete);
    }
    match table_token.and_then(table_ref_from_token) {
        Some(table) => Classification {
            kind: OperationKind::Delete,
            table: Some(table),
            detail: StatementDetail::Predicate(extract_predicate(stmt)),
        },
        None => Classification::bare(OperationKind::Delete),
    }
}

fn classify_drop<'a>(
    table_keyword: Option<&str>,
    rest: &mut impl Iterator<Item = &'a str>,
) -> Classification {
    if !matches_keyword(table_keyword, "TABLE") {
        return Classification::bare(OperationKind::Other);
    }
    let mut next = rest.next();
    // Tolerate DROP TABLE IF EXISTS t.
    if matches_keyword(next, "IF") && matches_keyword(rest.next(), "EXISTS") {
        next = rest.next();
    }
    match next.and_then(table_ref_from_token) {
        Some(table) => Classification {
            kind: OperationKind::DropTable,
            table: Some(table),
            detail: StatementDetail::None,
        },
        None => Classification::bare(OperationKind::DropTable),
    }
}

fn classify_alter(
    stmt: &str,
    table_keyword: Option<&str>,
    table_token: Option<&str>,
) -> Classification {
    if !matches_keyword(table_keyword, "TABLE") {
        return Classification::bare(OperationKind::Other);
    }
    let Some(caps) = RENAME_COLUMN_RE.captures(stmt) else {
        // ALTER TABLE in some other form (ADD COLUMN, DROP CONSTRAINT, ...):
        // not a pattern we capture state for.
        return Classification::bare(OperationKind::Other);
    };
    let table = table_token.and_then(table_ref_from_token);
    let old = caps.get(1).map(|m| m.as_str().to_string());
    let new = caps.get(2).map(|m| m.as_str().to_string());
    match (table, old, new) {
        (Some(table), Some(old), Some(new))
            if is_valid_identifier(&old) && is_valid_identifier(&new) =>
        {
            Classification {
                kind: OperationKind::AlterRenameColumn,
                table: Some(table),
                detail: StatementDetail::Rename { old, new },
            }
        }
        _ => Classification::bare(OperationKind::AlterRenameColumn),
    }
}

fn matches_keyword(token: Option<&str>, keyword: &str) -> bool {
    token.is_some_and(|t| t.eq_ignore_ascii_case(keyword))
}

/// A table token may run straight into a parenthesis (`t(a,b)`) or carry a
/// trailing semicolon; cut it back to the bare reference before parsing.
fn table_ref_from_token(token: &str) -> Option<TableRef> {
    let end = token.find('(').unwrap_or(token.len());
    TableRef::parse(token[..end].trim_end_matches(';'))
}

/// Raw predicate text after the first `WHERE`, if any.
fn extract_predicate(stmt: &str) -> Option<String> {
    let m = WHERE_RE.find(stmt)?;
    let predicate = stmt[m.end()..].trim();
    if predicate.is_empty() {
        None
    } else {
        Some(predicate.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn table(c: &Classification) -> String {
        c.table.as_ref().unwrap().to_string()
    }

    // ========================================================================
    // UPDATE
    // ========================================================================

    #[test]
    fn test_update_with_predicate() {
        let c = classify("UPDATE t SET status = 'closed' WHERE id = 7");
        assert_eq!(c.kind, OperationKind::Update);
        assert_eq!(table(&c), "t");
        assert_eq!(
            c.detail,
            StatementDetail::Predicate(Some("id = 7".to_string()))
        );
    }

    #[test]
    fn test_update_without_predicate() {
        let c = classify("update inventory.items set price = price * 2");
        assert_eq!(c.kind, OperationKind::Update);
        assert_eq!(table(&c), "inventory.items");
        assert_eq!(c.detail, StatementDetail::Predicate(None));
    }

    #[test]
    fn test_update_missing_set_is_under_specified() {
        let c = classify("UPDATE t WHERE id = 1");
        assert_eq!(c.kind, OperationKind::Update);
        assert!(c.table.is_none());
        assert!(c.is_under_specified());
    }

    #[test]
    fn test_update_bad_table_is_under_specified() {
        let c = classify("UPDATE \"my table\" SET x = 1");
        assert_eq!(c.kind, OperationKind::Update);
        assert!(c.is_under_specified());
    }

    // ========================================================================
    // INSERT / DELETE
    // ========================================================================

    #[test]
    fn test_insert() {
        let c = classify("  insert into sales.orders (id, total) VALUES (1, 9.99);  ");
        assert_eq!(c.kind, OperationKind::Insert);
        assert_eq!(table(&c), "sales.orders");
        assert_eq!(c.detail, StatementDetail::None);
    }

    #[test]
    fn test_insert_table_glued_to_columns() {
        let c = classify("INSERT INTO t(a,b) VALUES (1,2)");
        assert_eq!(table(&c), "t");
    }

    #[test]
    fn test_insert_missing_into() {
        let c = classify("INSERT t VALUES (1)");
        assert_eq!(c.kind, OperationKind::Insert);
        assert!(c.is_under_specified());
    }

    #[test]
    fn test_delete_with_predicate() {
        let c = classify("DELETE FROM t WHERE id = 3");
        assert_eq!(c.kind, OperationKind::Delete);
        assert_eq!(table(&c), "t");
        assert_eq!(
            c.detail,
            StatementDetail::Predicate(Some("id = 3".to_string()))
        );
    }

    #[test]
    fn test_delete_whole_table() {
        let c = classify("DELETE FROM audit_log");
        assert_eq!(c.kind, OperationKind::Delete);
        assert_eq!(c.detail, StatementDetail::Predicate(None));
    }

    // ========================================================================
    // DROP TABLE / ALTER
    // ========================================================================

    #[test]
    fn test_drop_table() {
        let c = classify("DROP TABLE t");
        assert_eq!(c.kind, OperationKind::DropTable);
        assert_eq!(table(&c), "t");
    }

    #[test]
    fn test_drop_table_if_exists() {
        let c = classify("drop table if exists staging.tmp_load");
        assert_eq!(c.kind, OperationKind::DropTable);
        assert_eq!(table(&c), "staging.tmp_load");
    }

    #[test]
    fn test_drop_index_is_other() {
        let c = classify("DROP INDEX idx_orders_id");
        assert_eq!(c.kind, OperationKind::Other);
    }

    #[test]
    fn test_alter_rename_column() {
        let c = classify("ALTER TABLE t RENAME COLUMN old TO new");
        assert_eq!(c.kind, OperationKind::AlterRenameColumn);
        assert_eq!(table(&c), "t");
        assert_eq!(
            c.detail,
            StatementDetail::Rename {
                old: "old".to_string(),
                new: "new".to_string()
            }
        );
    }

    #[test]
    fn test_alter_rename_case_insensitive() {
        let c = classify("alter table sales.orders rename column total to amount");
        assert_eq!(c.kind, OperationKind::AlterRenameColumn);
        assert_eq!(
            c.detail,
            StatementDetail::Rename {
                old: "total".to_string(),
                new: "amount".to_string()
            }
        );
    }

    #[test]
    fn test_alter_add_column_is_other() {
        let c = classify("ALTER TABLE t ADD COLUMN c INT");
        assert_eq!(c.kind, OperationKind::Other);
    }

    #[test]
    fn test_alter_rename_bad_identifiers() {
        let c = classify("ALTER TABLE t RENAME COLUMN \"old name\" TO new");
        assert_eq!(c.kind, OperationKind::AlterRenameColumn);
        assert!(c.is_under_specified());
    }

    // ========================================================================
    // READ-ONLY / OTHER
    // ========================================================================

    #[test]
    fn test_read_only_statements_are_none() {
        for sql in [
            "SELECT * FROM t",
            "show tables",
            "EXPLAIN SELECT 1",
            "WITH x AS (SELECT 1) SELECT * FROM x",
            "",
        ] {
            assert_eq!(classify(sql).kind, OperationKind::None, "{sql:?}");
        }
    }

    #[test]
    fn test_unrecognized_statements_are_other() {
        for sql in [
            "CREATE TABLE t (id INT)",
            "TRUNCATE t",
            "GRANT SELECT ON t TO bob",
            "garbage in garbage out",
        ] {
            assert_eq!(classify(sql).kind, OperationKind::Other, "{sql:?}");
        }
    }

    // ========================================================================
    // KIND PERSISTENCE TAGS
    // ========================================================================

    #[test]
    fn test_kind_str_roundtrip() {
        for kind in [
            OperationKind::Update,
            OperationKind::Insert,
            OperationKind::Delete,
            OperationKind::DropTable,
            OperationKind::AlterRenameColumn,
            OperationKind::Other,
            OperationKind::None,
        ] {
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_confirmation_policy_defaults() {
        assert!(OperationKind::Update.requires_confirmation());
        assert!(OperationKind::Delete.requires_confirmation());
        assert!(OperationKind::AlterRenameColumn.requires_confirmation());
        assert!(!OperationKind::Insert.requires_confirmation());
        assert!(!OperationKind::DropTable.requires_confirmation());
        assert!(!OperationKind::Other.requires_confirmation());
    }

    #[test]
    fn test_table_ref_qualification() {
        let bare = TableRef::parse("orders").unwrap();
        assert_eq!(bare.qualified("public"), "public.orders");
        let qualified = TableRef::parse("sales.orders").unwrap();
        assert_eq!(qualified.qualified("public"), "sales.orders");
        assert!(TableRef::parse("a.b.c").is_none());
    }
}
