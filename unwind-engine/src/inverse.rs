//! Inverse synthesis
//!
//! Builds the statement sequence that undoes a recorded operation from its
//! captured payload. Synthesis is deterministic per operation kind; when no
//! deterministic rule applies the result is an explicit [`Synthesis::NeedsOracle`],
//! never a silent guess. Identifiers are re-validated against the restricted
//! grammar before they reach assembled SQL; every value is a bound parameter.

use unwind_core::{
    validate_identifier, LedgerEntry, RevertError, RowSnapshot, SqlValue, StatePayload, TableRef,
    UnwindResult, VersionId,
};
use unwind_store::{KeyKind, SqlStore};

// ============================================================================
// PLAN TYPES
// ============================================================================

/// One inverse statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct InverseStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// An ordered inverse statement sequence. An empty plan is a benign no-op
/// (nothing to undo), not an error.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InversePlan {
    pub statements: Vec<InverseStatement>,
}

/// Outcome of deterministic synthesis.
#[derive(Debug, Clone, PartialEq)]
pub enum Synthesis {
    /// A deterministic inverse exists.
    Plan(InversePlan),
    /// No deterministic rule covers this entry; the caller must consult
    /// the query translator oracle.
    NeedsOracle,
}

// ============================================================================
// SYNTHESIS
// ============================================================================

/// Synthesize the inverse of a recorded operation.
///
/// Re-reads current table structure where the per-kind rule requires it and
/// refuses on drift rather than guessing. Kinds without a payload, and the
/// `Other` kind, come back as [`Synthesis::NeedsOracle`].
pub async fn synthesize(entry: &LedgerEntry, store: &dyn SqlStore) -> UnwindResult<Synthesis> {
    let payload = match &entry.payload {
        Some(p) => p,
        None => return Ok(Synthesis::NeedsOracle),
    };
    let table = match entry.target_table.as_deref().and_then(TableRef::parse) {
        Some(t) => t,
        None => return Ok(Synthesis::NeedsOracle),
    };
    let schema = table
        .schema
        .clone()
        .unwrap_or_else(|| entry.schema_name.clone());
    let qualified = table.qualified(&entry.schema_name);

    let plan = match payload {
        StatePayload::Update { rows } => {
            update_plan(entry.version_id, &qualified, &schema, &table.table, rows, store).await?
        }
        StatePayload::Insert {} => {
            insert_plan(entry.version_id, &qualified, &schema, &table.table, store).await?
        }
        StatePayload::Delete { rows } => delete_plan(entry.version_id, &qualified, rows)?,
        StatePayload::DropTable {
            columns,
            types,
            rows,
        } => drop_table_plan(entry.version_id, &qualified, columns, types, rows)?,
        StatePayload::RenameColumn {
            old_name,
            new_name,
            columns,
        } => {
            rename_plan(
                entry.version_id,
                &qualified,
                &schema,
                &table.table,
                old_name,
                new_name,
                columns,
                store,
            )
            .await?
        }
    };
    Ok(Synthesis::Plan(plan))
}

/// One `UPDATE ... SET <every column> WHERE <first column> = <captured>` per
/// captured row, against the current column list. A column-count mismatch
/// means the schema drifted since capture and the revert is refused.
async fn update_plan(
    version: VersionId,
    qualified: &str,
    schema: &str,
    table: &str,
    snapshot: &RowSnapshot,
    store: &dyn SqlStore,
) -> UnwindResult<InversePlan> {
    let current = store.list_columns(schema, table).await?;
    if current.len() != snapshot.columns.len() {
        return Err(RevertError::SchemaDrift {
            table: qualified.to_string(),
            captured: snapshot.columns.len(),
            current: current.len(),
        }
        .into());
    }
    let names: Vec<&str> = current
        .iter()
        .map(|c| validate_identifier(&c.name))
        .collect::<Result<_, _>>()?;
    let first = match names.first() {
        Some(name) => *name,
        None => {
            return Err(RevertError::NotReversible {
                version,
                reason: format!("{qualified} has no columns"),
            }
            .into())
        }
    };

    let set_clause = names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{name} = ${}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {qualified} SET {set_clause} WHERE {first} = ${}",
        names.len() + 1
    );

    let mut statements = Vec::with_capacity(snapshot.rows.len());
    for row in &snapshot.rows {
        if row.len() != names.len() {
            return Err(RevertError::NotReversible {
                version,
                reason: format!(
                    "captured row has {} values for {} columns",
                    row.len(),
                    names.len()
                ),
            }
            .into());
        }
        let mut params = row.clone();
        params.push(row[0].clone());
        statements.push(InverseStatement {
            sql: sql.clone(),
            params,
        });
    }
    Ok(InversePlan { statements })
}

/// Delete by re-queried identity: read the table's current identity values
/// and remove them. The identity column is the primary key when one exists,
/// else the first column. Imprecise by design (correct only for append-only
/// tables with no intervening writers); an empty table yields an empty plan.
async fn insert_plan(
    version: VersionId,
    qualified: &str,
    schema: &str,
    table: &str,
    store: &dyn SqlStore,
) -> UnwindResult<InversePlan> {
    let columns = store.list_columns(schema, table).await?;
    if columns.is_empty() {
        return Err(RevertError::NotReversible {
            version,
            reason: format!("{qualified} no longer exists"),
        }
        .into());
    }
    let keys = store.key_membership(schema, table).await?;
    let identity = columns
        .iter()
        .find(|c| keys.get(&c.name) == Some(&KeyKind::Primary))
        .unwrap_or(&columns[0]);
    let identity = validate_identifier(&identity.name)?;

    let set = store
        .execute(&format!("SELECT {identity} FROM {qualified}"), &[])
        .await?
        .into_rows()?;
    let values: Vec<SqlValue> = set.rows.into_iter().filter_map(|mut r| r.pop()).collect();
    if values.is_empty() {
        return Ok(InversePlan::default());
    }

    let placeholders = (1..=values.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(InversePlan {
        statements: vec![InverseStatement {
            sql: format!("DELETE FROM {qualified} WHERE {identity} IN ({placeholders})"),
            params: values,
        }],
    })
}

/// One re-INSERT per captured pre-image row, in the stored column order.
fn delete_plan(
    version: VersionId,
    qualified: &str,
    snapshot: &RowSnapshot,
) -> UnwindResult<InversePlan> {
    let columns: Vec<&str> = snapshot
        .columns
        .iter()
        .map(|c| validate_identifier(c))
        .collect::<Result<_, _>>()?;
    let statements = reinsert_statements(version, qualified, &columns, &snapshot.rows)?;
    Ok(InversePlan { statements })
}

/// CREATE TABLE from the stored column definitions, then one INSERT per
/// stored row. Column type strings come from the store's own rendering at
/// capture time and are reused verbatim.
fn drop_table_plan(
    version: VersionId,
    qualified: &str,
    columns: &[String],
    types: &[String],
    rows: &[Vec<SqlValue>],
) -> UnwindResult<InversePlan> {
    if columns.is_empty() || columns.len() != types.len() {
        return Err(RevertError::NotReversible {
            version,
            reason: "captured column and type lists disagree".to_string(),
        }
        .into());
    }
    let names: Vec<&str> = columns
        .iter()
        .map(|c| validate_identifier(c))
        .collect::<Result<_, _>>()?;

    let defs = names
        .iter()
        .zip(types)
        .map(|(name, sql_type)| format!("{name} {sql_type}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut statements = vec![InverseStatement {
        sql: format!("CREATE TABLE {qualified} ({defs})"),
        params: Vec::new(),
    }];
    statements.extend(reinsert_statements(version, qualified, &names, rows)?);
    Ok(InversePlan { statements })
}

/// Reverse the rename. The captured column list must contain the old name
/// and the current table must still carry the new name; otherwise the
/// column drifted after the rename and reversing it would hit the wrong
/// column or none at all.
#[allow(clippy::too_many_arguments)]
async fn rename_plan(
    version: VersionId,
    qualified: &str,
    schema: &str,
    table: &str,
    old_name: &str,
    new_name: &str,
    captured_columns: &[String],
    store: &dyn SqlStore,
) -> UnwindResult<InversePlan> {
    let old_name = validate_identifier(old_name)?;
    let new_name = validate_identifier(new_name)?;
    if !captured_columns.iter().any(|c| c == old_name) {
        return Err(RevertError::NotReversible {
            version,
            reason: format!("captured column list does not contain {old_name}"),
        }
        .into());
    }
    let current = store.list_columns(schema, table).await?;
    if !current.iter().any(|c| c.name == new_name) {
        return Err(RevertError::NotReversible {
            version,
            reason: format!("{qualified} no longer has a column named {new_name}"),
        }
        .into());
    }
    Ok(InversePlan {
        statements: vec![InverseStatement {
            sql: format!("ALTER TABLE {qualified} RENAME COLUMN {new_name} TO {old_name}"),
            params: Vec::new(),
        }],
    })
}

fn reinsert_statements(
    version: VersionId,
    qualified: &str,
    columns: &[&str],
    rows: &[Vec<SqlValue>],
) -> UnwindResult<Vec<InverseStatement>> {
    let column_list = columns.join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("INSERT INTO {qualified} ({column_list}) VALUES ({placeholders})");

    let mut statements = Vec::with_capacity(rows.len());
    for row in rows {
        if row.len() != columns.len() {
            return Err(RevertError::NotReversible {
                version,
                reason: format!(
                    "captured row has {} values for {} columns",
                    row.len(),
                    columns.len()
                ),
            }
            .into());
        }
        statements.push(InverseStatement {
            sql: sql.clone(),
            params: row.clone(),
        });
    }
    Ok(statements)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedStore;
    use unwind_core::{OperationKind, UnwindError};
    use unwind_store::{ExecuteOutcome, RowSet};

    fn entry(
        kind: OperationKind,
        target_table: Option<&str>,
        payload: Option<StatePayload>,
    ) -> LedgerEntry {
        LedgerEntry {
            version_id: 7,
            user_request: "req".to_string(),
            executed_sql: "sql".to_string(),
            schema_name: "public".to_string(),
            recorded_at: chrono::Utc::now(),
            kind,
            target_table: target_table.map(String::from),
            payload,
        }
    }

    fn snapshot(columns: &[&str], rows: Vec<Vec<SqlValue>>) -> RowSnapshot {
        RowSnapshot {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            truncated: false,
        }
    }

    fn plan(synthesis: Synthesis) -> InversePlan {
        match synthesis {
            Synthesis::Plan(p) => p,
            Synthesis::NeedsOracle => panic!("expected a deterministic plan"),
        }
    }

    #[tokio::test]
    async fn test_update_inverse_restores_captured_row() {
        let store = ScriptedStore::new();
        store.set_columns(
            "public",
            "t",
            &[("id", "bigint"), ("status", "text"), ("owner", "text")],
        );
        let rows = snapshot(
            &["id", "status", "owner"],
            vec![vec![
                SqlValue::Int(7),
                SqlValue::Text("open".to_string()),
                SqlValue::Text("alice".to_string()),
            ]],
        );
        let entry = entry(
            OperationKind::Update,
            Some("public.t"),
            Some(StatePayload::Update { rows }),
        );

        let plan = plan(synthesize(&entry, &store).await.unwrap());
        assert_eq!(plan.statements.len(), 1);
        assert_eq!(
            plan.statements[0].sql,
            "UPDATE public.t SET id = $1, status = $2, owner = $3 WHERE id = $4"
        );
        assert_eq!(
            plan.statements[0].params,
            vec![
                SqlValue::Int(7),
                SqlValue::Text("open".to_string()),
                SqlValue::Text("alice".to_string()),
                SqlValue::Int(7),
            ]
        );
    }

    #[tokio::test]
    async fn test_update_inverse_refuses_schema_drift() {
        let store = ScriptedStore::new();
        store.set_columns("public", "t", &[("id", "bigint"), ("status", "text")]);
        let rows = snapshot(
            &["id", "status", "owner"],
            vec![vec![
                SqlValue::Int(7),
                SqlValue::Text("open".to_string()),
                SqlValue::Text("alice".to_string()),
            ]],
        );
        let entry = entry(
            OperationKind::Update,
            Some("public.t"),
            Some(StatePayload::Update { rows }),
        );

        let err = synthesize(&entry, &store).await.unwrap_err();
        assert_eq!(
            err,
            UnwindError::Revert(RevertError::SchemaDrift {
                table: "public.t".to_string(),
                captured: 3,
                current: 2,
            })
        );
    }

    #[tokio::test]
    async fn test_delete_inverse_reinserts_rows() {
        let store = ScriptedStore::new();
        let rows = snapshot(
            &["id", "name"],
            vec![vec![SqlValue::Int(3), SqlValue::Text("x".to_string())]],
        );
        let entry = entry(
            OperationKind::Delete,
            Some("public.t"),
            Some(StatePayload::Delete { rows }),
        );

        let plan = plan(synthesize(&entry, &store).await.unwrap());
        assert_eq!(plan.statements.len(), 1);
        assert_eq!(
            plan.statements[0].sql,
            "INSERT INTO public.t (id, name) VALUES ($1, $2)"
        );
        assert_eq!(
            plan.statements[0].params,
            vec![SqlValue::Int(3), SqlValue::Text("x".to_string())]
        );
    }

    #[tokio::test]
    async fn test_drop_table_inverse_recreates_then_refills() {
        let store = ScriptedStore::new();
        let entry = entry(
            OperationKind::DropTable,
            Some("public.t"),
            Some(StatePayload::DropTable {
                columns: vec!["id".to_string(), "name".to_string()],
                types: vec!["integer".to_string(), "character varying(255)".to_string()],
                rows: vec![vec![SqlValue::Int(1), SqlValue::Text("bob".to_string())]],
            }),
        );

        let plan = plan(synthesize(&entry, &store).await.unwrap());
        assert_eq!(plan.statements.len(), 2);
        assert_eq!(
            plan.statements[0].sql,
            "CREATE TABLE public.t (id integer, name character varying(255))"
        );
        assert!(plan.statements[0].params.is_empty());
        assert_eq!(
            plan.statements[1].sql,
            "INSERT INTO public.t (id, name) VALUES ($1, $2)"
        );
    }

    #[tokio::test]
    async fn test_rename_inverse_swaps_direction() {
        let store = ScriptedStore::new();
        store.set_columns("public", "t", &[("id", "bigint"), ("new", "text")]);
        let entry = entry(
            OperationKind::AlterRenameColumn,
            Some("public.t"),
            Some(StatePayload::RenameColumn {
                old_name: "old".to_string(),
                new_name: "new".to_string(),
                columns: vec!["id".to_string(), "old".to_string()],
            }),
        );

        let plan = plan(synthesize(&entry, &store).await.unwrap());
        assert_eq!(
            plan.statements[0].sql,
            "ALTER TABLE public.t RENAME COLUMN new TO old"
        );
    }

    #[tokio::test]
    async fn test_rename_inverse_refuses_when_renamed_column_gone() {
        let store = ScriptedStore::new();
        store.set_columns("public", "t", &[("id", "bigint"), ("other", "text")]);
        let entry = entry(
            OperationKind::AlterRenameColumn,
            Some("public.t"),
            Some(StatePayload::RenameColumn {
                old_name: "old".to_string(),
                new_name: "new".to_string(),
                columns: vec!["id".to_string(), "old".to_string()],
            }),
        );

        let err = synthesize(&entry, &store).await.unwrap_err();
        assert!(matches!(
            err,
            UnwindError::Revert(RevertError::NotReversible { version: 7, .. })
        ));
    }

    #[tokio::test]
    async fn test_insert_inverse_deletes_by_primary_key() {
        let store = ScriptedStore::new();
        store.set_columns("public", "t", &[("name", "text"), ("id", "bigint")]);
        store.set_keys("public", "t", &[("id", KeyKind::Primary)]);
        store.push_execute(Ok(ExecuteOutcome::Rows(RowSet {
            columns: vec!["id".to_string()],
            rows: vec![vec![SqlValue::Int(10)], vec![SqlValue::Int(11)]],
        })));
        let entry = entry(
            OperationKind::Insert,
            Some("public.t"),
            Some(StatePayload::Insert {}),
        );

        let plan = plan(synthesize(&entry, &store).await.unwrap());
        assert_eq!(store.statements(), vec!["SELECT id FROM public.t"]);
        assert_eq!(
            plan.statements[0].sql,
            "DELETE FROM public.t WHERE id IN ($1, $2)"
        );
        assert_eq!(
            plan.statements[0].params,
            vec![SqlValue::Int(10), SqlValue::Int(11)]
        );
    }

    #[tokio::test]
    async fn test_insert_inverse_falls_back_to_first_column() {
        let store = ScriptedStore::new();
        store.set_columns("public", "t", &[("name", "text"), ("id", "bigint")]);
        store.push_execute(Ok(ExecuteOutcome::Rows(RowSet {
            columns: vec!["name".to_string()],
            rows: vec![vec![SqlValue::Text("a".to_string())]],
        })));
        let entry = entry(
            OperationKind::Insert,
            Some("public.t"),
            Some(StatePayload::Insert {}),
        );

        let plan = plan(synthesize(&entry, &store).await.unwrap());
        assert_eq!(store.statements(), vec!["SELECT name FROM public.t"]);
        assert_eq!(
            plan.statements[0].sql,
            "DELETE FROM public.t WHERE name IN ($1)"
        );
    }

    #[tokio::test]
    async fn test_insert_inverse_on_empty_table_is_benign_noop() {
        let store = ScriptedStore::new();
        store.set_columns("public", "t", &[("id", "bigint")]);
        store.push_execute(Ok(ExecuteOutcome::Rows(RowSet {
            columns: vec!["id".to_string()],
            rows: vec![],
        })));
        let entry = entry(
            OperationKind::Insert,
            Some("public.t"),
            Some(StatePayload::Insert {}),
        );

        let plan = plan(synthesize(&entry, &store).await.unwrap());
        assert!(plan.statements.is_empty());
    }

    #[tokio::test]
    async fn test_other_kind_needs_oracle() {
        let store = ScriptedStore::new();
        let entry = entry(OperationKind::Other, None, None);
        assert_eq!(
            synthesize(&entry, &store).await.unwrap(),
            Synthesis::NeedsOracle
        );
    }

    #[tokio::test]
    async fn test_unparsable_target_table_needs_oracle() {
        let store = ScriptedStore::new();
        let entry = entry(
            OperationKind::Insert,
            Some("not a table; DROP TABLE x"),
            Some(StatePayload::Insert {}),
        );
        assert_eq!(
            synthesize(&entry, &store).await.unwrap(),
            Synthesis::NeedsOracle
        );
    }

    #[tokio::test]
    async fn test_empty_delete_snapshot_is_empty_plan() {
        let store = ScriptedStore::new();
        let rows = snapshot(&["id"], vec![]);
        let entry = entry(
            OperationKind::Delete,
            Some("public.t"),
            Some(StatePayload::Delete { rows }),
        );
        let plan = plan(synthesize(&entry, &store).await.unwrap());
        assert!(plan.statements.is_empty());
    }
}
