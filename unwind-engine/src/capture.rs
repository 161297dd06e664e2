//! Pre-state capture
//!
//! Reads whatever the forward statement is about to destroy, before it
//! runs. Capture is fail-closed: any error here aborts the forward
//! operation, because executing without a pre-image would leave an entry
//! that cannot be reverted.

use tracing::warn;
use unwind_core::{
    CaptureError, Classification, OperationKind, RowSnapshot, StatePayload, StatementDetail,
    TableRef, UnwindResult,
};
use unwind_store::SqlStore;

/// Captures pre-state for classified statements against a live store.
pub struct CaptureEngine<'a> {
    store: &'a dyn SqlStore,
    row_cap: usize,
}

impl<'a> CaptureEngine<'a> {
    pub fn new(store: &'a dyn SqlStore, row_cap: usize) -> Self {
        Self { store, row_cap }
    }

    /// Capture the pre-state for a classified statement.
    ///
    /// Returns `None` for kinds with nothing to capture (`Other`, `None`).
    /// A recognized kind whose structural pieces failed to parse is
    /// rejected here rather than guessed at.
    pub async fn capture(
        &self,
        classification: &Classification,
        default_schema: &str,
    ) -> UnwindResult<Option<StatePayload>> {
        if matches!(
            classification.kind,
            OperationKind::Other | OperationKind::None
        ) {
            return Ok(None);
        }

        let table = classification
            .table
            .as_ref()
            .ok_or(CaptureError::UnderSpecified {
                kind: classification.kind,
            })?;

        let payload = match classification.kind {
            OperationKind::Update => StatePayload::Update {
                rows: self
                    .pre_image(table, default_schema, &classification.detail)
                    .await?,
            },
            OperationKind::Delete => StatePayload::Delete {
                rows: self
                    .pre_image(table, default_schema, &classification.detail)
                    .await?,
            },
            OperationKind::Insert => StatePayload::Insert {},
            OperationKind::DropTable => self.table_snapshot(table, default_schema).await?,
            OperationKind::AlterRenameColumn => {
                self.rename_snapshot(table, default_schema, &classification.detail)
                    .await?
            }
            OperationKind::Other | OperationKind::None => return Ok(None),
        };
        Ok(Some(payload))
    }

    /// Capped pre-image read for UPDATE/DELETE. Replays the statement's own
    /// WHERE text so the snapshot covers exactly the rows about to change;
    /// no predicate means a whole-table operation and a whole-table read.
    async fn pre_image(
        &self,
        table: &TableRef,
        default_schema: &str,
        detail: &StatementDetail,
    ) -> UnwindResult<RowSnapshot> {
        let qualified = table.qualified(default_schema);
        let mut sql = format!("SELECT * FROM {qualified}");
        if let StatementDetail::Predicate(Some(pred)) = detail {
            sql.push_str(" WHERE ");
            sql.push_str(pred);
        }
        // One row past the cap distinguishes "exactly cap rows" from
        // "truncated at cap".
        sql.push_str(&format!(" LIMIT {}", self.row_cap + 1));

        let set = self
            .store
            .execute(&sql, &[])
            .await
            .and_then(|outcome| outcome.into_rows())
            .map_err(|e| CaptureError::PreImageReadFailed {
                table: qualified.clone(),
                reason: e.to_string(),
            })?;

        let truncated = set.rows.len() > self.row_cap;
        let mut rows = set.rows;
        rows.truncate(self.row_cap);
        if truncated {
            warn!(
                table = %qualified,
                cap = self.row_cap,
                "pre-image capture truncated at row cap; revert will restore only captured rows"
            );
        }
        Ok(RowSnapshot {
            columns: set.columns,
            rows,
            truncated,
        })
    }

    /// Uncapped full snapshot for DROP TABLE: column definitions plus every
    /// row. Exact recreation needs the whole table, so the row cap does not
    /// apply here.
    async fn table_snapshot(
        &self,
        table: &TableRef,
        default_schema: &str,
    ) -> UnwindResult<StatePayload> {
        let qualified = table.qualified(default_schema);
        let columns = self.introspect_columns(table, default_schema).await?;

        let set = self
            .store
            .execute(&format!("SELECT * FROM {qualified}"), &[])
            .await
            .and_then(|outcome| outcome.into_rows())
            .map_err(|e| CaptureError::PreImageReadFailed {
                table: qualified.clone(),
                reason: e.to_string(),
            })?;

        let (names, types) = columns.into_iter().map(|c| (c.name, c.sql_type)).unzip();
        Ok(StatePayload::DropTable {
            columns: names,
            types,
            rows: set.rows,
        })
    }

    /// Rename pair plus the column list as it stands before the rename,
    /// kept for drift validation when the rename is reverted.
    async fn rename_snapshot(
        &self,
        table: &TableRef,
        default_schema: &str,
        detail: &StatementDetail,
    ) -> UnwindResult<StatePayload> {
        let (old, new) = match detail {
            StatementDetail::Rename { old, new } => (old.clone(), new.clone()),
            _ => {
                return Err(CaptureError::UnderSpecified {
                    kind: OperationKind::AlterRenameColumn,
                }
                .into())
            }
        };
        let columns = self.introspect_columns(table, default_schema).await?;
        Ok(StatePayload::RenameColumn {
            old_name: old,
            new_name: new,
            columns: columns.into_iter().map(|c| c.name).collect(),
        })
    }

    async fn introspect_columns(
        &self,
        table: &TableRef,
        default_schema: &str,
    ) -> UnwindResult<Vec<unwind_store::ColumnInfo>> {
        let schema = table.schema.as_deref().unwrap_or(default_schema);
        let qualified = table.qualified(default_schema);
        let columns = self
            .store
            .list_columns(schema, &table.table)
            .await
            .map_err(|e| CaptureError::PreImageReadFailed {
                table: qualified.clone(),
                reason: e.to_string(),
            })?;
        if columns.is_empty() {
            return Err(CaptureError::NoColumns { table: qualified }.into());
        }
        Ok(columns)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedStore;
    use unwind_core::{classify, SqlValue, UnwindError};
    use unwind_store::{ExecuteOutcome, RowSet};

    fn rows(n: i64) -> ExecuteOutcome {
        ExecuteOutcome::Rows(RowSet {
            columns: vec!["id".to_string(), "status".to_string()],
            rows: (0..n)
                .map(|i| vec![SqlValue::Int(i), SqlValue::Text("open".to_string())])
                .collect(),
        })
    }

    #[tokio::test]
    async fn test_update_capture_replays_predicate() {
        let store = ScriptedStore::new();
        store.push_execute(Ok(rows(2)));
        let engine = CaptureEngine::new(&store, 100);

        let classification = classify("UPDATE orders SET status = 'closed' WHERE id < 2");
        let payload = engine
            .capture(&classification, "public")
            .await
            .unwrap()
            .unwrap();

        let log = store.statements();
        assert_eq!(log, vec!["SELECT * FROM public.orders WHERE id < 2 LIMIT 101"]);
        match payload {
            StatePayload::Update { rows } => {
                assert_eq!(rows.rows.len(), 2);
                assert!(!rows.truncated);
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_without_predicate_reads_whole_table() {
        let store = ScriptedStore::new();
        store.push_execute(Ok(rows(3)));
        let engine = CaptureEngine::new(&store, 100);

        let payload = engine
            .capture(&classify("DELETE FROM orders"), "public")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            store.statements(),
            vec!["SELECT * FROM public.orders LIMIT 101"]
        );
        assert!(matches!(payload, StatePayload::Delete { .. }));
    }

    #[tokio::test]
    async fn test_capture_truncates_at_cap_and_flags_it() {
        let store = ScriptedStore::new();
        store.push_execute(Ok(rows(6)));
        let engine = CaptureEngine::new(&store, 5);

        let payload = engine
            .capture(&classify("DELETE FROM orders"), "public")
            .await
            .unwrap()
            .unwrap();

        match payload {
            StatePayload::Delete { rows } => {
                assert_eq!(rows.rows.len(), 5);
                assert!(rows.truncated);
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exactly_cap_rows_is_not_truncated() {
        let store = ScriptedStore::new();
        store.push_execute(Ok(rows(5)));
        let engine = CaptureEngine::new(&store, 5);

        let payload = engine
            .capture(&classify("DELETE FROM orders"), "public")
            .await
            .unwrap()
            .unwrap();

        match payload {
            StatePayload::Delete { rows } => {
                assert_eq!(rows.rows.len(), 5);
                assert!(!rows.truncated);
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_insert_captures_marker_only() {
        let store = ScriptedStore::new();
        let engine = CaptureEngine::new(&store, 100);

        let payload = engine
            .capture(
                &classify("INSERT INTO orders (id) VALUES (1)"),
                "public",
            )
            .await
            .unwrap();

        assert_eq!(payload, Some(StatePayload::Insert {}));
        assert!(store.statements().is_empty());
    }

    #[tokio::test]
    async fn test_drop_table_snapshot_is_uncapped() {
        let store = ScriptedStore::new();
        store.set_columns(
            "public",
            "orders",
            &[("id", "bigint"), ("status", "character varying(32)")],
        );
        store.push_execute(Ok(rows(250)));
        let engine = CaptureEngine::new(&store, 100);

        let payload = engine
            .capture(&classify("DROP TABLE orders"), "public")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(store.statements(), vec!["SELECT * FROM public.orders"]);
        match payload {
            StatePayload::DropTable {
                columns,
                types,
                rows,
            } => {
                assert_eq!(columns, vec!["id", "status"]);
                assert_eq!(types, vec!["bigint", "character varying(32)"]);
                assert_eq!(rows.len(), 250);
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_drop_table_with_no_columns_fails() {
        let store = ScriptedStore::new();
        let engine = CaptureEngine::new(&store, 100);

        let err = engine
            .capture(&classify("DROP TABLE ghosts"), "public")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UnwindError::Capture(CaptureError::NoColumns { .. })
        ));
    }

    #[tokio::test]
    async fn test_rename_capture_records_pair_and_columns() {
        let store = ScriptedStore::new();
        store.set_columns("public", "orders", &[("id", "bigint"), ("status", "text")]);
        let engine = CaptureEngine::new(&store, 100);

        let payload = engine
            .capture(
                &classify("ALTER TABLE orders RENAME COLUMN status TO state"),
                "public",
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            payload,
            StatePayload::RenameColumn {
                old_name: "status".to_string(),
                new_name: "state".to_string(),
                columns: vec!["id".to_string(), "status".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_read_only_and_unrecognized_capture_nothing() {
        let store = ScriptedStore::new();
        let engine = CaptureEngine::new(&store, 100);

        assert_eq!(
            engine
                .capture(&classify("SELECT * FROM orders"), "public")
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            engine
                .capture(&classify("GRANT SELECT ON orders TO app"), "public")
                .await
                .unwrap(),
            None
        );
        assert!(store.statements().is_empty());
    }

    #[tokio::test]
    async fn test_failed_pre_image_read_fails_closed() {
        let store = ScriptedStore::new();
        store.push_execute(Err(unwind_core::StoreError::Execution {
            reason: "relation does not exist".to_string(),
        }));
        let engine = CaptureEngine::new(&store, 100);

        let err = engine
            .capture(&classify("DELETE FROM missing WHERE id = 1"), "public")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UnwindError::Capture(CaptureError::PreImageReadFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_schema_qualified_table_uses_its_own_schema() {
        let store = ScriptedStore::new();
        store.push_execute(Ok(rows(1)));
        let engine = CaptureEngine::new(&store, 100);

        engine
            .capture(&classify("DELETE FROM sales.orders WHERE id = 1"), "public")
            .await
            .unwrap();

        assert_eq!(
            store.statements(),
            vec!["SELECT * FROM sales.orders WHERE id = 1 LIMIT 101"]
        );
    }
}
