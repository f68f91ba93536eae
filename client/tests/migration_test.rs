//! Integration tests for additive schema migrations.

use jigsync_client::db::{self, schema_fingerprint, table_columns};
use jigsync_client::DurableStore;
use jigsync_engine::{
    AddColumn, ColumnDef, ColumnType, MigrationPlan, OperationType, QueueStatus, MUTATIONS_TABLE,
};

/// Shape written by the first offline-capable release.
const LEGACY_TABLE: &str = r#"
    CREATE TABLE pending_mutations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_type TEXT NOT NULL,
        payload BLOB NOT NULL,
        created_at INTEGER NOT NULL,
        synced INTEGER NOT NULL DEFAULT 0
    )
"#;

#[cfg(test)]
mod migration_tests {
    use super::*;

    #[tokio::test]
    async fn test_reopen_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        let store = DurableStore::open(&path).await.unwrap();
        let first = schema_fingerprint(store.pool()).await.unwrap();
        assert_eq!(
            store.migration_report().applied.len(),
            MigrationPlan::current().migrations.len()
        );
        store.close().await;

        let store = DurableStore::open(&path).await.unwrap();
        let second = schema_fingerprint(store.pool()).await.unwrap();
        let report = store.migration_report();
        assert!(report.applied.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(
            report.already_present.len(),
            MigrationPlan::current().migrations.len()
        );
        assert_eq!(first, second);
        store.close().await;
    }

    #[tokio::test]
    async fn test_legacy_database_is_upgraded_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");

        let pool = db::create_pool(&path).await.unwrap();
        sqlx::query(LEGACY_TABLE).execute(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO pending_mutations (entity_type, payload, created_at, synced) \
             VALUES ('validations', ?, 1000, 0), ('repairs', ?, 2000, 1)",
        )
        .bind(br#"{"jig_id":7}"#.to_vec())
        .bind(br#"{"jig_id":8}"#.to_vec())
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;

        let store = DurableStore::open(&path).await.unwrap();
        assert!(!store.migration_report().is_degraded());

        let plan = MigrationPlan::current();
        let columns = table_columns(store.pool(), MUTATIONS_TABLE).await.unwrap();
        assert_eq!(columns, plan.final_columns(MUTATIONS_TABLE));

        let pending = store.get(1).await.unwrap().unwrap();
        assert_eq!(pending.operation_type(), OperationType::Create);
        assert_eq!(pending.priority, 20);
        assert_eq!(pending.status, QueueStatus::Pending);
        assert_eq!(pending.attempts, 0);
        assert_eq!(pending.client_ref, "local-1");
        assert_eq!(pending.envelope.bytes, br#"{"jig_id":7}"#.to_vec());

        let synced = store.get(2).await.unwrap().unwrap();
        assert!(synced.synced);
        assert_eq!(synced.status, QueueStatus::Done);

        let counts = store.count_pending().await.unwrap();
        assert_eq!(counts.total, 1);
        store.close().await;
    }

    #[tokio::test]
    async fn test_partially_migrated_database() {
        let pool = db::create_memory_pool().await.unwrap();
        sqlx::query(LEGACY_TABLE).execute(&pool).await.unwrap();
        sqlx::query("ALTER TABLE pending_mutations ADD COLUMN attempts INTEGER NOT NULL DEFAULT 0")
            .execute(&pool)
            .await
            .unwrap();

        let report = db::run_migrations(&pool, &MigrationPlan::current())
            .await
            .unwrap();
        assert_eq!(report.already_present, vec!["pending_mutations.attempts"]);
        assert_eq!(
            report.applied.len(),
            MigrationPlan::current().migrations.len() - 1
        );
    }

    #[tokio::test]
    async fn test_failed_step_does_not_block_the_rest() {
        let pool = db::create_memory_pool().await.unwrap();

        let mut plan = MigrationPlan::current();
        plan.migrations.insert(
            0,
            AddColumn::new(
                MUTATIONS_TABLE,
                ColumnDef::optional("operator", ColumnType::Text),
            )
            .with_backfill("UPDATE no_such_table SET x = 1"),
        );

        let report = db::run_migrations(&pool, &plan).await.unwrap();
        assert!(report.is_degraded());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].step, "pending_mutations.operator");
        assert_eq!(
            report.applied.len(),
            MigrationPlan::current().migrations.len()
        );

        // The failed step rolled back as a whole
        let columns = table_columns(&pool, MUTATIONS_TABLE).await.unwrap();
        assert!(!columns.contains(&"operator".to_string()));
        assert!(columns.contains(&"status".to_string()));

        // A later run retries it
        let report = db::run_migrations(&pool, &plan).await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(report.applied.is_empty());
    }

    #[tokio::test]
    async fn test_indexes_created_after_columns() {
        let store = DurableStore::open_in_memory().await.unwrap();
        let fingerprint = schema_fingerprint(store.pool()).await.unwrap();
        let names: Vec<_> = fingerprint.iter().map(|(name, _)| name.as_str()).collect();

        for index in &MigrationPlan::current().indexes {
            assert!(names.contains(&index.name.as_str()), "missing {}", index.name);
        }
    }
}
