//! Additive schema migrations.
//!
//! Each step probes the live table before altering it, so running the plan
//! against a current database is a no-op. A failing step is recorded and
//! skipped; the store then runs degraded instead of refusing to start.

use jigsync_engine::{AddColumn, MigrationPlan};
use serde::Serialize;
use sqlx::Row;

use super::Pool;

/// Outcome of one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// Steps that changed the schema during this run
    pub applied: Vec<String>,
    /// Steps whose column was already there
    pub already_present: Vec<String>,
    /// Steps (and indexes) that failed
    pub failed: Vec<MigrationFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationFailure {
    pub step: String,
    pub error: String,
}

impl MigrationReport {
    /// Whether any step failed.
    pub fn is_degraded(&self) -> bool {
        !self.failed.is_empty()
    }
}

enum StepResult {
    Applied,
    AlreadyPresent,
}

/// Bring the database up to `plan`.
///
/// Only base table creation is fatal. Column steps and indexes report their
/// failures in the returned [`MigrationReport`].
pub async fn run_migrations(pool: &Pool, plan: &MigrationPlan) -> Result<MigrationReport, sqlx::Error> {
    let mut report = MigrationReport::default();

    for table in &plan.tables {
        sqlx::query(&table.create_sql()).execute(pool).await?;
    }

    for step in &plan.migrations {
        let name = step.name();
        match apply_step(pool, step).await {
            Ok(StepResult::Applied) => {
                tracing::info!(step = %name, "Applied migration");
                report.applied.push(name);
            }
            Ok(StepResult::AlreadyPresent) => {
                tracing::debug!(step = %name, "Migration already present");
                report.already_present.push(name);
            }
            Err(e) => {
                tracing::error!(step = %name, error = %e, "Migration failed, continuing degraded");
                report.failed.push(MigrationFailure {
                    step: name,
                    error: e.to_string(),
                });
            }
        }
    }

    // Indexes reference migrated columns, so they go last
    for index in &plan.indexes {
        if let Err(e) = sqlx::query(&index.create_sql()).execute(pool).await {
            tracing::error!(index = %index.name, error = %e, "Failed to create index");
            report.failed.push(MigrationFailure {
                step: index.name.clone(),
                error: e.to_string(),
            });
        }
    }

    Ok(report)
}

async fn apply_step(pool: &Pool, step: &AddColumn) -> Result<StepResult, sqlx::Error> {
    let columns = table_columns(pool, &step.table).await?;
    if columns.iter().any(|c| c == &step.column.name) {
        return Ok(StepResult::AlreadyPresent);
    }

    // Column and backfill land together or not at all
    let mut tx = pool.begin().await?;
    if let Err(e) = sqlx::query(&step.alter_sql()).execute(&mut *tx).await {
        tx.rollback().await?;
        if is_duplicate_column(&e) {
            return Ok(StepResult::AlreadyPresent);
        }
        return Err(e);
    }
    if let Some(backfill) = &step.backfill {
        if let Err(e) = sqlx::query(backfill).execute(&mut *tx).await {
            tx.rollback().await?;
            return Err(e);
        }
    }
    tx.commit().await?;

    Ok(StepResult::Applied)
}

/// Column names of `table`, in declaration order.
pub async fn table_columns(pool: &Pool, table: &str) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await?;
    rows.iter().map(|row| row.try_get("name")).collect()
}

/// Every table and index definition, sorted by name.
///
/// Two databases with the same fingerprint have the same schema.
pub async fn schema_fingerprint(pool: &Pool) -> Result<Vec<(String, String)>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT name, COALESCE(sql, '') AS sql
        FROM sqlite_master
        WHERE type IN ('table', 'index') AND name NOT LIKE 'sqlite_%'
        ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<(String, String), sqlx::Error> {
            Ok((row.try_get("name")?, row.try_get("sql")?))
        })
        .collect()
}

fn is_duplicate_column(e: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = e {
        return db_err.message().contains("duplicate column name");
    }
    false
}
