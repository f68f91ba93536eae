//! Database operations for the pending_mutations table.

use jigsync_engine::{
    FailureClass, MutationEnvelope, MutationId, NewMutation, PendingMutation, Timestamp,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::Pool;

/// A stored mutation row from the database.
#[derive(Debug)]
pub struct StoredMutation {
    pub id: i64,
    pub entity_type: String,
    pub operation_type: String,
    pub entity_id: Option<String>,
    pub client_ref: String,
    pub schema_version: i64,
    pub payload: Vec<u8>,
    pub priority: i64,
    pub status: String,
    pub created_at: i64,
    pub synced: bool,
    pub attempts: i64,
    pub last_attempt_at: Option<i64>,
    pub last_error: Option<String>,
    pub last_error_class: Option<String>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StoredMutation {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(StoredMutation {
            id: row.try_get("id")?,
            entity_type: row.try_get("entity_type")?,
            operation_type: row.try_get("operation_type")?,
            entity_id: row.try_get("entity_id")?,
            client_ref: row.try_get("client_ref")?,
            schema_version: row.try_get("schema_version")?,
            payload: row.try_get("payload")?,
            priority: row.try_get("priority")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            synced: row.try_get("synced")?,
            attempts: row.try_get("attempts")?,
            last_attempt_at: row.try_get("last_attempt_at")?,
            last_error: row.try_get("last_error")?,
            last_error_class: row.try_get("last_error_class")?,
        })
    }
}

impl StoredMutation {
    /// Convert database row to a jigsync-engine PendingMutation.
    pub fn to_mutation(&self) -> Result<PendingMutation, jigsync_engine::Error> {
        let envelope = MutationEnvelope {
            entity_type: self.entity_type.clone(),
            operation_type: self.operation_type.parse()?,
            entity_id: self.entity_id.clone(),
            schema_version: u32::try_from(self.schema_version)
                .map_err(|_| jigsync_engine::Error::InvalidSchemaVersion)?,
            bytes: self.payload.clone(),
        };

        // Rows written before client_ref existed get a stable stand-in
        let client_ref = if self.client_ref.is_empty() {
            format!("local-{}", self.id)
        } else {
            self.client_ref.clone()
        };

        let last_error_class = self
            .last_error_class
            .as_deref()
            .map(str::parse::<FailureClass>)
            .transpose()?;

        Ok(PendingMutation {
            id: self.id,
            client_ref,
            envelope,
            priority: self.priority as i32,
            status: self.status.parse()?,
            created_at: self.created_at.max(0) as u64,
            synced: self.synced,
            attempts: self.attempts.clamp(0, i64::from(u32::MAX)) as u32,
            last_attempt_at: self.last_attempt_at.map(|t| t.max(0) as u64),
            last_error: self.last_error.clone(),
            last_error_class,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, entity_type, operation_type, entity_id, client_ref, schema_version,
           payload, priority, status, created_at, synced, attempts,
           last_attempt_at, last_error, last_error_class
    FROM pending_mutations
"#;

/// Insert a new mutation, returning its id.
pub async fn insert_mutation(
    pool: &Pool,
    mutation: &NewMutation,
    client_ref: &str,
    created_at: Timestamp,
) -> Result<MutationId, sqlx::Error> {
    let envelope = &mutation.envelope;
    let result = sqlx::query(
        r#"
        INSERT INTO pending_mutations (
            entity_type, operation_type, entity_id, client_ref, schema_version,
            payload, priority, status, created_at, synced, attempts
        ) VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, 0, 0)
        "#,
    )
    .bind(&envelope.entity_type)
    .bind(envelope.operation_type.as_str())
    .bind(&envelope.entity_id)
    .bind(client_ref)
    .bind(i64::from(envelope.schema_version))
    .bind(&envelope.bytes)
    .bind(i64::from(mutation.priority))
    .bind(created_at as i64)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Get a single mutation by id.
pub async fn get_mutation(pool: &Pool, id: MutationId) -> Result<Option<StoredMutation>, sqlx::Error> {
    sqlx::query_as::<_, StoredMutation>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Unsynced mutations in drain order, optionally for one entity type.
pub async fn list_unsynced(
    pool: &Pool,
    entity_type: Option<&str>,
) -> Result<Vec<StoredMutation>, sqlx::Error> {
    sqlx::query_as::<_, StoredMutation>(&format!(
        "{} WHERE synced = 0 AND (?1 IS NULL OR entity_type = ?1) \
         ORDER BY priority DESC, created_at ASC, id ASC",
        SELECT_COLUMNS
    ))
    .bind(entity_type)
    .fetch_all(pool)
    .await
}

/// `pending -> in_flight`. Returns rows affected.
pub async fn mark_in_flight(pool: &Pool, id: MutationId, at: Timestamp) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE pending_mutations
        SET status = 'in_flight', last_attempt_at = ?
        WHERE id = ? AND synced = 0 AND status = 'pending'
        "#,
    )
    .bind(at as i64)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Mark confirmed by the remote. Returns rows affected (0 if already synced).
pub async fn mark_synced(pool: &Pool, id: MutationId) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE pending_mutations
        SET synced = 1, status = 'done', attempts = 0,
            last_error = NULL, last_error_class = NULL
        WHERE id = ? AND synced = 0
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Record a failed attempt and return the entry to pending.
pub async fn record_failure(
    pool: &Pool,
    id: MutationId,
    error: &str,
    class: FailureClass,
    at: Timestamp,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE pending_mutations
        SET attempts = attempts + 1, last_attempt_at = ?, last_error = ?,
            last_error_class = ?, status = 'pending'
        WHERE id = ? AND synced = 0 AND status IN ('pending', 'in_flight')
        "#,
    )
    .bind(at as i64)
    .bind(error)
    .bind(class.as_str())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Move an unsynced entry to `failed_permanently`.
pub async fn mark_failed_permanently(pool: &Pool, id: MutationId) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE pending_mutations
        SET status = 'failed_permanently'
        WHERE id = ? AND synced = 0 AND status IN ('pending', 'in_flight')
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Return an unsynced entry to a fresh pending state.
pub async fn reset_mutation(pool: &Pool, id: MutationId) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE pending_mutations
        SET status = 'pending', attempts = 0, last_error = NULL, last_error_class = NULL
        WHERE id = ? AND synced = 0
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Entries left `in_flight` by a process that died mid-submit.
pub async fn recover_in_flight(pool: &Pool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE pending_mutations SET status = 'pending' WHERE synced = 0 AND status = 'in_flight'",
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Unsynced entry counts grouped by entity type.
pub async fn count_unsynced_by_entity(pool: &Pool) -> Result<Vec<(String, u64)>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT entity_type, COUNT(*) AS count
        FROM pending_mutations
        WHERE synced = 0
        GROUP BY entity_type
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<(String, u64), sqlx::Error> {
            let count: i64 = row.try_get("count")?;
            Ok((row.try_get("entity_type")?, count.max(0) as u64))
        })
        .collect()
}

/// Unsynced entries that have failed at least `min_attempts` times.
pub async fn count_failed(pool: &Pool, min_attempts: u32) -> Result<u64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pending_mutations WHERE synced = 0 AND attempts >= ?",
    )
    .bind(i64::from(min_attempts.max(1)))
    .fetch_one(pool)
    .await?;

    Ok(count.max(0) as u64)
}

/// Entries in `failed_permanently`.
pub async fn count_abandoned(pool: &Pool) -> Result<u64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pending_mutations WHERE status = 'failed_permanently'",
    )
    .fetch_one(pool)
    .await?;

    Ok(count.max(0) as u64)
}

/// Delete synced entries created before `cutoff`. Returns rows deleted.
pub async fn purge_synced_before(pool: &Pool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM pending_mutations WHERE synced = 1 AND created_at < ?")
        .bind(cutoff.min(i64::MAX as u64) as i64)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
