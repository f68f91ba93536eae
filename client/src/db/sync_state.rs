//! Database operations for the single-row sync_state table.

use jigsync_engine::Timestamp;

use super::Pool;

const STATE_ROW: i64 = 1;

/// End of the last completed pass, if any.
pub async fn get_last_sync_at(pool: &Pool) -> Result<Option<Timestamp>, sqlx::Error> {
    let value: Option<Option<i64>> =
        sqlx::query_scalar("SELECT last_sync_at FROM sync_state WHERE id = ?")
            .bind(STATE_ROW)
            .fetch_optional(pool)
            .await?;

    Ok(value.flatten().map(|t| t.max(0) as u64))
}

/// Record the end of a completed pass.
pub async fn set_last_sync_at(pool: &Pool, at: Timestamp) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sync_state (id, last_sync_at) VALUES (?, ?)
        ON CONFLICT (id) DO UPDATE SET last_sync_at = excluded.last_sync_at
        "#,
    )
    .bind(STATE_ROW)
    .bind(at as i64)
    .execute(pool)
    .await?;

    Ok(())
}
