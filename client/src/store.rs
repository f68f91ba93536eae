//! Durable mutation store.
//!
//! [`DurableStore`] is the only component that talks to SQLite. It turns rows
//! into engine types and enforces the queue's status rules at the statement
//! level, so a crash between any two calls leaves a consistent queue.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jigsync_engine::{
    Error as EngineError, FailureClass, MigrationPlan, MutationId, NewMutation, PendingCounts,
    PendingMutation, QueueExport, QueueStatus, SyncStatusReport, Timestamp,
};
use uuid::Uuid;

use crate::db::{self, MigrationReport, Pool};
use crate::error::{Result, StoreError};
use crate::lock::QueueLock;

/// Unsynced entries in drain order, plus the rows that failed to decode.
#[derive(Debug, Default)]
pub struct PendingScan {
    pub mutations: Vec<PendingMutation>,
    pub unreadable: Vec<MutationId>,
}

/// Durable, crash-safe queue of pending mutations.
#[derive(Clone)]
pub struct DurableStore {
    pool: Pool,
    migrations: Arc<MigrationReport>,
    lock: Arc<Mutex<Option<QueueLock>>>,
    owner: bool,
}

impl DurableStore {
    /// Open the queue database at `path` as its owner.
    ///
    /// Takes the queue lock, migrates, and returns entries a dead owner left
    /// mid-submit to pending. Fails with [`StoreError::Locked`] while another
    /// process owns the file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Opening mutation store");
        let lock = QueueLock::acquire(path)?;
        let pool = db::create_pool(path).await?;
        Self::from_parts(pool, Some(lock), true).await
    }

    /// Open the queue database at `path` without taking ownership.
    ///
    /// No lock is taken and in-flight entries are left as they are, so this is
    /// safe next to a running agent. Meant for status and export views.
    pub async fn open_for_inspection(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "Opening mutation store for inspection");
        let pool = db::create_pool(path).await?;
        Self::from_parts(pool, None, false).await
    }

    /// Open a private in-memory store.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = db::create_memory_pool().await?;
        Self::from_pool(pool).await
    }

    /// Migrate `pool` and recover entries left mid-submit.
    pub async fn from_pool(pool: Pool) -> Result<Self> {
        Self::from_parts(pool, None, true).await
    }

    async fn from_parts(pool: Pool, lock: Option<QueueLock>, owner: bool) -> Result<Self> {
        let plan = MigrationPlan::current();
        plan.validate()?;

        let report = db::run_migrations(&pool, &plan).await?;
        if report.is_degraded() {
            tracing::warn!(
                failed = report.failed.len(),
                "Mutation store running with incomplete schema"
            );
        }

        let store = Self {
            pool,
            migrations: Arc::new(report),
            lock: Arc::new(Mutex::new(lock)),
            owner,
        };
        store.recover_in_flight().await?;
        Ok(store)
    }

    /// Return every `in_flight` entry to pending.
    ///
    /// Call only while no pass is submitting. A no-op on inspection handles,
    /// whose in-flight rows belong to another process.
    pub async fn recover_in_flight(&self) -> Result<u64> {
        if !self.owner {
            return Ok(0);
        }
        let recovered = db::recover_in_flight(&self.pool).await?;
        if recovered > 0 {
            tracing::warn!(count = recovered, "Recovered in-flight mutations");
        }
        Ok(recovered)
    }

    /// What the last open did to the schema.
    pub fn migration_report(&self) -> &MigrationReport {
        &self.migrations
    }

    /// Underlying pool, for diagnostics.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Whether this handle may drain and recover the queue.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Close every connection and release the queue lock. Pending entries
    /// stay on disk.
    pub async fn close(&self) {
        self.pool.close().await;
        if let Ok(mut held) = self.lock.lock() {
            held.take();
        }
    }

    /// Persist a new mutation. Once this returns, the entry survives a crash.
    pub async fn insert(&self, mutation: NewMutation, created_at: Timestamp) -> Result<MutationId> {
        mutation.envelope.validate()?;

        let client_ref = Uuid::new_v4().to_string();
        let id = db::insert_mutation(&self.pool, &mutation, &client_ref, created_at).await?;

        tracing::debug!(
            id,
            entity_type = %mutation.envelope.entity_type,
            operation = %mutation.envelope.operation_type,
            priority = mutation.priority,
            "Queued mutation"
        );
        Ok(id)
    }

    pub async fn get(&self, id: MutationId) -> Result<Option<PendingMutation>> {
        match db::get_mutation(&self.pool, id).await? {
            Some(row) => Ok(Some(row.to_mutation()?)),
            None => Ok(None),
        }
    }

    /// Unsynced entries in drain order, optionally filtered by entity type.
    ///
    /// Rows that fail to decode are left out; see [`scan_pending`](Self::scan_pending).
    pub async fn list_pending(&self, entity_type: Option<&str>) -> Result<Vec<PendingMutation>> {
        Ok(self.scan_pending(entity_type).await?.mutations)
    }

    /// Like [`list_pending`](Self::list_pending), also reporting the ids of
    /// rows that could not be decoded.
    pub async fn scan_pending(&self, entity_type: Option<&str>) -> Result<PendingScan> {
        let rows = db::list_unsynced(&self.pool, entity_type).await?;
        let mut scan = PendingScan {
            mutations: Vec::with_capacity(rows.len()),
            unreadable: Vec::new(),
        };
        for row in rows {
            match row.to_mutation() {
                Ok(m) => scan.mutations.push(m),
                // One undecodable row must not block the rest of the queue
                Err(e) => {
                    tracing::error!(id = row.id, error = %e, "Skipping unreadable mutation row");
                    scan.unreadable.push(row.id);
                }
            }
        }
        Ok(scan)
    }

    /// `pending -> in_flight`, stamping the attempt time.
    pub async fn mark_in_flight(&self, id: MutationId, at: Timestamp) -> Result<()> {
        if db::mark_in_flight(&self.pool, id, at).await? == 1 {
            return Ok(());
        }
        Err(self.rejected_move(id, QueueStatus::InFlight).await)
    }

    /// Mark confirmed by the remote. Marking an already synced entry is a no-op.
    pub async fn mark_synced(&self, id: MutationId) -> Result<()> {
        if db::mark_synced(&self.pool, id).await? == 1 {
            tracing::debug!(id, "Mutation synced");
            return Ok(());
        }
        match self.get(id).await? {
            Some(m) if m.synced => Ok(()),
            Some(m) => Err(EngineError::InvalidTransition {
                from: m.status,
                to: QueueStatus::Done,
            }
            .into()),
            None => Err(StoreError::NotFound(id)),
        }
    }

    /// Count a failed attempt and keep the entry pending.
    pub async fn record_failure(
        &self,
        id: MutationId,
        error: &str,
        class: FailureClass,
        at: Timestamp,
    ) -> Result<()> {
        if db::record_failure(&self.pool, id, error, class, at).await? == 1 {
            return Ok(());
        }
        Err(self.rejected_move(id, QueueStatus::Pending).await)
    }

    /// Stop retrying an entry. It stays in the store for inspection.
    pub async fn mark_failed_permanently(&self, id: MutationId) -> Result<()> {
        if db::mark_failed_permanently(&self.pool, id).await? == 1 {
            tracing::warn!(id, "Mutation abandoned");
            return Ok(());
        }
        Err(self.rejected_move(id, QueueStatus::FailedPermanently).await)
    }

    /// Manually return an unsynced entry to a fresh pending state.
    pub async fn reset(&self, id: MutationId) -> Result<()> {
        if db::reset_mutation(&self.pool, id).await? == 1 {
            tracing::info!(id, "Mutation reset");
            return Ok(());
        }
        Err(self.rejected_move(id, QueueStatus::Pending).await)
    }

    /// Unsynced entries per entity type.
    pub async fn count_pending(&self) -> Result<PendingCounts> {
        let groups = db::count_unsynced_by_entity(&self.pool).await?;
        Ok(PendingCounts::from_groups(groups))
    }

    /// Aggregate for the sync indicator. `running` is left false.
    pub async fn status_report(&self, stuck_after: u32) -> Result<SyncStatusReport> {
        Ok(SyncStatusReport {
            pending_count: self.count_pending().await?.total,
            failed_count: db::count_failed(&self.pool, 1).await?,
            abandoned_count: db::count_abandoned(&self.pool).await?,
            stuck_count: db::count_failed(&self.pool, stuck_after).await?,
            last_sync_at: db::get_last_sync_at(&self.pool).await?,
            running: false,
        })
    }

    /// Stamp the end of a completed pass.
    pub async fn record_sync_completed(&self, at: Timestamp) -> Result<()> {
        db::set_last_sync_at(&self.pool, at).await?;
        Ok(())
    }

    pub async fn last_sync_at(&self) -> Result<Option<Timestamp>> {
        Ok(db::get_last_sync_at(&self.pool).await?)
    }

    /// Delete synced entries older than `retention`. Unsynced entries are never purged.
    pub async fn purge_synced_older_than(&self, retention: Duration, now: Timestamp) -> Result<u64> {
        let retention_ms = u64::try_from(retention.as_millis()).unwrap_or(u64::MAX);
        let cutoff = now.saturating_sub(retention_ms);
        let purged = db::purge_synced_before(&self.pool, cutoff).await?;
        if purged > 0 {
            tracing::info!(count = purged, "Purged synced mutations");
        }
        Ok(purged)
    }

    /// Snapshot of every unsynced entry, abandoned ones included.
    pub async fn export_pending(&self, now: Timestamp) -> Result<QueueExport> {
        let mutations = self.list_pending(None).await?;
        Ok(QueueExport::new(now, mutations))
    }

    async fn rejected_move(&self, id: MutationId, to: QueueStatus) -> StoreError {
        match self.get(id).await {
            Ok(Some(m)) if m.synced => EngineError::AlreadySynced(id).into(),
            Ok(Some(m)) => EngineError::InvalidTransition { from: m.status, to }.into(),
            Ok(None) => StoreError::NotFound(id),
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jigsync_engine::{MutationEnvelope, OperationType};
    use serde_json::json;

    fn validation(jig_id: i64) -> NewMutation {
        NewMutation::new(
            MutationEnvelope::json(
                "validations",
                OperationType::Create,
                &json!({"jig_id": jig_id, "turno": "A", "estado": "OK"}),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = DurableStore::open_in_memory().await.unwrap();
        let id = store.insert(validation(7), 1_000).await.unwrap();

        let m = store.get(id).await.unwrap().unwrap();
        assert_eq!(m.entity_type(), "validations");
        assert_eq!(m.status, QueueStatus::Pending);
        assert_eq!(m.priority, 20);
        assert_eq!(m.created_at, 1_000);
        assert!(Uuid::parse_str(&m.client_ref).is_ok());
        assert!(!store.migration_report().is_degraded());
    }

    #[tokio::test]
    async fn insert_rejects_invalid_envelope() {
        let store = DurableStore::open_in_memory().await.unwrap();
        let envelope = MutationEnvelope::new("jigs", OperationType::Update, b"{}".to_vec());
        let err = store.insert(NewMutation::new(envelope), 1).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Engine(EngineError::MissingEntityId { .. })
        ));
        assert_eq!(store.count_pending().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn mark_synced_is_idempotent() {
        let store = DurableStore::open_in_memory().await.unwrap();
        let id = store.insert(validation(1), 1).await.unwrap();

        store.mark_synced(id).await.unwrap();
        store.mark_synced(id).await.unwrap();

        let m = store.get(id).await.unwrap().unwrap();
        assert!(m.synced);
        assert_eq!(m.status, QueueStatus::Done);
        assert!(store.list_pending(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_id() {
        let store = DurableStore::open_in_memory().await.unwrap();
        assert!(matches!(
            store.mark_synced(99).await,
            Err(StoreError::NotFound(99))
        ));
        assert!(store.get(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn in_flight_twice_is_rejected() {
        let store = DurableStore::open_in_memory().await.unwrap();
        let id = store.insert(validation(1), 1).await.unwrap();

        store.mark_in_flight(id, 2).await.unwrap();
        let err = store.mark_in_flight(id, 3).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Engine(EngineError::InvalidTransition {
                from: QueueStatus::InFlight,
                to: QueueStatus::InFlight
            })
        ));
    }
}
