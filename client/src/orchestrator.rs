//! Sync orchestrator.
//!
//! Drains the durable queue against the remote service, one entry at a time,
//! in drain order. At most one pass runs at any moment; a request that
//! arrives while a pass is running is dropped rather than queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jigsync_engine::{
    FailureDisposition, PendingMutation, QueueStatus, RetryPolicy, SyncOutcome, SyncStatusReport,
    SyncSummary, TriggerSource,
};
use tokio::sync::{mpsc, watch};

use crate::clock::now_millis;
use crate::connectivity::{ConnectivityObserver, SyncTrigger};
use crate::error::StoreError;
use crate::remote::RemoteMutationClient;
use crate::store::DurableStore;

/// How a pass treats failures and paces submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPolicy {
    pub retry: RetryPolicy,
    /// Pause between two submits of the same pass
    pub inter_item_delay: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            inter_item_delay: Duration::from_millis(100),
        }
    }
}

/// Clears the running flag when a pass ends, even on panic.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncOrchestrator {
    store: DurableStore,
    remote: Arc<dyn RemoteMutationClient>,
    connectivity: ConnectivityObserver,
    policy: SyncPolicy,
    running: AtomicBool,
}

impl SyncOrchestrator {
    pub fn new(
        store: DurableStore,
        remote: Arc<dyn RemoteMutationClient>,
        connectivity: ConnectivityObserver,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            policy,
            running: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Whether a pass is running right now.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run a pass now, if online and no pass is running.
    pub async fn force_sync(&self) -> SyncOutcome {
        self.sync(TriggerSource::Forced).await
    }

    /// Run one drain pass.
    ///
    /// A request made while a pass is running gets `AlreadyRunning`, whatever
    /// the connectivity.
    pub async fn sync(&self, source: TriggerSource) -> SyncOutcome {
        let Some(_guard) = PassGuard::acquire(&self.running) else {
            tracing::info!(?source, "Sync already in progress");
            return SyncOutcome::AlreadyRunning;
        };

        if !self.connectivity.is_online() {
            tracing::debug!(?source, "Offline, sync skipped");
            return SyncOutcome::Offline;
        }

        tracing::info!(?source, "Starting sync pass");
        let mut summary = self.drain().await;

        if let Err(e) = self.store.record_sync_completed(now_millis()).await {
            tracing::error!(error = %e, "Failed to record sync completion");
            summary.storage_errors += 1;
        }

        tracing::info!(
            synced = summary.synced_count,
            failed = summary.failed_count,
            abandoned = summary.abandoned_count,
            deferred = summary.deferred_count,
            storage_errors = summary.storage_errors,
            unreadable = summary.unreadable_count,
            "Sync pass finished"
        );
        SyncOutcome::Completed(summary)
    }

    async fn drain(&self) -> SyncSummary {
        let mut summary = SyncSummary::default();

        // The pass guard is held, so anything in flight was stranded by an
        // earlier storage failure
        if let Err(e) = self.store.recover_in_flight().await {
            tracing::error!(error = %e, "Failed to recover in-flight mutations");
            summary.storage_errors += 1;
        }

        let scan = match self.store.scan_pending(None).await {
            Ok(scan) => scan,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list pending mutations");
                summary.storage_errors += 1;
                return summary;
            }
        };
        summary.unreadable_count = u32::try_from(scan.unreadable.len()).unwrap_or(u32::MAX);

        let mut submitted_any = false;
        for mut mutation in scan.mutations {
            if !mutation.is_syncable() {
                continue;
            }
            if !self.policy.retry.is_due(&mutation, now_millis()) {
                summary.deferred_count += 1;
                continue;
            }

            if submitted_any && !self.policy.inter_item_delay.is_zero() {
                tokio::time::sleep(self.policy.inter_item_delay).await;
            }
            submitted_any = true;

            self.process(&mut mutation, &mut summary).await;
        }

        summary
    }

    /// Submit one entry and persist the outcome. Never aborts the pass.
    async fn process(&self, mutation: &mut PendingMutation, summary: &mut SyncSummary) {
        let id = mutation.id;
        let started_at = now_millis();

        if let Err(e) = mutation.begin_attempt(started_at) {
            tracing::warn!(id, error = %e, "Mutation not eligible for submit");
            return;
        }
        if let Err(e) = self.store.mark_in_flight(id, started_at).await {
            tracing::error!(id, error = %e, "Failed to mark mutation in flight");
            summary.storage_errors += 1;
            return;
        }

        match self.remote.submit(mutation).await {
            Ok(_) => {
                if let Err(e) = mutation.complete() {
                    tracing::warn!(id, error = %e, "Unexpected state after submit");
                }
                match self.store.mark_synced(id).await {
                    Ok(()) => summary.synced_count += 1,
                    Err(e) => {
                        // Stays in flight until the next pass recovers and resubmits it
                        tracing::error!(id, error = %e, "Submitted but failed to mark synced");
                        summary.storage_errors += 1;
                    }
                }
            }
            Err(err) => {
                let class = err.class();
                let message = err.to_string();
                let disposition = self
                    .policy
                    .retry
                    .disposition(mutation.attempts.saturating_add(1), class);

                let status = match mutation.fail(message.clone(), class, disposition) {
                    Ok(status) => status,
                    Err(e) => {
                        tracing::warn!(id, error = %e, "Unexpected state after failed submit");
                        QueueStatus::Pending
                    }
                };
                tracing::warn!(
                    id,
                    attempts = mutation.attempts,
                    class = %class,
                    error = %message,
                    "Mutation submit failed"
                );

                if let Err(e) = self.store.record_failure(id, &message, class, started_at).await {
                    tracing::error!(id, error = %e, "Failed to record submit failure");
                    summary.storage_errors += 1;
                    return;
                }

                if disposition == FailureDisposition::Abandon
                    && status == QueueStatus::FailedPermanently
                {
                    match self.store.mark_failed_permanently(id).await {
                        Ok(()) => summary.abandoned_count += 1,
                        Err(e) => {
                            tracing::error!(id, error = %e, "Failed to abandon mutation");
                            summary.storage_errors += 1;
                            summary.failed_count += 1;
                        }
                    }
                } else {
                    summary.failed_count += 1;
                }
            }
        }
    }

    /// Aggregate for the sync indicator.
    pub async fn status(&self) -> Result<SyncStatusReport, StoreError> {
        let mut report = self
            .store
            .status_report(self.policy.retry.stuck_after)
            .await?;
        report.running = self.is_running();
        Ok(report)
    }

    /// Serve sync requests until the channel closes or `shutdown` flips.
    ///
    /// A running pass always finishes. Requests that piled up during a pass
    /// are discarded: the pass already covered them.
    pub async fn run(
        self: Arc<Self>,
        mut triggers: mpsc::Receiver<SyncTrigger>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                trigger = triggers.recv() => {
                    let Some(trigger) = trigger else { break };
                    let outcome = self.sync(trigger.source).await;
                    tracing::debug!(?outcome, "Triggered sync handled");

                    while let Ok(stale) = triggers.try_recv() {
                        tracing::debug!(source = ?stale.source, "Dropped stale sync request");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("Sync loop stopped");
    }
}
