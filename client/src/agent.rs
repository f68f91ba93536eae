//! Composition root: store, remote client, connectivity and orchestrator
//! wired together with their background tasks.

use std::sync::Arc;
use std::time::Duration;

use jigsync_engine::{
    MutationId, NewMutation, PendingCounts, QueueExport, SyncOutcome, SyncStatusReport,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::now_millis;
use crate::config::Config;
use crate::connectivity::{ConnectivityObserver, HttpProbe};
use crate::error::{AgentError, StoreError};
use crate::orchestrator::{SyncOrchestrator, SyncPolicy};
use crate::remote::{HttpRemoteClient, RemoteMutationClient};
use crate::store::DurableStore;

/// How long synced entries are kept and how often they are purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub keep_synced_for: Duration,
    pub cleanup_interval: Duration,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            keep_synced_for: Duration::from_secs(30 * 86_400),
            cleanup_interval: Duration::from_secs(86_400),
        }
    }
}

/// A running sync agent.
///
/// Call [`SyncAgent::close`] to stop it; a pass in progress finishes first.
pub struct SyncAgent {
    store: DurableStore,
    connectivity: ConnectivityObserver,
    orchestrator: Arc<SyncOrchestrator>,
    retention: Retention,
    shutdown: watch::Sender<bool>,
    sync_loop: JoinHandle<()>,
    background: Vec<JoinHandle<()>>,
}

impl SyncAgent {
    /// Open the store, connect to the remote and start probing.
    pub async fn open(config: &Config) -> Result<Self, AgentError> {
        let store = DurableStore::open(&config.database_path).await?;
        let remote = HttpRemoteClient::new(
            config.remote_url.clone(),
            config.request_timeout,
            config.auth_token.clone(),
        )?;
        let probe = HttpProbe::new(
            &config.remote_url,
            config.request_timeout.min(config.probe_interval),
            config.probe_interval,
        )?;

        let policy = SyncPolicy {
            retry: config.retry.clone(),
            inter_item_delay: config.inter_item_delay,
        };
        let retention = Retention {
            keep_synced_for: config.retention,
            cleanup_interval: config.cleanup_interval,
        };

        let mut agent = Self::start(store, Arc::new(remote), policy, retention);
        agent
            .background
            .push(probe.spawn(agent.connectivity.clone()));
        Ok(agent)
    }

    /// Wire an agent from parts. Connectivity is reported by the caller.
    pub fn start(
        store: DurableStore,
        remote: Arc<dyn RemoteMutationClient>,
        policy: SyncPolicy,
        retention: Retention,
    ) -> Self {
        let (connectivity, triggers) = ConnectivityObserver::with_triggers();
        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone(),
            remote,
            connectivity.clone(),
            policy,
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let sync_loop = tokio::spawn(orchestrator.clone().run(triggers, shutdown_rx));
        let background = vec![spawn_retention(store.clone(), retention)];

        Self {
            store,
            connectivity,
            orchestrator,
            retention,
            shutdown,
            sync_loop,
            background,
        }
    }

    /// Durably queue a domain write.
    pub async fn enqueue(&self, mutation: NewMutation) -> Result<MutationId, StoreError> {
        self.store.insert(mutation, now_millis()).await
    }

    pub async fn force_sync(&self) -> SyncOutcome {
        self.orchestrator.force_sync().await
    }

    pub async fn status(&self) -> Result<SyncStatusReport, StoreError> {
        self.orchestrator.status().await
    }

    pub async fn pending_counts(&self) -> Result<PendingCounts, StoreError> {
        self.store.count_pending().await
    }

    /// Dump the unsynced queue for inspection.
    pub async fn export(&self) -> Result<QueueExport, StoreError> {
        self.store.export_pending(now_millis()).await
    }

    /// Give an abandoned or stuck entry a fresh start.
    pub async fn reset(&self, id: MutationId) -> Result<(), StoreError> {
        self.store.reset(id).await
    }

    /// Run the retention purge now.
    pub async fn purge_synced(&self) -> Result<u64, StoreError> {
        self.store
            .purge_synced_older_than(self.retention.keep_synced_for, now_millis())
            .await
    }

    pub fn connectivity(&self) -> &ConnectivityObserver {
        &self.connectivity
    }

    pub fn store(&self) -> &DurableStore {
        &self.store
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// Stop background work, let a running pass finish, close the store.
    pub async fn close(self) {
        for task in &self.background {
            task.abort();
        }
        let _ = self.shutdown.send(true);
        if let Err(e) = self.sync_loop.await {
            tracing::error!(error = %e, "Sync loop ended abnormally");
        }
        self.store.close().await;
        tracing::info!("Sync agent closed");
    }
}

fn spawn_retention(store: DurableStore, retention: Retention) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = retention.cleanup_interval.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = store
                .purge_synced_older_than(retention.keep_synced_for, now_millis())
                .await
            {
                tracing::error!(error = %e, "Retention purge failed");
            }
        }
    })
}
