//! Connectivity observer.
//!
//! Holds the latest [`ConnectivitySnapshot`], notifies subscribers on every
//! state change and asks for a drain pass on each offline to online edge.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use jigsync_engine::{ConnectivitySnapshot, Timestamp, TriggerSource, Transition};
use tokio::sync::{mpsc, watch};

use crate::clock::now_millis;

/// Request for a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTrigger {
    pub source: TriggerSource,
    pub requested_at: Timestamp,
}

/// Callback invoked with the new snapshot after each state change.
pub type ConnectivityCallback = Arc<dyn Fn(&ConnectivitySnapshot) + Send + Sync>;

struct Inner {
    snapshot: watch::Sender<ConnectivitySnapshot>,
    subscribers: DashMap<String, ConnectivityCallback>,
    triggers: Option<mpsc::Sender<SyncTrigger>>,
}

/// Tracks network state. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConnectivityObserver {
    inner: Arc<Inner>,
}

impl ConnectivityObserver {
    /// Observer that notifies subscribers but never requests a sync.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Observer plus the receiving end of its sync requests.
    ///
    /// The channel holds a single request: a reconnection while one is
    /// already queued is coalesced into it.
    pub fn with_triggers() -> (Self, mpsc::Receiver<SyncTrigger>) {
        let (tx, rx) = mpsc::channel(1);
        (Self::build(Some(tx)), rx)
    }

    fn build(triggers: Option<mpsc::Sender<SyncTrigger>>) -> Self {
        // Offline until told otherwise, so the first online report drains
        let (snapshot, _) = watch::channel(ConnectivitySnapshot::offline(now_millis()));
        Self {
            inner: Arc::new(Inner {
                snapshot,
                subscribers: DashMap::new(),
                triggers,
            }),
        }
    }

    /// Latest snapshot.
    pub fn current(&self) -> ConnectivitySnapshot {
        *self.inner.snapshot.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Receiver that wakes on every state change.
    pub fn watch(&self) -> watch::Receiver<ConnectivitySnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Report the platform's view of the network.
    pub fn report(&self, is_connected: bool, is_internet_reachable: bool) -> Option<Transition> {
        self.report_at(is_connected, is_internet_reachable, now_millis())
    }

    /// Report with an explicit observation time.
    ///
    /// Returns the transition, or `None` when the state did not change.
    pub fn report_at(
        &self,
        is_connected: bool,
        is_internet_reachable: bool,
        observed_at: Timestamp,
    ) -> Option<Transition> {
        let next = ConnectivitySnapshot::new(is_connected, is_internet_reachable, observed_at);

        // Compare and swap under the watch lock so concurrent reports see one edge each
        let mut transition = None;
        self.inner.snapshot.send_if_modified(|current| {
            transition = Transition::between(current, &next);
            if transition.is_some() {
                *current = next;
            }
            transition.is_some()
        });
        let transition = transition?;

        tracing::info!(
            ?transition,
            connected = is_connected,
            reachable = is_internet_reachable,
            "Connectivity changed"
        );

        let callbacks: Vec<ConnectivityCallback> = self
            .inner
            .subscribers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for callback in callbacks {
            callback(&next);
        }

        if transition.triggers_sync() {
            self.request_sync(TriggerSource::Reconnected, observed_at);
        }

        Some(transition)
    }

    fn request_sync(&self, source: TriggerSource, requested_at: Timestamp) {
        let Some(triggers) = &self.inner.triggers else {
            return;
        };
        match triggers.try_send(SyncTrigger {
            source,
            requested_at,
        }) {
            Ok(()) => tracing::debug!(?source, "Sync requested"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("Sync request already queued")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Sync loop is gone, request dropped")
            }
        }
    }

    /// Register `callback` for state changes until the returned handle drops.
    ///
    /// Callbacks run on the reporting task and should return quickly.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectivitySnapshot) + Send + Sync + 'static,
    {
        let id = uuid::Uuid::new_v4().to_string();
        self.inner
            .subscribers
            .insert(id.clone(), Arc::new(callback));
        tracing::debug!(subscription = %id, "Connectivity subscriber registered");

        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}

impl Default for ConnectivityObserver {
    fn default() -> Self {
        Self::new()
    }
}

/// Live subscription; dropping it unsubscribes.
pub struct Subscription {
    id: String,
    inner: Weak<Inner>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.remove(&self.id);
            tracing::debug!(subscription = %self.id, "Connectivity subscriber removed");
        }
    }
}
