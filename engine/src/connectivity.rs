//! Connectivity snapshots and transition detection.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Last known network state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivitySnapshot {
    /// A network interface is up
    pub is_connected: bool,
    /// The remote service actually answers
    pub is_internet_reachable: bool,
    /// When this state was observed (milliseconds since epoch)
    pub observed_at: Timestamp,
}

impl ConnectivitySnapshot {
    pub fn new(is_connected: bool, is_internet_reachable: bool, observed_at: Timestamp) -> Self {
        Self {
            is_connected,
            is_internet_reachable,
            observed_at,
        }
    }

    /// Nothing known yet, or known to be down.
    pub fn offline(observed_at: Timestamp) -> Self {
        Self::new(false, false, observed_at)
    }

    /// Only the conjunction counts as online.
    pub fn is_online(&self) -> bool {
        self.is_connected && self.is_internet_reachable
    }

    /// Same network state, ignoring when it was observed.
    pub fn same_state(&self, other: &ConnectivitySnapshot) -> bool {
        self.is_connected == other.is_connected
            && self.is_internet_reachable == other.is_internet_reachable
    }
}

/// A change between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transition {
    /// Offline to online: the edge that requests a sync
    CameOnline,
    /// Online to offline
    WentOffline,
    /// A flag changed but online-ness did not
    Changed,
}

impl Transition {
    /// Classify the move from `previous` to `next`; `None` for a repeat report.
    pub fn between(previous: &ConnectivitySnapshot, next: &ConnectivitySnapshot) -> Option<Self> {
        if previous.same_state(next) {
            return None;
        }
        Some(match (previous.is_online(), next.is_online()) {
            (false, true) => Transition::CameOnline,
            (true, false) => Transition::WentOffline,
            _ => Transition::Changed,
        })
    }

    /// Whether this transition should trigger a drain pass.
    pub fn triggers_sync(&self) -> bool {
        matches!(self, Transition::CameOnline)
    }
}
