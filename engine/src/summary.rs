//! Results and aggregates reported to callers and UI indicators.

use crate::{EntityType, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What asked for a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerSource {
    /// Connectivity came back
    Reconnected,
    /// The user pressed "sync now" or the app asked explicitly
    Forced,
}

/// Tally of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// Entries confirmed by the remote
    pub synced_count: u32,
    /// Entries that failed and stay pending
    pub failed_count: u32,
    /// Entries moved to `failed_permanently` during this pass
    pub abandoned_count: u32,
    /// Entries skipped because their backoff window is still open
    pub deferred_count: u32,
    /// Local storage failures hit while recording results
    pub storage_errors: u32,
    /// Unsynced rows that could not be decoded and were left alone
    #[serde(default)]
    pub unreadable_count: u32,
}

impl SyncSummary {
    /// Entries the remote was actually asked about.
    pub fn attempted(&self) -> u32 {
        self.synced_count + self.failed_count + self.abandoned_count
    }

    /// Nothing failed and nothing was left behind.
    pub fn is_clean(&self) -> bool {
        self.failed_count == 0
            && self.abandoned_count == 0
            && self.deferred_count == 0
            && self.storage_errors == 0
            && self.unreadable_count == 0
    }
}

/// Result of asking the orchestrator to sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SyncOutcome {
    /// A pass ran to completion
    Completed(SyncSummary),
    /// Another pass was running; this request was dropped
    AlreadyRunning,
    /// The connectivity snapshot is not online
    Offline,
}

impl SyncOutcome {
    /// The pass summary, if a pass ran.
    pub fn summary(&self) -> Option<&SyncSummary> {
        match self {
            SyncOutcome::Completed(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn is_already_running(&self) -> bool {
        matches!(self, SyncOutcome::AlreadyRunning)
    }
}

/// Unsynced entries per entity type, for badges.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCounts {
    pub by_entity_type: BTreeMap<EntityType, u64>,
    pub total: u64,
}

impl PendingCounts {
    /// Build from `(entity_type, count)` groups.
    pub fn from_groups(groups: impl IntoIterator<Item = (EntityType, u64)>) -> Self {
        let mut counts = Self::default();
        for (entity_type, count) in groups {
            counts.total += count;
            *counts.by_entity_type.entry(entity_type).or_default() += count;
        }
        counts
    }

    /// Count for one entity type (zero when absent).
    pub fn get(&self, entity_type: &str) -> u64 {
        self.by_entity_type.get(entity_type).copied().unwrap_or(0)
    }
}

/// Aggregate consumed by the sync indicator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusReport {
    /// Unsynced entries, abandoned ones included
    pub pending_count: u64,
    /// Unsynced entries with at least one failed attempt
    pub failed_count: u64,
    /// Entries in `failed_permanently`
    pub abandoned_count: u64,
    /// Unsynced entries at or past the stuck threshold
    pub stuck_count: u64,
    /// End of the last completed pass
    pub last_sync_at: Option<Timestamp>,
    /// A pass is running right now
    pub running: bool,
}
