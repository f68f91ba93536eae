//! Retry policy for failed submissions.
//!
//! The default policy retries forever and never backs off, which is how the
//! factory app has always behaved. Abandonment and per-entry backoff are opt-in.

use crate::{FailureClass, PendingMutation, Timestamp};
use serde::{Deserialize, Serialize};

/// Per-entry delay before a failed mutation is attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Backoff {
    /// Retry on the next pass
    #[default]
    None,
    /// `base_ms * 2^(attempts - 1)`, capped at `max_ms`
    #[serde(rename_all = "camelCase")]
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Backoff {
    /// Delay in milliseconds after `attempts` failures.
    pub fn delay_after(&self, attempts: u32) -> u64 {
        match *self {
            Backoff::None => 0,
            Backoff::Exponential { base_ms, max_ms } => {
                if attempts == 0 {
                    return 0;
                }
                let factor = 1u64.checked_shl(attempts - 1).unwrap_or(u64::MAX);
                base_ms.saturating_mul(factor).min(max_ms)
            }
        }
    }
}

/// What happens to an entry after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureDisposition {
    /// Back to pending for a later pass
    Retry,
    /// Move to `failed_permanently`
    Abandon,
}

/// Retry configuration applied by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Abandon once this many attempts have failed (`None`: never)
    pub max_attempts: Option<u32>,
    /// Abandon as soon as the server definitively rejects a payload
    pub abandon_on_rejection: bool,
    /// Report entries with at least this many failures as stuck
    pub stuck_after: u32,
    /// Per-entry backoff between attempts
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            abandon_on_rejection: false,
            stuck_after: 5,
            backoff: Backoff::None,
        }
    }
}

impl RetryPolicy {
    /// Decide the fate of an entry that has now failed `attempts` times.
    pub fn disposition(&self, attempts: u32, class: FailureClass) -> FailureDisposition {
        if self.abandon_on_rejection && class == FailureClass::Rejected {
            return FailureDisposition::Abandon;
        }
        match self.max_attempts {
            Some(max) if attempts >= max => FailureDisposition::Abandon,
            _ => FailureDisposition::Retry,
        }
    }

    /// Earliest time the entry may be attempted again.
    pub fn next_attempt_at(&self, mutation: &PendingMutation) -> Option<Timestamp> {
        let last = mutation.last_attempt_at?;
        let delay = self.backoff.delay_after(mutation.attempts);
        Some(last.saturating_add(delay))
    }

    /// Whether the entry is outside its backoff window at `now`.
    pub fn is_due(&self, mutation: &PendingMutation, now: Timestamp) -> bool {
        match self.next_attempt_at(mutation) {
            Some(at) => now >= at,
            None => true,
        }
    }

    /// Whether the entry should be surfaced as stuck.
    pub fn is_stuck(&self, mutation: &PendingMutation) -> bool {
        !mutation.synced && mutation.attempts >= self.stuck_after
    }
}
