//! Queue status and its legal transitions.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a queued mutation sits in its sync lifecycle.
///
/// ```text
/// pending --> in_flight --> done
///    ^            |
///    +------------+         (retry)
///                 |
///                 +-------> failed_permanently
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for the next drain pass
    Pending,
    /// Submitted to the remote, no answer yet
    InFlight,
    /// Confirmed by the remote
    Done,
    /// Abandoned; kept for inspection, never submitted again
    FailedPermanently,
}

impl QueueStatus {
    /// The persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::InFlight => "in_flight",
            QueueStatus::Done => "done",
            QueueStatus::FailedPermanently => "failed_permanently",
        }
    }

    /// Whether `self -> next` is a legal move.
    pub fn can_transition_to(self, next: QueueStatus) -> bool {
        matches!(
            (self, next),
            (QueueStatus::Pending, QueueStatus::InFlight)
                | (QueueStatus::InFlight, QueueStatus::Done)
                | (QueueStatus::InFlight, QueueStatus::Pending)
                | (QueueStatus::InFlight, QueueStatus::FailedPermanently)
        )
    }

    /// Move to `next`, or fail with [`Error::InvalidTransition`].
    pub fn transition(self, next: QueueStatus) -> Result<QueueStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Terminal statuses are never picked up by a drain pass.
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Done | QueueStatus::FailedPermanently)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "in_flight" => Ok(QueueStatus::InFlight),
            "done" => Ok(QueueStatus::Done),
            "failed_permanently" => Ok(QueueStatus::FailedPermanently),
            other => Err(Error::UnknownStatus(other.to_string())),
        }
    }
}
