//! Pending mutations and queue ordering.

use crate::{
    error::Result, Error, FailureDisposition, MutationEnvelope, MutationId, OperationType,
    Priority, QueueStatus, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Why a submit attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureClass {
    /// Network unreachable, timeout, server error: worth retrying
    Transient,
    /// The server definitively refused the payload
    Rejected,
}

impl FailureClass {
    /// The persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Transient => "transient",
            FailureClass::Rejected => "rejected",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "transient" => Ok(FailureClass::Transient),
            "rejected" => Ok(FailureClass::Rejected),
            other => Err(Error::UnknownFailureClass(other.to_string())),
        }
    }
}

/// A mutation as handed to the durable store, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMutation {
    pub envelope: MutationEnvelope,
    pub priority: Priority,
}

impl NewMutation {
    /// Queue `envelope` at its operation's default priority.
    pub fn new(envelope: MutationEnvelope) -> Self {
        let priority = envelope.operation_type.default_priority();
        Self { envelope, priority }
    }

    /// Override the queue priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// One domain write not yet confirmed by the remote.
///
/// Retries mutate this record in place; there is never more than one record
/// per logical local mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    /// Locally assigned, monotonically increasing
    pub id: MutationId,
    /// Random reference sent to the remote as an idempotency key
    pub client_ref: String,
    /// The domain write
    pub envelope: MutationEnvelope,
    /// Higher drains first
    pub priority: Priority,
    /// Position in the sync lifecycle
    pub status: QueueStatus,
    /// Local creation time (milliseconds since epoch)
    pub created_at: Timestamp,
    /// True once the remote confirmed it
    pub synced: bool,
    /// Failed attempts so far
    pub attempts: u32,
    /// When the last attempt started
    pub last_attempt_at: Option<Timestamp>,
    /// Human-readable reason of the last failure
    pub last_error: Option<String>,
    /// Class of the last failure
    pub last_error_class: Option<FailureClass>,
}

impl PendingMutation {
    /// Build the record for a freshly inserted mutation.
    pub fn from_new(
        id: MutationId,
        client_ref: impl Into<String>,
        new: NewMutation,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            client_ref: client_ref.into(),
            envelope: new.envelope,
            priority: new.priority,
            status: QueueStatus::Pending,
            created_at,
            synced: false,
            attempts: 0,
            last_attempt_at: None,
            last_error: None,
            last_error_class: None,
        }
    }

    /// Entity type of the wrapped mutation.
    pub fn entity_type(&self) -> &str {
        &self.envelope.entity_type
    }

    /// Operation type of the wrapped mutation.
    pub fn operation_type(&self) -> OperationType {
        self.envelope.operation_type
    }

    /// Whether a drain pass should pick this entry up.
    pub fn is_syncable(&self) -> bool {
        !self.synced && self.status == QueueStatus::Pending
    }

    /// `pending -> in_flight`.
    pub fn begin_attempt(&mut self, at: Timestamp) -> Result<()> {
        if self.synced {
            return Err(Error::AlreadySynced(self.id));
        }
        self.status = self.status.transition(QueueStatus::InFlight)?;
        self.last_attempt_at = Some(at);
        Ok(())
    }

    /// `in_flight -> done`. Clears the failure bookkeeping.
    pub fn complete(&mut self) -> Result<()> {
        self.status = self.status.transition(QueueStatus::Done)?;
        self.synced = true;
        self.attempts = 0;
        self.last_error = None;
        self.last_error_class = None;
        Ok(())
    }

    /// `in_flight -> pending | failed_permanently`.
    ///
    /// Returns the status the entry ended up in.
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        class: FailureClass,
        disposition: FailureDisposition,
    ) -> Result<QueueStatus> {
        let next = match disposition {
            FailureDisposition::Retry => QueueStatus::Pending,
            FailureDisposition::Abandon => QueueStatus::FailedPermanently,
        };
        self.status = self.status.transition(next)?;
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.into());
        self.last_error_class = Some(class);
        Ok(self.status)
    }

    /// Explicit manual reset of an unsynced entry back to a fresh pending state.
    pub fn reset(&mut self) -> Result<()> {
        if self.synced {
            return Err(Error::AlreadySynced(self.id));
        }
        self.status = QueueStatus::Pending;
        self.attempts = 0;
        self.last_error = None;
        self.last_error_class = None;
        Ok(())
    }
}

/// Drain order: priority descending, then creation time, then id.
pub fn sync_order(a: &PendingMutation, b: &PendingMutation) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort `items` into drain order.
pub fn order_pending(items: &mut [PendingMutation]) {
    items.sort_by(sync_order);
}
