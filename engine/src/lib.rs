//! # jigsync Engine
//!
//! The deterministic model behind the jigsync offline mutation queue.
//!
//! This crate describes what a pending mutation is, how the sync queue is
//! ordered, which status transitions are legal, and how failures are retried.
//! Persistence, networking and scheduling live in `jigsync-client`; this crate
//! only decides.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches files, sockets or clocks; callers pass
//!   timestamps in
//! - **Deterministic**: the same queue and the same policy always produce the
//!   same order and the same decisions
//! - **Opaque payloads**: domain data travels as bytes inside a typed
//!   [`MutationEnvelope`]; the engine never looks inside
//!
//! ## Core Concepts
//!
//! ### Pending mutations
//!
//! A [`PendingMutation`] is one domain write (a jig validation, a repair, a new
//! jig) that the remote service has not confirmed yet. It carries its own queue
//! state: [`OperationType`], priority and [`QueueStatus`].
//!
//! ### Ordering
//!
//! [`order_pending`] sorts by priority (highest first), then creation time,
//! then id. Creates outrank updates by default.
//!
//! ### Status machine
//!
//! `pending -> in_flight -> {done | pending | failed_permanently}`. Every
//! other move is rejected with [`Error::InvalidTransition`].
//!
//! ### Retry policy
//!
//! [`RetryPolicy`] decides whether a failed entry stays pending or is
//! abandoned, whether it is due for another attempt, and whether it should be
//! reported as stuck.
//!
//! ## Quick Start
//!
//! ```rust
//! use jigsync_engine::{
//!     FailureClass, MutationEnvelope, NewMutation, OperationType, PendingMutation,
//!     QueueStatus, RetryPolicy,
//! };
//! use serde_json::json;
//!
//! // 1. Wrap a domain write in an envelope
//! let envelope = MutationEnvelope::json(
//!     "validations",
//!     OperationType::Create,
//!     &json!({"jig_id": 7, "turno": "A", "estado": "OK"}),
//! )
//! .unwrap();
//! let new = NewMutation::new(envelope);
//! assert_eq!(new.priority, 20);
//!
//! // 2. The durable store assigns an id and a creation time
//! let mut mutation = PendingMutation::from_new(1, "ref-1", new, 1706745600000);
//!
//! // 3. An attempt fails; the default policy keeps the entry pending
//! mutation.begin_attempt(1706745600500).unwrap();
//! let policy = RetryPolicy::default();
//! let disposition = policy.disposition(mutation.attempts + 1, FailureClass::Transient);
//! mutation
//!     .fail("connection refused", FailureClass::Transient, disposition)
//!     .unwrap();
//!
//! assert_eq!(mutation.status, QueueStatus::Pending);
//! assert_eq!(mutation.attempts, 1);
//! ```
//!
//! ## Persistence
//!
//! [`MigrationPlan::current`] describes the SQLite layout the client builds
//! and evolves additively. [`QueueExport`] is the versioned JSON dump of the
//! queue used to inspect stuck entries.

pub mod connectivity;
pub mod envelope;
pub mod error;
pub mod export;
pub mod migration;
pub mod mutation;
pub mod retry;
pub mod status;
pub mod summary;

// Re-export main types at crate root
pub use connectivity::{ConnectivitySnapshot, Transition};
pub use envelope::{MutationEnvelope, OperationType};
pub use error::Error;
pub use export::{QueueExport, EXPORT_FORMAT_VERSION};
pub use migration::{
    AddColumn, ColumnDef, ColumnType, IndexDef, MigrationPlan, TableDef, MUTATIONS_TABLE,
    SYNC_STATE_TABLE,
};
pub use mutation::{order_pending, sync_order, FailureClass, NewMutation, PendingMutation};
pub use retry::{Backoff, FailureDisposition, RetryPolicy};
pub use status::QueueStatus;
pub use summary::{PendingCounts, SyncOutcome, SyncStatusReport, SyncSummary, TriggerSource};

/// Type aliases for clarity
pub type MutationId = i64;
pub type EntityType = String;
pub type EntityId = String;
pub type Priority = i32;
pub type Timestamp = u64;
pub type SchemaVersion = u32;
