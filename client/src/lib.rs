//! # jigsync Client
//!
//! Offline-first durable mutation queue and sync agent for the factory jig
//! tracking app.
//!
//! Every domain write (a jig validation, a repair, a new jig) is first
//! committed to a local SQLite queue. When the network comes back, or when
//! the app asks, the orchestrator drains the queue against the remote API one
//! entry at a time, highest priority first. Nothing is lost on a crash and
//! nothing is submitted twice by the same pass.
//!
//! ## Components
//!
//! - [`DurableStore`]: the SQLite queue, migrated additively on open
//! - [`ConnectivityObserver`]: latest network snapshot and change subscribers
//! - [`SyncOrchestrator`]: single-flight drain passes
//! - [`HttpRemoteClient`]: the production [`RemoteMutationClient`]
//! - [`SyncAgent`]: all of the above plus background probing and retention
//!
//! ## Example
//!
//! ```rust,no_run
//! use jigsync_client::{Config, SyncAgent};
//! use jigsync_engine::{MutationEnvelope, NewMutation, OperationType};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let agent = SyncAgent::open(&config).await?;
//!
//! let envelope = MutationEnvelope::json(
//!     "validations",
//!     OperationType::Create,
//!     &json!({"jig_id": 7, "turno": "A", "estado": "OK"}),
//! )?;
//! agent.enqueue(NewMutation::new(envelope)).await?;
//!
//! let outcome = agent.force_sync().await;
//! println!("{:?}", outcome);
//! agent.close().await;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod remote;
pub mod store;

pub use agent::{Retention, SyncAgent};
pub use config::{Config, ConfigError};
pub use connectivity::{ConnectivityObserver, HttpProbe, Subscription, SyncTrigger};
pub use error::{AgentError, RemoteError, StoreError};
pub use lock::QueueLock;
pub use orchestrator::{SyncOrchestrator, SyncPolicy};
pub use remote::{HttpRemoteClient, RemoteMutationClient, ServerRecord};
pub use store::{DurableStore, PendingScan};
