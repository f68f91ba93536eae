//! Remote service seam.
//!
//! The orchestrator only knows [`RemoteMutationClient`]; [`HttpRemoteClient`]
//! is the production implementation.

mod http;

pub use http::*;

use async_trait::async_trait;
use jigsync_engine::PendingMutation;

use crate::error::RemoteError;

/// Server-assigned record returned by a successful submit.
pub type ServerRecord = serde_json::Value;

/// Submits one mutation to the remote service.
///
/// Implementations must be safe to call again with the same mutation: a
/// mutation the remote accepted may be resubmitted if marking it synced
/// failed locally.
#[async_trait]
pub trait RemoteMutationClient: Send + Sync {
    async fn submit(&self, mutation: &PendingMutation) -> Result<ServerRecord, RemoteError>;
}
