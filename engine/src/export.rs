//! Versioned JSON export of the unsynced queue.
//!
//! Abandoned and stuck entries are never deleted automatically; an export is
//! how an operator gets them off a device for inspection.

use crate::{error::Result, order_pending, Error, PendingMutation, QueueStatus, Timestamp};
use serde::{Deserialize, Serialize};

/// Version of the export format for future compatibility.
pub const EXPORT_FORMAT_VERSION: u32 = 1;

/// A point-in-time dump of unsynced mutations, in drain order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueExport {
    /// Export format version
    pub format_version: u32,
    /// When the export was taken (milliseconds since epoch)
    pub exported_at: Timestamp,
    /// Unsynced mutations
    pub mutations: Vec<PendingMutation>,
}

impl QueueExport {
    /// Build an export; mutations are sorted into drain order.
    pub fn new(exported_at: Timestamp, mut mutations: Vec<PendingMutation>) -> Self {
        order_pending(&mut mutations);
        Self {
            format_version: EXPORT_FORMAT_VERSION,
            exported_at,
            mutations,
        }
    }

    /// Number of exported mutations.
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Mutations the orchestrator gave up on.
    pub fn abandoned(&self) -> impl Iterator<Item = &PendingMutation> {
        self.mutations
            .iter()
            .filter(|m| m.status == QueueStatus::FailedPermanently)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidExport(e.to_string()))
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidExport(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let export: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidExport(e.to_string()))?;

        if export.format_version > EXPORT_FORMAT_VERSION {
            return Err(Error::InvalidExport(format!(
                "unsupported export format version: {} (max supported: {})",
                export.format_version, EXPORT_FORMAT_VERSION
            )));
        }

        Ok(export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MutationEnvelope, NewMutation, OperationType};

    fn pending(id: i64, operation: OperationType, created_at: Timestamp) -> PendingMutation {
        let mut envelope = MutationEnvelope::new("jigs", operation, b"{}".to_vec());
        if operation.requires_entity_id() {
            envelope = envelope.with_entity_id(id.to_string());
        }
        PendingMutation::from_new(id, format!("ref-{}", id), NewMutation::new(envelope), created_at)
    }

    #[test]
    fn export_is_in_drain_order() {
        let export = QueueExport::new(
            10_000,
            vec![
                pending(1, OperationType::Update, 1_000),
                pending(2, OperationType::Create, 2_000),
            ],
        );
        assert_eq!(export.mutations[0].id, 2);
        assert_eq!(export.len(), 2);
    }

    #[test]
    fn lists_abandoned() {
        let mut stuck = pending(1, OperationType::Create, 1_000);
        stuck.status = QueueStatus::FailedPermanently;
        let export = QueueExport::new(10_000, vec![stuck, pending(2, OperationType::Create, 2_000)]);

        let abandoned: Vec<_> = export.abandoned().map(|m| m.id).collect();
        assert_eq!(abandoned, vec![1]);
    }

    #[test]
    fn json_roundtrip() {
        let export = QueueExport::new(10_000, vec![pending(1, OperationType::Create, 1_000)]);
        let json = export.to_json().unwrap();
        assert!(json.contains("\"formatVersion\":1"));

        let parsed = QueueExport::from_json(&json).unwrap();
        assert_eq!(parsed, export);
    }

    #[test]
    fn rejects_future_format() {
        let json = r#"{"formatVersion":99,"exportedAt":0,"mutations":[]}"#;
        assert!(matches!(
            QueueExport::from_json(json),
            Err(Error::InvalidExport(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(QueueExport::from_json("not json").is_err());
    }
}
