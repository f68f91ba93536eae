//! Mutation envelopes.
//!
//! Domain writes are carried as opaque bytes. The envelope adds just enough
//! typing around them (entity type, operation, payload schema version) to
//! route, order and evolve them without the engine ever reading the payload.

use crate::{error::Result, EntityId, EntityType, Error, Priority, SchemaVersion};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of write a mutation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    /// The persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }

    /// Queue priority used when the caller does not pick one.
    ///
    /// Creates rank above updates so that an entity exists remotely before
    /// anything is applied to it.
    pub fn default_priority(&self) -> Priority {
        match self {
            OperationType::Create => 20,
            OperationType::Update => 10,
            OperationType::Delete => 0,
        }
    }

    /// Updates and deletes address an existing remote entity.
    pub fn requires_entity_id(&self) -> bool {
        !matches!(self, OperationType::Create)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(OperationType::Create),
            "update" => Ok(OperationType::Update),
            "delete" => Ok(OperationType::Delete),
            other => Err(Error::UnknownOperationType(other.to_string())),
        }
    }
}

/// A domain mutation as the queue sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationEnvelope {
    /// Remote collection the write targets (`validations`, `repairs`, ...)
    pub entity_type: EntityType,
    /// Create, update or delete
    pub operation_type: OperationType,
    /// Remote id of the entity, for updates and deletes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    /// Version of the payload format chosen by the application
    pub schema_version: SchemaVersion,
    /// Serialized payload, never inspected by the engine
    pub bytes: Vec<u8>,
}

impl MutationEnvelope {
    /// Wrap already-serialized bytes. Payload schema version defaults to 1.
    pub fn new(
        entity_type: impl Into<EntityType>,
        operation_type: OperationType,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            operation_type,
            entity_id: None,
            schema_version: 1,
            bytes,
        }
    }

    /// Serialize `value` as JSON into a new envelope.
    pub fn json<T: Serialize>(
        entity_type: impl Into<EntityType>,
        operation_type: OperationType,
        value: &T,
    ) -> Result<Self> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| Error::InvalidPayload(e.to_string()))?;
        Ok(Self::new(entity_type, operation_type, bytes))
    }

    /// Set the remote entity id.
    pub fn with_entity_id(mut self, entity_id: impl Into<EntityId>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the payload schema version.
    pub fn with_schema_version(mut self, schema_version: SchemaVersion) -> Self {
        self.schema_version = schema_version;
        self
    }

    /// Check the envelope is routable.
    pub fn validate(&self) -> Result<()> {
        if self.entity_type.trim().is_empty() {
            return Err(Error::EmptyEntityType);
        }
        if self.schema_version == 0 {
            return Err(Error::InvalidSchemaVersion);
        }
        if self.operation_type.requires_entity_id()
            && self.entity_id.as_deref().map_or(true, str::is_empty)
        {
            return Err(Error::MissingEntityId {
                operation: self.operation_type.to_string(),
                entity_type: self.entity_type.clone(),
            });
        }
        Ok(())
    }

    /// Decode the payload as JSON into `T`.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.bytes).map_err(|e| Error::InvalidPayload(e.to_string()))
    }

    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_priorities_rank_creates_first() {
        assert!(OperationType::Create.default_priority() > OperationType::Update.default_priority());
        assert!(OperationType::Update.default_priority() > OperationType::Delete.default_priority());
    }

    #[test]
    fn json_envelope() {
        let env = MutationEnvelope::json(
            "validations",
            OperationType::Create,
            &json!({"jig_id": 12, "turno": "B"}),
        )
        .unwrap();

        assert_eq!(env.entity_type, "validations");
        assert_eq!(env.schema_version, 1);
        assert!(env.entity_id.is_none());

        let decoded: serde_json::Value = env.decode_json().unwrap();
        assert_eq!(decoded["jig_id"], 12);
    }

    #[test]
    fn update_requires_entity_id() {
        let env = MutationEnvelope::new("jigs", OperationType::Update, b"{}".to_vec());
        assert!(matches!(
            env.validate(),
            Err(Error::MissingEntityId { .. })
        ));

        let env = env.with_entity_id("42");
        assert!(env.validate().is_ok());
    }

    #[test]
    fn empty_entity_type_rejected() {
        let env = MutationEnvelope::new("  ", OperationType::Create, vec![]);
        assert_eq!(env.validate(), Err(Error::EmptyEntityType));
    }

    #[test]
    fn zero_schema_version_rejected() {
        let env = MutationEnvelope::new("repairs", OperationType::Create, vec![])
            .with_schema_version(0);
        assert_eq!(env.validate(), Err(Error::InvalidSchemaVersion));
    }

    #[test]
    fn decode_garbage_fails() {
        let env = MutationEnvelope::new("repairs", OperationType::Create, b"not json".to_vec());
        let result: Result<serde_json::Value> = env.decode_json();
        assert!(matches!(result, Err(Error::InvalidPayload(_))));
    }

    #[test]
    fn operation_type_parse() {
        assert_eq!("delete".parse::<OperationType>().unwrap(), OperationType::Delete);
        assert!(matches!(
            "upsert".parse::<OperationType>(),
            Err(Error::UnknownOperationType(_))
        ));
    }

    #[test]
    fn serialization_format() {
        let env = MutationEnvelope::new("jigs", OperationType::Delete, vec![])
            .with_entity_id("9");
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"entityType\":\"jigs\""));
        assert!(json.contains("\"operationType\":\"delete\""));
        assert!(json.contains("\"entityId\":\"9\""));
    }
}
