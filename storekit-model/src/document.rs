use crate::{AuditFields, Entity, EntitySchema, HasAudit, HasConcurrencyStamp, HasIdentity};
use serde::{Deserialize, Serialize};
use storekit_types::{ConcurrencyStamp, EntityId, PartitionKey};

/// A schema-less record holding an arbitrary JSON payload.
///
/// Used for raw captured data whose shape is owned by the producer rather
/// than by a Rust type. Optionally partitioned, always audited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub concurrency_stamp: Option<ConcurrencyStamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<PartitionKey>,
    pub data: serde_json::Value,
    #[serde(default)]
    pub audit: AuditFields,
}

impl Document {
    /// Creates an unsaved document.
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            id: None,
            concurrency_stamp: None,
            partition_key: None,
            data,
            audit: AuditFields::default(),
        }
    }

    /// Places the document in a partition.
    pub fn in_partition(mut self, key: PartitionKey) -> Self {
        self.partition_key = Some(key);
        self
    }

    /// Extract a string value from `data` using a JSON pointer (e.g., "/title").
    pub fn get_str(&self, pointer: &str) -> Option<&str> {
        self.data.pointer(pointer).and_then(|v| v.as_str())
    }

    /// Extract a boolean value from `data` using a JSON pointer.
    pub fn get_bool(&self, pointer: &str) -> Option<bool> {
        self.data.pointer(pointer).and_then(|v| v.as_bool())
    }

    /// Extract a numeric value from `data` using a JSON pointer.
    pub fn get_number(&self, pointer: &str) -> Option<f64> {
        self.data.pointer(pointer).and_then(|v| v.as_f64())
    }
}

impl HasIdentity for Document {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }
}

impl HasConcurrencyStamp for Document {
    fn concurrency_stamp(&self) -> Option<&ConcurrencyStamp> {
        self.concurrency_stamp.as_ref()
    }

    fn set_concurrency_stamp(&mut self, stamp: ConcurrencyStamp) {
        self.concurrency_stamp = Some(stamp);
    }
}

impl HasAudit for Document {
    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}

impl Entity for Document {
    const ENTITY_TYPE: &'static str = "document";

    fn schema() -> EntitySchema {
        EntitySchema::new(Self::ENTITY_TYPE)
            .describe("Schema-less captured payloads")
            .partitioned()
    }

    fn partition(&self) -> Option<&PartitionKey> {
        self.partition_key.as_ref()
    }

    fn audit_fields(&self) -> Option<&AuditFields> {
        Some(self.audit())
    }

    fn audit_fields_mut(&mut self) -> Option<&mut AuditFields> {
        Some(self.audit_mut())
    }
}
