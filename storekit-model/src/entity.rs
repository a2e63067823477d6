use crate::EntitySchema;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use storekit_types::{ConcurrencyStamp, EntityId, PartitionKey};

/// A record with a globally unique id.
///
/// The id is `None` until the store assigns one at creation; it never
/// changes afterwards.
pub trait HasIdentity {
    fn id(&self) -> Option<EntityId>;
    fn set_id(&mut self, id: EntityId);
}

/// A record guarded by an optimistic-lock stamp.
pub trait HasConcurrencyStamp {
    fn concurrency_stamp(&self) -> Option<&ConcurrencyStamp>;
    fn set_concurrency_stamp(&mut self, stamp: ConcurrencyStamp);
}

/// A record that belongs to exactly one partition.
pub trait HasPartitionKey {
    fn partition_key(&self) -> &PartitionKey;
}

/// Actor and time metadata stamped by audit handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// A record carrying [`AuditFields`].
pub trait HasAudit {
    fn audit(&self) -> &AuditFields;
    fn audit_mut(&mut self) -> &mut AuditFields;
}

/// A record that is tombstoned instead of physically removed.
pub trait SoftDelete {
    fn deleted_at(&self) -> Option<DateTime<Utc>>;
    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>);

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

/// A persisted record type.
///
/// Identity and the concurrency stamp are mandatory. The remaining
/// capabilities are opt-in: an entity that implements [`HasPartitionKey`],
/// [`HasAudit`] or [`SoftDelete`] exposes it by overriding the matching
/// accessor below, which is how the generic store discovers it.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use storekit_model::{Entity, HasConcurrencyStamp, HasIdentity};
/// use storekit_types::{ConcurrencyStamp, EntityId};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Sensor {
///     id: Option<EntityId>,
///     concurrency_stamp: Option<ConcurrencyStamp>,
///     label: String,
/// }
///
/// impl HasIdentity for Sensor {
///     fn id(&self) -> Option<EntityId> { self.id }
///     fn set_id(&mut self, id: EntityId) { self.id = Some(id) }
/// }
///
/// impl HasConcurrencyStamp for Sensor {
///     fn concurrency_stamp(&self) -> Option<&ConcurrencyStamp> { self.concurrency_stamp.as_ref() }
///     fn set_concurrency_stamp(&mut self, stamp: ConcurrencyStamp) { self.concurrency_stamp = Some(stamp) }
/// }
///
/// impl Entity for Sensor {
///     const ENTITY_TYPE: &'static str = "sensor";
/// }
/// ```
pub trait Entity:
    HasIdentity + HasConcurrencyStamp + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Stable type name; also the default table name.
    const ENTITY_TYPE: &'static str;

    /// Storage layout handed to backing-context adapters at registration.
    fn schema() -> EntitySchema {
        EntitySchema::new(Self::ENTITY_TYPE)
    }

    fn partition(&self) -> Option<&PartitionKey> {
        None
    }

    fn audit_fields(&self) -> Option<&AuditFields> {
        None
    }

    fn audit_fields_mut(&mut self) -> Option<&mut AuditFields> {
        None
    }

    fn soft_delete_mut(&mut self) -> Option<&mut dyn SoftDelete> {
        None
    }

    fn is_deleted(&self) -> bool {
        false
    }
}
