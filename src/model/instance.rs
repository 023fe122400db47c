use crate::model::{generate_id, Id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Extra fields stored with a service instance. Never part of its identity.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// The identity of a service instance: (service_id, org_id, space_id).
///
/// Equality is exact string equality on all three fields. No trimming or
/// case folding is applied anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    pub service_id: String,
    pub org_id: String,
    pub space_id: String,
}

impl InstanceKey {
    pub fn new(
        service_id: impl Into<String>,
        org_id: impl Into<String>,
        space_id: impl Into<String>,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            org_id: org_id.into(),
            space_id: space_id.into(),
        }
    }

    /// Names of the key fields that are empty, in declaration order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.service_id.is_empty() {
            missing.push("service_id");
        }
        if self.org_id.is_empty() {
            missing.push("org_id");
        }
        if self.space_id.is_empty() {
            missing.push("space_id");
        }
        missing
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.service_id, self.org_id, self.space_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: Id,
    pub service_id: String,
    pub org_id: String,
    pub space_id: String,
    #[serde(default)]
    pub attributes: Attributes,
    pub created_at: DateTime<Utc>,
}

impl ServiceInstance {
    pub fn key(&self) -> InstanceKey {
        InstanceKey::new(&self.service_id, &self.org_id, &self.space_id)
    }
}

/// A record ready to be handed to a store's insert primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct NewServiceInstance {
    pub id: Id,
    pub key: InstanceKey,
    pub attributes: Attributes,
    pub created_at: DateTime<Utc>,
}

impl NewServiceInstance {
    pub fn new(key: InstanceKey, attributes: Attributes) -> Self {
        Self {
            id: generate_id(),
            key,
            attributes,
            created_at: Utc::now(),
        }
    }

    pub fn into_instance(self) -> ServiceInstance {
        ServiceInstance {
            id: self.id,
            service_id: self.key.service_id,
            org_id: self.key.org_id,
            space_id: self.key.space_id,
            attributes: self.attributes,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_equality_is_exact() {
        let key = InstanceKey::new("test_service", "test_org", "test_space");

        assert_eq!(key, InstanceKey::new("test_service", "test_org", "test_space"));
        assert_ne!(key, InstanceKey::new("Test_Service", "test_org", "test_space"));
        assert_ne!(key, InstanceKey::new("test_service", "test_org ", "test_space"));
        assert_ne!(key, InstanceKey::new("test_service", "test_org2", "test_space2"));
    }

    #[test]
    fn test_missing_fields() {
        assert!(InstanceKey::new("s", "o", "p").missing_fields().is_empty());
        assert_eq!(
            InstanceKey::new("", "o", "").missing_fields(),
            vec!["service_id", "space_id"]
        );
    }

    #[test]
    fn test_new_instance_keeps_key_and_attributes_apart() {
        let key = InstanceKey::new("test_service", "test_org", "test_space");
        let mut attributes = Attributes::new();
        attributes.insert("plan".to_string(), serde_json::json!("small"));

        let instance = NewServiceInstance::new(key.clone(), attributes).into_instance();

        assert_eq!(instance.key(), key);
        assert_eq!(instance.attributes["plan"], serde_json::json!("small"));
    }

    #[test]
    fn test_attributes_default_when_absent() {
        let json = r#"{
            "id": "6f1c2d4e-9a57-4b1e-8f3a-2c5d7e9b1a30",
            "service_id": "test_service",
            "org_id": "test_org",
            "space_id": "test_space",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let instance: ServiceInstance = serde_json::from_str(json).unwrap();
        assert!(instance.attributes.is_empty());
    }
}
