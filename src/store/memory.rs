use crate::model::{Binding, InstanceKey, NewServiceInstance, ServiceInstance};
use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::{BindingStore, InstanceStore, Store};
use parking_lot::RwLock;
use std::collections::HashMap;

const INSTANCE_KEY_CONSTRAINT: &str = "service_instances_service_id_org_id_space_id_key";
const BINDING_PKEY_CONSTRAINT: &str = "service_bindings_pkey";
const BINDING_INSTANCE_FKEY_CONSTRAINT: &str = "service_bindings_instance_id_fkey";

#[derive(Debug, Default)]
struct MemoryState {
    /// Instances keyed by their identity triple
    instances: HashMap<InstanceKey, ServiceInstance>,
    /// Bindings keyed by binding id
    bindings: HashMap<String, Binding>,
}

impl MemoryState {
    fn is_referenced(&self, instance: &ServiceInstance) -> bool {
        self.bindings
            .values()
            .any(|binding| binding.instance_id == instance.id)
    }
}

/// Process-local store with the same constraint semantics as the PostgreSQL
/// schema. Every check-and-write happens under one write guard.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instance_count(&self) -> usize {
        self.state.read().instances.len()
    }

    pub fn binding_count(&self) -> usize {
        self.state.read().bindings.len()
    }
}

#[async_trait::async_trait]
impl InstanceStore for MemoryStore {
    async fn get_instance(&self, key: &InstanceKey) -> StoreResult<Option<ServiceInstance>> {
        Ok(self.state.read().instances.get(key).cloned())
    }

    async fn insert_instance(&self, instance: NewServiceInstance) -> StoreResult<ServiceInstance> {
        let mut state = self.state.write();
        if state.instances.contains_key(&instance.key) {
            return Err(StoreError::UniqueViolation {
                constraint: INSTANCE_KEY_CONSTRAINT.to_string(),
            });
        }

        let key = instance.key.clone();
        let stored = instance.into_instance();
        state.instances.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete_instance(&self, key: &InstanceKey) -> StoreResult<bool> {
        let mut state = self.state.write();
        let Some(instance) = state.instances.get(key) else {
            return Ok(false);
        };

        if state.is_referenced(instance) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: BINDING_INSTANCE_FKEY_CONSTRAINT.to_string(),
            });
        }

        state.instances.remove(key);
        Ok(true)
    }

    async fn clear_instances(&self, cascade: bool) -> StoreResult<()> {
        let mut state = self.state.write();
        if cascade {
            state.bindings.clear();
        } else if !state.bindings.is_empty() {
            return Err(StoreError::ForeignKeyViolation {
                constraint: BINDING_INSTANCE_FKEY_CONSTRAINT.to_string(),
            });
        }

        state.instances.clear();
        Ok(())
    }
}

#[async_trait::async_trait]
impl BindingStore for MemoryStore {
    async fn insert_binding(
        &self,
        key: &InstanceKey,
        binding_id: &str,
        app_id: &str,
    ) -> StoreResult<Option<Binding>> {
        let mut state = self.state.write();
        let Some(instance_id) = state.instances.get(key).map(|instance| instance.id) else {
            return Ok(None);
        };

        if state.bindings.contains_key(binding_id) {
            return Err(StoreError::UniqueViolation {
                constraint: BINDING_PKEY_CONSTRAINT.to_string(),
            });
        }

        let binding = Binding {
            binding_id: binding_id.to_string(),
            app_id: app_id.to_string(),
            instance_id,
            created_at: chrono::Utc::now(),
        };
        state
            .bindings
            .insert(binding_id.to_string(), binding.clone());
        Ok(Some(binding))
    }

    async fn delete_binding(&self, binding_id: &str) -> StoreResult<bool> {
        Ok(self.state.write().bindings.remove(binding_id).is_some())
    }

    async fn list_bindings(&self, key: &InstanceKey) -> StoreResult<Vec<Binding>> {
        let state = self.state.read();
        let Some(instance) = state.instances.get(key) else {
            return Ok(Vec::new());
        };

        let mut bindings: Vec<Binding> = state
            .bindings
            .values()
            .filter(|binding| binding.instance_id == instance.id)
            .cloned()
            .collect();
        bindings.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.binding_id.cmp(&b.binding_id))
        });
        Ok(bindings)
    }
}

impl Store for MemoryStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attributes;

    fn new_instance(service: &str, org: &str, space: &str) -> NewServiceInstance {
        NewServiceInstance::new(InstanceKey::new(service, org, space), Attributes::new())
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_key() {
        let store = MemoryStore::new();
        let first = store
            .insert_instance(new_instance("test_service", "test_org", "test_space"))
            .await
            .unwrap();

        let err = store
            .insert_instance(new_instance("test_service", "test_org", "test_space"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));

        let stored = store.get_instance(&first.key()).await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(store.instance_count(), 1);
    }

    #[tokio::test]
    async fn test_binding_requires_instance() {
        let store = MemoryStore::new();
        let key = InstanceKey::new("test_service", "test_org", "test_space");

        let missing = store.insert_binding(&key, "b-1", "app-1").await.unwrap();
        assert!(missing.is_none());

        store
            .insert_instance(new_instance("test_service", "test_org", "test_space"))
            .await
            .unwrap();
        let binding = store.insert_binding(&key, "b-1", "app-1").await.unwrap();
        assert!(binding.is_some());

        let err = store.insert_binding(&key, "b-1", "app-2").await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_delete_blocked_by_binding() {
        let store = MemoryStore::new();
        let key = InstanceKey::new("test_service", "test_org", "test_space");
        store
            .insert_instance(new_instance("test_service", "test_org", "test_space"))
            .await
            .unwrap();
        store.insert_binding(&key, "b-1", "app-1").await.unwrap();

        let err = store.delete_instance(&key).await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));

        assert!(store.delete_binding("b-1").await.unwrap());
        assert!(store.delete_instance(&key).await.unwrap());
        assert!(!store.delete_instance(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_without_cascade_keeps_referenced_rows() {
        let store = MemoryStore::new();
        let key = InstanceKey::new("test_service", "test_org", "test_space");
        store
            .insert_instance(new_instance("test_service", "test_org", "test_space"))
            .await
            .unwrap();
        store.insert_binding(&key, "b-1", "app-1").await.unwrap();

        let err = store.clear_instances(false).await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));
        assert_eq!(store.instance_count(), 1);

        store.clear_instances(true).await.unwrap();
        assert_eq!(store.instance_count(), 0);
        assert_eq!(store.binding_count(), 0);
    }
}
