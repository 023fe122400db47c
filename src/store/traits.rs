use crate::model::{Binding, InstanceKey, NewServiceInstance, ServiceInstance};
use crate::store::error::StoreResult;

/// Storage primitives for service instances.
///
/// Implementations must enforce uniqueness of (service_id, org_id, space_id)
/// themselves: `insert_instance` is a single atomic operation that either
/// stores the record or fails with `StoreError::UniqueViolation`.
#[async_trait::async_trait]
pub trait InstanceStore: Send + Sync {
    /// Get the instance stored under exactly this key
    async fn get_instance(&self, key: &InstanceKey) -> StoreResult<Option<ServiceInstance>>;
    /// Insert or report a uniqueness violation; never overwrites
    async fn insert_instance(&self, instance: NewServiceInstance) -> StoreResult<ServiceInstance>;
    /// Delete one instance. Fails with a foreign key violation while bindings reference it
    async fn delete_instance(&self, key: &InstanceKey) -> StoreResult<bool>;
    /// Remove every instance, and with `cascade` every binding as well
    async fn clear_instances(&self, cascade: bool) -> StoreResult<()>;
}

#[async_trait::async_trait]
pub trait BindingStore: Send + Sync {
    /// Attach a binding to the instance under `key`; `None` when no such instance exists
    async fn insert_binding(
        &self,
        key: &InstanceKey,
        binding_id: &str,
        app_id: &str,
    ) -> StoreResult<Option<Binding>>;
    async fn delete_binding(&self, binding_id: &str) -> StoreResult<bool>;
    async fn list_bindings(&self, key: &InstanceKey) -> StoreResult<Vec<Binding>>;
}

pub trait Store: InstanceStore + BindingStore + Send + Sync {}
