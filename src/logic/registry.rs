use log::{debug, info, warn};
use std::sync::Arc;
use thiserror::Error;

use crate::config::ConflictPolicy;
use crate::model::{Attributes, Binding, InstanceKey, NewServiceInstance, ServiceInstance};
use crate::store::{BindingStore, InstanceStore, Store, StoreError};

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid instance key: missing {}", .0.join(", "))]
    InvalidKey(Vec<&'static str>),

    #[error("service instance not found: {0}")]
    NotFound(InstanceKey),

    #[error("concurrent create conflict on service instance {0}")]
    Conflict(InstanceKey),

    #[error("binding already exists: {0}")]
    BindingExists(String),

    #[error("service instances are still referenced by bindings ({constraint})")]
    DependentRecords { constraint: String },

    #[error("storage operation timed out")]
    Timeout,

    #[error(transparent)]
    Backend(anyhow::Error),
}

impl RegistryError {
    /// Whether re-invoking the same call may succeed. A broker maps these to
    /// a retry response rather than a failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Conflict(_) | RegistryError::Timeout)
    }
}

impl From<StoreError> for RegistryError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::ForeignKeyViolation { constraint } => {
                RegistryError::DependentRecords { constraint }
            }
            StoreError::Timeout => RegistryError::Timeout,
            StoreError::Backend(inner) => RegistryError::Backend(inner),
            // Callers that expect a uniqueness signal translate it before this point.
            StoreError::UniqueViolation { constraint } => RegistryError::Backend(anyhow::anyhow!(
                "unexpected unique constraint violation: {}",
                constraint
            )),
        }
    }
}

/// Result of `find_or_create`.
#[derive(Debug, Clone, PartialEq)]
pub struct FindOrCreate {
    pub instance: ServiceInstance,
    /// True only for the single call that inserted the record
    pub created: bool,
}

/// Owns the lifecycle of service instance records.
///
/// Holds no lock of its own; the store's uniqueness constraint is the only
/// coordination point between concurrent callers.
#[derive(Debug)]
pub struct ServiceInstanceRepository<S: Store> {
    store: Arc<S>,
    conflict_policy: ConflictPolicy,
}

impl<S: Store> Clone for ServiceInstanceRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            conflict_policy: self.conflict_policy,
        }
    }
}

impl<S: Store> ServiceInstanceRepository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_conflict_policy(store, ConflictPolicy::default())
    }

    pub fn with_conflict_policy(store: Arc<S>, conflict_policy: ConflictPolicy) -> Self {
        Self {
            store,
            conflict_policy,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Return the instance stored under `key`, creating it from `key` and
    /// `attributes` when absent. `attributes` are ignored for an existing
    /// record.
    ///
    /// The initial read is only a fast path. Creation is decided by the
    /// store's constraint-enforced insert, so of N concurrent callers with the
    /// same key at most one sees `created == true`.
    pub async fn find_or_create(
        &self,
        key: InstanceKey,
        attributes: Attributes,
    ) -> RegistryResult<FindOrCreate> {
        validate_key(&key)?;

        if let Some(instance) = self.store.get_instance(&key).await? {
            debug!("Found existing service instance {}", key);
            return Ok(FindOrCreate {
                instance,
                created: false,
            });
        }

        match self
            .store
            .insert_instance(NewServiceInstance::new(key.clone(), attributes))
            .await
        {
            Ok(instance) => {
                info!("Created service instance {} ({})", key, instance.id);
                Ok(FindOrCreate {
                    instance,
                    created: true,
                })
            }
            Err(StoreError::UniqueViolation { constraint }) => {
                self.resolve_lost_race(key, &constraint).await
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn resolve_lost_race(
        &self,
        key: InstanceKey,
        constraint: &str,
    ) -> RegistryResult<FindOrCreate> {
        if self.conflict_policy == ConflictPolicy::Surface {
            warn!("Lost create race on {} ({}), surfacing conflict", key, constraint);
            return Err(RegistryError::Conflict(key));
        }

        debug!("Lost create race on {} ({}), re-reading winner", key, constraint);
        match self.store.get_instance(&key).await? {
            Some(instance) => Ok(FindOrCreate {
                instance,
                created: false,
            }),
            None => {
                // The winner's record was removed before we could read it.
                warn!("Winning record for {} disappeared before re-read", key);
                Err(RegistryError::Conflict(key))
            }
        }
    }

    /// Exact-key read. `None` is the not-found outcome.
    pub async fn lookup(&self, key: &InstanceKey) -> RegistryResult<Option<ServiceInstance>> {
        validate_key(key)?;
        Ok(self.store.get_instance(key).await?)
    }

    /// Remove every instance. With `cascade`, bindings referencing them go
    /// too; without it the call fails while any binding exists.
    pub async fn clear_all(&self, cascade: bool) -> RegistryResult<()> {
        self.store.clear_instances(cascade).await?;
        info!("Cleared service instances (cascade={})", cascade);
        Ok(())
    }

    /// Deprovision a single instance. Returns whether it existed.
    pub async fn delete(&self, key: &InstanceKey) -> RegistryResult<bool> {
        validate_key(key)?;
        let deleted = self.store.delete_instance(key).await?;
        if deleted {
            info!("Deleted service instance {}", key);
        }
        Ok(deleted)
    }

    pub async fn bind(
        &self,
        key: &InstanceKey,
        binding_id: &str,
        app_id: &str,
    ) -> RegistryResult<Binding> {
        validate_key(key)?;
        match self.store.insert_binding(key, binding_id, app_id).await {
            Ok(Some(binding)) => {
                info!("Bound app {} to service instance {} as {}", app_id, key, binding_id);
                Ok(binding)
            }
            Ok(None) => Err(RegistryError::NotFound(key.clone())),
            Err(StoreError::UniqueViolation { .. }) => {
                Err(RegistryError::BindingExists(binding_id.to_string()))
            }
            Err(other) => Err(other.into()),
        }
    }

    pub async fn unbind(&self, binding_id: &str) -> RegistryResult<bool> {
        Ok(self.store.delete_binding(binding_id).await?)
    }

    pub async fn bindings(&self, key: &InstanceKey) -> RegistryResult<Vec<Binding>> {
        validate_key(key)?;
        Ok(self.store.list_bindings(key).await?)
    }
}

fn validate_key(key: &InstanceKey) -> RegistryResult<()> {
    let missing = key.missing_fields();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(RegistryError::InvalidKey(missing))
    }
}
