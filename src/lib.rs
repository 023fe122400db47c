pub mod config;
pub mod logic;
pub mod model;
pub mod store;

// Export registry types
pub use logic::{FindOrCreate, RegistryError, RegistryResult, ServiceInstanceRepository};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store, StoreError};

/// Connect to PostgreSQL using the loaded configuration and build a repository
/// around the resulting store. The schema is applied separately, see
/// `PostgresStore::migrate`.
pub async fn connect_repository(
    config: &crate::config::AppConfig,
) -> anyhow::Result<ServiceInstanceRepository<PostgresStore>> {
    use std::sync::Arc;

    let database_url = config.database_url()?;
    let store = PostgresStore::connect(&database_url, &config.database).await?;

    Ok(ServiceInstanceRepository::with_conflict_policy(
        Arc::new(store),
        config.registry.conflict_policy,
    ))
}
