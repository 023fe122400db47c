use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::str::FromStr;

use crate::config::DatabaseConfig;
use crate::model::{Attributes, Binding, InstanceKey, NewServiceInstance, ServiceInstance};
use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::{BindingStore, InstanceStore, Store};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a store honouring pool size and timeout settings
    pub async fn connect(database_url: &str, config: &DatabaseConfig) -> Result<Self> {
        let mut options =
            PgConnectOptions::from_str(database_url).context("Invalid PostgreSQL connection string")?;
        if let Some(timeout_ms) = config.statement_timeout_ms {
            options = options.options([("statement_timeout", timeout_ms.to_string())]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections())
            .acquire_timeout(config.acquire_timeout())
            .connect_with(options)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }
}

fn instance_from_row(row: &PgRow) -> StoreResult<ServiceInstance> {
    let attributes: serde_json::Value = row.get("attributes");
    let attributes: Attributes = serde_json::from_value(attributes)
        .context("Failed to deserialize service instance attributes")?;

    Ok(ServiceInstance {
        id: row.get("id"),
        service_id: row.get("service_id"),
        org_id: row.get("org_id"),
        space_id: row.get("space_id"),
        attributes,
        created_at: row.get("created_at"),
    })
}

fn binding_from_row(row: &PgRow) -> Binding {
    Binding {
        binding_id: row.get("binding_id"),
        app_id: row.get("app_id"),
        instance_id: row.get("instance_id"),
        created_at: row.get("created_at"),
    }
}

#[async_trait::async_trait]
impl InstanceStore for PostgresStore {
    async fn get_instance(&self, key: &InstanceKey) -> StoreResult<Option<ServiceInstance>> {
        let row = sqlx::query(
            r#"
            SELECT id, service_id, org_id, space_id, attributes, created_at
            FROM service_instances
            WHERE service_id = $1 AND org_id = $2 AND space_id = $3
            "#,
        )
        .bind(&key.service_id)
        .bind(&key.org_id)
        .bind(&key.space_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "Failed to fetch service instance"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        instance_from_row(&row).map(Some)
    }

    async fn insert_instance(&self, instance: NewServiceInstance) -> StoreResult<ServiceInstance> {
        let attributes = serde_json::to_value(&instance.attributes)
            .context("Failed to serialize service instance attributes")?;

        // One statement: the unique constraint decides the race, not a prior read.
        let row = sqlx::query(
            r#"
            INSERT INTO service_instances (id, service_id, org_id, space_id, attributes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, service_id, org_id, space_id, attributes, created_at
            "#,
        )
        .bind(instance.id)
        .bind(&instance.key.service_id)
        .bind(&instance.key.org_id)
        .bind(&instance.key.space_id)
        .bind(attributes)
        .bind(instance.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "Failed to insert service instance"))?;

        instance_from_row(&row)
    }

    async fn delete_instance(&self, key: &InstanceKey) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM service_instances WHERE service_id = $1 AND org_id = $2 AND space_id = $3",
        )
        .bind(&key.service_id)
        .bind(&key.org_id)
        .bind(&key.space_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "Failed to delete service instance"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_instances(&self, cascade: bool) -> StoreResult<()> {
        // TRUNCATE refuses any referenced table without CASCADE, even an empty
        // one, so the non-cascading path deletes rows instead.
        let statement = if cascade {
            "TRUNCATE TABLE service_instances CASCADE"
        } else {
            "DELETE FROM service_instances"
        };

        sqlx::query(statement)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx(e, "Failed to clear service instances"))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl BindingStore for PostgresStore {
    async fn insert_binding(
        &self,
        key: &InstanceKey,
        binding_id: &str,
        app_id: &str,
    ) -> StoreResult<Option<Binding>> {
        let row = sqlx::query(
            r#"
            INSERT INTO service_bindings (binding_id, app_id, instance_id, created_at)
            SELECT $1, $2, id, NOW()
            FROM service_instances
            WHERE service_id = $3 AND org_id = $4 AND space_id = $5
            RETURNING binding_id, app_id, instance_id, created_at
            "#,
        )
        .bind(binding_id)
        .bind(app_id)
        .bind(&key.service_id)
        .bind(&key.org_id)
        .bind(&key.space_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "Failed to insert service binding"))?;

        Ok(row.as_ref().map(binding_from_row))
    }

    async fn delete_binding(&self, binding_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM service_bindings WHERE binding_id = $1")
            .bind(binding_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx(e, "Failed to delete service binding"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_bindings(&self, key: &InstanceKey) -> StoreResult<Vec<Binding>> {
        let rows = sqlx::query(
            r#"
            SELECT b.binding_id, b.app_id, b.instance_id, b.created_at
            FROM service_bindings b
            JOIN service_instances i ON i.id = b.instance_id
            WHERE i.service_id = $1 AND i.org_id = $2 AND i.space_id = $3
            ORDER BY b.created_at, b.binding_id
            "#,
        )
        .bind(&key.service_id)
        .bind(&key.org_id)
        .bind(&key.space_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "Failed to list service bindings"))?;

        Ok(rows.iter().map(binding_from_row).collect())
    }
}

impl Store for PostgresStore {}
