use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use nexus_models::{Rule, Schema, TypeDefinition};
use sqlx::PgPool;

use crate::error::{Result, SchemaError};
use crate::validate::validate_schema;

/// Holds per-tenant schema snapshots and exposes the current one. An
/// evaluation always works off a single `Arc<Schema>` snapshot obtained
/// once at the start of a check — concurrent reloads never tear a
/// reduction in progress.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    async fn current(&self, tenant_id: &str) -> Result<Arc<Schema>>;

    /// Validates and installs a new schema version, returning the new
    /// version number. Rejects with `Invalid` if validation fails — the
    /// previous version remains current. On success, writes a synthetic
    /// change-log entry (both tuple fields absent) so the invalidator
    /// flushes every cache entry belonging to the tenant.
    async fn reload(&self, tenant_id: &str, schema: Schema) -> Result<i32>;
}

/// Postgres-backed registry. One row per `(tenant, object_type,
/// version)` in `authorization_schemas`; the tenant's current version
/// number lives in `schema_registry_state`.
pub struct PostgresSchemaRegistry {
    pool: PgPool,
}

impl PostgresSchemaRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_version(&self, tenant_id: &str) -> Result<Option<i32>> {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT current_version FROM schema_registry_state WHERE tenant_id = $1")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }
}

#[async_trait]
impl SchemaRegistry for PostgresSchemaRegistry {
    async fn current(&self, tenant_id: &str) -> Result<Arc<Schema>> {
        let version = self
            .current_version(tenant_id)
            .await?
            .ok_or_else(|| SchemaError::NoCurrentVersion(tenant_id.to_string()))?;

        #[derive(sqlx::FromRow)]
        struct Row {
            object_type: String,
            rule_json: sqlx::types::Json<HashMap<String, Rule>>,
        }

        let rows: Vec<Row> = sqlx::query_as(
            "SELECT object_type, rule_json FROM authorization_schemas WHERE tenant_id = $1 AND version = $2",
        )
        .bind(tenant_id)
        .bind(version)
        .fetch_all(&self.pool)
        .await?;

        let type_definitions = rows
            .into_iter()
            .map(|r| TypeDefinition { object_type: r.object_type, relations: r.rule_json.0 })
            .collect();

        Ok(Arc::new(Schema { schema_version: version.to_string(), type_definitions }))
    }

    async fn reload(&self, tenant_id: &str, schema: Schema) -> Result<i32> {
        let errors = validate_schema(&schema);
        if !errors.is_empty() {
            return Err(SchemaError::Invalid(errors));
        }

        let mut tx = self.pool.begin().await?;

        let next_version: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM authorization_schemas WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_one(&mut *tx)
        .await?;

        for type_def in &schema.type_definitions {
            sqlx::query(
                r#"
                INSERT INTO authorization_schemas (tenant_id, object_type, version, rule_json, created_at)
                VALUES ($1, $2, $3, $4, NOW())
                "#,
            )
            .bind(tenant_id)
            .bind(&type_def.object_type)
            .bind(next_version)
            .bind(sqlx::types::Json(&type_def.relations))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO schema_registry_state (tenant_id, current_version)
            VALUES ($1, $2)
            ON CONFLICT (tenant_id) DO UPDATE SET current_version = EXCLUDED.current_version
            "#,
        )
        .bind(tenant_id)
        .bind(next_version)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO rebac_changelog (tenant_id, kind, tuple_before, tuple_after, ts)
            VALUES ($1, $2, NULL, NULL, $3)
            "#,
        )
        .bind(tenant_id)
        .bind("write")
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(tenant_id, version = next_version, "installed schema version");

        Ok(next_version)
    }
}

/// In-process registry for tests — no database required.
#[derive(Default)]
pub struct InMemorySchemaRegistry {
    versions: RwLock<HashMap<String, (i32, Arc<Schema>)>>,
}

impl InMemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a schema without validation, bypassing the normal
    /// reload path — useful for tests that want a known-good fixture
    /// without caring about versioning.
    pub fn seed(&self, tenant_id: &str, schema: Schema) {
        let mut versions = self.versions.write().unwrap();
        let version = versions.get(tenant_id).map(|(v, _)| v + 1).unwrap_or(1);
        versions.insert(tenant_id.to_string(), (version, Arc::new(schema)));
    }
}

#[async_trait]
impl SchemaRegistry for InMemorySchemaRegistry {
    async fn current(&self, tenant_id: &str) -> Result<Arc<Schema>> {
        self.versions
            .read()
            .unwrap()
            .get(tenant_id)
            .map(|(_, schema)| schema.clone())
            .ok_or_else(|| SchemaError::NoCurrentVersion(tenant_id.to_string()))
    }

    async fn reload(&self, tenant_id: &str, schema: Schema) -> Result<i32> {
        let errors = validate_schema(&schema);
        if !errors.is_empty() {
            return Err(SchemaError::Invalid(errors));
        }
        let mut versions = self.versions.write().unwrap();
        let version = versions.get(tenant_id).map(|(v, _)| v + 1).unwrap_or(1);
        versions.insert(tenant_id.to_string(), (version, Arc::new(schema)));
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_models::TypeDefinition as TD;

    fn sample_schema() -> Schema {
        Schema {
            schema_version: "1".to_string(),
            type_definitions: vec![TD {
                object_type: "folder".to_string(),
                relations: [("owner".to_string(), Rule::this())].into_iter().collect(),
            }],
        }
    }

    #[tokio::test]
    async fn reload_then_current_round_trips() {
        let registry = InMemorySchemaRegistry::new();
        let version = registry.reload("t1", sample_schema()).await.unwrap();
        assert_eq!(version, 1);
        let schema = registry.current("t1").await.unwrap();
        assert!(schema.type_def("folder").is_some());
    }

    #[tokio::test]
    async fn invalid_schema_is_rejected_without_installing() {
        let registry = InMemorySchemaRegistry::new();
        let mut bad = sample_schema();
        bad.type_definitions.push(TD { object_type: "folder".to_string(), relations: Default::default() });
        let err = registry.reload("t1", bad).await.unwrap_err();
        assert!(matches!(err, SchemaError::Invalid(_)));
        assert!(registry.current("t1").await.is_err());
    }

    #[tokio::test]
    async fn reload_bumps_version() {
        let registry = InMemorySchemaRegistry::new();
        registry.reload("t1", sample_schema()).await.unwrap();
        let v2 = registry.reload("t1", sample_schema()).await.unwrap();
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn unknown_tenant_has_no_current_version() {
        let registry = InMemorySchemaRegistry::new();
        let err = registry.current("ghost").await.unwrap_err();
        assert!(matches!(err, SchemaError::NoCurrentVersion(_)));
    }
}
