use async_trait::async_trait;
use chrono::Utc;
use nexus_models::{
    ChangeKind, ChangeLogEntry, ObjectRef, RelationTuple, TupleFilter, TuplePrimaryKey,
    WriteTupleRequest,
};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{Result, StoreError};
use crate::traits::TupleStore;

/// Tuple store backed by Postgres. Same idempotent `ON CONFLICT DO
/// NOTHING` write and parameterized filter-query builder as a typical
/// repository-style service, extended with change-log emission (in the
/// same transaction as the tuple write) and an acyclicity check on
/// `parent`-relation writes.
pub struct PostgresTupleStore {
    pool: PgPool,
}

const PARENT_RELATION: &str = "parent";

impl PostgresTupleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Would writing `(object_type, object_id) --parent--> (subject_type,
    /// subject_id)` create a cycle? Walks the parent chain starting at
    /// the *new* parent and checks whether it ever returns to the
    /// object being assigned a parent. Same-type traversal only — the
    /// spec invariant is scoped to "objects of the same type."
    async fn would_cycle(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: &str,
        object_type: &str,
        object_id: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<bool> {
        if object_type != subject_type {
            return Ok(false);
        }
        if object_id == subject_id {
            return Ok(true);
        }

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            WITH RECURSIVE ancestors AS (
                SELECT subject_id AS id
                FROM relation_tuples
                WHERE tenant_id = $1 AND object_type = $2 AND object_id = $3
                  AND relation = $4 AND subject_type = $2
                UNION
                SELECT rt.subject_id
                FROM relation_tuples rt
                JOIN ancestors a ON rt.object_id = a.id
                WHERE rt.tenant_id = $1 AND rt.object_type = $2
                  AND rt.relation = $4 AND rt.subject_type = $2
            )
            SELECT id FROM ancestors
            "#,
        )
        .bind(tenant_id)
        .bind(object_type)
        .bind(subject_id)
        .bind(PARENT_RELATION)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.iter().any(|(id,)| id == object_id) || object_id == subject_id)
    }

    async fn append_changelog(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: &str,
        kind: ChangeKind,
        tuple_before: Option<&RelationTuple>,
        tuple_after: Option<&RelationTuple>,
    ) -> Result<i64> {
        let kind_str = match kind {
            ChangeKind::Write => "write",
            ChangeKind::Delete => "delete",
        };
        let seq: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO rebac_changelog (tenant_id, kind, tuple_before, tuple_after, ts)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING seq
            "#,
        )
        .bind(tenant_id)
        .bind(kind_str)
        .bind(tuple_before.map(|t| sqlx::types::Json(t)))
        .bind(tuple_after.map(|t| sqlx::types::Json(t)))
        .bind(Utc::now())
        .fetch_one(&mut **tx)
        .await?;

        Ok(seq.0)
    }
}

#[async_trait]
impl TupleStore for PostgresTupleStore {
    async fn write(&self, request: WriteTupleRequest) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        if request.relation == PARENT_RELATION
            && self
                .would_cycle(
                    &mut tx,
                    &request.tenant_id,
                    &request.object_type,
                    &request.object_id,
                    &request.subject_type,
                    &request.subject_id,
                )
                .await?
        {
            return Err(StoreError::CycleDetected(format!(
                "{}:{} -> parent -> {}:{}",
                request.object_type, request.object_id, request.subject_type, request.subject_id
            )));
        }

        if let Some(expected) = request.expected_seq {
            let current: (i64,) = sqlx::query_as(
                "SELECT COALESCE(MAX(seq), 0) FROM rebac_changelog WHERE tenant_id = $1",
            )
            .bind(&request.tenant_id)
            .fetch_one(&mut *tx)
            .await?;
            if current.0 != expected {
                return Err(StoreError::Conflict(format!(
                    "expected seq {expected}, tenant is at {}",
                    current.0
                )));
            }
        }

        let tuple = sqlx::query_as::<_, RelationTuple>(
            r#"
            INSERT INTO relation_tuples
                (tenant_id, object_type, object_id, relation, subject_type, subject_id, subject_relation, subject_tenant_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (tenant_id, object_type, object_id, relation, subject_type, subject_id, COALESCE(subject_relation, ''))
            DO UPDATE SET expires_at = EXCLUDED.expires_at, subject_tenant_id = EXCLUDED.subject_tenant_id
            RETURNING *
            "#,
        )
        .bind(&request.tenant_id)
        .bind(&request.object_type)
        .bind(&request.object_id)
        .bind(&request.relation)
        .bind(&request.subject_type)
        .bind(&request.subject_id)
        .bind(&request.subject_relation)
        .bind(&request.subject_tenant_id)
        .bind(request.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        let seq = Self::append_changelog(&mut tx, &request.tenant_id, ChangeKind::Write, None, Some(&tuple)).await?;

        tx.commit().await?;

        tracing::info!(
            tenant_id = %tuple.tenant_id,
            object = %format!("{}:{}", tuple.object_type, tuple.object_id),
            relation = %tuple.relation,
            subject = %format!("{}:{}", tuple.subject_type, tuple.subject_id),
            "wrote relation tuple"
        );

        Ok(seq)
    }

    async fn delete(&self, tenant_id: &str, pk: &TuplePrimaryKey) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, RelationTuple>(
            r#"
            SELECT * FROM relation_tuples
            WHERE tenant_id = $1 AND object_type = $2 AND object_id = $3 AND relation = $4
              AND subject_type = $5 AND subject_id = $6
              AND (subject_relation = $7 OR (subject_relation IS NULL AND $7 IS NULL))
            "#,
        )
        .bind(tenant_id)
        .bind(&pk.object_type)
        .bind(&pk.object_id)
        .bind(&pk.relation)
        .bind(&pk.subject_type)
        .bind(&pk.subject_id)
        .bind(&pk.subject_relation)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(tuple) = existing else {
            let current: (i64,) = sqlx::query_as(
                "SELECT COALESCE(MAX(seq), 0) FROM rebac_changelog WHERE tenant_id = $1",
            )
            .bind(tenant_id)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(current.0);
        };

        sqlx::query(
            r#"
            DELETE FROM relation_tuples
            WHERE tenant_id = $1 AND object_type = $2 AND object_id = $3 AND relation = $4
              AND subject_type = $5 AND subject_id = $6
              AND (subject_relation = $7 OR (subject_relation IS NULL AND $7 IS NULL))
            "#,
        )
        .bind(tenant_id)
        .bind(&pk.object_type)
        .bind(&pk.object_id)
        .bind(&pk.relation)
        .bind(&pk.subject_type)
        .bind(&pk.subject_id)
        .bind(&pk.subject_relation)
        .execute(&mut *tx)
        .await?;

        let seq = Self::append_changelog(&mut tx, tenant_id, ChangeKind::Delete, Some(&tuple), None).await?;
        tx.commit().await?;

        tracing::info!(
            tenant_id = %tenant_id,
            object = %format!("{}:{}", pk.object_type, pk.object_id),
            relation = %pk.relation,
            "deleted relation tuple"
        );

        Ok(seq)
    }

    async fn lookup_by_object(
        &self,
        tenant_id: &str,
        object_type: &str,
        object_id: &str,
        filter: &TupleFilter,
    ) -> Result<Vec<RelationTuple>> {
        let mut query = String::from(
            "SELECT * FROM relation_tuples WHERE tenant_id = $1 AND object_type = $2 AND object_id = $3",
        );
        let mut bind_count = 4;
        if filter.relation.is_some() {
            query.push_str(&format!(" AND relation = ${bind_count}"));
            bind_count += 1;
        }
        if filter.subject_type.is_some() {
            query.push_str(&format!(" AND subject_type = ${bind_count}"));
            bind_count += 1;
        }
        if filter.subject_id.is_some() {
            query.push_str(&format!(" AND subject_id = ${bind_count}"));
        }
        query.push_str(" AND (expires_at IS NULL OR expires_at > NOW())");

        let mut q = sqlx::query_as::<_, RelationTuple>(&query)
            .bind(tenant_id)
            .bind(object_type)
            .bind(object_id);
        if let Some(r) = &filter.relation {
            q = q.bind(r);
        }
        if let Some(st) = &filter.subject_type {
            q = q.bind(st);
        }
        if let Some(sid) = &filter.subject_id {
            q = q.bind(sid);
        }

        Ok(q.fetch_all(&self.pool).await?)
    }

    async fn lookup_by_subject(
        &self,
        tenant_id: &str,
        subject_type: &str,
        subject_id: &str,
        filter: &TupleFilter,
    ) -> Result<Vec<RelationTuple>> {
        let mut query = String::from(
            "SELECT * FROM relation_tuples WHERE tenant_id = $1 AND subject_type = $2 AND subject_id = $3",
        );
        let mut bind_count = 4;
        if filter.relation.is_some() {
            query.push_str(&format!(" AND relation = ${bind_count}"));
            bind_count += 1;
        }
        if filter.object_type.is_some() {
            query.push_str(&format!(" AND object_type = ${bind_count}"));
        }
        query.push_str(" AND (expires_at IS NULL OR expires_at > NOW())");

        let mut q = sqlx::query_as::<_, RelationTuple>(&query)
            .bind(tenant_id)
            .bind(subject_type)
            .bind(subject_id);
        if let Some(r) = &filter.relation {
            q = q.bind(r);
        }
        if let Some(ot) = &filter.object_type {
            q = q.bind(ot);
        }

        Ok(q.fetch_all(&self.pool).await?)
    }

    async fn lookup_tupleset(
        &self,
        tenant_id: &str,
        object_type: &str,
        object_id: &str,
        tupleset_relation: &str,
    ) -> Result<Vec<ObjectRef>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT subject_type, subject_id FROM relation_tuples
            WHERE tenant_id = $1 AND object_type = $2 AND object_id = $3 AND relation = $4
              AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(tenant_id)
        .bind(object_type)
        .bind(object_id)
        .bind(tupleset_relation)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(object_type, object_id)| ObjectRef::new(object_type, object_id))
            .collect())
    }

    async fn changelog_scan(
        &self,
        tenant_id: &str,
        since_seq: i64,
        max: usize,
    ) -> Result<Vec<ChangeLogEntry>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            seq: i64,
            tenant_id: String,
            kind: String,
            tuple_before: Option<sqlx::types::Json<RelationTuple>>,
            tuple_after: Option<sqlx::types::Json<RelationTuple>>,
            ts: chrono::DateTime<Utc>,
        }

        let rows: Vec<Row> = sqlx::query_as(
            r#"
            SELECT seq, tenant_id, kind, tuple_before, tuple_after, ts
            FROM rebac_changelog
            WHERE tenant_id = $1 AND seq > $2
            ORDER BY seq ASC
            LIMIT $3
            "#,
        )
        .bind(tenant_id)
        .bind(since_seq)
        .bind(max as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ChangeLogEntry {
                seq: r.seq,
                tenant_id: r.tenant_id,
                kind: if r.kind == "write" { ChangeKind::Write } else { ChangeKind::Delete },
                tuple_before: r.tuple_before.map(|j| j.0),
                tuple_after: r.tuple_after.map(|j| j.0),
                ts: r.ts,
            })
            .collect())
    }

    async fn current_seq(&self, tenant_id: &str) -> Result<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(seq), 0) FROM rebac_changelog WHERE tenant_id = $1")
                .bind(tenant_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }
}
