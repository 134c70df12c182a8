//! Family repository for database operations.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use domain::models::Family;
use domain::services::{FamilyStore, StoreError};

use super::store_error;
use crate::entities::FamilyEntity;
use crate::metrics::QueryTimer;

const FAMILY_COLUMNS: &str = "id, head_id, name, alias, max_size, member_ids, \
     pending_join_requests, pending_member_emails, created_at, updated_at";

/// Repository for family-related database operations.
#[derive(Clone)]
pub struct FamilyRepository {
    pool: PgPool,
}

impl FamilyRepository {
    /// Creates a new FamilyRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<FamilyEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_family_by_id");
        let result = sqlx::query_as::<_, FamilyEntity>(&format!(
            "SELECT {} FROM families WHERE id = $1",
            FAMILY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    async fn fetch_by_alias(&self, alias: &str) -> Result<Option<FamilyEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_family_by_alias");
        let result = sqlx::query_as::<_, FamilyEntity>(&format!(
            "SELECT {} FROM families WHERE alias = $1",
            FAMILY_COLUMNS
        ))
        .bind(alias)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    async fn exists_by_alias(&self, alias: &str) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("check_family_alias_exists");
        let result =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM families WHERE alias = $1)")
                .bind(alias)
                .fetch_one(&self.pool)
                .await;
        timer.record();
        result
    }

    /// Upsert the full family snapshot.
    async fn upsert(&self, family: &Family) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("upsert_family");
        let result = sqlx::query(
            r#"
            INSERT INTO families (
                id, head_id, name, alias, max_size, member_ids,
                pending_join_requests, pending_member_emails, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                head_id = EXCLUDED.head_id,
                name = EXCLUDED.name,
                alias = EXCLUDED.alias,
                max_size = EXCLUDED.max_size,
                member_ids = EXCLUDED.member_ids,
                pending_join_requests = EXCLUDED.pending_join_requests,
                pending_member_emails = EXCLUDED.pending_member_emails,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(family.id)
        .bind(family.head_id)
        .bind(&family.name)
        .bind(&family.alias)
        .bind(family.max_size)
        .bind(&family.member_ids)
        .bind(&family.pending_join_requests)
        .bind(&family.pending_member_emails)
        .bind(family.created_at)
        .bind(family.updated_at)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("delete_family");
        let result = sqlx::query("DELETE FROM families WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|_| ())
    }
}

#[async_trait]
impl FamilyStore for FamilyRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Family>, StoreError> {
        let entity = self
            .fetch_by_id(id)
            .await
            .map_err(|e| store_error("find_family_by_id", e))?;
        Ok(entity.map(Family::from))
    }

    async fn find_by_alias(&self, alias: &str) -> Result<Option<Family>, StoreError> {
        let entity = self
            .fetch_by_alias(alias)
            .await
            .map_err(|e| store_error("find_family_by_alias", e))?;
        Ok(entity.map(Family::from))
    }

    async fn alias_exists(&self, alias: &str) -> Result<bool, StoreError> {
        self.exists_by_alias(alias)
            .await
            .map_err(|e| store_error("check_family_alias_exists", e))
    }

    async fn save(&self, family: &Family) -> Result<(), StoreError> {
        self.upsert(family)
            .await
            .map_err(|e| store_error("upsert_family", e))
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.delete_by_id(id)
            .await
            .map_err(|e| store_error("delete_family", e))
    }
}

#[cfg(test)]
mod tests {
    // Note: FamilyRepository tests require a database connection; the
    // store trait behavior is covered against the in-memory
    // implementation in the domain crate.
}
