//! User repository for database operations.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use domain::models::FamilyUser;
use domain::services::{StoreError, UserStore};

use super::store_error;
use crate::entities::FamilyUserEntity;
use crate::metrics::QueryTimer;

const USER_COLUMNS: &str = "id, family_id, email, display_name, created_at, updated_at";

/// Repository for user membership-pointer database operations.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Creates a new UserRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<FamilyUserEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_user_by_id");
        let result = sqlx::query_as::<_, FamilyUserEntity>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    async fn fetch_by_email(&self, email: &str) -> Result<Option<FamilyUserEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_user_by_email");
        let result = sqlx::query_as::<_, FamilyUserEntity>(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Upsert the user snapshot.
    async fn upsert(&self, user: &FamilyUser) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("upsert_user");
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, family_id, email, display_name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                family_id = EXCLUDED.family_id,
                email = EXCLUDED.email,
                display_name = EXCLUDED.display_name,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user.id)
        .bind(user.family_id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<FamilyUser>, StoreError> {
        let entity = self
            .fetch_by_id(id)
            .await
            .map_err(|e| store_error("find_user_by_id", e))?;
        Ok(entity.map(FamilyUser::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<FamilyUser>, StoreError> {
        let entity = self
            .fetch_by_email(email)
            .await
            .map_err(|e| store_error("find_user_by_email", e))?;
        Ok(entity.map(FamilyUser::from))
    }

    async fn save(&self, user: &FamilyUser) -> Result<(), StoreError> {
        self.upsert(user)
            .await
            .map_err(|e| store_error("upsert_user", e))
    }
}

#[cfg(test)]
mod tests {
    // Note: UserRepository tests require a database connection; the
    // store trait behavior is covered against the in-memory
    // implementation in the domain crate.
}
