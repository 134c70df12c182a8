//! Join-request repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use domain::models::JoinRequest;
use domain::services::{JoinRequestStore, StoreError};

use super::store_error;
use crate::entities::{JoinRequestEntity, JoinRequestStatusDb};
use crate::metrics::QueryTimer;

const REQUEST_COLUMNS: &str =
    "id, requester_id, family_id, message, status, created_at, updated_at, processed_by";

/// Repository for join-request database operations.
///
/// Rows are inserted or transitioned in place, never deleted; the full
/// per-pair history stays queryable for the throttle.
#[derive(Clone)]
pub struct JoinRequestRepository {
    pool: PgPool,
}

impl JoinRequestRepository {
    /// Creates a new JoinRequestRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<JoinRequestEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_join_request_by_id");
        let result = sqlx::query_as::<_, JoinRequestEntity>(&format!(
            "SELECT {} FROM join_requests WHERE id = $1",
            REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    async fn fetch_pending(
        &self,
        requester_id: Uuid,
        family_id: Uuid,
    ) -> Result<Option<JoinRequestEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_pending_join_request");
        let result = sqlx::query_as::<_, JoinRequestEntity>(&format!(
            "SELECT {} FROM join_requests \
             WHERE requester_id = $1 AND family_id = $2 AND status = $3",
            REQUEST_COLUMNS
        ))
        .bind(requester_id)
        .bind(family_id)
        .bind(JoinRequestStatusDb::Pending)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    async fn fetch_history(
        &self,
        requester_id: Uuid,
        family_id: Uuid,
    ) -> Result<Vec<JoinRequestEntity>, sqlx::Error> {
        let timer = QueryTimer::new("fetch_join_request_history");
        let result = sqlx::query_as::<_, JoinRequestEntity>(&format!(
            "SELECT {} FROM join_requests \
             WHERE requester_id = $1 AND family_id = $2 \
             ORDER BY created_at DESC",
            REQUEST_COLUMNS
        ))
        .bind(requester_id)
        .bind(family_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    async fn fetch_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JoinRequestEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_stale_pending_join_requests");
        let result = sqlx::query_as::<_, JoinRequestEntity>(&format!(
            "SELECT {} FROM join_requests WHERE status = $1 AND created_at < $2",
            REQUEST_COLUMNS
        ))
        .bind(JoinRequestStatusDb::Pending)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    async fn fetch_pending_by_requester(
        &self,
        requester_id: Uuid,
    ) -> Result<Vec<JoinRequestEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_pending_join_requests_by_requester");
        let result = sqlx::query_as::<_, JoinRequestEntity>(&format!(
            "SELECT {} FROM join_requests \
             WHERE requester_id = $1 AND status = $2 \
             ORDER BY created_at DESC",
            REQUEST_COLUMNS
        ))
        .bind(requester_id)
        .bind(JoinRequestStatusDb::Pending)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Upsert the row snapshot.
    async fn upsert(&self, request: &JoinRequest) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("upsert_join_request");
        let result = sqlx::query(
            r#"
            INSERT INTO join_requests (
                id, requester_id, family_id, message, status,
                created_at, updated_at, processed_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                message = EXCLUDED.message,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at,
                processed_by = EXCLUDED.processed_by
            "#,
        )
        .bind(request.id)
        .bind(request.requester_id)
        .bind(request.family_id)
        .bind(&request.message)
        .bind(JoinRequestStatusDb::from(request.status))
        .bind(request.created_at)
        .bind(request.updated_at)
        .bind(request.processed_by)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }
}

#[async_trait]
impl JoinRequestStore for JoinRequestRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<JoinRequest>, StoreError> {
        let entity = self
            .fetch_by_id(id)
            .await
            .map_err(|e| store_error("find_join_request_by_id", e))?;
        Ok(entity.map(JoinRequest::from))
    }

    async fn find_pending(
        &self,
        requester_id: Uuid,
        family_id: Uuid,
    ) -> Result<Option<JoinRequest>, StoreError> {
        let entity = self
            .fetch_pending(requester_id, family_id)
            .await
            .map_err(|e| store_error("find_pending_join_request", e))?;
        Ok(entity.map(JoinRequest::from))
    }

    async fn history(
        &self,
        requester_id: Uuid,
        family_id: Uuid,
    ) -> Result<Vec<JoinRequest>, StoreError> {
        let entities = self
            .fetch_history(requester_id, family_id)
            .await
            .map_err(|e| store_error("fetch_join_request_history", e))?;
        Ok(entities.into_iter().map(JoinRequest::from).collect())
    }

    async fn find_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JoinRequest>, StoreError> {
        let entities = self
            .fetch_pending_older_than(cutoff)
            .await
            .map_err(|e| store_error("find_stale_pending_join_requests", e))?;
        Ok(entities.into_iter().map(JoinRequest::from).collect())
    }

    async fn find_pending_by_requester(
        &self,
        requester_id: Uuid,
    ) -> Result<Vec<JoinRequest>, StoreError> {
        let entities = self
            .fetch_pending_by_requester(requester_id)
            .await
            .map_err(|e| store_error("find_pending_join_requests_by_requester", e))?;
        Ok(entities.into_iter().map(JoinRequest::from).collect())
    }

    async fn save(&self, request: &JoinRequest) -> Result<(), StoreError> {
        self.upsert(request)
            .await
            .map_err(|e| store_error("upsert_join_request", e))
    }
}
