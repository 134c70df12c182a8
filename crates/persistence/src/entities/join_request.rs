//! Join-request entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::{JoinRequest, JoinRequestStatus};

/// Database enum for join_request_status that maps to the PostgreSQL
/// enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "join_request_status", rename_all = "lowercase")]
pub enum JoinRequestStatusDb {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl From<JoinRequestStatusDb> for JoinRequestStatus {
    fn from(db_status: JoinRequestStatusDb) -> Self {
        match db_status {
            JoinRequestStatusDb::Pending => JoinRequestStatus::Pending,
            JoinRequestStatusDb::Accepted => JoinRequestStatus::Accepted,
            JoinRequestStatusDb::Rejected => JoinRequestStatus::Rejected,
            JoinRequestStatusDb::Cancelled => JoinRequestStatus::Cancelled,
        }
    }
}

impl From<JoinRequestStatus> for JoinRequestStatusDb {
    fn from(status: JoinRequestStatus) -> Self {
        match status {
            JoinRequestStatus::Pending => JoinRequestStatusDb::Pending,
            JoinRequestStatus::Accepted => JoinRequestStatusDb::Accepted,
            JoinRequestStatus::Rejected => JoinRequestStatusDb::Rejected,
            JoinRequestStatus::Cancelled => JoinRequestStatusDb::Cancelled,
        }
    }
}

/// Database row mapping for the join_requests table.
#[derive(Debug, Clone, FromRow)]
pub struct JoinRequestEntity {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub family_id: Uuid,
    pub message: Option<String>,
    pub status: JoinRequestStatusDb,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_by: Option<Uuid>,
}

impl From<JoinRequestEntity> for JoinRequest {
    fn from(entity: JoinRequestEntity) -> Self {
        Self {
            id: entity.id,
            requester_id: entity.requester_id,
            family_id: entity.family_id,
            message: entity.message,
            status: entity.status.into(),
            created_at: entity.created_at,
            updated_at: entity.updated_at,
            processed_by: entity.processed_by,
        }
    }
}
