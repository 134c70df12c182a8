//! Family entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::Family;

/// Database row mapping for the families table.
///
/// `member_ids` and `pending_join_requests` are `uuid[]` columns,
/// `pending_member_emails` is `text[]`; array order is preserved by
/// PostgreSQL, which the head-transfer rule relies on.
#[derive(Debug, Clone, FromRow)]
pub struct FamilyEntity {
    pub id: Uuid,
    pub head_id: Uuid,
    pub name: String,
    pub alias: String,
    pub max_size: i32,
    pub member_ids: Vec<Uuid>,
    pub pending_join_requests: Vec<Uuid>,
    pub pending_member_emails: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FamilyEntity> for Family {
    fn from(entity: FamilyEntity) -> Self {
        Self {
            id: entity.id,
            head_id: entity.head_id,
            name: entity.name,
            alias: entity.alias,
            max_size: entity.max_size,
            member_ids: entity.member_ids,
            pending_join_requests: entity.pending_join_requests,
            pending_member_emails: entity.pending_member_emails,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
