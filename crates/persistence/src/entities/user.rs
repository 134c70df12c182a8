//! User entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::FamilyUser;

/// Database row mapping for the users table.
#[derive(Debug, Clone, FromRow)]
pub struct FamilyUserEntity {
    pub id: Uuid,
    pub family_id: Option<Uuid>,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FamilyUserEntity> for FamilyUser {
    fn from(entity: FamilyUserEntity) -> Self {
        Self {
            id: entity.id,
            family_id: entity.family_id,
            email: entity.email,
            display_name: entity.display_name,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
