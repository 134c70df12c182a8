//! User membership pointer model.
//!
//! Account management (registration, login, profile) lives in the auth
//! service. This backend only tracks the single fact it owns: which
//! family, if any, a user belongs to. The pointer is the source of truth
//! for "already in a family"; `Family::member_ids` must stay consistent
//! with it under every mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user as seen by the family subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FamilyUser {
    pub id: Uuid,
    /// None means unaffiliated.
    pub family_id: Option<Uuid>,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FamilyUser {
    pub fn is_affiliated(&self) -> bool {
        self.family_id.is_some()
    }

    /// Returns a snapshot with the family pointer replaced.
    pub fn with_family(&self, family_id: Option<Uuid>, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.family_id = family_id;
        next.updated_at = now;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> FamilyUser {
        let now = Utc::now();
        FamilyUser {
            id: Uuid::new_v4(),
            family_id: None,
            email: "kid@example.com".to_string(),
            display_name: Some("Kid".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_affiliation() {
        let unaffiliated = user();
        assert!(!unaffiliated.is_affiliated());

        let family_id = Uuid::new_v4();
        let joined = unaffiliated.with_family(Some(family_id), Utc::now());
        assert!(joined.is_affiliated());
        assert_eq!(joined.family_id, Some(family_id));

        let left = joined.with_family(None, Utc::now());
        assert!(!left.is_affiliated());
    }
}
