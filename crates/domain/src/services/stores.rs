//! Store traits consumed by the lifecycle orchestrator and the sweeper.
//!
//! All methods return value snapshots, never live references; callers
//! must re-fetch to observe concurrent changes. The in-memory
//! implementations below back the unit tests and mirror the behavior
//! expected from the SQL-backed repositories in the persistence crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Family, FamilyUser, JoinRequest};

/// Error produced by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence contract for families.
#[async_trait]
pub trait FamilyStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Family>, StoreError>;

    async fn find_by_alias(&self, alias: &str) -> Result<Option<Family>, StoreError>;

    /// Uniqueness check used by alias generation.
    async fn alias_exists(&self, alias: &str) -> Result<bool, StoreError>;

    /// Upsert the full family snapshot.
    async fn save(&self, family: &Family) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Persistence contract for join requests.
///
/// Rows are only ever inserted or transitioned in place; nothing deletes
/// them, so the history of a (requester, family) pair keeps growing.
#[async_trait]
pub trait JoinRequestStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<JoinRequest>, StoreError>;

    /// The pending row for a (requester, family) pair, if any.
    async fn find_pending(
        &self,
        requester_id: Uuid,
        family_id: Uuid,
    ) -> Result<Option<JoinRequest>, StoreError>;

    /// Full attempt history for a pair, most recent first.
    async fn history(
        &self,
        requester_id: Uuid,
        family_id: Uuid,
    ) -> Result<Vec<JoinRequest>, StoreError>;

    /// All pending rows created before the cutoff, for the sweeper.
    async fn find_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JoinRequest>, StoreError>;

    /// All pending rows filed by one requester, most recent first.
    async fn find_pending_by_requester(
        &self,
        requester_id: Uuid,
    ) -> Result<Vec<JoinRequest>, StoreError>;

    /// Upsert the row snapshot.
    async fn save(&self, request: &JoinRequest) -> Result<(), StoreError>;
}

/// Persistence contract for user membership pointers.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<FamilyUser>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<FamilyUser>, StoreError>;

    async fn save(&self, user: &FamilyUser) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory family store. State is lost on drop; used in tests.
#[derive(Default)]
pub struct InMemoryFamilyStore {
    families: RwLock<HashMap<Uuid, Family>>,
}

impl InMemoryFamilyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FamilyStore for InMemoryFamilyStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Family>, StoreError> {
        let families = self.families.read().await;
        Ok(families.get(&id).cloned())
    }

    async fn find_by_alias(&self, alias: &str) -> Result<Option<Family>, StoreError> {
        let families = self.families.read().await;
        Ok(families.values().find(|f| f.alias == alias).cloned())
    }

    async fn alias_exists(&self, alias: &str) -> Result<bool, StoreError> {
        let families = self.families.read().await;
        Ok(families.values().any(|f| f.alias == alias))
    }

    async fn save(&self, family: &Family) -> Result<(), StoreError> {
        let mut families = self.families.write().await;
        families.insert(family.id, family.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut families = self.families.write().await;
        families.remove(&id);
        Ok(())
    }
}

/// In-memory join request store.
#[derive(Default)]
pub struct InMemoryJoinRequestStore {
    requests: RwLock<HashMap<Uuid, JoinRequest>>,
}

impl InMemoryJoinRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JoinRequestStore for InMemoryJoinRequestStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<JoinRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id).cloned())
    }

    async fn find_pending(
        &self,
        requester_id: Uuid,
        family_id: Uuid,
    ) -> Result<Option<JoinRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .find(|r| {
                r.requester_id == requester_id && r.family_id == family_id && r.is_pending()
            })
            .cloned())
    }

    async fn history(
        &self,
        requester_id: Uuid,
        family_id: Uuid,
    ) -> Result<Vec<JoinRequest>, StoreError> {
        let requests = self.requests.read().await;
        let mut rows: Vec<JoinRequest> = requests
            .values()
            .filter(|r| r.requester_id == requester_id && r.family_id == family_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn find_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JoinRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .filter(|r| r.is_pending() && r.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn find_pending_by_requester(
        &self,
        requester_id: Uuid,
    ) -> Result<Vec<JoinRequest>, StoreError> {
        let requests = self.requests.read().await;
        let mut rows: Vec<JoinRequest> = requests
            .values()
            .filter(|r| r.requester_id == requester_id && r.is_pending())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn save(&self, request: &JoinRequest) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id, request.clone());
        Ok(())
    }
}

/// In-memory user store.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, FamilyUser>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<FamilyUser>, StoreError> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<FamilyUser>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn save(&self, user: &FamilyUser) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        users.insert(user.id, user.clone());
        Ok(())
    }
}
