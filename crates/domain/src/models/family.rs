//! Family domain model and request/response payloads.
//!
//! A `Family` is an immutable value snapshot. Every mutation goes through a
//! `with_*` helper that returns a new snapshot, so the read-modify-write
//! cycle against the store is explicit at each call site.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use shared::validation::ALIAS_LENGTH;

/// A family sharing one expense ledger.
///
/// `member_ids` preserves insertion order; the first remaining member
/// inherits headship when the head leaves. `pending_join_requests` is a
/// denormalized mirror of the PENDING join-request rows for this family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Family {
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

impl Family {
    /// Creates a new family with the creator as head and sole member.
    pub fn new(
        head_id: Uuid,
        name: String,
        alias: String,
        max_size: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            head_id,
            name,
            alias,
            max_size,
            member_ids: vec![head_id],
            pending_join_requests: Vec::new(),
            pending_member_emails: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.member_ids.contains(&user_id)
    }

    pub fn is_full(&self) -> bool {
        // A non-positive capacity must read as full, not wrap around.
        self.member_ids.len() >= usize::try_from(self.max_size).unwrap_or(0)
    }

    pub fn has_pending_request(&self, user_id: Uuid) -> bool {
        self.pending_join_requests.contains(&user_id)
    }

    pub fn has_pending_email(&self, email: &str) -> bool {
        self.pending_member_emails
            .iter()
            .any(|e| e.eq_ignore_ascii_case(email))
    }

    /// Returns a snapshot with `user_id` appended to the membership list.
    /// No-op (aside from `updated_at`) when the user is already a member.
    pub fn with_member_added(&self, user_id: Uuid, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        if !next.member_ids.contains(&user_id) {
            next.member_ids.push(user_id);
        }
        next.updated_at = now;
        next
    }

    /// Returns a snapshot with `user_id` removed from the membership list.
    ///
    /// When the head is removed and members remain, headship passes to the
    /// first remaining member in insertion order. Returns `None` when the
    /// last member left, meaning the family should be deleted.
    pub fn with_member_removed(&self, user_id: Uuid, now: DateTime<Utc>) -> Option<Self> {
        let mut next = self.clone();
        next.member_ids.retain(|id| *id != user_id);
        if next.member_ids.is_empty() {
            return None;
        }
        if next.head_id == user_id {
            next.head_id = next.member_ids[0];
        }
        next.updated_at = now;
        Some(next)
    }

    pub fn with_pending_request_added(&self, user_id: Uuid, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        if !next.pending_join_requests.contains(&user_id) {
            next.pending_join_requests.push(user_id);
        }
        next.updated_at = now;
        next
    }

    pub fn with_pending_request_removed(&self, user_id: Uuid, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.pending_join_requests.retain(|id| *id != user_id);
        next.updated_at = now;
        next
    }

    pub fn with_pending_email_added(&self, email: &str, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        if !next.has_pending_email(email) {
            next.pending_member_emails.push(email.to_lowercase());
        }
        next.updated_at = now;
        next
    }

    pub fn with_pending_email_removed(&self, email: &str, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.pending_member_emails
            .retain(|e| !e.eq_ignore_ascii_case(email));
        next.updated_at = now;
        next
    }

    pub fn with_name(&self, name: String, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.name = name;
        next.updated_at = now;
        next
    }
}

/// Generate a random family alias: 6 uppercase alphanumeric characters.
///
/// Uniqueness is the caller's problem; the lifecycle service retries
/// against the store's alias check until an unused code comes up.
pub fn generate_alias() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    (0..ALIAS_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CHARS.len());
            CHARS[idx] as char
        })
        .collect()
}

/// Request payload for creating a family.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateFamilyRequest {
    #[validate(custom(function = "shared::validation::validate_family_name"))]
    pub name: String,

    #[validate(range(min = 2, max = 50, message = "max_size must be between 2 and 50"))]
    pub max_size: Option<i32>,
}

/// Request payload for renaming a family.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct RenameFamilyRequest {
    #[validate(custom(function = "shared::validation::validate_family_name"))]
    pub name: String,
}

/// Request payload for inviting a member by email.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct InviteMemberRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

/// Request payload for cancelling an email invitation.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CancelInvitationRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

/// Request payload for accepting an email invitation by alias.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct AcceptInvitationRequest {
    #[validate(custom(function = "shared::validation::validate_alias"))]
    pub alias: String,
}

/// Full family view for members.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FamilyResponse {
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

impl From<Family> for FamilyResponse {
    fn from(family: Family) -> Self {
        Self {
            id: family.id,
            head_id: family.head_id,
            name: family.name,
            alias: family.alias,
            max_size: family.max_size,
            member_ids: family.member_ids,
            pending_join_requests: family.pending_join_requests,
            pending_member_emails: family.pending_member_emails,
            created_at: family.created_at,
            updated_at: family.updated_at,
        }
    }
}

/// Response when removing a member or leaving.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RemoveMemberResponse {
    pub removed: bool,
    pub user_id: Uuid,
    pub family_id: Uuid,
    /// True when the family was deleted because the last member left.
    pub family_deleted: bool,
    /// New head after the removal, when the family survived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family_with_members(members: &[Uuid]) -> Family {
        let now = Utc::now();
        Family {
            id: Uuid::new_v4(),
            head_id: members[0],
            name: "Smith Family".to_string(),
            alias: "AB12CD".to_string(),
            max_size: 10,
            member_ids: members.to_vec(),
            pending_join_requests: Vec::new(),
            pending_member_emails: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_new_family_has_head_as_sole_member() {
        let head = Uuid::new_v4();
        let family = Family::new(head, "Smiths".into(), "AB12CD".into(), 10, Utc::now());
        assert_eq!(family.member_ids, vec![head]);
        assert_eq!(family.head_id, head);
        assert!(family.is_member(head));
        assert!(!family.is_full());
    }

    #[test]
    fn test_is_full() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut family = family_with_members(&[a, b]);
        family.max_size = 2;
        assert!(family.is_full());
    }

    #[test]
    fn test_non_positive_capacity_reads_as_full() {
        let a = Uuid::new_v4();
        let mut family = family_with_members(&[a]);
        family.max_size = 0;
        assert!(family.is_full());
        family.max_size = -1;
        assert!(family.is_full());
    }

    #[test]
    fn test_with_member_added_is_idempotent() {
        let head = Uuid::new_v4();
        let family = family_with_members(&[head]);
        let joiner = Uuid::new_v4();

        let once = family.with_member_added(joiner, Utc::now());
        let twice = once.with_member_added(joiner, Utc::now());
        assert_eq!(once.member_ids, twice.member_ids);
        assert_eq!(twice.member_ids.len(), 2);
    }

    #[test]
    fn test_head_transfer_on_head_removal() {
        let head = Uuid::new_v4();
        let second = Uuid::new_v4();
        let third = Uuid::new_v4();
        let family = family_with_members(&[head, second, third]);

        let after = family.with_member_removed(head, Utc::now()).unwrap();
        assert_eq!(after.head_id, second);
        assert_eq!(after.member_ids, vec![second, third]);
    }

    #[test]
    fn test_last_member_removal_signals_deletion() {
        let head = Uuid::new_v4();
        let family = family_with_members(&[head]);
        assert!(family.with_member_removed(head, Utc::now()).is_none());
    }

    #[test]
    fn test_non_head_removal_keeps_head() {
        let head = Uuid::new_v4();
        let other = Uuid::new_v4();
        let family = family_with_members(&[head, other]);

        let after = family.with_member_removed(other, Utc::now()).unwrap();
        assert_eq!(after.head_id, head);
        assert_eq!(after.member_ids, vec![head]);
    }

    #[test]
    fn test_pending_request_mirror_helpers() {
        let head = Uuid::new_v4();
        let requester = Uuid::new_v4();
        let family = family_with_members(&[head]);

        let with = family.with_pending_request_added(requester, Utc::now());
        assert!(with.has_pending_request(requester));

        // Adding again does not duplicate
        let again = with.with_pending_request_added(requester, Utc::now());
        assert_eq!(again.pending_join_requests.len(), 1);

        let without = again.with_pending_request_removed(requester, Utc::now());
        assert!(!without.has_pending_request(requester));
    }

    #[test]
    fn test_pending_email_case_insensitive() {
        let head = Uuid::new_v4();
        let family = family_with_members(&[head]);

        let with = family.with_pending_email_added("Aunt@Example.com", Utc::now());
        assert!(with.has_pending_email("aunt@example.com"));
        assert!(with.has_pending_email("AUNT@EXAMPLE.COM"));

        let without = with.with_pending_email_removed("aunt@example.COM", Utc::now());
        assert!(!without.has_pending_email("aunt@example.com"));
    }

    #[test]
    fn test_generate_alias_format() {
        for _ in 0..100 {
            let alias = generate_alias();
            assert_eq!(alias.len(), 6);
            assert!(alias
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
            assert!(shared::validation::validate_alias(&alias).is_ok());
        }
    }

    #[test]
    fn test_create_family_request_validation() {
        let valid = CreateFamilyRequest {
            name: "The Smiths".to_string(),
            max_size: Some(10),
        };
        assert!(valid.validate().is_ok());

        let blank_name = CreateFamilyRequest {
            name: "   ".to_string(),
            max_size: None,
        };
        assert!(blank_name.validate().is_err());

        let too_big = CreateFamilyRequest {
            name: "The Smiths".to_string(),
            max_size: Some(500),
        };
        assert!(too_big.validate().is_err());
    }

    #[test]
    fn test_invite_member_request_validation() {
        let valid = InviteMemberRequest {
            email: "aunt@example.com".to_string(),
        };
        assert!(valid.validate().is_ok());

        let invalid = InviteMemberRequest {
            email: "not-an-email".to_string(),
        };
        assert!(invalid.validate().is_err());
    }
}
