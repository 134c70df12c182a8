//! Family membership and join-request lifecycle orchestrator.
//!
//! Every operation here is one logical transaction against the family,
//! join-request and user stores. The stores hand out value snapshots, so
//! each operation re-reads current state and re-validates its
//! preconditions immediately before the state-changing write: the head,
//! the requester and the expiry sweeper can all race on the same
//! (requester, family) pair, and last-write-wins per row is only safe
//! because of that re-check.
//!
//! Notification dispatch is fire-and-forget; a failed send is logged and
//! never turned into an operation failure.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use shared::clock::Clock;
use shared::validation::{validate_alias, validate_family_name, validate_join_message};
use validator::ValidateEmail;

use crate::models::family::{generate_alias, RemoveMemberResponse};
use crate::models::{Family, FamilyUser, JoinRequest, JoinRequestStatus};

use super::notification::{FamilyNotification, FamilyNotifier, NotificationKind, NotificationResult};
use super::stores::{FamilyStore, JoinRequestStore, StoreError, UserStore};
use super::throttle::{ThrottleDecision, ThrottleDenial, ThrottlePolicy};

/// Attempts to generate a unique alias before giving up.
const MAX_ALIAS_ATTEMPTS: usize = 100;

/// Domain error taxonomy for family operations.
#[derive(Debug, Error)]
pub enum FamilyError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Throttle denial is a conflict subtype carrying structured reason
    /// data so callers can render actionable UI.
    #[error("join attempt throttled: {}", .0.reason)]
    ThrottleDenied(ThrottleDenial),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Orchestrates family membership and the join-request state machine.
pub struct FamilyService {
    families: Arc<dyn FamilyStore>,
    requests: Arc<dyn JoinRequestStore>,
    users: Arc<dyn UserStore>,
    notifier: Arc<dyn FamilyNotifier>,
    clock: Arc<dyn Clock>,
    throttle: ThrottlePolicy,
    default_max_size: i32,
}

impl FamilyService {
    pub fn new(
        families: Arc<dyn FamilyStore>,
        requests: Arc<dyn JoinRequestStore>,
        users: Arc<dyn UserStore>,
        notifier: Arc<dyn FamilyNotifier>,
        clock: Arc<dyn Clock>,
        throttle: ThrottlePolicy,
        default_max_size: i32,
    ) -> Self {
        Self {
            families,
            requests,
            users,
            notifier,
            clock,
            throttle,
            default_max_size,
        }
    }

    // ========================================================================
    // Family CRUD-lite
    // ========================================================================

    /// Create a family with the caller as head and sole member.
    pub async fn create_family(
        &self,
        creator_id: Uuid,
        name: &str,
        max_size: Option<i32>,
    ) -> Result<Family, FamilyError> {
        validate_family_name(name)
            .map_err(|e| FamilyError::Validation(validation_message(&e)))?;

        let creator = self.require_user(creator_id).await?;
        if creator.is_affiliated() {
            return Err(FamilyError::Conflict(
                "You already belong to a family".to_string(),
            ));
        }

        let alias = self.unique_alias().await?;
        let now = self.clock.now();
        let family = Family::new(
            creator_id,
            name.trim().to_string(),
            alias,
            max_size.unwrap_or(self.default_max_size),
            now,
        );
        self.families.save(&family).await?;
        self.users
            .save(&creator.with_family(Some(family.id), now))
            .await?;

        tracing::info!(
            family_id = %family.id,
            head_id = %creator_id,
            alias = %family.alias,
            "Family created"
        );
        Ok(family)
    }

    /// The caller's current family.
    pub async fn my_family(&self, user_id: Uuid) -> Result<Family, FamilyError> {
        let user = self.require_user(user_id).await?;
        let family_id = user
            .family_id
            .ok_or_else(|| FamilyError::NotFound("You do not belong to a family".to_string()))?;
        self.require_family(family_id).await
    }

    /// Rename the family. Head only.
    pub async fn rename_family(&self, head_id: Uuid, name: &str) -> Result<Family, FamilyError> {
        validate_family_name(name)
            .map_err(|e| FamilyError::Validation(validation_message(&e)))?;

        let family = self.require_headship(head_id).await?;
        let renamed = family.with_name(name.trim().to_string(), self.clock.now());
        self.families.save(&renamed).await?;
        Ok(renamed)
    }

    // ========================================================================
    // Join-request lifecycle
    // ========================================================================

    /// File a join request against the family identified by `alias`.
    ///
    /// Idempotent while a pending row already exists for the pair.
    pub async fn request_to_join(
        &self,
        requester_id: Uuid,
        alias: &str,
        message: Option<String>,
    ) -> Result<JoinRequest, FamilyError> {
        let (requester, family) = self.check_join_preconditions(requester_id, alias).await?;
        let history = self.requests.history(requester_id, family.id).await?;
        let now = self.clock.now();

        if let ThrottleDecision::Denied(denial) = self.throttle.evaluate(&history, now) {
            return Err(FamilyError::ThrottleDenied(denial));
        }

        // An outstanding pending row makes this a no-op.
        if let Some(pending) = history.iter().find(|r| r.is_pending()) {
            return Ok(pending.clone());
        }

        if let Some(message) = message.as_deref() {
            validate_join_message(message)
                .map_err(|e| FamilyError::Validation(validation_message(&e)))?;
        }

        let request = JoinRequest::new(requester_id, family.id, message, now);
        self.requests.save(&request).await?;
        self.families
            .save(&family.with_pending_request_added(requester_id, now))
            .await?;

        tracing::info!(
            family_id = %family.id,
            requester_id = %requester_id,
            request_id = %request.id,
            "Join request created"
        );

        self.notify_head_of_request(&family, &requester, NotificationKind::JoinRequestReceived)
            .await;
        Ok(request)
    }

    /// Cancel any outstanding pending row for the pair and file a fresh
    /// one. The cancelled row stays in the history, so the lifetime cap
    /// keeps counting.
    pub async fn resend_request(
        &self,
        requester_id: Uuid,
        alias: &str,
        message: Option<String>,
    ) -> Result<JoinRequest, FamilyError> {
        let (requester, family) = self.check_join_preconditions(requester_id, alias).await?;
        let history = self.requests.history(requester_id, family.id).await?;
        let now = self.clock.now();

        // The lifetime cap counts cancelled rows, so the throttle runs
        // before the previous pending row is cancelled.
        if let ThrottleDecision::Denied(denial) = self.throttle.evaluate(&history, now) {
            return Err(FamilyError::ThrottleDenied(denial));
        }

        if let Some(message) = message.as_deref() {
            validate_join_message(message)
                .map_err(|e| FamilyError::Validation(validation_message(&e)))?;
        }

        if let Some(pending) = history.iter().find(|r| r.is_pending()) {
            self.requests
                .save(&pending.into_status(JoinRequestStatus::Cancelled, None, now))
                .await?;
        }

        let request = JoinRequest::new(requester_id, family.id, message, now);
        self.requests.save(&request).await?;
        self.families
            .save(&family.with_pending_request_added(requester_id, now))
            .await?;

        tracing::info!(
            family_id = %family.id,
            requester_id = %requester_id,
            request_id = %request.id,
            "Join request resent"
        );

        self.notify_head_of_request(&family, &requester, NotificationKind::JoinRequestResent)
            .await;
        Ok(request)
    }

    /// Cancel the caller's own pending request for the aliased family.
    ///
    /// Cancelling an already-cancelled request succeeds without effect
    /// (the sweeper may win the race); cancelling a decided request is a
    /// conflict, so the caller learns the decision came first.
    pub async fn cancel_request(
        &self,
        requester_id: Uuid,
        alias: &str,
    ) -> Result<JoinRequest, FamilyError> {
        let requester = self.require_user(requester_id).await?;
        let family = self
            .families
            .find_by_alias(alias)
            .await?
            .ok_or_else(|| FamilyError::NotFound("Family not found".to_string()))?;

        let history = self.requests.history(requester_id, family.id).await?;
        let latest = history
            .first()
            .ok_or_else(|| FamilyError::NotFound("No join request for this family".to_string()))?;
        // Cancelling races with the expiry sweeper; losing that race is
        // still success. A decided request is a different story.
        if latest.status == JoinRequestStatus::Cancelled {
            return Ok(latest.clone());
        }
        if !latest.is_pending() {
            return Err(FamilyError::Conflict(format!(
                "Join request is already {}",
                latest.status
            )));
        }

        let now = self.clock.now();
        let cancelled = latest.into_status(JoinRequestStatus::Cancelled, None, now);
        self.requests.save(&cancelled).await?;

        if family.has_pending_request(requester_id) {
            self.families
                .save(&family.with_pending_request_removed(requester_id, now))
                .await?;
        }

        tracing::info!(
            family_id = %family.id,
            requester_id = %requester_id,
            request_id = %cancelled.id,
            "Join request cancelled by requester"
        );

        self.dispatch(FamilyNotification {
            recipient_id: family.head_id,
            kind: NotificationKind::JoinRequestCancelled,
            title: "Join request withdrawn".to_string(),
            body: format!("{} withdrew their join request", display_name(&requester)),
            data: serde_json::json!({
                "family_id": family.id,
                "requester_id": requester_id,
            }),
        })
        .await;
        Ok(cancelled)
    }

    /// Accept a pending request. Head only.
    ///
    /// Capacity and the requester's affiliation are re-checked here, not
    /// at request time: both may have changed since the request was
    /// filed.
    pub async fn accept_request(
        &self,
        head_id: Uuid,
        requester_id: Uuid,
    ) -> Result<JoinRequest, FamilyError> {
        let family = self.require_headship(head_id).await?;
        let pending = self.require_pending_row(requester_id, family.id).await?;

        let requester = self.require_user(requester_id).await?;
        if requester.is_affiliated() {
            return Err(FamilyError::Conflict(
                "Requester already belongs to a family".to_string(),
            ));
        }
        if family.is_full() {
            return Err(FamilyError::Conflict("Family is full".to_string()));
        }

        // Claim the row first: a concurrent sweeper pass skips rows that
        // are no longer pending.
        let now = self.clock.now();
        let accepted = pending.into_status(JoinRequestStatus::Accepted, Some(head_id), now);
        self.requests.save(&accepted).await?;

        self.families
            .save(
                &family
                    .with_member_added(requester_id, now)
                    .with_pending_request_removed(requester_id, now),
            )
            .await?;
        self.users
            .save(&requester.with_family(Some(family.id), now))
            .await?;

        tracing::info!(
            family_id = %family.id,
            requester_id = %requester_id,
            head_id = %head_id,
            "Join request accepted"
        );

        self.dispatch(FamilyNotification {
            recipient_id: requester_id,
            kind: NotificationKind::JoinRequestAccepted,
            title: "Join request accepted".to_string(),
            body: format!("You are now a member of {}", family.name),
            data: serde_json::json!({
                "family_id": family.id,
                "family_name": family.name,
            }),
        })
        .await;
        Ok(accepted)
    }

    /// Reject a pending request. Head only. Membership is untouched.
    pub async fn reject_request(
        &self,
        head_id: Uuid,
        requester_id: Uuid,
    ) -> Result<JoinRequest, FamilyError> {
        let family = self.require_headship(head_id).await?;
        let pending = self.require_pending_row(requester_id, family.id).await?;

        let now = self.clock.now();
        let rejected = pending.into_status(JoinRequestStatus::Rejected, Some(head_id), now);
        self.requests.save(&rejected).await?;
        self.families
            .save(&family.with_pending_request_removed(requester_id, now))
            .await?;

        tracing::info!(
            family_id = %family.id,
            requester_id = %requester_id,
            head_id = %head_id,
            "Join request rejected"
        );

        self.dispatch(FamilyNotification {
            recipient_id: requester_id,
            kind: NotificationKind::JoinRequestRejected,
            title: "Join request declined".to_string(),
            body: format!("Your request to join {} was declined", family.name),
            data: serde_json::json!({ "family_id": family.id }),
        })
        .await;
        Ok(rejected)
    }

    /// The caller's outstanding pending requests, most recent first.
    pub async fn my_requests(&self, requester_id: Uuid) -> Result<Vec<JoinRequest>, FamilyError> {
        Ok(self.requests.find_pending_by_requester(requester_id).await?)
    }

    // ========================================================================
    // Membership removal
    // ========================================================================

    /// Remove a member. The head may remove anyone; everyone may remove
    /// themselves. When the head leaves and members remain, headship
    /// passes to the first remaining member in insertion order; when the
    /// last member leaves, the family is deleted.
    pub async fn remove_member(
        &self,
        actor_id: Uuid,
        member_id: Uuid,
    ) -> Result<RemoveMemberResponse, FamilyError> {
        let actor = self.require_user(actor_id).await?;
        let family_id = actor
            .family_id
            .ok_or_else(|| FamilyError::NotFound("You do not belong to a family".to_string()))?;
        let family = self.require_family(family_id).await?;

        if actor_id != member_id && family.head_id != actor_id {
            return Err(FamilyError::Forbidden(
                "Only the family head can remove other members".to_string(),
            ));
        }
        if !family.is_member(member_id) {
            return Err(FamilyError::NotFound(
                "User is not a member of this family".to_string(),
            ));
        }

        let now = self.clock.now();
        let (family_deleted, head_id) = match family.with_member_removed(member_id, now) {
            Some(next) => {
                let head_id = next.head_id;
                self.families.save(&next).await?;
                (false, Some(head_id))
            }
            None => {
                self.families.delete(family.id).await?;
                (true, None)
            }
        };

        if let Some(member) = self.users.find_by_id(member_id).await? {
            self.users.save(&member.with_family(None, now)).await?;
        }

        tracing::info!(
            family_id = %family.id,
            member_id = %member_id,
            actor_id = %actor_id,
            family_deleted = family_deleted,
            "Member removed from family"
        );

        if actor_id != member_id {
            self.dispatch(FamilyNotification {
                recipient_id: member_id,
                kind: NotificationKind::MemberRemoved,
                title: "Removed from family".to_string(),
                body: format!("You were removed from {}", family.name),
                data: serde_json::json!({ "family_id": family.id }),
            })
            .await;
        }

        Ok(RemoveMemberResponse {
            removed: true,
            user_id: member_id,
            family_id: family.id,
            family_deleted,
            head_id,
        })
    }

    /// Leave one's own family.
    pub async fn leave_family(&self, user_id: Uuid) -> Result<RemoveMemberResponse, FamilyError> {
        self.remove_member(user_id, user_id).await
    }

    // ========================================================================
    // Email invitations
    // ========================================================================

    /// Invite an email address into the family. Head only. Invitations
    /// bypass the requester-initiated throttle entirely.
    pub async fn invite_member(&self, head_id: Uuid, email: &str) -> Result<Family, FamilyError> {
        if !email.validate_email() {
            return Err(FamilyError::Validation("Invalid email address".to_string()));
        }

        let family = self.require_headship(head_id).await?;
        if family.has_pending_email(email) {
            return Err(FamilyError::Conflict(
                "This email has already been invited".to_string(),
            ));
        }

        let invitee = self.users.find_by_email(email).await?;
        if let Some(invitee) = &invitee {
            if family.is_member(invitee.id) {
                return Err(FamilyError::Conflict(
                    "User is already a member of this family".to_string(),
                ));
            }
        }

        let now = self.clock.now();
        let invited = family.with_pending_email_added(email, now);
        self.families.save(&invited).await?;

        tracing::info!(family_id = %family.id, "Member invitation recorded");

        if let Some(invitee) = invitee {
            self.dispatch(FamilyNotification {
                recipient_id: invitee.id,
                kind: NotificationKind::InvitationSent,
                title: "Family invitation".to_string(),
                body: format!("You were invited to join {}", invited.name),
                data: serde_json::json!({
                    "family_id": invited.id,
                    "alias": invited.alias,
                }),
            })
            .await;
        }
        Ok(invited)
    }

    /// Withdraw a previously sent email invitation. Head only.
    pub async fn cancel_invitation(
        &self,
        head_id: Uuid,
        email: &str,
    ) -> Result<Family, FamilyError> {
        let family = self.require_headship(head_id).await?;
        if !family.has_pending_email(email) {
            return Err(FamilyError::Conflict(
                "No outstanding invitation for this email".to_string(),
            ));
        }

        let now = self.clock.now();
        let updated = family.with_pending_email_removed(email, now);
        self.families.save(&updated).await?;

        if let Some(invitee) = self.users.find_by_email(email).await? {
            self.dispatch(FamilyNotification {
                recipient_id: invitee.id,
                kind: NotificationKind::InvitationCancelled,
                title: "Invitation withdrawn".to_string(),
                body: format!("Your invitation to {} was withdrawn", updated.name),
                data: serde_json::json!({ "family_id": updated.id }),
            })
            .await;
        }
        Ok(updated)
    }

    /// Accept an email invitation to the aliased family.
    ///
    /// Affiliation and capacity are re-checked exactly like an accept by
    /// the head; an outstanding join request by the same user for the
    /// same family is cancelled so the pending mirror stays consistent.
    pub async fn accept_invitation(
        &self,
        user_id: Uuid,
        alias: &str,
    ) -> Result<Family, FamilyError> {
        let user = self.require_user(user_id).await?;
        if user.is_affiliated() {
            return Err(FamilyError::Conflict(
                "You already belong to a family".to_string(),
            ));
        }

        let family = self
            .families
            .find_by_alias(alias)
            .await?
            .ok_or_else(|| FamilyError::NotFound("Family not found".to_string()))?;
        if !family.has_pending_email(&user.email) {
            return Err(FamilyError::Conflict(
                "No invitation for this account".to_string(),
            ));
        }
        if family.is_full() {
            return Err(FamilyError::Conflict("Family is full".to_string()));
        }

        let now = self.clock.now();
        let mut joined = family
            .with_member_added(user_id, now)
            .with_pending_email_removed(&user.email, now);

        if let Some(pending) = self.requests.find_pending(user_id, family.id).await? {
            self.requests
                .save(&pending.into_status(JoinRequestStatus::Cancelled, None, now))
                .await?;
            joined = joined.with_pending_request_removed(user_id, now);
        }

        self.families.save(&joined).await?;
        self.users
            .save(&user.with_family(Some(family.id), now))
            .await?;

        tracing::info!(
            family_id = %family.id,
            user_id = %user_id,
            "Invitation accepted"
        );

        self.dispatch(FamilyNotification {
            recipient_id: joined.head_id,
            kind: NotificationKind::InvitationAccepted,
            title: "Invitation accepted".to_string(),
            body: format!("{} joined {}", display_name(&user), joined.name),
            data: serde_json::json!({
                "family_id": joined.id,
                "user_id": user_id,
            }),
        })
        .await;
        Ok(joined)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn require_user(&self, user_id: Uuid) -> Result<FamilyUser, FamilyError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| FamilyError::NotFound("User not found".to_string()))
    }

    async fn require_family(&self, family_id: Uuid) -> Result<Family, FamilyError> {
        self.families
            .find_by_id(family_id)
            .await?
            .ok_or_else(|| FamilyError::NotFound("Family not found".to_string()))
    }

    /// The caller's family, with the caller verified as its head.
    async fn require_headship(&self, head_id: Uuid) -> Result<Family, FamilyError> {
        let user = self.require_user(head_id).await?;
        let family_id = user
            .family_id
            .ok_or_else(|| FamilyError::NotFound("You do not belong to a family".to_string()))?;
        let family = self.require_family(family_id).await?;
        if family.head_id != head_id {
            return Err(FamilyError::Forbidden(
                "Only the family head can do this".to_string(),
            ));
        }
        Ok(family)
    }

    /// The pending row for a pair; terminal rows are a conflict, absent
    /// history is not-found.
    async fn require_pending_row(
        &self,
        requester_id: Uuid,
        family_id: Uuid,
    ) -> Result<JoinRequest, FamilyError> {
        let history = self.requests.history(requester_id, family_id).await?;
        let latest = history
            .first()
            .ok_or_else(|| FamilyError::NotFound("No join request from this user".to_string()))?;
        if !latest.is_pending() {
            return Err(FamilyError::Conflict(format!(
                "Join request is already {}",
                latest.status
            )));
        }
        Ok(latest.clone())
    }

    /// Shared preconditions for filing or resending a join request.
    async fn check_join_preconditions(
        &self,
        requester_id: Uuid,
        alias: &str,
    ) -> Result<(FamilyUser, Family), FamilyError> {
        validate_alias(alias).map_err(|e| FamilyError::Validation(validation_message(&e)))?;

        let requester = self.require_user(requester_id).await?;
        if requester.is_affiliated() {
            return Err(FamilyError::Conflict(
                "You already belong to a family".to_string(),
            ));
        }

        let family = self
            .families
            .find_by_alias(alias)
            .await?
            .ok_or_else(|| FamilyError::NotFound("Family not found".to_string()))?;
        if family.is_full() {
            return Err(FamilyError::Conflict("Family is full".to_string()));
        }

        Ok((requester, family))
    }

    async fn unique_alias(&self) -> Result<String, FamilyError> {
        for _ in 0..MAX_ALIAS_ATTEMPTS {
            let alias = generate_alias();
            if !self.families.alias_exists(&alias).await? {
                return Ok(alias);
            }
        }
        Err(FamilyError::Store(StoreError::Unavailable(
            "Could not generate a unique family alias".to_string(),
        )))
    }

    async fn notify_head_of_request(
        &self,
        family: &Family,
        requester: &FamilyUser,
        kind: NotificationKind,
    ) {
        self.dispatch(FamilyNotification {
            recipient_id: family.head_id,
            kind,
            title: "New join request".to_string(),
            body: format!("{} wants to join {}", display_name(requester), family.name),
            data: serde_json::json!({
                "family_id": family.id,
                "requester_id": requester.id,
            }),
        })
        .await;
    }

    /// Best-effort dispatch; failures are logged and swallowed.
    async fn dispatch(&self, notification: FamilyNotification) {
        let kind = notification.kind;
        let recipient = notification.recipient_id;
        if let NotificationResult::Failed(err) = self.notifier.notify(notification).await {
            tracing::warn!(
                recipient_id = %recipient,
                kind = %kind,
                error = %err,
                "Notification dispatch failed"
            );
        }
    }
}

fn display_name(user: &FamilyUser) -> String {
    user.display_name
        .clone()
        .unwrap_or_else(|| "A user".to_string())
}

fn validation_message(err: &validator::ValidationError) -> String {
    err.message
        .as_ref()
        .map(|m| m.to_string())
        .unwrap_or_else(|| err.code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notification::LoggingNotifier;
    use crate::services::stores::{
        InMemoryFamilyStore, InMemoryJoinRequestStore, InMemoryUserStore,
    };
    use chrono::{Duration, TimeZone, Utc};
    use shared::clock::ManualClock;

    struct Fixture {
        service: FamilyService,
        families: Arc<InMemoryFamilyStore>,
        requests: Arc<InMemoryJoinRequestStore>,
        users: Arc<InMemoryUserStore>,
        notifier: Arc<LoggingNotifier>,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        fixture_with_policy(ThrottlePolicy::default())
    }

    fn fixture_with_policy(policy: ThrottlePolicy) -> Fixture {
        let families = Arc::new(InMemoryFamilyStore::new());
        let requests = Arc::new(InMemoryJoinRequestStore::new());
        let users = Arc::new(InMemoryUserStore::new());
        let notifier = Arc::new(LoggingNotifier::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());

        let service = FamilyService::new(
            families.clone(),
            requests.clone(),
            users.clone(),
            notifier.clone(),
            Arc::new(clock.clone()),
            policy,
            10,
        );

        Fixture {
            service,
            families,
            requests,
            users,
            notifier,
            clock,
        }
    }

    async fn seed_user(fx: &Fixture, name: &str) -> Uuid {
        let now = fx.clock.now();
        let user = FamilyUser {
            id: Uuid::new_v4(),
            family_id: None,
            email: format!("{}@example.com", name.to_lowercase()),
            display_name: Some(name.to_string()),
            created_at: now,
            updated_at: now,
        };
        fx.users.save(&user).await.unwrap();
        user.id
    }

    async fn seed_family(fx: &Fixture, head: Uuid, max_size: i32) -> Family {
        let family = fx.service.create_family(head, "Smiths", None).await.unwrap();
        // Adjust capacity directly for capacity-focused tests.
        let mut family = family;
        family.max_size = max_size;
        fx.families.save(&family).await.unwrap();
        family
    }

    #[tokio::test]
    async fn test_create_family_sets_pointer_and_alias() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;

        let family = fx.service.create_family(head, "Smiths", None).await.unwrap();
        assert_eq!(family.head_id, head);
        assert_eq!(family.member_ids, vec![head]);
        assert!(shared::validation::validate_alias(&family.alias).is_ok());

        let user = fx.users.find_by_id(head).await.unwrap().unwrap();
        assert_eq!(user.family_id, Some(family.id));

        // Creating a second family while affiliated is a conflict.
        let err = fx.service.create_family(head, "Other", None).await.unwrap_err();
        assert!(matches!(err, FamilyError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_request_to_join_creates_pending_row_and_mirror() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let requester = seed_user(&fx, "Req").await;
        let family = seed_family(&fx, head, 10).await;

        let request = fx
            .service
            .request_to_join(requester, &family.alias, Some("hi".into()))
            .await
            .unwrap();
        assert!(request.is_pending());

        let family = fx.families.find_by_id(family.id).await.unwrap().unwrap();
        assert_eq!(family.pending_join_requests, vec![requester]);

        // Head was notified.
        let sent = fx.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient_id, head);
        assert_eq!(sent[0].kind, NotificationKind::JoinRequestReceived);
    }

    #[tokio::test]
    async fn test_request_to_join_unknown_alias_is_not_found() {
        let fx = fixture();
        let requester = seed_user(&fx, "Req").await;

        let err = fx
            .service
            .request_to_join(requester, "ZZZZZ9", None)
            .await
            .unwrap_err();
        assert!(matches!(err, FamilyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_request_to_join_is_idempotent_while_pending() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let requester = seed_user(&fx, "Req").await;
        let family = seed_family(&fx, head, 10).await;

        let first = fx
            .service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap();

        // Past the 6h backoff the pending row is simply returned again.
        fx.clock.advance(Duration::hours(7));
        let second = fx
            .service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        let history = fx.requests.history(requester, family.id).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_affiliated_requester_is_conflict() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let other_head = seed_user(&fx, "Other").await;
        let family = seed_family(&fx, head, 10).await;
        fx.service.create_family(other_head, "Others", None).await.unwrap();

        let err = fx
            .service
            .request_to_join(other_head, &family.alias, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FamilyError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_full_family_is_conflict_at_request_time() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let requester = seed_user(&fx, "Req").await;
        let family = seed_family(&fx, head, 1).await;

        let err = fx
            .service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FamilyError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_backoff_denial_then_allowed_after_cooldown() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let requester = seed_user(&fx, "Req").await;
        let family = seed_family(&fx, head, 10).await;

        fx.service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap();
        fx.service.cancel_request(requester, &family.alias).await.unwrap();

        // Two hours in: the 6h backoff step still applies.
        fx.clock.advance(Duration::hours(2));
        let err = fx
            .service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap_err();
        let FamilyError::ThrottleDenied(denial) = err else {
            panic!("expected throttle denial, got {:?}", err);
        };
        assert_eq!(denial.reason, crate::services::ThrottleReason::Backoff);

        // Five more hours and the same call goes through.
        fx.clock.advance(Duration::hours(5));
        let request = fx
            .service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap();
        assert!(request.is_pending());
    }

    #[tokio::test]
    async fn test_lifetime_cap_is_permanent() {
        let policy = ThrottlePolicy {
            max_attempts_per_family: 2,
            backoff_schedule: vec![chrono::Duration::zero()],
            max_attempts_per_window: 10,
            ..ThrottlePolicy::default()
        };
        let fx = fixture_with_policy(policy);
        let head = seed_user(&fx, "Head").await;
        let requester = seed_user(&fx, "Req").await;
        let family = seed_family(&fx, head, 10).await;

        fx.service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap();
        fx.service.resend_request(requester, &family.alias, None).await.unwrap();

        // History now holds 2 rows (one cancelled, one pending): capped.
        let err = fx
            .service
            .resend_request(requester, &family.alias, None)
            .await
            .unwrap_err();
        let FamilyError::ThrottleDenied(denial) = err else {
            panic!("expected throttle denial");
        };
        assert_eq!(denial.reason, crate::services::ThrottleReason::MaxRetries);
        assert!(denial.next_allowed_at.is_none());

        // A month of waiting changes nothing.
        fx.clock.advance(Duration::days(30));
        let err = fx
            .service
            .resend_request(requester, &family.alias, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FamilyError::ThrottleDenied(_)));
    }

    #[tokio::test]
    async fn test_resend_keeps_single_pending_row() {
        let policy = ThrottlePolicy {
            backoff_schedule: vec![chrono::Duration::zero()],
            ..ThrottlePolicy::default()
        };
        let fx = fixture_with_policy(policy);
        let head = seed_user(&fx, "Head").await;
        let requester = seed_user(&fx, "Req").await;
        let family = seed_family(&fx, head, 10).await;

        fx.service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap();
        fx.clock.advance(Duration::hours(1));
        fx.service
            .resend_request(requester, &family.alias, Some("again".into()))
            .await
            .unwrap();

        let history = fx.requests.history(requester, family.id).await.unwrap();
        assert_eq!(history.len(), 2);
        let pending: Vec<_> = history.iter().filter(|r| r.is_pending()).collect();
        assert_eq!(pending.len(), 1, "at most one pending row per pair");
        assert_eq!(history[1].status, JoinRequestStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_but_decided_rows_conflict() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let requester = seed_user(&fx, "Req").await;
        let family = seed_family(&fx, head, 10).await;

        fx.service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap();
        fx.service.cancel_request(requester, &family.alias).await.unwrap();

        // Cancelling twice mirrors losing the race against the sweeper.
        let again = fx
            .service
            .cancel_request(requester, &family.alias)
            .await
            .unwrap();
        assert_eq!(again.status, JoinRequestStatus::Cancelled);

        let snapshot = fx.families.find_by_id(family.id).await.unwrap().unwrap();
        assert!(snapshot.pending_join_requests.is_empty());

        // A decided request cannot be withdrawn.
        fx.clock.advance(Duration::hours(7));
        fx.service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap();
        fx.service.accept_request(head, requester).await.unwrap();

        let err = fx
            .service
            .cancel_request(requester, &family.alias)
            .await
            .unwrap_err();
        assert!(matches!(err, FamilyError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_accept_applies_all_effects_atomically() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let requester = seed_user(&fx, "Req").await;
        let family = seed_family(&fx, head, 2).await;

        fx.service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap();
        let accepted = fx.service.accept_request(head, requester).await.unwrap();
        assert_eq!(accepted.status, JoinRequestStatus::Accepted);
        assert_eq!(accepted.processed_by, Some(head));

        let family = fx.families.find_by_id(family.id).await.unwrap().unwrap();
        assert_eq!(family.member_ids, vec![head, requester]);
        assert!(family.pending_join_requests.is_empty());

        let user = fx.users.find_by_id(requester).await.unwrap().unwrap();
        assert_eq!(user.family_id, Some(family.id));

        // Requester was notified of the acceptance.
        let sent = fx.notifier.sent();
        assert!(sent
            .iter()
            .any(|n| n.recipient_id == requester
                && n.kind == NotificationKind::JoinRequestAccepted));

        // Second accept on the same requester: the row is terminal.
        let err = fx.service.accept_request(head, requester).await.unwrap_err();
        assert!(matches!(err, FamilyError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_accept_by_non_head_is_forbidden() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let member = seed_user(&fx, "Member").await;
        let requester = seed_user(&fx, "Req").await;
        let family = seed_family(&fx, head, 10).await;

        fx.service
            .request_to_join(member, &family.alias, None)
            .await
            .unwrap();
        fx.service.accept_request(head, member).await.unwrap();
        fx.service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap();

        let err = fx.service.accept_request(member, requester).await.unwrap_err();
        assert!(matches!(err, FamilyError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_capacity_race_second_accept_conflicts() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let first = seed_user(&fx, "First").await;
        let second = seed_user(&fx, "Second").await;
        let family = seed_family(&fx, head, 2).await;

        fx.service.request_to_join(first, &family.alias, None).await.unwrap();
        fx.service.request_to_join(second, &family.alias, None).await.unwrap();

        // Both requests were filed while a seat was free; the re-check at
        // accept time lets exactly one in.
        fx.service.accept_request(head, first).await.unwrap();
        let err = fx.service.accept_request(head, second).await.unwrap_err();
        assert!(matches!(err, FamilyError::Conflict(_)));

        let family = fx.families.find_by_id(family.id).await.unwrap().unwrap();
        assert_eq!(family.member_ids.len(), 2);
        assert!(!family.is_member(second));
    }

    #[tokio::test]
    async fn test_accept_requester_who_joined_elsewhere_is_conflict() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let other_head = seed_user(&fx, "Other").await;
        let requester = seed_user(&fx, "Req").await;
        let family = seed_family(&fx, head, 10).await;
        let other = seed_family(&fx, other_head, 10).await;

        fx.service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap();
        // Meanwhile the requester joins the other family by invitation.
        fx.service.invite_member(other_head, "req@example.com").await.unwrap();
        fx.service.accept_invitation(requester, &other.alias).await.unwrap();

        let err = fx.service.accept_request(head, requester).await.unwrap_err();
        assert!(matches!(err, FamilyError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_reject_leaves_membership_untouched() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let requester = seed_user(&fx, "Req").await;
        let family = seed_family(&fx, head, 10).await;

        fx.service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap();
        let rejected = fx.service.reject_request(head, requester).await.unwrap();
        assert_eq!(rejected.status, JoinRequestStatus::Rejected);

        let family = fx.families.find_by_id(family.id).await.unwrap().unwrap();
        assert_eq!(family.member_ids, vec![head]);
        assert!(family.pending_join_requests.is_empty());

        let user = fx.users.find_by_id(requester).await.unwrap().unwrap();
        assert!(user.family_id.is_none());
    }

    #[tokio::test]
    async fn test_head_leaving_transfers_headship_in_insertion_order() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let second = seed_user(&fx, "Second").await;
        let third = seed_user(&fx, "Third").await;
        let family = seed_family(&fx, head, 10).await;

        for user in [second, third] {
            fx.service.request_to_join(user, &family.alias, None).await.unwrap();
            fx.service.accept_request(head, user).await.unwrap();
        }

        let result = fx.service.leave_family(head).await.unwrap();
        assert!(!result.family_deleted);
        assert_eq!(result.head_id, Some(second));

        let family = fx.families.find_by_id(family.id).await.unwrap().unwrap();
        assert_eq!(family.head_id, second);
        assert_eq!(family.member_ids, vec![second, third]);
    }

    #[tokio::test]
    async fn test_last_member_leaving_deletes_family() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let family = seed_family(&fx, head, 10).await;

        let result = fx.service.leave_family(head).await.unwrap();
        assert!(result.family_deleted);
        assert!(result.head_id.is_none());

        assert!(fx.families.find_by_id(family.id).await.unwrap().is_none());
        let user = fx.users.find_by_id(head).await.unwrap().unwrap();
        assert!(user.family_id.is_none());
    }

    #[tokio::test]
    async fn test_member_cannot_remove_other_member() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let a = seed_user(&fx, "A").await;
        let b = seed_user(&fx, "B").await;
        let family = seed_family(&fx, head, 10).await;

        for user in [a, b] {
            fx.service.request_to_join(user, &family.alias, None).await.unwrap();
            fx.service.accept_request(head, user).await.unwrap();
        }

        let err = fx.service.remove_member(a, b).await.unwrap_err();
        assert!(matches!(err, FamilyError::Forbidden(_)));

        // The head can.
        let result = fx.service.remove_member(head, b).await.unwrap();
        assert!(result.removed);
        let sent = fx.notifier.sent();
        assert!(sent
            .iter()
            .any(|n| n.recipient_id == b && n.kind == NotificationKind::MemberRemoved));
    }

    #[tokio::test]
    async fn test_invitation_flow_bypasses_throttle() {
        let policy = ThrottlePolicy {
            max_attempts_per_family: 1,
            ..ThrottlePolicy::default()
        };
        let fx = fixture_with_policy(policy);
        let head = seed_user(&fx, "Head").await;
        let requester = seed_user(&fx, "Req").await;
        let family = seed_family(&fx, head, 10).await;

        // Exhaust the lifetime cap.
        fx.service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap();
        fx.service.cancel_request(requester, &family.alias).await.unwrap();
        let err = fx
            .service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FamilyError::ThrottleDenied(_)));

        // The head-side invitation remains the escape hatch.
        fx.service.invite_member(head, "req@example.com").await.unwrap();
        let joined = fx
            .service
            .accept_invitation(requester, &family.alias)
            .await
            .unwrap();
        assert!(joined.is_member(requester));
        assert!(!joined.has_pending_email("req@example.com"));

        let user = fx.users.find_by_id(requester).await.unwrap().unwrap();
        assert_eq!(user.family_id, Some(family.id));
    }

    #[tokio::test]
    async fn test_duplicate_invitation_is_conflict() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        seed_family(&fx, head, 10).await;

        fx.service.invite_member(head, "aunt@example.com").await.unwrap();
        let err = fx
            .service
            .invite_member(head, "Aunt@Example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, FamilyError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_cancel_invitation() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let family = seed_family(&fx, head, 10).await;

        fx.service.invite_member(head, "aunt@example.com").await.unwrap();
        let updated = fx
            .service
            .cancel_invitation(head, "aunt@example.com")
            .await
            .unwrap();
        assert!(!updated.has_pending_email("aunt@example.com"));

        let err = fx
            .service
            .cancel_invitation(head, "aunt@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, FamilyError::Conflict(_)));

        let stored = fx.families.find_by_id(family.id).await.unwrap().unwrap();
        assert!(stored.pending_member_emails.is_empty());
    }

    #[tokio::test]
    async fn test_accept_invitation_cancels_outstanding_join_request() {
        let fx = fixture();
        let head = seed_user(&fx, "Head").await;
        let requester = seed_user(&fx, "Req").await;
        let family = seed_family(&fx, head, 10).await;

        fx.service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap();
        fx.service.invite_member(head, "req@example.com").await.unwrap();
        let joined = fx
            .service
            .accept_invitation(requester, &family.alias)
            .await
            .unwrap();

        assert!(joined.pending_join_requests.is_empty());
        let history = fx.requests.history(requester, family.id).await.unwrap();
        assert_eq!(history[0].status, JoinRequestStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_my_requests_lists_only_pending() {
        let fx = fixture();
        let head_a = seed_user(&fx, "HeadA").await;
        let head_b = seed_user(&fx, "HeadB").await;
        let requester = seed_user(&fx, "Req").await;
        let family_a = seed_family(&fx, head_a, 10).await;
        let family_b = seed_family(&fx, head_b, 10).await;

        fx.service.request_to_join(requester, &family_a.alias, None).await.unwrap();
        fx.service.request_to_join(requester, &family_b.alias, None).await.unwrap();
        fx.service.reject_request(head_b, requester).await.unwrap();

        let mine = fx.service.my_requests(requester).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].family_id, family_a.id);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_operation() {
        let families = Arc::new(InMemoryFamilyStore::new());
        let requests = Arc::new(InMemoryJoinRequestStore::new());
        let users = Arc::new(InMemoryUserStore::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        let service = FamilyService::new(
            families.clone(),
            requests.clone(),
            users.clone(),
            Arc::new(LoggingNotifier::failing()),
            Arc::new(clock.clone()),
            ThrottlePolicy::default(),
            10,
        );

        let now = clock.now();
        for (id, name) in [("head", "Head"), ("req", "Req")] {
            users
                .save(&FamilyUser {
                    id: Uuid::new_v4(),
                    family_id: None,
                    email: format!("{}@example.com", id),
                    display_name: Some(name.to_string()),
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }
        let head = users.find_by_email("head@example.com").await.unwrap().unwrap().id;
        let requester = users.find_by_email("req@example.com").await.unwrap().unwrap().id;

        let family = service.create_family(head, "Smiths", None).await.unwrap();
        let request = service
            .request_to_join(requester, &family.alias, None)
            .await
            .unwrap();
        assert!(request.is_pending(), "state transition survives failed dispatch");
    }

    #[tokio::test]
    async fn test_spec_scenario_two_member_family() {
        // max_size=2 walk-through: request, accept, then a second accept
        // conflicts.
        let fx = fixture();
        let head = seed_user(&fx, "H").await;
        let joiner = seed_user(&fx, "U").await;
        let family = seed_family(&fx, head, 2).await;

        fx.service.request_to_join(joiner, &family.alias, None).await.unwrap();
        let stored = fx.families.find_by_id(family.id).await.unwrap().unwrap();
        assert_eq!(stored.pending_join_requests, vec![joiner]);

        fx.service.accept_request(head, joiner).await.unwrap();
        let stored = fx.families.find_by_id(family.id).await.unwrap().unwrap();
        assert_eq!(stored.member_ids, vec![head, joiner]);
        let user = fx.users.find_by_id(joiner).await.unwrap().unwrap();
        assert_eq!(user.family_id, Some(family.id));

        let err = fx.service.accept_request(head, joiner).await.unwrap_err();
        assert!(matches!(err, FamilyError::Conflict(_)));
    }
}
