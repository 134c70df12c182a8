//! Join-request domain model and request/response payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Status of a join request.
///
/// `Pending` is the only non-terminal state. Terminal rows are immutable
/// and are never deleted, which keeps the full attempt history available
/// to the throttle engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinRequestStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl JoinRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinRequestStatus::Pending => "pending",
            JoinRequestStatus::Accepted => "accepted",
            JoinRequestStatus::Rejected => "rejected",
            JoinRequestStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true for states that can never transition again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JoinRequestStatus::Pending)
    }
}

impl FromStr for JoinRequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JoinRequestStatus::Pending),
            "accepted" => Ok(JoinRequestStatus::Accepted),
            "rejected" => Ok(JoinRequestStatus::Rejected),
            "cancelled" => Ok(JoinRequestStatus::Cancelled),
            _ => Err(format!("Invalid join request status: {}", s)),
        }
    }
}

impl fmt::Display for JoinRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One join attempt by a requester against a family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JoinRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub family_id: Uuid,
    pub message: Option<String>,
    pub status: JoinRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The head who accepted or rejected this request.
    pub processed_by: Option<Uuid>,
}

impl JoinRequest {
    /// Creates a fresh pending request.
    pub fn new(
        requester_id: Uuid,
        family_id: Uuid,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester_id,
            family_id,
            message,
            status: JoinRequestStatus::Pending,
            created_at: now,
            updated_at: now,
            processed_by: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == JoinRequestStatus::Pending
    }

    /// Returns a copy transitioned into the given terminal status.
    ///
    /// Callers must check `is_pending` first; this helper does not guard
    /// the transition itself.
    pub fn into_status(
        &self,
        status: JoinRequestStatus,
        processed_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut next = self.clone();
        next.status = status;
        next.processed_by = processed_by;
        next.updated_at = now;
        next
    }
}

/// Request payload for creating or resending a join request.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct JoinFamilyRequest {
    #[validate(custom(function = "shared::validation::validate_alias"))]
    pub alias: String,

    #[validate(custom(function = "shared::validation::validate_join_message"))]
    pub message: Option<String>,
}

/// Request payload for cancelling one's own join request.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CancelJoinRequest {
    #[validate(custom(function = "shared::validation::validate_alias"))]
    pub alias: String,
}

/// Request payload for the head deciding on a join request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DecideJoinRequest {
    pub requester_id: Uuid,
}

/// Join request view returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct JoinRequestResponse {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub family_id: Uuid,
    pub message: Option<String>,
    pub status: JoinRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<JoinRequest> for JoinRequestResponse {
    fn from(request: JoinRequest) -> Self {
        Self {
            id: request.id,
            requester_id: request.requester_id,
            family_id: request.family_id,
            message: request.message,
            status: request.status,
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}

/// Response for listing the caller's pending requests.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ListJoinRequestsResponse {
    pub data: Vec<JoinRequestResponse>,
    pub count: usize,
}
