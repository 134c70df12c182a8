//! Notification dispatch for family lifecycle events.
//!
//! The orchestrator hands payloads to a `FamilyNotifier` and moves on:
//! delivery is best-effort and a failed send never fails the state
//! transition that triggered it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of family event a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    JoinRequestReceived,
    JoinRequestResent,
    JoinRequestCancelled,
    JoinRequestAccepted,
    JoinRequestRejected,
    MemberRemoved,
    InvitationSent,
    InvitationCancelled,
    InvitationAccepted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::JoinRequestReceived => "join_request_received",
            NotificationKind::JoinRequestResent => "join_request_resent",
            NotificationKind::JoinRequestCancelled => "join_request_cancelled",
            NotificationKind::JoinRequestAccepted => "join_request_accepted",
            NotificationKind::JoinRequestRejected => "join_request_rejected",
            NotificationKind::MemberRemoved => "member_removed",
            NotificationKind::InvitationSent => "invitation_sent",
            NotificationKind::InvitationCancelled => "invitation_cancelled",
            NotificationKind::InvitationAccepted => "invitation_accepted",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A notification ready for dispatch to one recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FamilyNotification {
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// Structured payload for the client (family id, requester id, ...).
    pub data: serde_json::Value,
}

/// Result of a notification send attempt.
#[derive(Debug, Clone)]
pub enum NotificationResult {
    /// Notification was handed to the transport.
    Sent,
    /// Sending failed (but was non-blocking).
    Failed(String),
    /// Recipient cannot be reached (no registered device).
    Skipped,
}

/// Dispatch abstraction. The real transport lives outside this crate.
#[async_trait::async_trait]
pub trait FamilyNotifier: Send + Sync {
    async fn notify(&self, notification: FamilyNotification) -> NotificationResult;
}

/// Notifier that logs instead of delivering.
///
/// Default wiring for development and tests; records everything it was
/// asked to send so tests can assert on emitted events.
#[derive(Debug, Default)]
pub struct LoggingNotifier {
    /// Whether to simulate failures for testing.
    pub simulate_failure: bool,
    sent: std::sync::Mutex<Vec<FamilyNotification>>,
}

impl LoggingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a notifier that simulates failures.
    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            sent: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Everything successfully "sent" so far.
    pub fn sent(&self) -> Vec<FamilyNotification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait::async_trait]
impl FamilyNotifier for LoggingNotifier {
    async fn notify(&self, notification: FamilyNotification) -> NotificationResult {
        if self.simulate_failure {
            tracing::warn!(
                recipient_id = %notification.recipient_id,
                kind = %notification.kind,
                "Logging notifier simulating failure"
            );
            return NotificationResult::Failed("Simulated failure".to_string());
        }

        tracing::info!(
            recipient_id = %notification.recipient_id,
            kind = %notification.kind,
            title = %notification.title,
            "Would send family notification"
        );

        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        NotificationResult::Sent
    }
}
