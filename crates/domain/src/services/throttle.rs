//! Join-request throttle engine.
//!
//! Three independent gates evaluated over the attempt history of one
//! (requester, family) pair:
//!
//! 1. a lifetime cap over all rows, any status,
//! 2. a rolling-window cap over non-cancelled rows,
//! 3. a backoff cooldown indexed by the in-window attempt count.
//!
//! Every knob comes from configuration. The evaluation itself is a pure
//! function of the history and the injected `now`, so the engine is
//! trivially testable without a clock or a store.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{JoinRequest, JoinRequestStatus};

/// Why an attempt was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThrottleReason {
    /// Lifetime attempt cap reached; only an invitation can get the
    /// requester in now.
    MaxRetries,
    /// Too many attempts within the rolling window.
    WeeklyLimit,
    /// The backoff cooldown since the latest attempt has not elapsed.
    Backoff,
}

impl ThrottleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottleReason::MaxRetries => "MAX_RETRIES",
            ThrottleReason::WeeklyLimit => "WEEKLY_LIMIT",
            ThrottleReason::Backoff => "BACKOFF",
        }
    }
}

impl std::fmt::Display for ThrottleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured denial payload, surfaced to clients as a 409 body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ThrottleDenial {
    pub reason: ThrottleReason,
    /// Earliest instant a new attempt can succeed. None for permanent
    /// denials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_allowed_at: Option<DateTime<Utc>>,
    /// Remaining cooldown in seconds, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<i64>,
}

impl ThrottleDenial {
    pub fn permanent(reason: ThrottleReason) -> Self {
        Self {
            reason,
            next_allowed_at: None,
            retry_after_secs: None,
        }
    }

    pub fn until(reason: ThrottleReason, next_allowed_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            reason,
            next_allowed_at: Some(next_allowed_at),
            retry_after_secs: Some((next_allowed_at - now).num_seconds().max(0)),
        }
    }
}

/// Outcome of a throttle evaluation.
#[derive(Debug, Clone)]
pub enum ThrottleDecision {
    Allowed,
    Denied(ThrottleDenial),
}

impl ThrottleDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ThrottleDecision::Allowed)
    }
}

/// Throttle policy knobs, loaded from configuration.
#[derive(Debug, Clone)]
pub struct ThrottlePolicy {
    /// Lifetime attempt cap per (requester, family) pair, any status.
    /// Cancelled rows count too; otherwise resending forever would
    /// sidestep the cap.
    pub max_attempts_per_family: usize,
    /// Trailing span over which the window cap and backoff index are
    /// evaluated.
    pub attempt_window: Duration,
    /// Maximum non-cancelled attempts within the window.
    pub max_attempts_per_window: usize,
    /// Minimum wait after the latest attempt, indexed by the in-window
    /// attempt count and clamped to the last entry.
    pub backoff_schedule: Vec<Duration>,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_family: 5,
            attempt_window: Duration::days(7),
            max_attempts_per_window: 3,
            backoff_schedule: vec![
                Duration::zero(),
                Duration::hours(6),
                Duration::hours(12),
                Duration::hours(24),
            ],
        }
    }
}

impl ThrottlePolicy {
    /// Evaluates whether a new attempt is allowed right now.
    ///
    /// `history` must be the full attempt history for the pair, most
    /// recent first, as returned by `JoinRequestStore::history`.
    pub fn evaluate(&self, history: &[JoinRequest], now: DateTime<Utc>) -> ThrottleDecision {
        // Gate 1: lifetime cap, permanent.
        if history.len() >= self.max_attempts_per_family {
            return ThrottleDecision::Denied(ThrottleDenial::permanent(
                ThrottleReason::MaxRetries,
            ));
        }

        let window_start = now - self.attempt_window;
        let in_window: Vec<&JoinRequest> = history
            .iter()
            .filter(|r| r.created_at > window_start)
            .collect();

        // Gate 2: rolling-window cap over non-cancelled attempts.
        let countable: Vec<&&JoinRequest> = in_window
            .iter()
            .filter(|r| r.status != JoinRequestStatus::Cancelled)
            .collect();
        if countable.len() >= self.max_attempts_per_window {
            // Oldest countable attempt leaves the window first.
            let oldest = countable
                .iter()
                .map(|r| r.created_at)
                .min()
                .unwrap_or(now);
            return ThrottleDecision::Denied(ThrottleDenial::until(
                ThrottleReason::WeeklyLimit,
                oldest + self.attempt_window,
                now,
            ));
        }

        // Gate 3: backoff cooldown since the latest attempt of any status.
        if let Some(latest) = history.first() {
            let step = in_window.len().min(self.backoff_schedule.len().saturating_sub(1));
            let required = self
                .backoff_schedule
                .get(step)
                .copied()
                .unwrap_or_else(Duration::zero);
            let next_allowed = latest.created_at + required;
            if now < next_allowed {
                return ThrottleDecision::Denied(ThrottleDenial::until(
                    ThrottleReason::Backoff,
                    next_allowed,
                    now,
                ));
            }
        }

        ThrottleDecision::Allowed
    }
}
