//! Expiry sweeper for stale pending join requests.
//!
//! Pending rows older than the configured TTL are cancelled and the
//! family's pending mirror is reconciled. The sweeper races with the
//! head and the requester on every row, so each candidate is re-read
//! right before the write and skipped if it turned terminal in the
//! meantime. One row's failure never aborts the pass.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use shared::clock::Clock;

use crate::models::JoinRequestStatus;

use super::stores::{FamilyStore, JoinRequestStore, StoreError};

/// Aggregate outcome of one sweep pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Rows transitioned to cancelled.
    pub expired: usize,
    /// Families whose pending mirror was updated.
    pub families_touched: usize,
    /// Rows that failed to expire and were left for the next pass.
    pub errors: usize,
}

/// Cancels pending join requests that outlived their TTL.
pub struct JoinRequestSweeper {
    requests: Arc<dyn JoinRequestStore>,
    families: Arc<dyn FamilyStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl JoinRequestSweeper {
    pub fn new(
        requests: Arc<dyn JoinRequestStore>,
        families: Arc<dyn FamilyStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            requests,
            families,
            clock,
            ttl,
        }
    }

    /// Run one sweep pass.
    ///
    /// Errors from the initial candidate query abort the pass; per-row
    /// failures are counted and logged instead.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let now = self.clock.now();
        let cutoff = now - self.ttl;
        let candidates = self.requests.find_pending_older_than(cutoff).await?;

        let mut report = SweepReport::default();
        if candidates.is_empty() {
            return Ok(report);
        }

        tracing::debug!(candidates = candidates.len(), "Sweeping stale join requests");

        for candidate in candidates {
            match self.expire_row(candidate.id).await {
                Ok(Some(family_touched)) => {
                    report.expired += 1;
                    if family_touched {
                        report.families_touched += 1;
                    }
                }
                // Claimed by an accept/reject/cancel since the query.
                Ok(None) => {}
                Err(err) => {
                    report.errors += 1;
                    tracing::warn!(
                        request_id = %candidate.id,
                        error = %err,
                        "Failed to expire join request"
                    );
                }
            }
        }

        tracing::info!(
            expired = report.expired,
            families_touched = report.families_touched,
            errors = report.errors,
            "Join request sweep finished"
        );
        Ok(report)
    }

    /// Expire a single row. Returns `Ok(None)` when the row is no longer
    /// pending, `Ok(Some(mirror_updated))` on success.
    async fn expire_row(&self, request_id: Uuid) -> Result<Option<bool>, StoreError> {
        let Some(current) = self.requests.find_by_id(request_id).await? else {
            return Ok(None);
        };
        if !current.is_pending() {
            return Ok(None);
        }

        let now = self.clock.now();
        self.requests
            .save(&current.into_status(JoinRequestStatus::Cancelled, None, now))
            .await?;

        let mut family_touched = false;
        if let Some(family) = self.families.find_by_id(current.family_id).await? {
            if family.has_pending_request(current.requester_id) {
                self.families
                    .save(&family.with_pending_request_removed(current.requester_id, now))
                    .await?;
                family_touched = true;
            }
        }

        tracing::debug!(
            request_id = %current.id,
            family_id = %current.family_id,
            requester_id = %current.requester_id,
            "Join request expired"
        );
        Ok(Some(family_touched))
    }
}
