//! Background job that expires stale pending join requests.

use std::sync::Arc;

use domain::services::JoinRequestSweeper;

use super::scheduler::{Job, JobFrequency};
use crate::middleware::metrics::record_join_requests_expired;

/// Job that periodically cancels pending join requests past their TTL.
pub struct ExpireJoinRequestsJob {
    sweeper: Arc<JoinRequestSweeper>,
    interval_minutes: u64,
}

impl ExpireJoinRequestsJob {
    /// Create a new expiry job running every `interval_minutes`.
    pub fn new(sweeper: Arc<JoinRequestSweeper>, interval_minutes: u64) -> Self {
        Self {
            sweeper,
            interval_minutes,
        }
    }
}

#[async_trait::async_trait]
impl Job for ExpireJoinRequestsJob {
    fn name(&self) -> &'static str {
        "expire_join_requests"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    async fn execute(&self) -> Result<(), String> {
        let report = self
            .sweeper
            .sweep()
            .await
            .map_err(|e| format!("Sweep pass failed: {}", e))?;

        if report.expired > 0 {
            record_join_requests_expired(report.expired);
        }

        // Per-row errors are already logged by the sweeper; a partially
        // failed pass still counts as a completed run.
        if report.errors > 0 {
            tracing::warn!(
                expired = report.expired,
                errors = report.errors,
                "Sweep pass completed with errors"
            );
        }

        Ok(())
    }
}
