//! Reconciliation Sweeper - Per-tick cleanup independent of any one campaign
//!
//! Fails attempts stuck in progress past the staleness timeout, resumes
//! campaigns paused outside calling hours once their window opens, and starts
//! scheduled campaigns whose start time has passed. Each step is best-effort:
//! a failure is logged and counted, and the next step still runs.

use super::state::{apply_event, CampaignEvent};
use super::window::is_within_calling_hours;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use dialrust_common::Result;
use dialrust_storage::models::PauseReason;
use dialrust_storage::repository::{AttemptStore, CampaignStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Sweep results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub stale_attempts_failed: u64,
    pub campaigns_resumed: usize,
    pub campaigns_started: usize,
    pub errors: usize,
}

/// Reconciliation sweeper
pub struct ReconciliationSweeper {
    campaigns: Arc<dyn CampaignStore>,
    attempts: Arc<dyn AttemptStore>,
    stale_timeout: Duration,
    default_timezone: Tz,
}

impl ReconciliationSweeper {
    pub fn new(
        campaigns: Arc<dyn CampaignStore>,
        attempts: Arc<dyn AttemptStore>,
        stale_timeout: Duration,
        default_timezone: Tz,
    ) -> Self {
        Self {
            campaigns,
            attempts,
            stale_timeout,
            default_timezone,
        }
    }

    /// Run every sweep step once
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        match self.fail_stale_attempts(now).await {
            Ok(count) => report.stale_attempts_failed = count,
            Err(e) => {
                error!(error = %e, "Stale attempt sweep failed");
                report.errors += 1;
            }
        }

        match self.resume_paused(now).await {
            Ok((resumed, errors)) => {
                report.campaigns_resumed = resumed;
                report.errors += errors;
            }
            Err(e) => {
                error!(error = %e, "Failed to list campaigns paused outside calling hours");
                report.errors += 1;
            }
        }

        match self.start_scheduled(now).await {
            Ok((started, errors)) => {
                report.campaigns_started = started;
                report.errors += errors;
            }
            Err(e) => {
                error!(error = %e, "Failed to list due scheduled campaigns");
                report.errors += 1;
            }
        }

        report
    }

    /// Fail in-progress attempts older than the staleness timeout, whatever the campaign state
    pub async fn fail_stale_attempts(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - self.stale_timeout;
        let count = self.attempts.fail_stale_in_progress(cutoff).await?;
        if count > 0 {
            info!(count, %cutoff, "Failed stale in-progress attempts");
        }
        Ok(count)
    }

    /// Resume campaigns paused outside calling hours whose window is open.
    ///
    /// Returns (resumed, per-campaign errors).
    pub async fn resume_paused(&self, now: DateTime<Utc>) -> Result<(usize, usize)> {
        let paused = self
            .campaigns
            .list_paused(&PauseReason::OutsideCallingHours)
            .await?;

        let mut resumed = 0;
        let mut errors = 0;
        for campaign in paused {
            if !is_within_calling_hours(&campaign, now, self.default_timezone) {
                continue;
            }
            match apply_event(self.campaigns.as_ref(), &campaign, CampaignEvent::WindowOpened)
                .await
            {
                Ok(Some(_)) => resumed += 1,
                Ok(None) => {}
                Err(e) => {
                    error!(campaign_id = %campaign.id, error = %e, "Failed to resume campaign");
                    errors += 1;
                }
            }
        }
        Ok((resumed, errors))
    }

    /// Activate scheduled campaigns whose start time has passed
    pub async fn start_scheduled(&self, now: DateTime<Utc>) -> Result<(usize, usize)> {
        let due = self.campaigns.list_scheduled_due(now).await?;

        let mut started = 0;
        let mut errors = 0;
        for campaign in due {
            match apply_event(self.campaigns.as_ref(), &campaign, CampaignEvent::StartDue).await {
                Ok(Some(_)) => started += 1,
                Ok(None) => {}
                Err(e) => {
                    error!(campaign_id = %campaign.id, error = %e, "Failed to start campaign");
                    errors += 1;
                }
            }
        }
        Ok((started, errors))
    }
}
