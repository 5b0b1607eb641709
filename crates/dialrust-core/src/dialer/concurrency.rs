//! Concurrency Governor - How many new calls a campaign may start

use chrono::{DateTime, Duration, Utc};
use dialrust_common::Result;
use dialrust_storage::models::Campaign;
use dialrust_storage::repository::AttemptStore;
use std::sync::Arc;
use tracing::debug;

/// Slots left under `cap` with `active` calls in flight, never negative
pub fn slots_from(cap: i32, active: i64) -> i64 {
    (cap as i64 - active).max(0)
}

/// Concurrency governor
///
/// In-flight calls are counted from the attempt store, not from memory, so the
/// count is shared by every dialer instance. Only attempts created within the
/// in-flight window are counted; older ones are left to the sweeper.
pub struct ConcurrencyGovernor {
    attempts: Arc<dyn AttemptStore>,
    in_flight_window: Duration,
}

impl ConcurrencyGovernor {
    pub fn new(attempts: Arc<dyn AttemptStore>, in_flight_window: Duration) -> Self {
        Self {
            attempts,
            in_flight_window,
        }
    }

    /// Slots available to `campaign` at `now`
    pub async fn available_slots(&self, campaign: &Campaign, now: DateTime<Utc>) -> Result<i64> {
        let since = now - self.in_flight_window;
        let active = self
            .attempts
            .count_in_progress_since(campaign.id, since)
            .await?;

        let slots = slots_from(campaign.concurrent_calls, active);
        debug!(
            campaign_id = %campaign.id,
            cap = campaign.concurrent_calls,
            active,
            slots,
            "Computed available slots"
        );
        Ok(slots)
    }
}
