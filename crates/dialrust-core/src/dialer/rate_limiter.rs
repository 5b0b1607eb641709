//! Rate Limiter - Bounds calls initiated per campaign per minute
//!
//! Two backends share one contract. [`LocalRateLimiter`] keeps a fixed 60 second
//! window per campaign in process memory; it is lost on restart and is only
//! correct while a single dialer instance runs. [`SharedRateLimiter`] keeps
//! minute-aligned windows in the database so several instances share one count.
//!
//! The hourly cap is tracked and reported through [`RemainingQuota`] but does
//! not gate admission.

use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Utc};
use dialrust_common::config::RateLimitConfig;
use dialrust_common::types::CampaignId;
use dialrust_common::Result;
use dialrust_storage::repository::RateLimitStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Per-campaign call rate caps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_minute: 10,
            per_hour: 300,
        }
    }
}

impl From<&RateLimitConfig> for RateLimits {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            per_minute: config.per_minute,
            per_hour: config.per_hour,
        }
    }
}

/// Remaining quota for a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemainingQuota {
    pub per_minute: i64,
    pub per_hour: i64,
}

impl RemainingQuota {
    /// Whether another call may start this minute
    pub fn is_saturated(&self) -> bool {
        self.per_minute <= 0
    }
}

/// Call rate limiter
#[async_trait]
pub trait CallRateLimiter: Send + Sync {
    /// Count one call against the campaign's window if it is under the per-minute cap
    async fn try_admit(&self, campaign_id: CampaignId, now: DateTime<Utc>) -> Result<bool>;
    /// Remaining quota without consuming any
    async fn remaining(&self, campaign_id: CampaignId, now: DateTime<Utc>)
        -> Result<RemainingQuota>;
    /// Drop expired state; returns how many entries were removed
    async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[derive(Debug, Clone)]
struct WindowState {
    window_start: DateTime<Utc>,
    calls_in_window: u32,
    hour_start: DateTime<Utc>,
    calls_in_hour: u32,
}

impl WindowState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            calls_in_window: 0,
            hour_start: now,
            calls_in_hour: 0,
        }
    }

    fn roll(&mut self, now: DateTime<Utc>) {
        if now - self.window_start > Duration::seconds(60) {
            self.window_start = now;
            self.calls_in_window = 0;
        }
        if now - self.hour_start > Duration::hours(1) {
            self.hour_start = now;
            self.calls_in_hour = 0;
        }
    }
}

/// Process-local fixed-window rate limiter
pub struct LocalRateLimiter {
    limits: RateLimits,
    windows: Mutex<HashMap<CampaignId, WindowState>>,
}

impl LocalRateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CallRateLimiter for LocalRateLimiter {
    async fn try_admit(&self, campaign_id: CampaignId, now: DateTime<Utc>) -> Result<bool> {
        let mut windows = self.windows.lock().await;
        let state = windows
            .entry(campaign_id)
            .or_insert_with(|| WindowState::new(now));
        state.roll(now);

        if state.calls_in_window >= self.limits.per_minute {
            debug!(
                %campaign_id,
                calls = state.calls_in_window,
                limit = self.limits.per_minute,
                "Rate limit hit"
            );
            return Ok(false);
        }

        state.calls_in_window += 1;
        state.calls_in_hour += 1;
        Ok(true)
    }

    async fn remaining(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<RemainingQuota> {
        let mut windows = self.windows.lock().await;
        let (minute, hour) = match windows.get_mut(&campaign_id) {
            Some(state) => {
                state.roll(now);
                (state.calls_in_window, state.calls_in_hour)
            }
            None => (0, 0),
        };

        Ok(RemainingQuota {
            per_minute: (self.limits.per_minute as i64 - minute as i64).max(0),
            per_hour: (self.limits.per_hour as i64 - hour as i64).max(0),
        })
    }

    async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, state| now - state.hour_start <= Duration::hours(1));
        Ok((before - windows.len()) as u64)
    }
}

/// Database-backed rate limiter shared by every dialer instance
pub struct SharedRateLimiter {
    limits: RateLimits,
    store: Arc<dyn RateLimitStore>,
}

impl SharedRateLimiter {
    pub fn new(limits: RateLimits, store: Arc<dyn RateLimitStore>) -> Self {
        Self { limits, store }
    }

    fn minute_start(now: DateTime<Utc>) -> DateTime<Utc> {
        now.duration_trunc(Duration::minutes(1)).unwrap_or(now)
    }

    fn hour_start(now: DateTime<Utc>) -> DateTime<Utc> {
        now.duration_trunc(Duration::hours(1)).unwrap_or(now)
    }
}

#[async_trait]
impl CallRateLimiter for SharedRateLimiter {
    async fn try_admit(&self, campaign_id: CampaignId, now: DateTime<Utc>) -> Result<bool> {
        let limit = i32::try_from(self.limits.per_minute).unwrap_or(i32::MAX);
        let count = self
            .store
            .increment_window(campaign_id, Self::minute_start(now), limit)
            .await?;

        if count.is_none() {
            debug!(%campaign_id, limit, "Rate limit hit (shared window)");
        }
        Ok(count.is_some())
    }

    async fn remaining(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<RemainingQuota> {
        let minute = self
            .store
            .window_count(campaign_id, Self::minute_start(now))
            .await?;
        let hour = self
            .store
            .count_since(campaign_id, Self::hour_start(now))
            .await?;

        Ok(RemainingQuota {
            per_minute: (self.limits.per_minute as i64 - minute).max(0),
            per_hour: (self.limits.per_hour as i64 - hour).max(0),
        })
    }

    async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64> {
        self.store.cleanup_before(now - Duration::days(1)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialer::fakes::MemoryRateLimitStore;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 10).unwrap()
    }

    #[tokio::test]
    async fn test_local_limiter_caps_per_minute() {
        let limiter = LocalRateLimiter::new(RateLimits {
            per_minute: 3,
            per_hour: 300,
        });
        let campaign = Uuid::new_v4();

        for _ in 0..3 {
            assert!(limiter.try_admit(campaign, t0()).await.unwrap());
        }
        assert!(!limiter.try_admit(campaign, t0()).await.unwrap());

        let quota = limiter.remaining(campaign, t0()).await.unwrap();
        assert_eq!(quota.per_minute, 0);
        assert_eq!(quota.per_hour, 297);
        assert!(quota.is_saturated());
    }

    #[tokio::test]
    async fn test_local_limiter_resets_after_window() {
        let limiter = LocalRateLimiter::new(RateLimits {
            per_minute: 1,
            per_hour: 300,
        });
        let campaign = Uuid::new_v4();

        assert!(limiter.try_admit(campaign, t0()).await.unwrap());
        // Exactly 60s later the window is still open
        assert!(!limiter
            .try_admit(campaign, t0() + Duration::seconds(60))
            .await
            .unwrap());
        assert!(limiter
            .try_admit(campaign, t0() + Duration::seconds(61))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_local_limiter_is_per_campaign() {
        let limiter = LocalRateLimiter::new(RateLimits {
            per_minute: 1,
            per_hour: 300,
        });
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(limiter.try_admit(a, t0()).await.unwrap());
        assert!(!limiter.try_admit(a, t0()).await.unwrap());
        assert!(limiter.try_admit(b, t0()).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_cleanup_drops_idle_campaigns() {
        let limiter = LocalRateLimiter::new(RateLimits::default());
        limiter.try_admit(Uuid::new_v4(), t0()).await.unwrap();

        assert_eq!(limiter.cleanup(t0() + Duration::minutes(30)).await.unwrap(), 0);
        assert_eq!(limiter.cleanup(t0() + Duration::hours(2)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_shared_limiter_uses_minute_windows() {
        let store = Arc::new(MemoryRateLimitStore::default());
        let limiter = SharedRateLimiter::new(
            RateLimits {
                per_minute: 2,
                per_hour: 300,
            },
            store.clone(),
        );
        let campaign = Uuid::new_v4();

        assert!(limiter.try_admit(campaign, t0()).await.unwrap());
        assert!(limiter.try_admit(campaign, t0()).await.unwrap());
        assert!(!limiter.try_admit(campaign, t0()).await.unwrap());

        // Next aligned minute starts a new window
        let next_minute = Utc.with_ymd_and_hms(2024, 3, 6, 12, 1, 0).unwrap();
        assert!(limiter.try_admit(campaign, next_minute).await.unwrap());

        let quota = limiter.remaining(campaign, next_minute).await.unwrap();
        assert_eq!(quota.per_minute, 1);
        assert_eq!(quota.per_hour, 297);
    }
}
