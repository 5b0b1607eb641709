//! Shared per-campaign rate windows

use crate::db::DatabasePool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialrust_common::types::CampaignId;
use dialrust_common::{Error, Result};

/// Rate window store trait
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Increment the window counter unless it already reached `limit`.
    ///
    /// Returns the new count, or `None` when the window is full.
    async fn increment_window(
        &self,
        campaign_id: CampaignId,
        window_start: DateTime<Utc>,
        limit: i32,
    ) -> Result<Option<i64>>;
    /// Current count for a window
    async fn window_count(&self, campaign_id: CampaignId, window_start: DateTime<Utc>)
        -> Result<i64>;
    /// Sum of counts for windows starting at or after `since`
    async fn count_since(&self, campaign_id: CampaignId, since: DateTime<Utc>) -> Result<i64>;
    /// Delete windows that started before `cutoff`
    async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Database rate window store
#[derive(Clone)]
pub struct DbRateLimitStore {
    pool: DatabasePool,
}

impl DbRateLimitStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitStore for DbRateLimitStore {
    async fn increment_window(
        &self,
        campaign_id: CampaignId,
        window_start: DateTime<Utc>,
        limit: i32,
    ) -> Result<Option<i64>> {
        if limit <= 0 {
            return Ok(None);
        }

        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            INSERT INTO campaign_rate_windows (campaign_id, window_start, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (campaign_id, window_start)
            DO UPDATE SET count = campaign_rate_windows.count + 1, updated_at = NOW()
            WHERE campaign_rate_windows.count < $3
            RETURNING count
            "#,
        )
        .bind(campaign_id)
        .bind(window_start)
        .bind(limit)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(row.map(|(c,)| c as i64))
    }

    async fn window_count(
        &self,
        campaign_id: CampaignId,
        window_start: DateTime<Utc>,
    ) -> Result<i64> {
        let count: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT count FROM campaign_rate_windows
            WHERE campaign_id = $1 AND window_start = $2
            "#,
        )
        .bind(campaign_id)
        .bind(window_start)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(count.map(|(c,)| c as i64).unwrap_or(0))
    }

    async fn count_since(&self, campaign_id: CampaignId, since: DateTime<Utc>) -> Result<i64> {
        let count: (Option<i64>,) = sqlx::query_as(
            r#"
            SELECT SUM(count)::BIGINT FROM campaign_rate_windows
            WHERE campaign_id = $1 AND window_start >= $2
            "#,
        )
        .bind(campaign_id)
        .bind(since)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(count.0.unwrap_or(0))
    }

    async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM campaign_rate_windows WHERE window_start < $1")
            .bind(cutoff)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
