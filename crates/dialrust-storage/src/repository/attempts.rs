//! Call attempt repository

use crate::db::DatabasePool;
use crate::models::{AttemptPatch, NewAttempt};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialrust_common::types::{AttemptId, CampaignId};
use dialrust_common::{Error, Result};
use uuid::Uuid;

/// Attempt store trait
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Insert an `in-progress` attempt and return its id.
    ///
    /// Fails with [`Error::Conflict`] when the contact already has one open.
    async fn create(&self, attempt: NewAttempt) -> Result<AttemptId>;
    /// Move an `in-progress` attempt to a terminal state.
    ///
    /// Returns `false` when the attempt is no longer in progress.
    async fn update(&self, id: AttemptId, patch: AttemptPatch) -> Result<bool>;
    /// Count `in-progress` attempts for a campaign created at or after `since`
    async fn count_in_progress_since(
        &self,
        campaign_id: CampaignId,
        since: DateTime<Utc>,
    ) -> Result<i64>;
    /// Fail every `in-progress` attempt created before `older_than`
    async fn fail_stale_in_progress(&self, older_than: DateTime<Utc>) -> Result<u64>;
}

/// Database attempt store
#[derive(Clone)]
pub struct DbAttemptStore {
    pool: DatabasePool,
}

impl DbAttemptStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptStore for DbAttemptStore {
    async fn create(&self, attempt: NewAttempt) -> Result<AttemptId> {
        let id = Uuid::now_v7();

        sqlx::query(
            r#"
            INSERT INTO campaign_contact_attempts (
                id, campaign_id, contact_id, phone_number, phone_index, total_phones,
                attempt_number, attempt_day, status, next_retry_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'in-progress', $9, $10, $10)
            "#,
        )
        .bind(id)
        .bind(attempt.campaign_id)
        .bind(attempt.contact_id)
        .bind(&attempt.phone_number)
        .bind(attempt.phone_index)
        .bind(attempt.total_phones)
        .bind(attempt.attempt_number)
        .bind(attempt.attempt_day)
        .bind(attempt.next_retry_at)
        .bind(attempt.created_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Error::Conflict(format!(
                "contact {} already has an in-progress attempt",
                attempt.contact_id
            )),
            e => Error::Database(e.to_string()),
        })?;

        Ok(id)
    }

    async fn update(&self, id: AttemptId, patch: AttemptPatch) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_contact_attempts SET
                status = $2,
                provider_call_id = COALESCE($3, provider_call_id),
                provider_response = COALESCE($4, provider_response),
                updated_at = NOW()
            WHERE id = $1 AND status = 'in-progress'
            "#,
        )
        .bind(id)
        .bind(patch.status.to_string())
        .bind(&patch.provider_call_id)
        .bind(&patch.provider_response)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_in_progress_since(
        &self,
        campaign_id: CampaignId,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM campaign_contact_attempts
            WHERE campaign_id = $1 AND status = 'in-progress' AND created_at >= $2
            "#,
        )
        .bind(campaign_id)
        .bind(since)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(count.0)
    }

    async fn fail_stale_in_progress(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_contact_attempts SET
                status = 'failed',
                provider_response = COALESCE(provider_response, '{}'::jsonb)
                    || jsonb_build_object('error', 'stale attempt timed out'),
                updated_at = NOW()
            WHERE status = 'in-progress' AND created_at < $1
            "#,
        )
        .bind(older_than)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
