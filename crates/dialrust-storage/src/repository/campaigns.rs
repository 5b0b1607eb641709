//! Campaign repository

use crate::db::DatabasePool;
use crate::models::{Campaign, CampaignStatus, FieldMapping, PauseReason};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialrust_common::types::{CampaignId, ContactGroupId};
use dialrust_common::{Error, Result};

/// Campaign store trait
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Campaigns the dialer should consider this tick
    async fn list_active(&self) -> Result<Vec<Campaign>>;
    /// Paused campaigns carrying the given reason
    async fn list_paused(&self, reason: &PauseReason) -> Result<Vec<Campaign>>;
    /// Scheduled campaigns whose start time has passed
    async fn list_scheduled_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>>;
    async fn set_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        reason: Option<&PauseReason>,
    ) -> Result<()>;
    async fn field_mappings(&self, group_id: ContactGroupId) -> Result<Vec<FieldMapping>>;
}

const CAMPAIGN_SELECT: &str = r#"
    SELECT
        c.id, c.account_id, c.name, c.status, c.paused_reason, c.timezone, c.active_days,
        c.calling_hours_start, c.calling_hours_end, c.concurrent_calls, c.max_retry_days,
        c.retry_attempts, c.retry_interval, c.contact_group_id, c.agent_id,
        a.provider_agent_id, a.outbound_phone_number,
        c.scheduled_start_at, c.created_at, c.updated_at
    FROM campaigns c
    LEFT JOIN agents a ON a.id = c.agent_id
"#;

/// Database campaign store
#[derive(Clone)]
pub struct DbCampaignStore {
    pool: DatabasePool,
}

impl DbCampaignStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignStore for DbCampaignStore {
    async fn list_active(&self) -> Result<Vec<Campaign>> {
        let sql = format!(
            "{} WHERE c.status = 'active' ORDER BY c.created_at ASC, c.id ASC",
            CAMPAIGN_SELECT
        );

        sqlx::query_as::<_, Campaign>(&sql)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_paused(&self, reason: &PauseReason) -> Result<Vec<Campaign>> {
        // Older rows may carry the spaced spelling of the reason
        let spaced = reason.as_str().replace('_', " ");
        let sql = format!(
            "{} WHERE c.status = 'paused' AND c.paused_reason IN ($1, $2) ORDER BY c.created_at ASC",
            CAMPAIGN_SELECT
        );

        sqlx::query_as::<_, Campaign>(&sql)
            .bind(reason.as_str())
            .bind(&spaced)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_scheduled_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let sql = format!(
            "{} WHERE c.status = 'scheduled' AND c.scheduled_start_at IS NOT NULL AND c.scheduled_start_at <= $1 ORDER BY c.scheduled_start_at ASC",
            CAMPAIGN_SELECT
        );

        sqlx::query_as::<_, Campaign>(&sql)
            .bind(now)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn set_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        reason: Option<&PauseReason>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                status = $2,
                paused_reason = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(reason.map(|r| r.as_str().to_string()))
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("campaign {}", id)));
        }
        Ok(())
    }

    async fn field_mappings(&self, group_id: ContactGroupId) -> Result<Vec<FieldMapping>> {
        sqlx::query_as::<_, FieldMapping>(
            r#"
            SELECT id, contact_group_id, csv_header, variable_name
            FROM field_mappings
            WHERE contact_group_id = $1
            ORDER BY position ASC, csv_header ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
