//! Contact repository

use crate::db::DatabasePool;
use crate::models::{Contact, DueContact};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialrust_common::types::CampaignId;
use dialrust_common::{Error, Result};
use sqlx::FromRow;

/// Contact store trait
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Next contacts due for a call, oldest-due first.
    ///
    /// Never returns a contact that has an open in-progress attempt for the
    /// campaign, one already reached, one whose first attempt is more than
    /// `max_retry_days` old, or one whose retry time has not come yet.
    /// Attempts at or after `day_start` (local midnight of the campaign's
    /// timezone) count toward today.
    async fn next_due(
        &self,
        campaign_id: CampaignId,
        limit: i64,
        max_retry_days: i32,
        now: DateTime<Utc>,
        day_start: DateTime<Utc>,
    ) -> Result<Vec<DueContact>>;
}

#[derive(FromRow)]
struct DueContactRow {
    #[sqlx(flatten)]
    contact: Contact,
    prior_attempts: i64,
    attempts_today: i64,
    first_attempt_at: Option<DateTime<Utc>>,
}

/// Database contact store
#[derive(Clone)]
pub struct DbContactStore {
    pool: DatabasePool,
}

impl DbContactStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactStore for DbContactStore {
    async fn next_due(
        &self,
        campaign_id: CampaignId,
        limit: i64,
        max_retry_days: i32,
        now: DateTime<Utc>,
        day_start: DateTime<Utc>,
    ) -> Result<Vec<DueContact>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, DueContactRow>(
            r#"
            WITH history AS (
                SELECT
                    a.contact_id,
                    COUNT(*) AS prior_attempts,
                    COUNT(*) FILTER (WHERE a.created_at >= $5) AS attempts_today,
                    MIN(a.created_at) AS first_attempt_at,
                    BOOL_OR(a.status = 'in-progress') AS has_open_attempt,
                    BOOL_OR(a.call_outcome = 'answered') AS reached,
                    (ARRAY_AGG(a.next_retry_at ORDER BY a.created_at DESC))[1] AS next_retry_at
                FROM campaign_contact_attempts a
                WHERE a.campaign_id = $1
                GROUP BY a.contact_id
            )
            SELECT
                c.id, c.contact_group_id, c.first_name, c.last_name, c.email, c.address,
                c.phones, c.custom_fields, c.created_at,
                COALESCE(h.prior_attempts, 0) AS prior_attempts,
                COALESCE(h.attempts_today, 0) AS attempts_today,
                h.first_attempt_at
            FROM campaigns cp
            JOIN contacts c ON c.contact_group_id = cp.contact_group_id
            LEFT JOIN history h ON h.contact_id = c.id
            WHERE cp.id = $1
              AND c.excluded = FALSE
              AND COALESCE(h.has_open_attempt, FALSE) = FALSE
              AND COALESCE(h.reached, FALSE) = FALSE
              AND (h.first_attempt_at IS NULL
                   OR h.first_attempt_at > $4::timestamptz - make_interval(days => $3))
              AND (h.next_retry_at IS NULL OR h.next_retry_at <= $4::timestamptz)
            ORDER BY COALESCE(h.next_retry_at, c.created_at) ASC, c.id ASC
            LIMIT $2
            "#,
        )
        .bind(campaign_id)
        .bind(limit)
        .bind(max_retry_days)
        .bind(now)
        .bind(day_start)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                DueContact::from_history(
                    row.contact,
                    row.prior_attempts,
                    row.attempts_today,
                    row.first_attempt_at,
                    now,
                )
            })
            .collect())
    }
}
