//! Credit ledger

use crate::db::DatabasePool;
use crate::models::{CreditReservation, WarningLevel};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dialrust_common::types::{AccountId, ReservationId};
use dialrust_common::{Error, Result};
use sqlx::FromRow;
use tracing::debug;
use uuid::Uuid;

/// How long a hold keeps credit set aside before it lapses unsettled
const RESERVATION_TTL_MINUTES: i64 = 15;

/// Credit ledger trait
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Atomically reserve `amount` against the account, or reject
    async fn reserve(&self, account_id: AccountId, amount: f64) -> Result<CreditReservation>;
    /// Return a live hold to the spendable balance.
    ///
    /// Returns false when the hold was already released, settled or expired.
    async fn release(&self, reservation_id: ReservationId) -> Result<bool>;
}

#[derive(FromRow)]
struct AccountBalanceRow {
    balance: f64,
    warning_threshold: f64,
    critical_threshold: f64,
    auto_pause_on_insufficient: Option<bool>,
}

/// Database credit ledger
#[derive(Clone)]
pub struct DbCreditLedger {
    pool: DatabasePool,
}

impl DbCreditLedger {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditLedger for DbCreditLedger {
    async fn reserve(&self, account_id: AccountId, amount: f64) -> Result<CreditReservation> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        // Row lock serialises concurrent reservations for the same account
        let account = sqlx::query_as::<_, AccountBalanceRow>(
            r#"
            SELECT balance, warning_threshold, critical_threshold, auto_pause_on_insufficient
            FROM accounts WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .ok_or_else(|| Error::NotFound(format!("account {}", account_id)))?;

        let held: (Option<f64>,) = sqlx::query_as(
            r#"
            SELECT SUM(amount) FROM credit_reservations
            WHERE account_id = $1 AND status = 'held' AND expires_at > $2
            "#,
        )
        .bind(account_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let available = account.balance - held.0.unwrap_or(0.0);

        if available < amount {
            tx.rollback()
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

            debug!(%account_id, available, amount, "Credit reservation rejected");
            return Ok(CreditReservation {
                reservation_id: None,
                success: false,
                can_proceed: false,
                current_balance: available,
                warning_level: WarningLevel::Critical,
                auto_pause: account.auto_pause_on_insufficient,
            });
        }

        let reservation_id = Uuid::now_v7();
        sqlx::query(
            r#"
            INSERT INTO credit_reservations (id, account_id, amount, status, expires_at, created_at)
            VALUES ($1, $2, $3, 'held', $4, $5)
            "#,
        )
        .bind(reservation_id)
        .bind(account_id)
        .bind(amount)
        .bind(now + Duration::minutes(RESERVATION_TTL_MINUTES))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let remaining = available - amount;
        Ok(CreditReservation {
            reservation_id: Some(reservation_id),
            success: true,
            can_proceed: true,
            current_balance: remaining,
            warning_level: WarningLevel::from_balance(
                remaining,
                account.warning_threshold,
                account.critical_threshold,
            ),
            auto_pause: account.auto_pause_on_insufficient,
        })
    }

    async fn release(&self, reservation_id: ReservationId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE credit_reservations
            SET status = 'released'
            WHERE id = $1 AND status = 'held' AND expires_at > NOW()
            "#,
        )
        .bind(reservation_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let released = result.rows_affected() > 0;
        debug!(%reservation_id, released, "Credit hold released");
        Ok(released)
    }
}
