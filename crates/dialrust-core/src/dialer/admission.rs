//! Admission Controller - Credit gate for a campaign's tick
//!
//! One coarse reservation per campaign per tick, sized to the estimated cost
//! ceiling of a single call. Warning levels never block admission; they are
//! logged and passed to a [`BalanceNotifier`].

use dialrust_common::types::{AccountId, ReservationId};
use dialrust_common::Result;
use dialrust_storage::models::{Campaign, WarningLevel};
use dialrust_storage::repository::CreditLedger;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a budget reservation
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionDecision {
    pub proceed: bool,
    /// Hold taken for this tick, when admitted
    pub reservation_id: Option<ReservationId>,
    pub balance: f64,
    pub warning_level: WarningLevel,
    /// Rejected and the account has not opted out of auto-pause
    pub pause: bool,
}

/// Receives low-balance signals; implementations must not block
pub trait BalanceNotifier: Send + Sync {
    fn notify_low_balance(&self, account_id: AccountId, balance: f64, level: WarningLevel);
}

#[derive(Debug, Serialize)]
struct LowBalancePayload {
    account_id: AccountId,
    balance: f64,
    warning_level: WarningLevel,
}

/// Posts low-balance signals to an auto-reload endpoint from a spawned task
pub struct HttpBalanceNotifier {
    http_client: Client,
    url: String,
}

impl HttpBalanceNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http_client,
            url: url.into(),
        }
    }
}

impl BalanceNotifier for HttpBalanceNotifier {
    fn notify_low_balance(&self, account_id: AccountId, balance: f64, level: WarningLevel) {
        let client = self.http_client.clone();
        let url = self.url.clone();
        let payload = LowBalancePayload {
            account_id,
            balance,
            warning_level: level,
        };

        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(%account_id, "Low-balance notification delivered");
                }
                Ok(response) => {
                    warn!(
                        %account_id,
                        status = %response.status(),
                        "Low-balance notification rejected"
                    );
                }
                Err(e) => {
                    warn!(%account_id, error = %e, "Low-balance notification failed");
                }
            }
        });
    }
}

/// Admission controller
pub struct AdmissionController {
    ledger: Arc<dyn CreditLedger>,
    estimated_call_cost: f64,
    notifier: Option<Arc<dyn BalanceNotifier>>,
}

impl AdmissionController {
    pub fn new(ledger: Arc<dyn CreditLedger>, estimated_call_cost: f64) -> Self {
        Self {
            ledger,
            estimated_call_cost,
            notifier: None,
        }
    }

    /// Set the low-balance notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn BalanceNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Reserve the tick's budget for `campaign`
    pub async fn reserve_budget(&self, campaign: &Campaign) -> Result<AdmissionDecision> {
        let reservation = self
            .ledger
            .reserve(campaign.account_id, self.estimated_call_cost)
            .await?;

        if !reservation.admitted() {
            let pause = reservation.auto_pause != Some(false);
            info!(
                campaign_id = %campaign.id,
                account_id = %campaign.account_id,
                balance = reservation.current_balance,
                pause,
                "Insufficient credits"
            );
            return Ok(AdmissionDecision {
                proceed: false,
                reservation_id: None,
                balance: reservation.current_balance,
                warning_level: reservation.warning_level,
                pause,
            });
        }

        if reservation.warning_level != WarningLevel::Ok {
            warn!(
                campaign_id = %campaign.id,
                account_id = %campaign.account_id,
                balance = reservation.current_balance,
                level = %reservation.warning_level,
                "Account balance is low"
            );
            if let Some(notifier) = &self.notifier {
                notifier.notify_low_balance(
                    campaign.account_id,
                    reservation.current_balance,
                    reservation.warning_level,
                );
            }
        }

        Ok(AdmissionDecision {
            proceed: true,
            reservation_id: reservation.reservation_id,
            balance: reservation.current_balance,
            warning_level: reservation.warning_level,
            pause: false,
        })
    }

    /// Give back a tick's hold. Failures are logged; the hold lapses on its own.
    pub async fn release(&self, campaign: &Campaign, reservation_id: ReservationId) {
        match self.ledger.release(reservation_id).await {
            Ok(true) => {
                debug!(campaign_id = %campaign.id, %reservation_id, "Released unused credit hold")
            }
            Ok(false) => {}
            Err(e) => warn!(
                campaign_id = %campaign.id,
                %reservation_id,
                error = %e,
                "Failed to release credit hold"
            ),
        }
    }
}
