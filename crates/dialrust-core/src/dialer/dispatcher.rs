//! Call Dispatcher - Places one call and records the attempt
//!
//! The attempt row is written as `in-progress` before the provider is called,
//! so a crash in between leaves a row the sweeper will fail later rather than
//! a call with no record. Every failure is contained to the one contact.

use super::retry::plan_next_retry;
use super::variables::build_dynamic_variables;
use super::window::CallingWindow;
use crate::telephony::{OutboundCallRequest, TelephonyProvider};
use chrono::{DateTime, Utc};
use dialrust_common::types::AttemptId;
use dialrust_common::Error;
use dialrust_storage::models::{AttemptPatch, Campaign, DueContact, FieldMapping, NewAttempt};
use dialrust_storage::repository::AttemptStore;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why a contact was passed over without a provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoOutboundNumber,
    NoAgent,
    NoPhone,
    /// The attempt row could not be written
    Persistence,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoOutboundNumber => write!(f, "no outbound phone number"),
            SkipReason::NoAgent => write!(f, "no provider agent"),
            SkipReason::NoPhone => write!(f, "no destination phone"),
            SkipReason::Persistence => write!(f, "attempt not recorded"),
        }
    }
}

/// Result of a single dial
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptResult {
    /// Provider accepted the call
    Placed { attempt_id: AttemptId, call_id: String },
    /// Provider refused or was unreachable; the attempt is failed
    Failed { attempt_id: AttemptId, error: String },
    Skipped(SkipReason),
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Call dispatcher
pub struct CallDispatcher {
    attempts: Arc<dyn AttemptStore>,
    provider: Arc<dyn TelephonyProvider>,
    webhook_url: String,
}

impl CallDispatcher {
    pub fn new(
        attempts: Arc<dyn AttemptStore>,
        provider: Arc<dyn TelephonyProvider>,
        webhook_url: impl Into<String>,
    ) -> Self {
        Self {
            attempts,
            provider,
            webhook_url: webhook_url.into(),
        }
    }

    /// Place one call for `due` on behalf of `campaign`
    pub async fn place_call(
        &self,
        campaign: &Campaign,
        window: &CallingWindow,
        due: &DueContact,
        mappings: &[FieldMapping],
        now: DateTime<Utc>,
    ) -> AttemptResult {
        let contact_id = due.contact.id;

        let Some(from_number) = non_empty(campaign.outbound_phone_number.as_deref()) else {
            warn!(campaign_id = %campaign.id, "Campaign has no outbound phone number");
            return AttemptResult::Skipped(SkipReason::NoOutboundNumber);
        };
        let Some(agent_id) = non_empty(campaign.provider_agent_id.as_deref()) else {
            warn!(campaign_id = %campaign.id, "Campaign has no provider agent");
            return AttemptResult::Skipped(SkipReason::NoAgent);
        };
        let Some(to_number) = due.phone() else {
            warn!(
                campaign_id = %campaign.id,
                %contact_id,
                phone_index = due.phone_index,
                "Contact has no phone at this index"
            );
            return AttemptResult::Skipped(SkipReason::NoPhone);
        };

        let attempt = NewAttempt {
            campaign_id: campaign.id,
            contact_id,
            phone_number: to_number.to_string(),
            phone_index: due.phone_index,
            total_phones: due.total_phones,
            attempt_number: due.attempt_number,
            attempt_day: due.attempt_day,
            next_retry_at: plan_next_retry(campaign, window, due, now),
            created_at: now,
        };

        let attempt_id = match self.attempts.create(attempt).await {
            Ok(id) => id,
            Err(Error::Conflict(reason)) => {
                info!(
                    campaign_id = %campaign.id,
                    %contact_id,
                    %reason,
                    "Contact already being dialed"
                );
                return AttemptResult::Skipped(SkipReason::Persistence);
            }
            Err(e) => {
                error!(
                    campaign_id = %campaign.id,
                    %contact_id,
                    error = %e,
                    "Failed to record attempt, skipping contact"
                );
                return AttemptResult::Skipped(SkipReason::Persistence);
            }
        };

        let request = OutboundCallRequest {
            agent_id: agent_id.to_string(),
            from_number: from_number.to_string(),
            to_number: to_number.to_string(),
            dynamic_variables: build_dynamic_variables(&due.contact, to_number, mappings),
            webhook_url: self.webhook_url.clone(),
            metadata: json!({
                "attempt_id": attempt_id,
                "campaign_id": campaign.id,
                "contact_id": contact_id,
            }),
        };

        match self.provider.place_call(&request).await {
            Ok(placed) => {
                let patch = AttemptPatch::succeeded(placed.call_id.clone(), placed.raw);
                self.record(attempt_id, patch).await;
                info!(
                    campaign_id = %campaign.id,
                    %contact_id,
                    %attempt_id,
                    call_id = %placed.call_id,
                    attempt_number = due.attempt_number,
                    "Call placed"
                );
                AttemptResult::Placed {
                    attempt_id,
                    call_id: placed.call_id,
                }
            }
            Err(e) => {
                self.record(attempt_id, AttemptPatch::failed(e.payload())).await;
                warn!(
                    campaign_id = %campaign.id,
                    %contact_id,
                    %attempt_id,
                    error = %e,
                    "Call placement failed"
                );
                AttemptResult::Failed {
                    attempt_id,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn record(&self, attempt_id: AttemptId, patch: AttemptPatch) {
        match self.attempts.update(attempt_id, patch).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(%attempt_id, "Attempt already terminal, update ignored");
            }
            Err(e) => {
                error!(%attempt_id, error = %e, "Failed to update attempt");
            }
        }
    }
}
