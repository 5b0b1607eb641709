//! In-memory collaborators for dialer tests

use crate::dialer::admission::BalanceNotifier;
use crate::telephony::{OutboundCallRequest, PlacedCall, ProviderError, TelephonyProvider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialrust_common::types::{AccountId, AttemptId, CampaignId, ContactGroupId, ReservationId};
use dialrust_common::{Error, Result};
use dialrust_storage::models::{
    AttemptPatch, AttemptStatus, Campaign, CampaignContactAttempt, CampaignStatus, Contact,
    CreditReservation, DueContact, FieldMapping, Json, NewAttempt, PauseReason, WarningLevel,
};
use dialrust_storage::repository::{
    AttemptStore, CampaignStore, ContactStore, CreditLedger, RateLimitStore,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Active weekday campaign, 09:00-17:00 UTC, bound to an agent and number
pub fn campaign() -> Campaign {
    let now = Utc::now();
    Campaign {
        id: Uuid::new_v4(),
        account_id: Uuid::new_v4(),
        name: "Renewals".to_string(),
        status: "active".to_string(),
        paused_reason: None,
        timezone: "UTC".to_string(),
        active_days: Json(
            ["mon", "tue", "wed", "thu", "fri"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
        ),
        calling_hours_start: "09:00".to_string(),
        calling_hours_end: "17:00".to_string(),
        concurrent_calls: 5,
        max_retry_days: 3,
        retry_attempts: 3,
        retry_interval: 60,
        contact_group_id: Uuid::new_v4(),
        agent_id: Some(Uuid::new_v4()),
        provider_agent_id: Some("agent_1".to_string()),
        outbound_phone_number: Some("+15550000".to_string()),
        scheduled_start_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn contact(phones: &[&str]) -> Contact {
    Contact {
        id: Uuid::new_v4(),
        contact_group_id: Uuid::new_v4(),
        first_name: Some("Ada".to_string()),
        last_name: None,
        email: None,
        address: None,
        phones: Json(phones.iter().map(|p| p.to_string()).collect()),
        custom_fields: json!({}),
        created_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct MemoryCampaignStore {
    campaigns: Mutex<Vec<Campaign>>,
    mappings: Mutex<HashMap<ContactGroupId, Vec<FieldMapping>>>,
    fail_listing: AtomicBool,
}

impl MemoryCampaignStore {
    /// Insert, or replace the campaign with the same id
    pub fn insert(&self, campaign: Campaign) {
        let mut campaigns = self.campaigns.lock().unwrap();
        match campaigns.iter_mut().find(|c| c.id == campaign.id) {
            Some(existing) => *existing = campaign,
            None => campaigns.push(campaign),
        }
    }

    pub fn get(&self, id: CampaignId) -> Option<Campaign> {
        self.campaigns
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn set_mappings(&self, group_id: ContactGroupId, mappings: Vec<FieldMapping>) {
        self.mappings.lock().unwrap().insert(group_id, mappings);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    fn filtered(&self, keep: impl Fn(&Campaign) -> bool) -> Result<Vec<Campaign>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::Database("connection refused".to_string()));
        }
        Ok(self
            .campaigns
            .lock()
            .unwrap()
            .iter()
            .filter(|c| keep(c))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CampaignStore for MemoryCampaignStore {
    async fn list_active(&self) -> Result<Vec<Campaign>> {
        self.filtered(|c| c.status == "active")
    }

    async fn list_paused(&self, reason: &PauseReason) -> Result<Vec<Campaign>> {
        self.filtered(|c| c.status == "paused" && c.pause_reason().as_ref() == Some(reason))
    }

    async fn list_scheduled_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        self.filtered(|c| {
            c.status == "scheduled" && c.scheduled_start_at.map_or(false, |at| at <= now)
        })
    }

    async fn set_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        reason: Option<&PauseReason>,
    ) -> Result<()> {
        let mut campaigns = self.campaigns.lock().unwrap();
        let campaign = campaigns
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("campaign {}", id)))?;
        campaign.status = status.to_string();
        campaign.paused_reason = reason.map(|r| r.as_str().to_string());
        campaign.updated_at = Utc::now();
        Ok(())
    }

    async fn field_mappings(&self, group_id: ContactGroupId) -> Result<Vec<FieldMapping>> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .get(&group_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Serves contacts in insertion order. When linked to an attempt store it
/// applies the same eligibility rules as the database query.
#[derive(Default)]
pub struct MemoryContactStore {
    contacts: Mutex<Vec<Contact>>,
    attempts: Option<Arc<MemoryAttemptStore>>,
    queries: AtomicUsize,
}

impl MemoryContactStore {
    pub fn with_attempts(mut self, attempts: Arc<MemoryAttemptStore>) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn push(&self, contact: Contact) {
        self.contacts.lock().unwrap().push(contact);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn next_due(
        &self,
        campaign_id: CampaignId,
        limit: i64,
        max_retry_days: i32,
        now: DateTime<Utc>,
        day_start: DateTime<Utc>,
    ) -> Result<Vec<DueContact>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let contacts = self.contacts.lock().unwrap().clone();

        let mut due = Vec::new();
        for contact in contacts {
            if due.len() as i64 >= limit {
                break;
            }

            let history: Vec<CampaignContactAttempt> = self
                .attempts
                .as_ref()
                .map(|store| {
                    store
                        .all()
                        .into_iter()
                        .filter(|a| a.campaign_id == campaign_id && a.contact_id == contact.id)
                        .collect()
                })
                .unwrap_or_default();

            if history.iter().any(|a| a.status == "in-progress") {
                continue;
            }
            if history.iter().any(|a| a.call_outcome.as_deref() == Some("answered")) {
                continue;
            }
            let first = history.iter().map(|a| a.created_at).min();
            if first.map_or(false, |f| (now - f).num_days() >= max_retry_days as i64) {
                continue;
            }
            let latest_retry = history
                .iter()
                .max_by_key(|a| a.created_at)
                .and_then(|a| a.next_retry_at);
            if latest_retry.map_or(false, |at| at > now) {
                continue;
            }

            let today_count = history
                .iter()
                .filter(|a| a.created_at >= day_start)
                .count();
            due.push(DueContact::from_history(
                contact,
                history.len() as i64,
                today_count as i64,
                first,
                now,
            ));
        }
        Ok(due)
    }
}

#[derive(Default)]
pub struct MemoryAttemptStore {
    attempts: Mutex<Vec<CampaignContactAttempt>>,
    fail_creates: AtomicBool,
}

impl MemoryAttemptStore {
    /// In-progress attempt for a fresh contact
    pub fn seed_in_progress(&self, campaign_id: CampaignId, created_at: DateTime<Utc>) -> AttemptId {
        let id = Uuid::new_v4();
        self.attempts.lock().unwrap().push(CampaignContactAttempt {
            id,
            campaign_id,
            contact_id: Uuid::new_v4(),
            phone_number: "+15559999".to_string(),
            phone_index: 0,
            total_phones: 1,
            attempt_number: 1,
            attempt_day: 0,
            status: AttemptStatus::InProgress.to_string(),
            provider_call_id: None,
            provider_response: None,
            call_outcome: None,
            next_retry_at: None,
            created_at,
            updated_at: created_at,
        });
        id
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<CampaignContactAttempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn status_of(&self, id: AttemptId) -> Option<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.status.clone())
    }

    /// Put every attempt back in progress, as if no outcome was reported
    pub fn reopen_all(&self) {
        for attempt in self.attempts.lock().unwrap().iter_mut() {
            attempt.status = AttemptStatus::InProgress.to_string();
        }
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn create(&self, attempt: NewAttempt) -> Result<AttemptId> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(Error::Database("insert failed".to_string()));
        }

        let mut attempts = self.attempts.lock().unwrap();
        if attempts.iter().any(|a| {
            a.campaign_id == attempt.campaign_id
                && a.contact_id == attempt.contact_id
                && a.status == "in-progress"
        }) {
            return Err(Error::Conflict(format!(
                "contact {} already has an in-progress attempt",
                attempt.contact_id
            )));
        }

        let id = Uuid::now_v7();
        attempts.push(CampaignContactAttempt {
            id,
            campaign_id: attempt.campaign_id,
            contact_id: attempt.contact_id,
            phone_number: attempt.phone_number,
            phone_index: attempt.phone_index,
            total_phones: attempt.total_phones,
            attempt_number: attempt.attempt_number,
            attempt_day: attempt.attempt_day,
            status: AttemptStatus::InProgress.to_string(),
            provider_call_id: None,
            provider_response: None,
            call_outcome: None,
            next_retry_at: attempt.next_retry_at,
            created_at: attempt.created_at,
            updated_at: attempt.created_at,
        });
        Ok(id)
    }

    async fn update(&self, id: AttemptId, patch: AttemptPatch) -> Result<bool> {
        let mut attempts = self.attempts.lock().unwrap();
        let Some(attempt) = attempts
            .iter_mut()
            .find(|a| a.id == id && a.status == "in-progress")
        else {
            return Ok(false);
        };

        attempt.status = patch.status.to_string();
        if patch.provider_call_id.is_some() {
            attempt.provider_call_id = patch.provider_call_id;
        }
        if patch.provider_response.is_some() {
            attempt.provider_response = patch.provider_response;
        }
        attempt.updated_at = Utc::now();
        Ok(true)
    }

    async fn count_in_progress_since(
        &self,
        campaign_id: CampaignId,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(self
            .attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| {
                a.campaign_id == campaign_id && a.status == "in-progress" && a.created_at >= since
            })
            .count() as i64)
    }

    async fn fail_stale_in_progress(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut count = 0;
        for attempt in self.attempts.lock().unwrap().iter_mut() {
            if attempt.status == "in-progress" && attempt.created_at < older_than {
                attempt.status = AttemptStatus::Failed.to_string();
                attempt.provider_response = Some(json!({ "error": "stale attempt timed out" }));
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Balances with fixed thresholds of 20 (warning) and 5 (critical).
/// Reservations are holds against the balance until released.
#[derive(Default)]
pub struct MemoryCreditLedger {
    accounts: Mutex<HashMap<AccountId, (f64, Option<bool>)>>,
    holds: Mutex<HashMap<ReservationId, (AccountId, f64)>>,
    reservations: AtomicUsize,
}

impl MemoryCreditLedger {
    pub fn set_account(&self, account_id: AccountId, balance: f64, auto_pause: Option<bool>) {
        self.accounts
            .lock()
            .unwrap()
            .insert(account_id, (balance, auto_pause));
    }

    /// Accepted reservations so far
    pub fn reservations(&self) -> usize {
        self.reservations.load(Ordering::SeqCst)
    }

    /// Credit currently held for an account
    pub fn held(&self, account_id: AccountId) -> f64 {
        self.holds
            .lock()
            .unwrap()
            .values()
            .filter(|(owner, _)| *owner == account_id)
            .map(|(_, amount)| *amount)
            .sum()
    }
}

#[async_trait]
impl CreditLedger for MemoryCreditLedger {
    async fn reserve(&self, account_id: AccountId, amount: f64) -> Result<CreditReservation> {
        let (balance, auto_pause) = self
            .accounts
            .lock()
            .unwrap()
            .get(&account_id)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("account {}", account_id)))?;

        let available = balance - self.held(account_id);
        if available < amount {
            return Ok(CreditReservation {
                reservation_id: None,
                success: false,
                can_proceed: false,
                current_balance: available,
                warning_level: WarningLevel::Critical,
                auto_pause,
            });
        }

        let reservation_id = Uuid::new_v4();
        self.holds
            .lock()
            .unwrap()
            .insert(reservation_id, (account_id, amount));
        self.reservations.fetch_add(1, Ordering::SeqCst);

        let remaining = available - amount;
        Ok(CreditReservation {
            reservation_id: Some(reservation_id),
            success: true,
            can_proceed: true,
            current_balance: remaining,
            warning_level: WarningLevel::from_balance(remaining, 20.0, 5.0),
            auto_pause,
        })
    }

    async fn release(&self, reservation_id: ReservationId) -> Result<bool> {
        Ok(self.holds.lock().unwrap().remove(&reservation_id).is_some())
    }
}

#[derive(Default)]
pub struct MemoryRateLimitStore {
    windows: Mutex<HashMap<(CampaignId, DateTime<Utc>), i64>>,
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn increment_window(
        &self,
        campaign_id: CampaignId,
        window_start: DateTime<Utc>,
        limit: i32,
    ) -> Result<Option<i64>> {
        let mut windows = self.windows.lock().unwrap();
        let count = windows.entry((campaign_id, window_start)).or_insert(0);
        if *count >= limit as i64 {
            return Ok(None);
        }
        *count += 1;
        Ok(Some(*count))
    }

    async fn window_count(
        &self,
        campaign_id: CampaignId,
        window_start: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(self
            .windows
            .lock()
            .unwrap()
            .get(&(campaign_id, window_start))
            .copied()
            .unwrap_or(0))
    }

    async fn count_since(&self, campaign_id: CampaignId, since: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .windows
            .lock()
            .unwrap()
            .iter()
            .filter(|((id, start), _)| *id == campaign_id && *start >= since)
            .map(|(_, count)| *count)
            .sum())
    }

    async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut windows = self.windows.lock().unwrap();
        let before = windows.len();
        windows.retain(|(_, start), _| *start >= cutoff);
        Ok((before - windows.len()) as u64)
    }
}

/// Records requests; fails the next N calls with a 500 when asked
#[derive(Default)]
pub struct FakeProvider {
    requests: Mutex<Vec<OutboundCallRequest>>,
    failures: AtomicUsize,
}

impl FakeProvider {
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<OutboundCallRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelephonyProvider for FakeProvider {
    async fn place_call(
        &self,
        request: &OutboundCallRequest,
    ) -> std::result::Result<PlacedCall, ProviderError> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };

        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if fail {
            return Err(ProviderError::Rejected {
                status: 500,
                body: json!({ "error": "upstream unavailable" }),
            });
        }

        let call_id = format!("call-{}", n);
        Ok(PlacedCall {
            raw: json!({ "call_id": call_id }),
            call_id,
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(AccountId, WarningLevel)>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<(AccountId, WarningLevel)> {
        self.calls.lock().unwrap().clone()
    }
}

impl BalanceNotifier for RecordingNotifier {
    fn notify_low_balance(&self, account_id: AccountId, _balance: f64, level: WarningLevel) {
        self.calls.lock().unwrap().push((account_id, level));
    }
}
