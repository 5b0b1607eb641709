//! Database models

use chrono::{DateTime, Utc};
use dialrust_common::types::{
    AccountId, AgentId, AttemptId, CampaignId, ContactGroupId, ContactId, ReservationId,
};
use serde::{Deserialize, Serialize};
pub use sqlx::types::Json;
use sqlx::FromRow;

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Paused,
    Scheduled,
    Stopped,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Active => write!(f, "active"),
            CampaignStatus::Paused => write!(f, "paused"),
            CampaignStatus::Scheduled => write!(f, "scheduled"),
            CampaignStatus::Stopped => write!(f, "stopped"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CampaignStatus::Active),
            "paused" => Ok(CampaignStatus::Paused),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "stopped" => Ok(CampaignStatus::Stopped),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Why a campaign is paused
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PauseReason {
    OutsideCallingHours,
    InsufficientCredits,
    /// Any reason set outside the dialer (manual pause, admin action)
    Other(String),
}

impl PauseReason {
    pub fn as_str(&self) -> &str {
        match self {
            PauseReason::OutsideCallingHours => "outside_calling_hours",
            PauseReason::InsufficientCredits => "insufficient_credits",
            PauseReason::Other(reason) => reason,
        }
    }

    /// Parse a stored reason, accepting spaced and underscored spellings
    pub fn parse(s: &str) -> Self {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "outside_calling_hours" => PauseReason::OutsideCallingHours,
            "insufficient_credits" => PauseReason::InsufficientCredits,
            _ => PauseReason::Other(s.to_string()),
        }
    }
}

impl std::fmt::Display for PauseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Campaign model, joined with its outbound agent
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub account_id: AccountId,
    pub name: String,
    pub status: String,
    pub paused_reason: Option<String>,
    /// IANA timezone name
    pub timezone: String,
    /// Weekday tokens ("mon", "tuesday", ...)
    pub active_days: Json<Vec<String>>,
    /// Local time of day, "HH:MM"
    pub calling_hours_start: String,
    pub calling_hours_end: String,
    pub concurrent_calls: i32,
    pub max_retry_days: i32,
    /// Attempts allowed per contact per day
    pub retry_attempts: i32,
    /// Minutes between same-day attempts
    pub retry_interval: i32,
    pub contact_group_id: ContactGroupId,
    pub agent_id: Option<AgentId>,
    /// Agent identity at the telephony provider
    pub provider_agent_id: Option<String>,
    /// Number (or provider number id) calls are placed from
    pub outbound_phone_number: Option<String>,
    pub scheduled_start_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Parse status string to enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }

    pub fn pause_reason(&self) -> Option<PauseReason> {
        self.paused_reason.as_deref().map(PauseReason::parse)
    }
}

/// CSV header to call-variable mapping for a contact group
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FieldMapping {
    pub id: uuid::Uuid,
    pub contact_group_id: ContactGroupId,
    pub csv_header: String,
    pub variable_name: String,
}

/// Contact model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub contact_group_id: ContactGroupId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    /// Phone numbers in dialing order
    pub phones: Json<Vec<String>>,
    /// Raw CSV fields keyed by header
    pub custom_fields: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    pub fn total_phones(&self) -> i32 {
        self.phones.0.len() as i32
    }

    pub fn phone(&self, index: i32) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.phones.0.get(i))
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
    }
}

/// A contact selected for dialing, with its position in the retry sequence
#[derive(Debug, Clone)]
pub struct DueContact {
    pub contact: Contact,
    pub phone_index: i32,
    pub total_phones: i32,
    pub attempt_number: i32,
    /// Whole days since the first attempt (0 for the first)
    pub attempt_day: i32,
    /// Attempts already made today
    pub attempts_today: i32,
}

impl DueContact {
    /// Derive the next attempt's position from the contact's attempt history
    pub fn from_history(
        contact: Contact,
        prior_attempts: i64,
        attempts_today: i64,
        first_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let total_phones = contact.total_phones();
        let prior = prior_attempts.max(0) as i32;
        let phone_index = if total_phones > 0 { prior % total_phones } else { 0 };
        let attempt_day = first_attempt_at
            .map(|first| (now - first).num_days().max(0) as i32)
            .unwrap_or(0);

        Self {
            contact,
            phone_index,
            total_phones,
            attempt_number: prior + 1,
            attempt_day,
            attempts_today: attempts_today.max(0) as i32,
        }
    }

    pub fn phone(&self) -> Option<&str> {
        self.contact.phone(self.phone_index)
    }
}

/// Attempt status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptStatus {
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

impl AttemptStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptStatus::InProgress => write!(f, "in-progress"),
            AttemptStatus::Succeeded => write!(f, "succeeded"),
            AttemptStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-progress" => Ok(AttemptStatus::InProgress),
            "succeeded" => Ok(AttemptStatus::Succeeded),
            "failed" => Ok(AttemptStatus::Failed),
            _ => Err(format!("Invalid attempt status: {}", s)),
        }
    }
}

/// Campaign contact attempt model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CampaignContactAttempt {
    pub id: AttemptId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub phone_number: String,
    pub phone_index: i32,
    pub total_phones: i32,
    pub attempt_number: i32,
    pub attempt_day: i32,
    pub status: String,
    pub provider_call_id: Option<String>,
    pub provider_response: Option<serde_json::Value>,
    /// Reported later by the call-status webhook
    pub call_outcome: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create attempt input
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub phone_number: String,
    pub phone_index: i32,
    pub total_phones: i32,
    pub attempt_number: i32,
    pub attempt_day: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Terminal update for an in-progress attempt
#[derive(Debug, Clone)]
pub struct AttemptPatch {
    pub status: AttemptStatus,
    pub provider_call_id: Option<String>,
    pub provider_response: Option<serde_json::Value>,
}

impl AttemptPatch {
    pub fn succeeded(call_id: impl Into<String>, response: serde_json::Value) -> Self {
        Self {
            status: AttemptStatus::Succeeded,
            provider_call_id: Some(call_id.into()),
            provider_response: Some(response),
        }
    }

    pub fn failed(payload: serde_json::Value) -> Self {
        Self {
            status: AttemptStatus::Failed,
            provider_call_id: None,
            provider_response: Some(payload),
        }
    }
}

/// Balance warning level reported by the credit ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    Ok,
    Warning,
    Critical,
}

impl WarningLevel {
    pub fn from_balance(balance: f64, warning_threshold: f64, critical_threshold: f64) -> Self {
        if balance < critical_threshold {
            WarningLevel::Critical
        } else if balance < warning_threshold {
            WarningLevel::Warning
        } else {
            WarningLevel::Ok
        }
    }
}

impl std::fmt::Display for WarningLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarningLevel::Ok => write!(f, "ok"),
            WarningLevel::Warning => write!(f, "warning"),
            WarningLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Result of a credit reservation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditReservation {
    /// Hold to release when the tick places nothing; `None` when rejected
    pub reservation_id: Option<ReservationId>,
    pub success: bool,
    pub can_proceed: bool,
    pub current_balance: f64,
    pub warning_level: WarningLevel,
    /// `Some(false)` when the account opted out of auto-pause
    pub auto_pause: Option<bool>,
}

impl CreditReservation {
    pub fn admitted(&self) -> bool {
        self.success && self.can_proceed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn contact(phones: &[&str]) -> Contact {
        Contact {
            id: Uuid::new_v4(),
            contact_group_id: Uuid::new_v4(),
            first_name: Some("Ada".to_string()),
            last_name: None,
            email: None,
            address: None,
            phones: Json(phones.iter().map(|p| p.to_string()).collect()),
            custom_fields: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_pause_reason_parse() {
        assert_eq!(
            PauseReason::parse("insufficient credits"),
            PauseReason::InsufficientCredits
        );
        assert_eq!(
            PauseReason::parse("outside_calling_hours"),
            PauseReason::OutsideCallingHours
        );
        assert_eq!(
            PauseReason::parse("manual"),
            PauseReason::Other("manual".to_string())
        );
    }

    #[test]
    fn test_status_roundtrip_strings() {
        assert_eq!("in-progress".parse::<AttemptStatus>(), Ok(AttemptStatus::InProgress));
        assert_eq!(AttemptStatus::InProgress.to_string(), "in-progress");
        assert!(AttemptStatus::Failed.is_terminal());
        assert_eq!("paused".parse::<CampaignStatus>(), Ok(CampaignStatus::Paused));
        assert!("archived".parse::<CampaignStatus>().is_err());
    }

    #[test]
    fn test_due_contact_rotates_phones() {
        let now = Utc.with_ymd_and_hms(2024, 3, 6, 15, 0, 0).unwrap();
        let first = now - Duration::days(2) - Duration::hours(1);

        let due = DueContact::from_history(contact(&["+1555", "+1666"]), 3, 1, Some(first), now);
        assert_eq!(due.phone_index, 1);
        assert_eq!(due.total_phones, 2);
        assert_eq!(due.attempt_number, 4);
        assert_eq!(due.attempt_day, 2);
        assert_eq!(due.phone(), Some("+1666"));

        let fresh = DueContact::from_history(contact(&["+1555"]), 0, 0, None, now);
        assert_eq!(fresh.attempt_number, 1);
        assert_eq!(fresh.attempt_day, 0);
        assert_eq!(fresh.phone(), Some("+1555"));
    }

    #[test]
    fn test_due_contact_without_phones() {
        let due = DueContact::from_history(contact(&[]), 2, 0, None, Utc::now());
        assert_eq!(due.phone_index, 0);
        assert_eq!(due.phone(), None);

        let blank = DueContact::from_history(contact(&["  "]), 0, 0, None, Utc::now());
        assert_eq!(blank.phone(), None);
    }

    #[test]
    fn test_warning_level_thresholds() {
        assert_eq!(WarningLevel::from_balance(50.0, 20.0, 5.0), WarningLevel::Ok);
        assert_eq!(WarningLevel::from_balance(10.0, 20.0, 5.0), WarningLevel::Warning);
        assert_eq!(WarningLevel::from_balance(1.0, 20.0, 5.0), WarningLevel::Critical);
    }
}
