//! Campaign lifecycle as an explicit state machine
//!
//! The stored `status` / `paused_reason` pair is decoded into a
//! [`CampaignState`], and every status write the dialer makes is the result of
//! [`transition`]. The function is pure so the rules can be tested without I/O.

use dialrust_common::Result;
use dialrust_storage::models::{Campaign, CampaignStatus, PauseReason};
use dialrust_storage::repository::CampaignStore;
use tracing::info;

/// Decoded campaign state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CampaignState {
    Active,
    Paused(PauseReason),
    Scheduled,
    Stopped,
}

/// Events the dialer raises against a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignEvent {
    /// Now is outside the calling window
    WindowClosed,
    /// Now is inside the calling window
    WindowOpened,
    /// Credit reservation rejected with auto-pause enabled
    CreditsExhausted,
    /// Scheduled start time reached
    StartDue,
    Stop,
}

impl CampaignState {
    /// Decode from a campaign row; unknown statuses decode as `None`
    pub fn of(campaign: &Campaign) -> Option<Self> {
        let state = match campaign.status_enum()? {
            CampaignStatus::Active => CampaignState::Active,
            CampaignStatus::Paused => CampaignState::Paused(
                campaign
                    .pause_reason()
                    .unwrap_or_else(|| PauseReason::Other(String::new())),
            ),
            CampaignStatus::Scheduled => CampaignState::Scheduled,
            CampaignStatus::Stopped => CampaignState::Stopped,
        };
        Some(state)
    }

    /// Split into the stored status and reason columns
    pub fn into_parts(self) -> (CampaignStatus, Option<PauseReason>) {
        match self {
            CampaignState::Active => (CampaignStatus::Active, None),
            CampaignState::Paused(reason) => (CampaignStatus::Paused, Some(reason)),
            CampaignState::Scheduled => (CampaignStatus::Scheduled, None),
            CampaignState::Stopped => (CampaignStatus::Stopped, None),
        }
    }
}

/// Next state for `event`, or `None` when the event does not change the state
pub fn transition(state: &CampaignState, event: CampaignEvent) -> Option<CampaignState> {
    use CampaignEvent::*;
    use CampaignState::*;

    match (state, event) {
        (Stopped, _) => None,
        (_, Stop) => Some(Stopped),

        (Active, WindowClosed) => Some(Paused(PauseReason::OutsideCallingHours)),
        (Active, CreditsExhausted) => Some(Paused(PauseReason::InsufficientCredits)),
        (Active, _) => None,

        // Only the dialer's own hours pause is lifted automatically
        (Paused(PauseReason::OutsideCallingHours), WindowOpened) => Some(Active),
        (Paused(_), _) => None,

        (Scheduled, StartDue) => Some(Active),
        (Scheduled, _) => None,
    }
}

/// Apply `event` to a stored campaign and persist the new status.
///
/// Returns the new state, or `None` when nothing changed.
pub async fn apply_event(
    store: &dyn CampaignStore,
    campaign: &Campaign,
    event: CampaignEvent,
) -> Result<Option<CampaignState>> {
    let Some(current) = CampaignState::of(campaign) else {
        return Ok(None);
    };
    let Some(next) = transition(&current, event) else {
        return Ok(None);
    };

    let (status, reason) = next.clone().into_parts();
    store.set_status(campaign.id, status, reason.as_ref()).await?;
    info!(
        campaign_id = %campaign.id,
        from = %campaign.status,
        to = %status,
        reason = reason.as_ref().map(|r| r.as_str()).unwrap_or(""),
        ?event,
        "Campaign status changed"
    );
    Ok(Some(next))
}
