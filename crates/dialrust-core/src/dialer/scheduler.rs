//! Dialer - Periodic driver over every active campaign
//!
//! One tick sweeps stale state, then walks active campaigns one at a time:
//! calling window, credit admission, rate limit, concurrency slots, contact
//! selection and dispatch. Failures are contained per contact and per
//! campaign; only failing to list active campaigns fails the tick.

use super::admission::{AdmissionController, BalanceNotifier};
use super::concurrency::ConcurrencyGovernor;
use super::dispatcher::{AttemptResult, CallDispatcher};
use super::rate_limiter::CallRateLimiter;
use super::selector::ContactSelector;
use super::state::{apply_event, CampaignEvent};
use super::sweeper::ReconciliationSweeper;
use super::window::CallingWindow;
use super::DialerError;
use crate::telephony::TelephonyProvider;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use dialrust_common::config::DialerConfig;
use dialrust_storage::models::Campaign;
use dialrust_storage::repository::{AttemptStore, CampaignStore, ContactStore, CreditLedger};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Dialer timing and cost settings
#[derive(Debug, Clone)]
pub struct DialerSettings {
    pub tick_interval: StdDuration,
    /// Attempts newer than this count as in flight
    pub in_flight_window: Duration,
    /// In-progress attempts older than this are failed
    pub stale_timeout: Duration,
    /// Cost ceiling reserved once per campaign per tick
    pub estimated_call_cost: f64,
    /// Used when a campaign's timezone does not parse
    pub default_timezone: Tz,
    pub webhook_url: String,
}

impl DialerSettings {
    pub fn from_config(config: &DialerConfig) -> Result<Self, DialerError> {
        let default_timezone = config.default_timezone.parse::<Tz>().map_err(|_| {
            DialerError::Config(format!("unknown timezone {}", config.default_timezone))
        })?;

        Ok(Self {
            tick_interval: StdDuration::from_secs(config.tick_interval_secs.max(1)),
            in_flight_window: Duration::seconds(config.in_flight_window_secs),
            stale_timeout: Duration::seconds(config.stale_attempt_timeout_secs),
            estimated_call_cost: config.estimated_call_cost,
            default_timezone,
            webhook_url: config.webhook_url.clone(),
        })
    }
}

impl Default for DialerSettings {
    fn default() -> Self {
        Self {
            tick_interval: StdDuration::from_secs(60),
            in_flight_window: Duration::seconds(60),
            stale_timeout: Duration::minutes(10),
            estimated_call_cost: 1.0,
            default_timezone: Tz::UTC,
            webhook_url: String::new(),
        }
    }
}

/// Collaborators the dialer drives
#[derive(Clone)]
pub struct DialerDeps {
    pub campaigns: Arc<dyn CampaignStore>,
    pub contacts: Arc<dyn ContactStore>,
    pub attempts: Arc<dyn AttemptStore>,
    pub credits: Arc<dyn CreditLedger>,
    pub rate_limiter: Arc<dyn CallRateLimiter>,
    pub provider: Arc<dyn TelephonyProvider>,
    pub notifier: Option<Arc<dyn BalanceNotifier>>,
}

/// Counts for one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub campaigns_seen: usize,
    pub campaigns_processed: usize,
    pub calls_placed: usize,
    pub calls_failed: usize,
    pub calls_skipped: usize,
    pub campaigns_paused: usize,
    pub campaigns_resumed: usize,
    pub campaigns_started: usize,
    pub stale_attempts_failed: u64,
    pub rate_windows_cleaned: u64,
    pub campaign_errors: usize,
    pub sweep_errors: usize,
}

impl TickReport {
    pub fn log(&self) {
        info!(
            campaigns = self.campaigns_seen,
            processed = self.campaigns_processed,
            placed = self.calls_placed,
            failed = self.calls_failed,
            skipped = self.calls_skipped,
            paused = self.campaigns_paused,
            resumed = self.campaigns_resumed,
            started = self.campaigns_started,
            stale = self.stale_attempts_failed,
            errors = self.campaign_errors + self.sweep_errors,
            "Dialer tick complete"
        );
    }
}

/// Campaign dialer
pub struct Dialer {
    campaigns: Arc<dyn CampaignStore>,
    rate_limiter: Arc<dyn CallRateLimiter>,
    selector: ContactSelector,
    governor: ConcurrencyGovernor,
    admission: AdmissionController,
    dispatcher: CallDispatcher,
    sweeper: ReconciliationSweeper,
    settings: DialerSettings,
    /// Held for the length of a tick
    tick_lock: Mutex<()>,
}

impl Dialer {
    pub fn new(deps: DialerDeps, settings: DialerSettings) -> Self {
        let mut admission =
            AdmissionController::new(deps.credits.clone(), settings.estimated_call_cost);
        if let Some(notifier) = deps.notifier.clone() {
            admission = admission.with_notifier(notifier);
        }

        Self {
            campaigns: deps.campaigns.clone(),
            rate_limiter: deps.rate_limiter.clone(),
            selector: ContactSelector::new(deps.contacts.clone()),
            governor: ConcurrencyGovernor::new(deps.attempts.clone(), settings.in_flight_window),
            admission,
            dispatcher: CallDispatcher::new(
                deps.attempts.clone(),
                deps.provider.clone(),
                settings.webhook_url.clone(),
            ),
            sweeper: ReconciliationSweeper::new(
                deps.campaigns,
                deps.attempts,
                settings.stale_timeout,
                settings.default_timezone,
            ),
            settings,
            tick_lock: Mutex::new(()),
        }
    }

    /// Tick on a fixed interval until the task is dropped
    pub async fn run(&self) {
        let mut ticker = interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Dialer started (tick: {}s, stale timeout: {}s)",
            self.settings.tick_interval.as_secs(),
            self.settings.stale_timeout.num_seconds()
        );

        loop {
            ticker.tick().await;

            match self.try_tick(Utc::now()).await {
                Some(Ok(report)) => report.log(),
                Some(Err(e)) => error!(error = %e, "Dialer tick failed"),
                None => warn!("Previous dialer tick still running, skipping"),
            }
        }
    }

    /// Run a tick unless one is already running; `None` when refused
    pub async fn try_tick(&self, now: DateTime<Utc>) -> Option<Result<TickReport, DialerError>> {
        let _guard = self.tick_lock.try_lock().ok()?;
        Some(self.run_tick(now).await)
    }

    /// Run a tick, waiting for any running tick to finish first
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, DialerError> {
        let _guard = self.tick_lock.lock().await;
        self.run_tick(now).await
    }

    async fn run_tick(&self, now: DateTime<Utc>) -> Result<TickReport, DialerError> {
        let mut report = TickReport::default();

        let sweep = self.sweeper.sweep(now).await;
        report.stale_attempts_failed = sweep.stale_attempts_failed;
        report.campaigns_resumed = sweep.campaigns_resumed;
        report.campaigns_started = sweep.campaigns_started;
        report.sweep_errors = sweep.errors;

        match self.rate_limiter.cleanup(now).await {
            Ok(cleaned) => report.rate_windows_cleaned = cleaned,
            Err(e) => {
                warn!(error = %e, "Rate window cleanup failed");
                report.sweep_errors += 1;
            }
        }

        let campaigns = self.campaigns.list_active().await?;
        debug!(count = campaigns.len(), "Processing active campaigns");

        for campaign in &campaigns {
            report.campaigns_seen += 1;
            if let Err(e) = self.process_campaign(campaign, now, &mut report).await {
                error!(campaign_id = %campaign.id, error = %e, "Campaign processing failed");
                report.campaign_errors += 1;
            }
        }

        Ok(report)
    }

    async fn process_campaign(
        &self,
        campaign: &Campaign,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<(), DialerError> {
        let window = CallingWindow::for_campaign(campaign, self.settings.default_timezone)?;

        if !window.contains(now) {
            if apply_event(self.campaigns.as_ref(), campaign, CampaignEvent::WindowClosed)
                .await?
                .is_some()
            {
                report.campaigns_paused += 1;
                let next = window.next_calling_time(now);
                info!(
                    campaign_id = %campaign.id,
                    next_calling_time = next.as_deref().unwrap_or("none"),
                    "Outside calling hours, campaign paused"
                );
            }
            return Ok(());
        }

        if campaign.outbound_phone_number.as_deref().map_or(true, |n| n.trim().is_empty())
            || campaign.provider_agent_id.as_deref().map_or(true, |a| a.trim().is_empty())
        {
            warn!(
                campaign_id = %campaign.id,
                "Campaign has no outbound number or agent binding, skipping"
            );
            return Ok(());
        }

        let decision = self.admission.reserve_budget(campaign).await?;
        if !decision.proceed {
            if decision.pause
                && apply_event(self.campaigns.as_ref(), campaign, CampaignEvent::CreditsExhausted)
                    .await?
                    .is_some()
            {
                report.campaigns_paused += 1;
            }
            return Ok(());
        }

        // The hold only covers calls this tick actually places
        let outcome = self.dispatch_batch(campaign, &window, now, report).await;
        if !matches!(outcome, Ok(placed) if placed > 0) {
            if let Some(reservation_id) = decision.reservation_id {
                self.admission.release(campaign, reservation_id).await;
            }
        }
        outcome.map(|_| ())
    }

    /// Rate limit, slots, selection and dispatch for an admitted campaign.
    ///
    /// Returns the number of calls placed.
    async fn dispatch_batch(
        &self,
        campaign: &Campaign,
        window: &CallingWindow,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<i64, DialerError> {
        let quota = self.rate_limiter.remaining(campaign.id, now).await?;
        if quota.is_saturated() {
            debug!(campaign_id = %campaign.id, "Rate limit saturated, skipping");
            return Ok(0);
        }

        let slots = self.governor.available_slots(campaign, now).await?;
        if slots <= 0 {
            debug!(campaign_id = %campaign.id, "No concurrency slots, skipping");
            return Ok(0);
        }

        let limit = slots.min(quota.per_minute);
        let batch = self
            .selector
            .next_contacts(campaign, window, limit, now)
            .await?;
        report.campaigns_processed += 1;
        if batch.is_empty() {
            debug!(campaign_id = %campaign.id, "No contacts due");
            return Ok(0);
        }

        let mappings = self
            .campaigns
            .field_mappings(campaign.contact_group_id)
            .await?;

        let mut placed: i64 = 0;
        for due in &batch {
            if placed >= slots {
                break;
            }
            if !self.rate_limiter.try_admit(campaign.id, now).await? {
                debug!(campaign_id = %campaign.id, "Rate limit reached mid-batch");
                break;
            }

            match self
                .dispatcher
                .place_call(campaign, window, due, &mappings, now)
                .await
            {
                AttemptResult::Placed { .. } => {
                    placed += 1;
                    report.calls_placed += 1;
                }
                AttemptResult::Failed { .. } => report.calls_failed += 1,
                AttemptResult::Skipped(_) => report.calls_skipped += 1,
            }
        }

        info!(
            campaign_id = %campaign.id,
            slots,
            selected = batch.len(),
            placed,
            "Campaign processed"
        );
        Ok(placed)
    }
}
