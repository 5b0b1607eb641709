//! Campaign dialer
//!
//! Turns active campaigns and due contacts into a bounded, rate-limited,
//! credit-gated stream of outbound calls, with attempt bookkeeping.

pub mod admission;
pub mod concurrency;
pub mod dispatcher;
pub mod rate_limiter;
pub mod retry;
pub mod scheduler;
pub mod selector;
pub mod state;
pub mod sweeper;
pub mod variables;
pub mod window;

#[cfg(test)]
pub(crate) mod fakes;

pub use admission::{AdmissionController, AdmissionDecision, BalanceNotifier, HttpBalanceNotifier};
pub use concurrency::ConcurrencyGovernor;
pub use dispatcher::{AttemptResult, CallDispatcher, SkipReason};
pub use rate_limiter::{
    CallRateLimiter, LocalRateLimiter, RateLimits, RemainingQuota, SharedRateLimiter,
};
pub use scheduler::{Dialer, DialerDeps, DialerSettings, TickReport};
pub use selector::ContactSelector;
pub use state::{transition, CampaignEvent, CampaignState};
pub use sweeper::{ReconciliationSweeper, SweepReport};
pub use window::{is_within_calling_hours, next_calling_time, CallingWindow, WindowError};

use thiserror::Error;

/// Dialer errors at campaign or tick scope
#[derive(Error, Debug)]
pub enum DialerError {
    #[error("Store error: {0}")]
    Store(#[from] dialrust_common::Error),

    #[error("Calling window error: {0}")]
    Window(#[from] WindowError),

    #[error("Invalid dialer configuration: {0}")]
    Config(String),
}
