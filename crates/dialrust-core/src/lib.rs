//! DialRust Core - Campaign dialer and admission scheduler
//!
//! This crate provides the dialer control loop: calling windows, credit
//! admission, rate and concurrency limits, contact selection, call dispatch
//! and reconciliation, plus the telephony provider client.

pub mod dialer;
pub mod telephony;

pub use dialer::{
    AttemptResult, CallingWindow, CampaignEvent, CampaignState, Dialer, DialerDeps, DialerError,
    DialerSettings, HttpBalanceNotifier, LocalRateLimiter, RateLimits, SharedRateLimiter,
    TickReport,
};
pub use telephony::{HttpTelephonyClient, OutboundCallRequest, PlacedCall, ProviderError, TelephonyProvider};
