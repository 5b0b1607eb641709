//! Telephony provider interface
//!
//! The dialer only needs one operation from the provider: place an outbound
//! call and get back the provider's call identifier.

mod client;

pub use client::HttpTelephonyClient;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Outbound call request
#[derive(Debug, Clone, Serialize)]
pub struct OutboundCallRequest {
    /// Agent identity at the provider
    pub agent_id: String,
    pub from_number: String,
    pub to_number: String,
    pub dynamic_variables: BTreeMap<String, String>,
    /// Call-status callback
    pub webhook_url: String,
    /// Echoed back on the callback for reconciliation
    pub metadata: Value,
}

/// An accepted call placement
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedCall {
    pub call_id: String,
    /// Raw provider response
    pub raw: Value,
}

/// Provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider rejected call with status {status}")]
    Rejected { status: u16, body: Value },

    #[error("Provider transport error: {0}")]
    Transport(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Payload recorded on the failed attempt
    pub fn payload(&self) -> Value {
        match self {
            ProviderError::Rejected { status, body } => json!({
                "error": "rejected",
                "status": status,
                "body": body,
            }),
            ProviderError::Transport(message) => json!({
                "error": "transport",
                "message": message,
            }),
            ProviderError::InvalidResponse(message) => json!({
                "error": "invalid_response",
                "message": message,
            }),
        }
    }
}

/// Telephony provider
#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    async fn place_call(&self, request: &OutboundCallRequest) -> Result<PlacedCall, ProviderError>;
}
