//! Common types for DialRust

use uuid::Uuid;

/// Unique identifier for accounts (credit owners)
pub type AccountId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for contacts
pub type ContactId = Uuid;

/// Unique identifier for contact groups
pub type ContactGroupId = Uuid;

/// Unique identifier for agents
pub type AgentId = Uuid;

/// Unique identifier for call attempts
pub type AttemptId = Uuid;

/// Unique identifier for credit holds
pub type ReservationId = Uuid;
