//! Repository layer for data access

pub mod attempts;
pub mod campaigns;
pub mod contacts;
pub mod credits;
pub mod rate_limits;

// Re-export store traits
pub use attempts::AttemptStore;
pub use campaigns::CampaignStore;
pub use contacts::ContactStore;
pub use credits::CreditLedger;
pub use rate_limits::RateLimitStore;

// Re-export Postgres implementations
pub use attempts::DbAttemptStore;
pub use campaigns::DbCampaignStore;
pub use contacts::DbContactStore;
pub use credits::DbCreditLedger;
pub use rate_limits::DbRateLimitStore;
