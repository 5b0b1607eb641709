//! Configuration for DialRust

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "DIALRUST_CONFIG";

/// Prefix for environment overrides (`DIALRUST__DIALER__TICK_INTERVAL_SECS=30`)
pub const ENV_PREFIX: &str = "DIALRUST";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Dialer loop configuration
    #[serde(default)]
    pub dialer: DialerConfig,

    /// Per-campaign call rate limits
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Telephony provider configuration
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Billing side-notifications
    #[serde(default)]
    pub billing: BillingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the health and trigger endpoints
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Bearer token required by `POST /dialer/tick` when set
    pub trigger_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            trigger_token: None,
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:8090".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (postgres)
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

/// Dialer loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialerConfig {
    /// Interval between ticks in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Attempts created within this many seconds count as in flight
    #[serde(default = "default_in_flight_window")]
    pub in_flight_window_secs: i64,

    /// In-progress attempts older than this are failed by the sweeper
    #[serde(default = "default_stale_attempt_timeout")]
    pub stale_attempt_timeout_secs: i64,

    /// Flat credit ceiling reserved once per campaign per tick
    #[serde(default = "default_estimated_call_cost")]
    pub estimated_call_cost: f64,

    /// Timezone used when a campaign's timezone cannot be parsed
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Status callback URL handed to the telephony provider
    #[serde(default = "default_webhook_url")]
    pub webhook_url: String,

    /// Run the periodic tick loop inside the server process
    #[serde(default = "default_run_loop")]
    pub run_loop: bool,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            in_flight_window_secs: default_in_flight_window(),
            stale_attempt_timeout_secs: default_stale_attempt_timeout(),
            estimated_call_cost: default_estimated_call_cost(),
            default_timezone: default_timezone(),
            webhook_url: default_webhook_url(),
            run_loop: default_run_loop(),
        }
    }
}

fn default_tick_interval() -> u64 {
    60
}

fn default_in_flight_window() -> i64 {
    60
}

fn default_stale_attempt_timeout() -> i64 {
    10 * 60
}

fn default_estimated_call_cost() -> f64 {
    1.0
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_webhook_url() -> String {
    "http://localhost:8080/api/webhooks/call-status".to_string()
}

fn default_run_loop() -> bool {
    true
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Limiter backend: "memory" (process-local) or "database" (shared)
    #[serde(default = "default_rate_limit_backend")]
    pub backend: String,

    /// Calls initiated per campaign per minute
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,

    /// Calls initiated per campaign per hour (reported, not enforced)
    #[serde(default = "default_per_hour")]
    pub per_hour: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            backend: default_rate_limit_backend(),
            per_minute: default_per_minute(),
            per_hour: default_per_hour(),
        }
    }
}

fn default_rate_limit_backend() -> String {
    "memory".to_string()
}

fn default_per_minute() -> u32 {
    10
}

fn default_per_hour() -> u32 {
    300
}

/// Telephony provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    /// Provider API base URL
    #[serde(default = "default_telephony_url")]
    pub base_url: String,

    /// API key sent with every request
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_telephony_timeout")]
    pub timeout_secs: u64,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            base_url: default_telephony_url(),
            api_key: None,
            timeout_secs: default_telephony_timeout(),
        }
    }
}

fn default_telephony_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_telephony_timeout() -> u64 {
    30
}

/// Billing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Endpoint notified (best effort) when a reservation reports a low balance
    pub auto_reload_url: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file (optional) overlaid with environment variables
    pub fn load() -> crate::Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .ok()
            .or_else(|| {
                [
                    PathBuf::from("./config.toml"),
                    PathBuf::from("/etc/dialrust/config.toml"),
                ]
                .into_iter()
                .find(|p| p.exists())
            });

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the dialer cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.dialer.tick_interval_secs == 0 {
            return Err(crate::Error::Config(
                "dialer.tick_interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.dialer.default_timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(crate::Error::Config(format!(
                "dialer.default_timezone '{}' is not a valid IANA timezone",
                self.dialer.default_timezone
            )));
        }

        if self.dialer.estimated_call_cost < 0.0 {
            return Err(crate::Error::Config(
                "dialer.estimated_call_cost must not be negative".to_string(),
            ));
        }

        match self.rate_limit.backend.as_str() {
            "memory" | "database" => {}
            other => {
                return Err(crate::Error::Config(format!(
                    "Unsupported rate limit backend: {}",
                    other
                )))
            }
        }

        Ok(())
    }
}
