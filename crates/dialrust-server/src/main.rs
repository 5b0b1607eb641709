//! DialRust - Campaign dialer entry point

mod api;

use anyhow::{Context, Result};
use dialrust_common::config::{Config, LoggingConfig};
use dialrust_core::dialer::{BalanceNotifier, CallRateLimiter};
use dialrust_core::{
    Dialer, DialerDeps, DialerSettings, HttpBalanceNotifier, HttpTelephonyClient,
    LocalRateLimiter, RateLimits, SharedRateLimiter,
};
use dialrust_storage::{
    DatabasePool, DbAttemptStore, DbCampaignStore, DbContactStore, DbCreditLedger,
    DbRateLimitStore,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting DialRust dialer...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;

    // Run migrations
    db_pool.migrate().await?;

    let dialer = Arc::new(build_dialer(&config, &db_pool)?);

    // Start tick loop
    let loop_handle = if config.dialer.run_loop {
        let dialer = dialer.clone();
        Some(tokio::spawn(async move {
            dialer.run().await;
        }))
    } else {
        info!("Tick loop disabled, ticks run only through the HTTP trigger");
        None
    };

    // Start HTTP server
    let app = api::create_router(api::AppState {
        trigger: dialer,
        health: Arc::new(db_pool.clone()),
        trigger_token: config.server.trigger_token.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    info!("Starting HTTP server on {}", config.server.bind_address);

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("HTTP server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    // Cleanup
    if let Some(handle) = loop_handle {
        handle.abort();
    }
    info!("DialRust shutdown complete");

    Ok(())
}

fn build_dialer(config: &Config, db_pool: &DatabasePool) -> Result<Dialer> {
    let limits = RateLimits::from(&config.rate_limit);
    let rate_limiter: Arc<dyn CallRateLimiter> = match config.rate_limit.backend.as_str() {
        "database" => Arc::new(SharedRateLimiter::new(
            limits,
            Arc::new(DbRateLimitStore::new(db_pool.clone())),
        )),
        _ => Arc::new(LocalRateLimiter::new(limits)),
    };
    info!(
        backend = %config.rate_limit.backend,
        per_minute = limits.per_minute,
        "Rate limiter configured"
    );

    let notifier = config
        .billing
        .auto_reload_url
        .as_ref()
        .map(|url| Arc::new(HttpBalanceNotifier::new(url.clone())) as Arc<dyn BalanceNotifier>);

    let deps = DialerDeps {
        campaigns: Arc::new(DbCampaignStore::new(db_pool.clone())),
        contacts: Arc::new(DbContactStore::new(db_pool.clone())),
        attempts: Arc::new(DbAttemptStore::new(db_pool.clone())),
        credits: Arc::new(DbCreditLedger::new(db_pool.clone())),
        rate_limiter,
        provider: Arc::new(HttpTelephonyClient::new(&config.telephony)?),
        notifier,
    };

    Ok(Dialer::new(deps, DialerSettings::from_config(&config.dialer)?))
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_level(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
