/// Estate Portal - property management backend
///
/// Landlords manage properties, units and invitations; tenants issue visitor
/// gate passes and pay rent by mobile money; guards verify passes at the gate.

mod account;
mod api;
mod auth;
mod config;
mod context;
mod db;
mod error;
mod gate_pass;
mod invitation;
mod jobs;
mod mailer;
mod metrics;
mod notify;
mod payment;
mod property;
mod rate_limit;
mod server;

#[cfg(test)]
mod test_support;

use config::ServerConfig;
use context::AppContext;
use error::PortalResult;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> PortalResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "estate_portal=debug,tower_http=debug".into());
    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(version = %config.service.version, "starting estate portal");

    // Create application context
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}
