//! Digital Bank Server - Main Application Entry Point
//!
//! A REST API for a digital banking demo: wallets, transfers with fees,
//! limits and OTP/code verification, gateway deposits and payouts, virtual
//! cards, KYC review and customer support.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries, row locks)
//! - **Authentication**: per-user API key with SHA-256 hashing
//! - **Payments**: Paystack or a built-in demo gateway
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Ensure the bootstrap admin exists, if configured
//! 4. Build the payment gateway and HTTP router
//! 5. Start server on configured port

mod config;
mod crypto;
mod db;
mod error;
mod gateway;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;
#[cfg(test)]
mod test_utils;

use tracing_subscriber::EnvFilter;

use crate::{gateway::PaymentGateway, services::user_service, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG, defaults to "info"
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!(
        provider = ?config.payment_provider,
        demo_mode = config.demo_mode,
        "Configuration loaded"
    );

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    if let Some(key) = config.bootstrap_admin_key.as_deref() {
        user_service::bootstrap_admin(&pool, key, &config.default_currency).await?;
    }

    let gateway = PaymentGateway::from_config(&config)?;
    tracing::info!(provider = gateway.provider_name(), "Payment gateway ready");

    let addr = format!("0.0.0.0:{}", config.server_port);
    let app = routes::build_router(AppState::new(pool, gateway, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
