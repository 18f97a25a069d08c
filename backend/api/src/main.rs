//! Home-services marketplace API entry point.
//!
//! Wires the marketplace core to a SQLite store and a notification sink, and
//! serves the core's operations over a small Axum REST API.

mod api;
mod config;
mod db;
mod errors;
mod notify;
mod rows;

use std::sync::Arc;

use marketplace_core::Marketplace;
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use notify::{NotificationSink, RetryPolicy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    let mut sink = NotificationSink::new(pool.clone());
    if let Some(url) = config.notify_webhook_url.clone() {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        info!("Forwarding notifications to {url}");
        sink = sink.with_webhook(
            client,
            url,
            RetryPolicy::with_attempts(config.notify_max_attempts),
        );
    }

    let market = Marketplace::new(
        Arc::new(db::SqliteStore::new(pool.clone())),
        Arc::new(sink),
        config.fees(),
    );
    info!(
        posting_fee = config.posting_fee,
        bid_fee = config.bid_fee,
        "Marketplace core ready"
    );

    if let Some(email) = config.bootstrap_admin_email.as_deref() {
        api::ensure_admin(&market, email)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bootstrap admin: {e}"))?;
    }

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState { market, pool });

    let app = api::router(api_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
