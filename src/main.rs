use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

mod catalog;
mod config;
mod dashboard;
mod db;
mod feed;
mod models;
mod odds;
mod session;
mod telemetry;
mod waitlist;

use config::Config;
use dashboard::AppState;
use db::Database;
use feed::playback::BroadcastPort;
use feed::FeedEngine;
use session::Session;
use telemetry::{PlausibleSink, TelemetrySink};
use waitlist::WaitlistClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Open database
    let db = Database::open(&config.db_path)?;
    info!("Database opened: {}", config.db_path);

    // Load the event catalog
    let events = match &config.catalog {
        Some(path) => catalog::load_from_file(path)?,
        None => catalog::load_default()?,
    };
    info!("Loaded {} events", events.len());

    let session = Session::new(
        feed::guest_user(config.initial_balance),
        events,
        config.revote_policy,
    );

    // Telemetry and waitlist delivery are both best-effort background I/O
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(PlausibleSink::new(
        config.telemetry_url.clone(),
        &config.telemetry_domain,
    ));
    if config.telemetry_url.is_some() {
        info!("Telemetry enabled for domain {}", config.telemetry_domain);
    }
    let waitlist = WaitlistClient::new(config.waitlist_url.clone(), config.waitlist_timeout())?;

    // Broadcast channels fan playback commands and odds updates out to
    // every connected websocket
    let (playback_tx, _) = broadcast::channel(256);
    let (odds_tx, _) = broadcast::channel(64);

    // Start the feed engine in its own task; it owns all mutable state
    let (engine, handle) = FeedEngine::new(
        session,
        db,
        telemetry,
        Arc::new(BroadcastPort::new(playback_tx.clone())),
        waitlist,
        odds_tx.clone(),
        config.default_wager,
    );
    let engine_task = tokio::spawn(engine.run());

    // Start the web server
    let state = AppState {
        handle: handle.clone(),
        playback_tx,
        odds_tx,
        default_wager: config.default_wager,
        min_spinner: config.min_spinner(),
    };
    let app = dashboard::router(state);
    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!("Feed listening on http://{}", config.listen);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            // Closes the final dwell span and flushes telemetry
            handle.shutdown().await?;
            let _ = engine_task.await;
        }
    }

    Ok(())
}
