use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::session::RevotePolicy;

/// Command-line and environment configuration
#[derive(Parser, Debug, Clone)]
#[command(
    name = "battlefeed",
    about = "Short-form video feed with pari-mutuel point wagers",
    version
)]
pub struct Config {
    /// Address the web server binds to
    #[arg(long, env = "BATTLEFEED_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// SQLite database path for durable local state
    #[arg(long, env = "BATTLEFEED_DB", default_value = "battlefeed.db")]
    pub db_path: String,

    /// JSON catalog file; the embedded launch catalog is used when omitted
    #[arg(long, env = "BATTLEFEED_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Points a fresh session starts with
    #[arg(long, env = "BATTLEFEED_INITIAL_BALANCE", default_value_t = 500)]
    pub initial_balance: u64,

    /// Points a single tap wagers
    #[arg(long, env = "BATTLEFEED_DEFAULT_WAGER", default_value_t = 10)]
    pub default_wager: u64,

    /// Whether a second wager on the same event is accepted or rejected
    #[arg(long, env = "BATTLEFEED_REVOTE_POLICY", value_enum, default_value = "allow")]
    pub revote_policy: RevotePolicy,

    /// Remote waitlist endpoint; signups stay local-only when omitted
    #[arg(long, env = "BATTLEFEED_WAITLIST_URL")]
    pub waitlist_url: Option<Url>,

    /// Timeout for the background waitlist POST, in seconds
    #[arg(long, env = "BATTLEFEED_WAITLIST_TIMEOUT", default_value_t = 10)]
    pub waitlist_timeout_secs: u64,

    /// Minimum time the waitlist submit spinner is shown, in milliseconds
    #[arg(long, env = "BATTLEFEED_MIN_SPINNER_MS", default_value_t = 1000)]
    pub min_spinner_ms: u64,

    /// Telemetry ingestion endpoint; events are dropped when omitted
    #[arg(long, env = "BATTLEFEED_TELEMETRY_URL")]
    pub telemetry_url: Option<Url>,

    /// Site domain reported with every telemetry event
    #[arg(long, env = "BATTLEFEED_TELEMETRY_DOMAIN", default_value = "battlefeed.app")]
    pub telemetry_domain: String,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.default_wager > 0, "default wager must be positive");
        anyhow::ensure!(
            self.waitlist_timeout_secs > 0,
            "waitlist timeout must be positive"
        );
        Ok(())
    }

    pub fn waitlist_timeout(&self) -> Duration {
        Duration::from_secs(self.waitlist_timeout_secs)
    }

    pub fn min_spinner(&self) -> Duration {
        Duration::from_millis(self.min_spinner_ms)
    }
}
