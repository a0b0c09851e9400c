//! Telemetry collaborator.
//!
//! The core produces three event shapes — dwell-duration samples,
//! wager-placed samples and email-submitted samples — as named events with
//! a flat string/number property bag. Delivery is best-effort from a
//! background task; a failed POST is logged and dropped, never surfaced.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use url::Url;

use crate::models::Side;

/// A named analytics event with a flat scalar property bag.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub name: &'static str,
    pub props: Map<String, Value>,
}

/// Map dwell seconds onto a coarse range label so distributions are easy to
/// read in the analytics UI; the exact second count travels alongside it.
pub fn duration_bucket(seconds: i64) -> &'static str {
    match seconds {
        1..=5 => "1-5s",
        6..=15 => "6-15s",
        16..=30 => "16-30s",
        31..=60 => "31-60s",
        61..=120 => "61-120s",
        _ => "120+s",
    }
}

impl TelemetryEvent {
    /// Dwell-duration sample, emitted when the active feed item changes.
    pub fn dwell_sample(event_id: &str, title: &str, seconds: i64) -> Self {
        let mut props = Map::new();
        props.insert("video_id".into(), json!(event_id));
        props.insert("video_title".into(), json!(title));
        props.insert("duration_seconds".into(), json!(seconds));
        props.insert("duration_range".into(), json!(duration_bucket(seconds)));
        TelemetryEvent {
            name: "Video View Duration",
            props,
        }
    }

    /// Wager-placed sample. Percentages are taken from the already-mutated
    /// pools at emission time.
    #[allow(clippy::too_many_arguments)]
    pub fn wager_placed(
        event_id: &str,
        title: &str,
        side: Side,
        option_label: &str,
        amount: u64,
        percent_a: u8,
        percent_b: u8,
        first_for_event: bool,
    ) -> Self {
        let mut props = Map::new();
        props.insert("video_id".into(), json!(event_id));
        props.insert("video_title".into(), json!(title));
        props.insert("side".into(), json!(side.as_str()));
        props.insert("option_name".into(), json!(option_label));
        props.insert("bet_amount".into(), json!(amount));
        props.insert("pool_a_percent".into(), json!(percent_a));
        props.insert("pool_b_percent".into(), json!(percent_b));
        // Booleans travel as strings; the property bag is scalars only
        props.insert("is_first_vote".into(), json!(bool_str(first_for_event)));
        TelemetryEvent {
            name: "Vote Clicked",
            props,
        }
    }

    /// Email-submitted sample, at most one per distinct address thanks to
    /// the durable per-email tracked flags.
    pub fn email_submitted(
        source: &str,
        total_asset_value: u64,
        pending_winnings: u64,
        wager_count: usize,
        returning_user: bool,
    ) -> Self {
        let mut props = Map::new();
        props.insert("source".into(), json!(source));
        props.insert("total_asset_value".into(), json!(total_asset_value));
        props.insert("pending_winnings".into(), json!(pending_winnings));
        props.insert("bet_count".into(), json!(wager_count));
        props.insert("is_returning_user".into(), json!(bool_str(returning_user)));
        TelemetryEvent {
            name: "Email Submitted",
            props,
        }
    }
}

fn bool_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Seam the engine emits through; production posts to a Plausible-style
/// endpoint, tests capture in memory.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);

    /// Drain anything still in flight. Called once at teardown so the final
    /// dwell flush still gets a delivery attempt.
    async fn flush(&self, _timeout: Duration) {}
}

enum SinkMessage {
    Event(TelemetryEvent),
    Flush(oneshot::Sender<()>),
}

/// HTTP sink posting `{name, domain, props}` events from a background task.
/// With no endpoint configured it degrades to debug logging.
pub struct PlausibleSink {
    tx: Option<mpsc::UnboundedSender<SinkMessage>>,
}

impl PlausibleSink {
    pub fn new(endpoint: Option<Url>, site_domain: &str) -> Self {
        let Some(endpoint) = endpoint else {
            return PlausibleSink { tx: None };
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let domain = site_domain.to_string();
        tokio::spawn(async move {
            forward_loop(endpoint, domain, rx).await;
        });
        PlausibleSink { tx: Some(tx) }
    }
}

#[async_trait]
impl TelemetrySink for PlausibleSink {
    fn emit(&self, event: TelemetryEvent) {
        debug!("telemetry: {} {:?}", event.name, event.props);
        if let Some(tx) = &self.tx {
            // Receiver only goes away at teardown; a drop here is fine
            let _ = tx.send(SinkMessage::Event(event));
        }
    }

    async fn flush(&self, timeout: Duration) {
        let Some(tx) = &self.tx else { return };
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(SinkMessage::Flush(ack_tx)).is_err() {
            return;
        }
        if tokio::time::timeout(timeout, ack_rx).await.is_err() {
            warn!("Telemetry flush timed out; pending events dropped");
        }
    }
}

async fn forward_loop(
    endpoint: Url,
    domain: String,
    mut rx: mpsc::UnboundedReceiver<SinkMessage>,
) {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            warn!("Telemetry disabled, failed to build HTTP client: {}", e);
            return;
        }
    };

    while let Some(msg) = rx.recv().await {
        match msg {
            SinkMessage::Event(event) => {
                let body = json!({
                    "name": event.name,
                    "domain": domain,
                    "url": format!("app://{}/feed", domain),
                    "props": event.props,
                });
                match client.post(endpoint.clone()).json(&body).send().await {
                    Ok(resp) if !resp.status().is_success() => {
                        warn!(
                            "Telemetry endpoint returned {} for '{}'",
                            resp.status(),
                            event.name
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Telemetry delivery failed for '{}': {}", event.name, e),
                }
            }
            SinkMessage::Flush(ack) => {
                // Everything queued before the flush marker has been sent
                let _ = ack.send(());
            }
        }
    }
}

/// In-memory sink for tests: records every emitted event.
#[derive(Clone, Default)]
pub struct CaptureSink {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn named(&self, name: &str) -> Vec<TelemetryEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.name == name)
            .collect()
    }
}

#[async_trait]
impl TelemetrySink for CaptureSink {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().unwrap().push(event);
    }
}
