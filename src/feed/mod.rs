//! The feed engine.
//!
//! One task owns every piece of mutable state — the session ledger, the
//! scheduler and the dwell tracker — and consumes commands from a channel.
//! Each command runs to completion before the next starts, which is what
//! makes wagers and feed transitions atomic without any locking.

pub mod dwell;
pub mod playback;
pub mod scheduler;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{error, info, warn};

use crate::db::Database;
use crate::models::{EventCard, Side, User, Wager};
use crate::odds::PoolOdds;
use crate::session::{GrantError, Session, WagerError};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::waitlist::{self, WaitlistClient, WaitlistError};

use dwell::DwellSample;
use playback::PlaybackPort;
use scheduler::{FeedScheduler, VisibilityReport};

/// Pushed to every websocket client after a wager moves the pools.
#[derive(Debug, Clone, Serialize)]
pub struct OddsUpdate {
    pub event_id: String,
    pub pool_a: u64,
    pub pool_b: u64,
    pub odds: PoolOdds,
}

/// What the wager endpoint returns on success.
#[derive(Debug, Clone, Serialize)]
pub struct WagerOutcome {
    pub wager: Wager,
    pub event_id: String,
    pub balance: u64,
    pub odds: PoolOdds,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitlistReceipt {
    pub email: String,
    /// True when this device had already joined before this call
    pub already_joined: bool,
}

/// One feed card plus everything derived for it.
#[derive(Debug, Clone, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub card: EventCard,
    pub odds: PoolOdds,
    /// This session's wager against the event, if any
    pub wager: Option<Wager>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub events: Vec<EventView>,
    pub active_id: Option<String>,
    pub paused: bool,
    pub muted: bool,
    pub balance: u64,
    pub default_wager: u64,
    /// False until the first wager; drives the one-time voting guide
    pub vote_guide_seen: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WagerView {
    #[serde(flatten)]
    pub wager: Wager,
    pub event_title: String,
    pub option_label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSnapshot {
    pub user: User,
    pub total_asset_value: u64,
    pub pending_winnings: u64,
    pub wagers: Vec<WagerView>,
    pub waitlist_joined: bool,
    pub waitlist_email: Option<String>,
}

pub enum FeedCommand {
    Feed {
        reply: oneshot::Sender<FeedSnapshot>,
    },
    Profile {
        reply: oneshot::Sender<ProfileSnapshot>,
    },
    PlaceWager {
        event_id: String,
        side: Side,
        amount: u64,
        reply: oneshot::Sender<Result<WagerOutcome, WagerError>>,
    },
    GrantPoints {
        amount: u64,
        reply: oneshot::Sender<Result<u64, GrantError>>,
    },
    JoinWaitlist {
        email: String,
        source: String,
        reply: oneshot::Sender<Result<WaitlistReceipt, WaitlistError>>,
    },
    Visibility {
        reports: Vec<VisibilityReport>,
    },
    TogglePause {
        reply: oneshot::Sender<bool>,
    },
    ToggleMute {
        reply: oneshot::Sender<bool>,
    },
    PageHidden,
    PageVisible,
    Mount {
        event_id: String,
    },
    Unmount {
        event_id: String,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable front door to the engine task.
#[derive(Clone)]
pub struct FeedHandle {
    tx: mpsc::Sender<FeedCommand>,
}

impl FeedHandle {
    pub async fn feed(&self) -> Result<FeedSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(FeedCommand::Feed { reply }).await?;
        Ok(rx.await?)
    }

    pub async fn profile(&self) -> Result<ProfileSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(FeedCommand::Profile { reply }).await?;
        Ok(rx.await?)
    }

    pub async fn place_wager(
        &self,
        event_id: String,
        side: Side,
        amount: u64,
    ) -> Result<Result<WagerOutcome, WagerError>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(FeedCommand::PlaceWager {
                event_id,
                side,
                amount,
                reply,
            })
            .await?;
        Ok(rx.await?)
    }

    pub async fn grant_points(&self, amount: u64) -> Result<Result<u64, GrantError>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(FeedCommand::GrantPoints { amount, reply })
            .await?;
        Ok(rx.await?)
    }

    pub async fn join_waitlist(
        &self,
        email: String,
        source: String,
    ) -> Result<Result<WaitlistReceipt, WaitlistError>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(FeedCommand::JoinWaitlist {
                email,
                source,
                reply,
            })
            .await?;
        Ok(rx.await?)
    }

    pub async fn report_visibility(&self, reports: Vec<VisibilityReport>) -> Result<()> {
        self.tx.send(FeedCommand::Visibility { reports }).await?;
        Ok(())
    }

    pub async fn toggle_pause(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(FeedCommand::TogglePause { reply }).await?;
        Ok(rx.await?)
    }

    pub async fn toggle_mute(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(FeedCommand::ToggleMute { reply }).await?;
        Ok(rx.await?)
    }

    pub async fn page_hidden(&self) -> Result<()> {
        self.tx.send(FeedCommand::PageHidden).await?;
        Ok(())
    }

    pub async fn page_visible(&self) -> Result<()> {
        self.tx.send(FeedCommand::PageVisible).await?;
        Ok(())
    }

    pub async fn mount(&self, event_id: String) -> Result<()> {
        self.tx.send(FeedCommand::Mount { event_id }).await?;
        Ok(())
    }

    pub async fn unmount(&self, event_id: String) -> Result<()> {
        self.tx.send(FeedCommand::Unmount { event_id }).await?;
        Ok(())
    }

    /// Stop the engine after a best-effort telemetry flush.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(FeedCommand::Shutdown { reply }).await?;
        Ok(rx.await?)
    }
}

pub struct FeedEngine {
    session: Session,
    scheduler: FeedScheduler,
    db: Database,
    telemetry: Arc<dyn TelemetrySink>,
    playback: Arc<dyn PlaybackPort>,
    waitlist: WaitlistClient,
    odds_tx: broadcast::Sender<OddsUpdate>,
    default_wager: u64,
    rx: mpsc::Receiver<FeedCommand>,
}

impl FeedEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Session,
        db: Database,
        telemetry: Arc<dyn TelemetrySink>,
        playback: Arc<dyn PlaybackPort>,
        waitlist: WaitlistClient,
        odds_tx: broadcast::Sender<OddsUpdate>,
        default_wager: u64,
    ) -> (Self, FeedHandle) {
        let order = session.events.iter().map(|e| e.id.clone()).collect();
        let (tx, rx) = mpsc::channel(64);
        let engine = FeedEngine {
            session,
            scheduler: FeedScheduler::new(order),
            db,
            telemetry,
            playback,
            waitlist,
            odds_tx,
            default_wager,
            rx,
        };
        (engine, FeedHandle { tx })
    }

    pub async fn run(mut self) {
        info!(
            "Feed engine started with {} events, balance {}",
            self.session.events.len(),
            self.session.user.points
        );
        while let Some(command) = self.rx.recv().await {
            if self.handle(command) {
                break;
            }
        }
        info!("Feed engine stopped");
    }

    /// Returns true when the engine should stop.
    fn handle(&mut self, command: FeedCommand) -> bool {
        let now = Utc::now();
        match command {
            FeedCommand::Feed { reply } => {
                let _ = reply.send(self.feed_snapshot());
            }
            FeedCommand::Profile { reply } => {
                let _ = reply.send(self.profile_snapshot());
            }
            FeedCommand::PlaceWager {
                event_id,
                side,
                amount,
                reply,
            } => {
                let _ = reply.send(self.place_wager(&event_id, side, amount));
            }
            FeedCommand::GrantPoints { amount, reply } => {
                let _ = reply.send(self.session.grant_points(amount));
            }
            FeedCommand::JoinWaitlist {
                email,
                source,
                reply,
            } => {
                let _ = reply.send(self.join_waitlist(&email, &source));
            }
            FeedCommand::Visibility { reports } => {
                let sample = self.scheduler.observe(&reports, now, self.playback.as_ref());
                self.emit_dwell(sample);
            }
            FeedCommand::TogglePause { reply } => {
                let _ = reply.send(self.scheduler.toggle_pause(self.playback.as_ref()));
            }
            FeedCommand::ToggleMute { reply } => {
                let _ = reply.send(self.scheduler.toggle_mute(self.playback.as_ref()));
            }
            FeedCommand::PageHidden => {
                let sample = self.scheduler.page_hidden(now);
                self.emit_dwell(sample);
            }
            FeedCommand::PageVisible => {
                let sample = self.scheduler.page_visible(now);
                self.emit_dwell(sample);
            }
            FeedCommand::Mount { event_id } => {
                self.scheduler.mount(&event_id, self.playback.as_ref());
            }
            FeedCommand::Unmount { event_id } => {
                let sample = self.scheduler.unmount(&event_id, now);
                self.emit_dwell(sample);
            }
            FeedCommand::Shutdown { reply } => {
                let sample = self.scheduler.finish(now);
                self.emit_dwell(sample);
                let telemetry = self.telemetry.clone();
                tokio::spawn(async move {
                    telemetry.flush(Duration::from_secs(2)).await;
                    let _ = reply.send(());
                });
                return true;
            }
        }
        false
    }

    // ── Command bodies ───────────────────────────────────────────────────────

    fn place_wager(
        &mut self,
        event_id: &str,
        side: Side,
        amount: u64,
    ) -> Result<WagerOutcome, WagerError> {
        let now = Utc::now();
        // A rejected wager produces no telemetry and no broadcast
        let receipt = self.session.apply_wager(event_id, side, amount, now)?;

        self.telemetry.emit(TelemetryEvent::wager_placed(
            &receipt.event_id,
            &receipt.event_title,
            side,
            &receipt.option_label,
            amount,
            receipt.odds.percent_a,
            receipt.odds.percent_b,
            receipt.first_for_event,
        ));
        if let Err(e) = self.db.mark_vote_guide_seen() {
            warn!("Failed to persist vote guide flag: {}", e);
        }
        if let Some(event) = self.session.event(event_id) {
            let _ = self.odds_tx.send(OddsUpdate {
                event_id: event.id.clone(),
                pool_a: event.pool_a,
                pool_b: event.pool_b,
                odds: receipt.odds,
            });
        }
        info!(
            "Wager placed: {} pts on {:?} of {} (balance {})",
            amount, side, receipt.event_id, receipt.balance_after
        );
        Ok(WagerOutcome {
            wager: receipt.wager,
            event_id: receipt.event_id,
            balance: receipt.balance_after,
            odds: receipt.odds,
        })
    }

    fn join_waitlist(&mut self, email: &str, source: &str) -> Result<WaitlistReceipt, WaitlistError> {
        let email = waitlist::validate_email(email)?.to_string();
        let already_joined = self.db.waitlist_joined().unwrap_or(false);

        // Local persistence is the source of truth and happens first
        if let Err(e) = self.db.mark_waitlist_joined(&email) {
            error!("Failed to persist waitlist membership: {}", e);
        }

        // Remote delivery is detached; the reply never waits on it
        let client = self.waitlist.clone();
        let remote_email = email.clone();
        let remote_source = source.to_string();
        let points = self.session.user.points;
        tokio::spawn(async move {
            client.submit(&remote_email, &remote_source, points).await;
        });

        // One telemetry event per distinct address, ever
        match self.db.email_tracked(&email) {
            Ok(false) => {
                self.telemetry.emit(TelemetryEvent::email_submitted(
                    source,
                    self.session.total_asset_value(),
                    self.pending_winnings(),
                    self.session.wager_count(),
                    already_joined,
                ));
                if let Err(e) = self.db.mark_email_tracked(&email) {
                    warn!("Failed to persist email-tracked flag: {}", e);
                }
            }
            Ok(true) => {}
            Err(e) => warn!("Failed to read email-tracked flag: {}", e),
        }

        Ok(WaitlistReceipt {
            email,
            already_joined,
        })
    }

    fn emit_dwell(&self, sample: Option<DwellSample>) {
        let Some(sample) = sample else { return };
        let title = self
            .session
            .event(&sample.event_id)
            .map(|e| e.title.as_str())
            .unwrap_or(sample.event_id.as_str());
        self.telemetry
            .emit(TelemetryEvent::dwell_sample(&sample.event_id, title, sample.seconds));
    }

    fn pending_winnings(&self) -> u64 {
        self.session
            .wagers
            .iter()
            .map(|w| w.potential_win.unwrap_or(0))
            .sum()
    }

    // ── Snapshots ────────────────────────────────────────────────────────────

    fn feed_snapshot(&self) -> FeedSnapshot {
        let events = self
            .session
            .events
            .iter()
            .map(|card| EventView {
                card: card.clone(),
                odds: crate::odds::pool_odds(card.pool_a, card.pool_b),
                wager: self.session.wager_for(&card.id).cloned(),
            })
            .collect();
        FeedSnapshot {
            events,
            active_id: self.scheduler.active_id().map(str::to_string),
            paused: self.scheduler.is_paused(),
            muted: self.scheduler.is_muted(),
            balance: self.session.user.points,
            default_wager: self.default_wager,
            vote_guide_seen: self.db.vote_guide_seen().unwrap_or(false),
        }
    }

    fn profile_snapshot(&self) -> ProfileSnapshot {
        let wagers = self
            .session
            .wagers
            .iter()
            .map(|w| {
                let event = self.session.event(&w.event_id);
                WagerView {
                    wager: w.clone(),
                    event_title: event.map(|e| e.title.clone()).unwrap_or_default(),
                    option_label: event
                        .map(|e| e.option_label(w.side).to_string())
                        .unwrap_or_default(),
                }
            })
            .collect();
        ProfileSnapshot {
            user: self.session.user.clone(),
            total_asset_value: self.session.total_asset_value(),
            pending_winnings: self.pending_winnings(),
            wagers,
            waitlist_joined: self.db.waitlist_joined().unwrap_or(false),
            waitlist_email: self.db.waitlist_email().unwrap_or(None),
        }
    }
}

/// The anonymous device-local user every session starts as.
pub fn guest_user(points: u64) -> User {
    User {
        id: "guest".into(),
        name: "Juan".into(),
        avatar_url: "https://api.dicebear.com/7.x/avataaars/svg?seed=Juan".into(),
        points,
        login_streak: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::feed::playback::RecordingPort;
    use crate::session::RevotePolicy;
    use crate::telemetry::CaptureSink;
    use serde_json::json;

    struct Harness {
        handle: FeedHandle,
        telemetry: CaptureSink,
        port: RecordingPort,
        odds_rx: broadcast::Receiver<OddsUpdate>,
        db: Database,
    }

    fn start(points: u64) -> Harness {
        let db = Database::open_in_memory().unwrap();
        let telemetry = CaptureSink::new();
        let port = RecordingPort::new();
        let (odds_tx, odds_rx) = broadcast::channel(16);
        let session = Session::new(
            guest_user(points),
            catalog::load_default().unwrap(),
            RevotePolicy::Allow,
        );
        let waitlist = WaitlistClient::new(None, Duration::from_secs(1)).unwrap();
        let (engine, handle) = FeedEngine::new(
            session,
            db.clone(),
            Arc::new(telemetry.clone()),
            Arc::new(port.clone()),
            waitlist,
            odds_tx,
            10,
        );
        tokio::spawn(engine.run());
        Harness {
            handle,
            telemetry,
            port,
            odds_rx,
            db,
        }
    }

    #[tokio::test]
    async fn test_feed_snapshot_has_derived_odds() {
        let h = start(500);
        let feed = h.handle.feed().await.unwrap();
        assert_eq!(feed.events.len(), 10);
        assert_eq!(feed.balance, 500);
        assert_eq!(feed.default_wager, 10);
        assert!(!feed.vote_guide_seen);
        let e1 = feed.events.iter().find(|e| e.card.id == "e1").unwrap();
        assert_eq!(e1.odds.percent_a, 58);
        assert!(e1.wager.is_none());
    }

    #[tokio::test]
    async fn test_wager_emits_telemetry_and_broadcast() {
        let mut h = start(500);
        let outcome = h
            .handle
            .place_wager("e1".into(), Side::A, 10)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.balance, 490);

        let events = h.telemetry.named("Vote Clicked");
        assert_eq!(events.len(), 1);
        // Percentages come from the post-mutation pools (45010, 32000)
        assert_eq!(events[0].props["pool_a_percent"], json!(58));
        assert_eq!(events[0].props["is_first_vote"], json!("true"));

        let update = h.odds_rx.recv().await.unwrap();
        assert_eq!(update.event_id, "e1");
        assert_eq!(update.pool_a, 45_010);

        assert!(h.db.vote_guide_seen().unwrap());
        let feed = h.handle.feed().await.unwrap();
        assert!(feed.vote_guide_seen);
        let e1 = feed.events.iter().find(|e| e.card.id == "e1").unwrap();
        assert!(e1.wager.is_some());
    }

    #[tokio::test]
    async fn test_rejected_wager_is_silent() {
        let h = start(5);
        let err = h
            .handle
            .place_wager("e1".into(), Side::A, 10)
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, WagerError::InsufficientBalance { .. }));
        assert!(h.telemetry.events().is_empty());
        assert!(!h.db.vote_guide_seen().unwrap());
    }

    #[tokio::test]
    async fn test_visibility_drives_dwell_telemetry() {
        let h = start(500);
        for id in ["e1", "e2"] {
            h.handle.mount(id.to_string()).await.unwrap();
        }
        h.handle
            .report_visibility(vec![VisibilityReport {
                event_id: "e1".into(),
                ratio: 0.9,
            }])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        h.handle
            .report_visibility(vec![VisibilityReport {
                event_id: "e2".into(),
                ratio: 0.9,
            }])
            .await
            .unwrap();
        // Snapshot round-trip guarantees both commands were processed
        let feed = h.handle.feed().await.unwrap();
        assert_eq!(feed.active_id.as_deref(), Some("e2"));

        let samples = h.telemetry.named("Video View Duration");
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].props["video_id"], json!("e1"));
        assert_eq!(samples[0].props["duration_seconds"], json!(1));
        assert_eq!(samples[0].props["duration_range"], json!("1-5s"));
        assert!(!h.port.for_event("e1").is_empty());
    }

    #[tokio::test]
    async fn test_waitlist_join_persists_and_dedups_telemetry() {
        let h = start(500);
        let receipt = h
            .handle
            .join_waitlist("maria@example.ph".into(), "Profile Page".into())
            .await
            .unwrap()
            .unwrap();
        assert!(!receipt.already_joined);
        assert!(h.db.waitlist_joined().unwrap());
        assert_eq!(
            h.db.waitlist_email().unwrap().as_deref(),
            Some("maria@example.ph")
        );
        assert_eq!(h.telemetry.named("Email Submitted").len(), 1);

        // Second join with the same address: membership reported,
        // telemetry not repeated
        let receipt = h
            .handle
            .join_waitlist("maria@example.ph".into(), "Profile Page".into())
            .await
            .unwrap()
            .unwrap();
        assert!(receipt.already_joined);
        assert_eq!(h.telemetry.named("Email Submitted").len(), 1);

        // A distinct address tracks again, flagged as returning
        h.handle
            .join_waitlist("juan@example.ph".into(), "Profile Page".into())
            .await
            .unwrap()
            .unwrap();
        let events = h.telemetry.named("Email Submitted");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].props["is_returning_user"], json!("true"));
    }

    #[tokio::test]
    async fn test_waitlist_rejects_bad_email() {
        let h = start(500);
        let err = h
            .handle
            .join_waitlist("not-an-email".into(), "Profile Page".into())
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err, WaitlistError::InvalidEmail);
        assert!(!h.db.waitlist_joined().unwrap());
        assert!(h.telemetry.events().is_empty());
    }

    #[tokio::test]
    async fn test_profile_snapshot_aggregates() {
        let h = start(500);
        h.handle
            .place_wager("e1".into(), Side::A, 10)
            .await
            .unwrap()
            .unwrap();
        h.handle
            .place_wager("e2".into(), Side::B, 20)
            .await
            .unwrap()
            .unwrap();
        let profile = h.handle.profile().await.unwrap();
        assert_eq!(profile.user.points, 470);
        assert_eq!(profile.total_asset_value, 1_000);
        assert_eq!(profile.wagers.len(), 2);
        // Newest first
        assert_eq!(profile.wagers[0].wager.event_id, "e2");
        assert!(profile.pending_winnings > 0);
        assert!(!profile.waitlist_joined);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_final_dwell() {
        let h = start(500);
        h.handle.mount("e1".into()).await.unwrap();
        h.handle
            .report_visibility(vec![VisibilityReport {
                event_id: "e1".into(),
                ratio: 1.0,
            }])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        h.handle.shutdown().await.unwrap();
        let samples = h.telemetry.named("Video View Duration");
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].props["video_id"], json!("e1"));
    }
}
