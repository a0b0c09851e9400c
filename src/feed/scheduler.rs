//! Active-item scheduling.
//!
//! The feed shows one card per viewport; whichever card covers at least
//! the visibility threshold becomes the active item. Activation drives
//! everything else: dwell accounting, play/pause fan-out, mute fan-out and
//! source preloading. All state lives here in one place, mutated by one
//! caller at a time, so a transition is atomic from the client's point of
//! view.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::dwell::{DwellSample, DwellTracker};
use super::playback::{PlaybackCommand, PlaybackPort, PlaybackRegistry};

/// Viewport coverage an item needs before it takes over as active.
pub const VISIBILITY_THRESHOLD: f64 = 0.6;

/// One intersection observation from the client. Ratio is viewport
/// coverage in `[0, 1]`.
#[derive(Debug, Clone, Deserialize)]
pub struct VisibilityReport {
    pub event_id: String,
    pub ratio: f64,
}

/// Schedules playback across the feed. Owns the dwell tracker and the
/// mounted-player registry; playback effects go out through the port
/// passed to each call.
pub struct FeedScheduler {
    order: Vec<String>,
    registry: PlaybackRegistry,
    dwell: DwellTracker,
    active: Option<usize>,
    /// User-requested pause. Survives transitions: a paused feed stays
    /// paused on the next card.
    paused: bool,
    /// Global mute. Starts on; browsers refuse unmuted autoplay.
    muted: bool,
    page_shown: bool,
}

impl FeedScheduler {
    pub fn new(order: Vec<String>) -> Self {
        FeedScheduler {
            order,
            registry: PlaybackRegistry::new(),
            dwell: DwellTracker::new(),
            active: None,
            paused: false,
            muted: true,
            page_shown: true,
        }
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.map(|i| self.order[i].as_str())
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    fn index_of(&self, event_id: &str) -> Option<usize> {
        self.order.iter().position(|id| id == event_id)
    }

    /// Whether the item at `index` should keep a video source attached:
    /// only the active item and its successor do. Before first activation
    /// the head of the feed and its successor preload.
    pub fn should_preload(&self, index: usize) -> bool {
        let anchor = self.active.unwrap_or(0);
        index == anchor || index == anchor + 1
    }

    // ── Player lifecycle ─────────────────────────────────────────────────────

    /// A player mounted in the client. It starts paused at position zero
    /// with the current mute and preload policy applied.
    pub fn mount(&mut self, event_id: &str, port: &dyn PlaybackPort) {
        if !self.registry.mount(event_id) {
            return;
        }
        let Some(index) = self.index_of(event_id) else {
            return;
        };
        port.send(PlaybackCommand::Pause {
            event_id: event_id.to_string(),
            reset: true,
        });
        port.send(PlaybackCommand::SetMuted {
            event_id: event_id.to_string(),
            muted: self.muted,
        });
        port.send(PlaybackCommand::SetPreload {
            event_id: event_id.to_string(),
            preload: self.should_preload(index),
        });
    }

    /// A player unmounted. Unmounting the active item closes its dwell
    /// span and leaves the feed with no active item until the next
    /// qualifying observation.
    pub fn unmount(&mut self, event_id: &str, now: DateTime<Utc>) -> Option<DwellSample> {
        if !self.registry.unmount(event_id) {
            return None;
        }
        if self.active_id() == Some(event_id) {
            self.active = None;
            return self.dwell.flush(now);
        }
        None
    }

    // ── Visibility ───────────────────────────────────────────────────────────

    /// Apply a batch of intersection observations. Among entries at or
    /// above the threshold the one earliest in feed order wins; later
    /// batches override earlier ones. A batch with no qualifying entry
    /// leaves the current active item in place.
    pub fn observe(
        &mut self,
        reports: &[VisibilityReport],
        now: DateTime<Utc>,
        port: &dyn PlaybackPort,
    ) -> Option<DwellSample> {
        let candidate = reports
            .iter()
            .filter(|r| r.ratio >= VISIBILITY_THRESHOLD)
            .filter_map(|r| self.index_of(&r.event_id))
            .min()?;
        if self.active == Some(candidate) {
            return None;
        }
        self.transition(candidate, now, port)
    }

    /// Make `next` the active item: close the outgoing dwell span, reset
    /// every other mounted player, start the incoming one under the
    /// current pause and mute policy, and move the preload window.
    fn transition(
        &mut self,
        next: usize,
        now: DateTime<Utc>,
        port: &dyn PlaybackPort,
    ) -> Option<DwellSample> {
        let next_id = self.order[next].clone();
        debug!("feed: activating {}", next_id);
        let sample = if self.page_shown {
            self.dwell.begin(&next_id, now)
        } else {
            self.dwell.flush(now)
        };
        self.active = Some(next);

        for id in self.registry.mounted().map(str::to_string).collect::<Vec<_>>() {
            if id != next_id {
                port.send(PlaybackCommand::Pause {
                    event_id: id.clone(),
                    reset: true,
                });
            }
        }
        if self.paused {
            port.send(PlaybackCommand::Pause {
                event_id: next_id.clone(),
                reset: false,
            });
        } else {
            port.send(PlaybackCommand::Play {
                event_id: next_id.clone(),
            });
        }
        port.send(PlaybackCommand::SetMuted {
            event_id: next_id,
            muted: self.muted,
        });
        self.apply_preload(port);
        sample
    }

    fn apply_preload(&self, port: &dyn PlaybackPort) {
        for id in self.registry.mounted() {
            if let Some(index) = self.order.iter().position(|o| o == id) {
                port.send(PlaybackCommand::SetPreload {
                    event_id: id.to_string(),
                    preload: self.should_preload(index),
                });
            }
        }
    }

    // ── User controls ────────────────────────────────────────────────────────

    /// Tap on the active card. Pausing keeps the position and keeps the
    /// dwell clock running; the item is still the one on screen.
    pub fn toggle_pause(&mut self, port: &dyn PlaybackPort) -> bool {
        self.paused = !self.paused;
        if let Some(id) = self.active_id().map(str::to_string) {
            if self.paused {
                port.send(PlaybackCommand::Pause {
                    event_id: id,
                    reset: false,
                });
            } else {
                port.send(PlaybackCommand::Play { event_id: id });
            }
        }
        self.paused
    }

    /// Flip the global mute and push it to every mounted player.
    pub fn toggle_mute(&mut self, port: &dyn PlaybackPort) -> bool {
        self.muted = !self.muted;
        for id in self.registry.mounted().map(str::to_string).collect::<Vec<_>>() {
            port.send(PlaybackCommand::SetMuted {
                event_id: id,
                muted: self.muted,
            });
        }
        self.muted
    }

    // ── Page visibility and teardown ─────────────────────────────────────────

    /// The tab went to the background: close the open dwell span so time
    /// off-screen is never counted. Active item and playback position are
    /// kept for the return.
    pub fn page_hidden(&mut self, now: DateTime<Utc>) -> Option<DwellSample> {
        self.page_shown = false;
        self.dwell.flush(now)
    }

    /// The tab came back: reopen the dwell span on the active item.
    pub fn page_visible(&mut self, now: DateTime<Utc>) -> Option<DwellSample> {
        self.page_shown = true;
        let active = self.active_id().map(str::to_string)?;
        self.dwell.begin(&active, now)
    }

    /// Session teardown. Returns the final dwell span, if any, for a
    /// best-effort telemetry flush.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Option<DwellSample> {
        self.dwell.flush(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::playback::RecordingPort;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        "2026-01-01T12:00:00Z".parse().unwrap()
    }

    fn feed() -> (FeedScheduler, RecordingPort) {
        let ids = vec!["e1".to_string(), "e2".to_string(), "e3".to_string()];
        let mut scheduler = FeedScheduler::new(ids.clone());
        let port = RecordingPort::new();
        for id in &ids {
            scheduler.mount(id, &port);
        }
        port.clear();
        (scheduler, port)
    }

    fn visible(event_id: &str) -> VisibilityReport {
        VisibilityReport {
            event_id: event_id.to_string(),
            ratio: 0.8,
        }
    }

    #[test]
    fn test_first_activation_plays_and_preloads_next() {
        let (mut scheduler, port) = feed();
        let sample = scheduler.observe(&[visible("e1")], t0(), &port);
        assert!(sample.is_none());
        assert_eq!(scheduler.active_id(), Some("e1"));

        let e1 = port.for_event("e1");
        assert!(e1.contains(&PlaybackCommand::Play {
            event_id: "e1".into()
        }));
        assert!(e1.contains(&PlaybackCommand::SetMuted {
            event_id: "e1".into(),
            muted: true,
        }));
        assert!(port.for_event("e2").contains(&PlaybackCommand::SetPreload {
            event_id: "e2".into(),
            preload: true,
        }));
        assert!(port.for_event("e3").contains(&PlaybackCommand::SetPreload {
            event_id: "e3".into(),
            preload: false,
        }));
    }

    #[test]
    fn test_below_threshold_is_ignored() {
        let (mut scheduler, port) = feed();
        scheduler.observe(
            &[VisibilityReport {
                event_id: "e1".into(),
                ratio: 0.59,
            }],
            t0(),
            &port,
        );
        assert_eq!(scheduler.active_id(), None);
        assert!(port.commands().is_empty());
    }

    #[test]
    fn test_threshold_boundary_activates() {
        let (mut scheduler, port) = feed();
        scheduler.observe(
            &[VisibilityReport {
                event_id: "e1".into(),
                ratio: 0.6,
            }],
            t0(),
            &port,
        );
        assert_eq!(scheduler.active_id(), Some("e1"));
    }

    #[test]
    fn test_transition_emits_dwell_and_resets_others() {
        let (mut scheduler, port) = feed();
        scheduler.observe(&[visible("e1")], t0(), &port);
        port.clear();

        let sample = scheduler
            .observe(&[visible("e2")], t0() + Duration::seconds(7), &port)
            .unwrap();
        assert_eq!(sample.event_id, "e1");
        assert_eq!(sample.seconds, 7);
        assert_eq!(scheduler.active_id(), Some("e2"));

        assert!(port.for_event("e1").contains(&PlaybackCommand::Pause {
            event_id: "e1".into(),
            reset: true,
        }));
        assert!(port.for_event("e2").contains(&PlaybackCommand::Play {
            event_id: "e2".into()
        }));
    }

    #[test]
    fn test_quick_flick_produces_no_sample() {
        let (mut scheduler, port) = feed();
        scheduler.observe(&[visible("e1")], t0(), &port);
        let sample = scheduler.observe(
            &[visible("e2")],
            t0() + Duration::milliseconds(400),
            &port,
        );
        assert!(sample.is_none());
        assert_eq!(scheduler.active_id(), Some("e2"));
    }

    #[test]
    fn test_batch_with_two_qualifying_picks_earliest_in_feed() {
        let (mut scheduler, _port) = feed();
        let port = RecordingPort::new();
        scheduler.observe(&[visible("e3"), visible("e2")], t0(), &port);
        assert_eq!(scheduler.active_id(), Some("e2"));
    }

    #[test]
    fn test_duplicate_observation_is_idempotent() {
        let (mut scheduler, port) = feed();
        scheduler.observe(&[visible("e1")], t0(), &port);
        port.clear();
        let sample = scheduler.observe(&[visible("e1")], t0() + Duration::seconds(3), &port);
        assert!(sample.is_none());
        assert!(port.commands().is_empty());
        // Dwell clock kept its original start
        let sample = scheduler
            .observe(&[visible("e2")], t0() + Duration::seconds(5), &port)
            .unwrap();
        assert_eq!(sample.seconds, 5);
    }

    #[test]
    fn test_pause_keeps_dwell_running() {
        let (mut scheduler, port) = feed();
        scheduler.observe(&[visible("e1")], t0(), &port);
        assert!(scheduler.toggle_pause(&port));
        assert!(port.for_event("e1").contains(&PlaybackCommand::Pause {
            event_id: "e1".into(),
            reset: false,
        }));
        let sample = scheduler
            .observe(&[visible("e2")], t0() + Duration::seconds(10), &port)
            .unwrap();
        assert_eq!(sample.seconds, 10);
    }

    #[test]
    fn test_pause_survives_transition() {
        let (mut scheduler, port) = feed();
        scheduler.observe(&[visible("e1")], t0(), &port);
        scheduler.toggle_pause(&port);
        port.clear();
        scheduler.observe(&[visible("e2")], t0() + Duration::seconds(2), &port);
        let e2 = port.for_event("e2");
        assert!(e2.contains(&PlaybackCommand::Pause {
            event_id: "e2".into(),
            reset: false,
        }));
        assert!(!e2.contains(&PlaybackCommand::Play {
            event_id: "e2".into()
        }));
    }

    #[test]
    fn test_unpause_resumes_active() {
        let (mut scheduler, port) = feed();
        scheduler.observe(&[visible("e1")], t0(), &port);
        scheduler.toggle_pause(&port);
        port.clear();
        assert!(!scheduler.toggle_pause(&port));
        assert!(port.for_event("e1").contains(&PlaybackCommand::Play {
            event_id: "e1".into()
        }));
    }

    #[test]
    fn test_mute_fans_out_to_all_mounted() {
        let (mut scheduler, port) = feed();
        scheduler.observe(&[visible("e1")], t0(), &port);
        port.clear();
        assert!(!scheduler.toggle_mute(&port));
        for id in ["e1", "e2", "e3"] {
            assert!(port.for_event(id).contains(&PlaybackCommand::SetMuted {
                event_id: id.into(),
                muted: false,
            }));
        }
        // New active item inherits the unmuted state
        port.clear();
        scheduler.observe(&[visible("e2")], t0() + Duration::seconds(2), &port);
        assert!(port.for_event("e2").contains(&PlaybackCommand::SetMuted {
            event_id: "e2".into(),
            muted: false,
        }));
    }

    #[test]
    fn test_page_hidden_flushes_and_visible_reopens() {
        let (mut scheduler, port) = feed();
        scheduler.observe(&[visible("e1")], t0(), &port);

        let sample = scheduler.page_hidden(t0() + Duration::seconds(4)).unwrap();
        assert_eq!(sample.seconds, 4);
        // Hidden time never accrues
        assert!(scheduler
            .page_visible(t0() + Duration::seconds(60))
            .is_none());
        let sample = scheduler.finish(t0() + Duration::seconds(63)).unwrap();
        assert_eq!(sample.event_id, "e1");
        assert_eq!(sample.seconds, 3);
    }

    #[test]
    fn test_finish_flushes_open_span_once() {
        let (mut scheduler, port) = feed();
        scheduler.observe(&[visible("e1")], t0(), &port);
        let sample = scheduler.finish(t0() + Duration::seconds(9)).unwrap();
        assert_eq!(sample.seconds, 9);
        assert!(scheduler.finish(t0() + Duration::seconds(12)).is_none());
    }

    #[test]
    fn test_unmount_active_closes_span() {
        let (mut scheduler, port) = feed();
        scheduler.observe(&[visible("e1")], t0(), &port);
        let sample = scheduler
            .unmount("e1", t0() + Duration::seconds(2))
            .unwrap();
        assert_eq!(sample.event_id, "e1");
        assert_eq!(scheduler.active_id(), None);
    }

    #[test]
    fn test_preload_window_follows_active() {
        let (mut scheduler, port) = feed();
        scheduler.observe(&[visible("e2")], t0(), &port);
        port.clear();
        scheduler.observe(&[visible("e3")], t0() + Duration::seconds(2), &port);
        assert!(port.for_event("e1").contains(&PlaybackCommand::SetPreload {
            event_id: "e1".into(),
            preload: false,
        }));
        assert!(port.for_event("e3").contains(&PlaybackCommand::SetPreload {
            event_id: "e3".into(),
            preload: true,
        }));
    }
}
