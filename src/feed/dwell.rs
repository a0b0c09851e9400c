//! Dwell tracking.
//!
//! At most one feed item accrues watch time at a time. The tracker is an
//! explicit two-state machine so a transition can never double-count:
//! closing the current span and opening the next are the same operation.

use chrono::{DateTime, Utc};

/// Minimum span length worth reporting, in whole seconds. Spans shorter
/// than this are flicks past an item, not views.
pub const MIN_DWELL_SECS: i64 = 1;

/// A completed watch span on one item. Seconds are floored, never rounded
/// up, so a sample of `n` means at least `n` full seconds on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DwellSample {
    pub event_id: String,
    pub seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DwellState {
    Idle,
    Tracking {
        event_id: String,
        started_at: DateTime<Utc>,
    },
}

/// Tracks which item is accruing watch time. All methods take `now`
/// explicitly; the tracker never reads the clock itself.
#[derive(Debug)]
pub struct DwellTracker {
    state: DwellState,
}

impl Default for DwellTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DwellTracker {
    pub fn new() -> Self {
        DwellTracker {
            state: DwellState::Idle,
        }
    }

    /// Start (or restart) tracking `event_id`. If a different item was
    /// being tracked its span is closed and returned; re-opening the item
    /// already being tracked is a no-op and keeps the original start time.
    pub fn begin(&mut self, event_id: &str, now: DateTime<Utc>) -> Option<DwellSample> {
        if let DwellState::Tracking { event_id: cur, .. } = &self.state {
            if cur == event_id {
                return None;
            }
        }
        let sample = self.flush(now);
        self.state = DwellState::Tracking {
            event_id: event_id.to_string(),
            started_at: now,
        };
        sample
    }

    /// Close the current span, if any, and go idle. Spans shorter than
    /// [`MIN_DWELL_SECS`] are discarded; the one-second boundary itself
    /// still counts.
    pub fn flush(&mut self, now: DateTime<Utc>) -> Option<DwellSample> {
        let DwellState::Tracking {
            event_id,
            started_at,
        } = std::mem::replace(&mut self.state, DwellState::Idle)
        else {
            return None;
        };
        let seconds = (now - started_at).num_seconds();
        if seconds >= MIN_DWELL_SECS {
            Some(DwellSample { event_id, seconds })
        } else {
            None
        }
    }

    /// Id of the item currently accruing time, if any.
    pub fn tracking(&self) -> Option<&str> {
        match &self.state {
            DwellState::Tracking { event_id, .. } => Some(event_id),
            DwellState::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        "2026-01-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_begin_then_flush_reports_floor_seconds() {
        let mut tracker = DwellTracker::new();
        assert!(tracker.begin("e1", t0()).is_none());
        let sample = tracker
            .flush(t0() + Duration::milliseconds(3_700))
            .unwrap();
        assert_eq!(sample.event_id, "e1");
        assert_eq!(sample.seconds, 3);
        assert_eq!(tracker.tracking(), None);
    }

    #[test]
    fn test_sub_second_span_discarded() {
        let mut tracker = DwellTracker::new();
        tracker.begin("e1", t0());
        assert!(tracker.flush(t0() + Duration::milliseconds(900)).is_none());
    }

    #[test]
    fn test_exactly_one_second_counts() {
        let mut tracker = DwellTracker::new();
        tracker.begin("e1", t0());
        let sample = tracker.flush(t0() + Duration::seconds(1)).unwrap();
        assert_eq!(sample.seconds, 1);
    }

    #[test]
    fn test_just_over_one_second_floors_to_one() {
        let mut tracker = DwellTracker::new();
        tracker.begin("e1", t0());
        let sample = tracker
            .flush(t0() + Duration::milliseconds(1_200))
            .unwrap();
        assert_eq!(sample.seconds, 1);
    }

    #[test]
    fn test_switch_closes_previous_span() {
        let mut tracker = DwellTracker::new();
        tracker.begin("e1", t0());
        let sample = tracker.begin("e2", t0() + Duration::seconds(5)).unwrap();
        assert_eq!(sample.event_id, "e1");
        assert_eq!(sample.seconds, 5);
        assert_eq!(tracker.tracking(), Some("e2"));
    }

    #[test]
    fn test_reopen_same_item_keeps_start() {
        let mut tracker = DwellTracker::new();
        tracker.begin("e1", t0());
        // Duplicate activation two seconds in must not reset the clock
        assert!(tracker.begin("e1", t0() + Duration::seconds(2)).is_none());
        let sample = tracker.flush(t0() + Duration::seconds(6)).unwrap();
        assert_eq!(sample.seconds, 6);
    }

    #[test]
    fn test_flush_when_idle_is_none() {
        let mut tracker = DwellTracker::new();
        assert!(tracker.flush(t0()).is_none());
    }

    #[test]
    fn test_double_flush_reports_once() {
        let mut tracker = DwellTracker::new();
        tracker.begin("e1", t0());
        assert!(tracker.flush(t0() + Duration::seconds(2)).is_some());
        assert!(tracker.flush(t0() + Duration::seconds(4)).is_none());
    }
}
