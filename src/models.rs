use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of a two-option event a wager backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::A => "A",
            Side::B => "B",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Ongoing,
    Settled,
}

/// A two-option prediction event backed by a short video card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCard {
    pub id: String,
    pub title: String,
    pub description: String,
    pub video_url: String,
    pub poster_url: String,
    /// Sponsor label shown on the card, if any
    #[serde(default)]
    pub brand_name: Option<String>,
    pub option_a: String,
    pub option_b: String,
    /// Points wagered on side A (monotonically non-decreasing while ongoing)
    pub pool_a: u64,
    /// Points wagered on side B (monotonically non-decreasing while ongoing)
    pub pool_b: u64,
    pub deadline: DateTime<Utc>,
    pub status: EventStatus,
    /// Winning side, set only once status is `Settled`
    #[serde(default)]
    pub winner: Option<Side>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl EventCard {
    pub fn pool(&self, side: Side) -> u64 {
        match side {
            Side::A => self.pool_a,
            Side::B => self.pool_b,
        }
    }

    pub fn option_label(&self, side: Side) -> &str {
        match side {
            Side::A => &self.option_a,
            Side::B => &self.option_b,
        }
    }

    pub(crate) fn credit_pool(&mut self, side: Side, amount: u64) {
        match side {
            Side::A => self.pool_a += amount,
            Side::B => self.pool_b += amount,
        }
    }
}

/// The session user. Balance is exclusively owned by the session and must
/// never go negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
    pub points: u64,
    pub login_streak: u32,
}

/// An immutable point commitment to one side of an event.
/// Displayed to end users as a "prediction" or "vote".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wager {
    pub id: String,
    pub event_id: String,
    pub side: Side,
    pub amount: u64,
    /// Payout snapshot computed from the post-wager pools
    pub potential_win: Option<u64>,
    pub placed_at: DateTime<Utc>,
}
