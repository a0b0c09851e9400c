use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{EventCard, EventStatus, Side, User, Wager};
use crate::odds::{self, PoolOdds};

/// Whether the ledger itself blocks a second wager against the same event.
/// The reference UI only hides the voting control after a wager, so `Allow`
/// reproduces the observed behavior; `Reject` adds a core-level guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RevotePolicy {
    Allow,
    Reject,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WagerError {
    #[error("wager amount must be a positive number of points")]
    InvalidAmount,
    #[error("not enough points: wager of {amount} exceeds balance of {balance}")]
    InsufficientBalance { amount: u64, balance: u64 },
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("event '{0}' is already settled")]
    EventSettled(String),
    #[error("a wager already exists for event '{0}'")]
    AlreadyWagered(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GrantError {
    #[error("point grant must be a positive number of points")]
    InvalidAmount,
}

/// Outcome of a successful wager, carrying everything the telemetry and UI
/// paths need without re-querying the session.
#[derive(Debug, Clone)]
pub struct WagerReceipt {
    pub wager: Wager,
    pub event_id: String,
    pub event_title: String,
    pub option_label: String,
    /// Odds recomputed from the already-mutated pools
    pub odds: PoolOdds,
    /// True when this is the first wager this session recorded against the event
    pub first_for_event: bool,
    pub balance_after: u64,
}

/// All mutable session state: the user, the event catalog and the
/// append-only wager list (newest first). Every mutation runs to
/// completion inside the single engine task, so there is no suspension
/// point between reading a balance and writing it back.
pub struct Session {
    pub user: User,
    pub events: Vec<EventCard>,
    /// Newest first; wagers are immutable once created
    pub wagers: Vec<Wager>,
    revote_policy: RevotePolicy,
    /// Base used for the profile "total asset value" card
    initial_balance: u64,
    wager_seq: u64,
}

impl Session {
    pub fn new(user: User, events: Vec<EventCard>, revote_policy: RevotePolicy) -> Self {
        let initial_balance = user.points;
        Session {
            user,
            events,
            wagers: Vec::new(),
            revote_policy,
            initial_balance,
            wager_seq: 0,
        }
    }

    pub fn event(&self, event_id: &str) -> Option<&EventCard> {
        self.events.iter().find(|e| e.id == event_id)
    }

    /// The session's wager against an event, if any (newest wins).
    pub fn wager_for(&self, event_id: &str) -> Option<&Wager> {
        self.wagers.iter().find(|w| w.event_id == event_id)
    }

    pub fn odds_for(&self, event_id: &str) -> Option<PoolOdds> {
        self.event(event_id)
            .map(|e| odds::pool_odds(e.pool_a, e.pool_b))
    }

    /// Apply a wager as a single atomic transition: debit the balance,
    /// credit the chosen pool, and prepend an immutable wager record.
    /// On any precondition failure nothing is mutated and the error is
    /// returned to the caller to surface.
    pub fn apply_wager(
        &mut self,
        event_id: &str,
        side: Side,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<WagerReceipt, WagerError> {
        if amount == 0 {
            return Err(WagerError::InvalidAmount);
        }
        if amount > self.user.points {
            return Err(WagerError::InsufficientBalance {
                amount,
                balance: self.user.points,
            });
        }
        let first_for_event = self.wager_for(event_id).is_none();
        if !first_for_event && self.revote_policy == RevotePolicy::Reject {
            return Err(WagerError::AlreadyWagered(event_id.to_string()));
        }

        let event = self
            .events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| WagerError::UnknownEvent(event_id.to_string()))?;
        if event.status == EventStatus::Settled {
            return Err(WagerError::EventSettled(event_id.to_string()));
        }

        // All preconditions hold; from here both sub-effects happen.
        self.user.points -= amount;
        event.credit_pool(side, amount);

        let odds = odds::pool_odds(event.pool_a, event.pool_b);
        let potential = odds::potential_win(amount, odds.multiplier(side));
        self.wager_seq += 1;
        let wager = Wager {
            id: format!("w{}-{}", now.timestamp_millis(), self.wager_seq),
            event_id: event.id.clone(),
            side,
            amount,
            potential_win: Some(potential),
            placed_at: now,
        };
        let receipt = WagerReceipt {
            wager: wager.clone(),
            event_id: event.id.clone(),
            event_title: event.title.clone(),
            option_label: event.option_label(side).to_string(),
            odds,
            first_for_event,
            balance_after: self.user.points,
        };
        self.wagers.insert(0, wager);
        Ok(receipt)
    }

    /// Credit-only transition: login bonuses, ad rewards, top-ups and
    /// promotional grants all land here. The purchase/authorization flow
    /// itself is out of scope.
    pub fn grant_points(&mut self, amount: u64) -> Result<u64, GrantError> {
        if amount == 0 {
            return Err(GrantError::InvalidAmount);
        }
        self.user.points += amount;
        Ok(self.user.points)
    }

    /// Profile-card asset figure: base balance plus a one-time engagement
    /// bonus once the user has voted at all. Pending winnings are not
    /// included.
    pub fn total_asset_value(&self) -> u64 {
        if self.wagers.is_empty() {
            self.initial_balance
        } else {
            self.initial_balance + 500
        }
    }

    pub fn wager_count(&self) -> usize {
        self.wagers.len()
    }
}
