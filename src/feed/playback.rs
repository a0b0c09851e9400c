//! Playback command fan-out.
//!
//! The scheduler decides what each mounted player should do and expresses
//! it as [`PlaybackCommand`]s; the port delivers them. In production the
//! port is a broadcast channel drained by the websocket layer, in tests a
//! recorder.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::trace;

/// One instruction for one player, in the order the scheduler decided it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlaybackCommand {
    Play {
        event_id: String,
    },
    /// `reset` rewinds to the start; off-screen items are paused with
    /// reset, a user pause keeps the position.
    Pause {
        event_id: String,
        reset: bool,
    },
    SetMuted {
        event_id: String,
        muted: bool,
    },
    /// Volume in `[0, 1]`. The stock UI only drives mute, but the player
    /// surface accepts a level.
    SetVolume {
        event_id: String,
        volume: f64,
    },
    /// Toggle source attachment. Only the active item and its successor
    /// keep a source attached.
    SetPreload {
        event_id: String,
        preload: bool,
    },
}

impl PlaybackCommand {
    pub fn event_id(&self) -> &str {
        match self {
            PlaybackCommand::Play { event_id }
            | PlaybackCommand::Pause { event_id, .. }
            | PlaybackCommand::SetMuted { event_id, .. }
            | PlaybackCommand::SetVolume { event_id, .. }
            | PlaybackCommand::SetPreload { event_id, .. } => event_id,
        }
    }
}

/// Delivery seam for playback commands.
pub trait PlaybackPort: Send + Sync {
    fn send(&self, command: PlaybackCommand);
}

/// Production port: fans commands out to every connected websocket.
pub struct BroadcastPort {
    tx: broadcast::Sender<PlaybackCommand>,
}

impl BroadcastPort {
    pub fn new(tx: broadcast::Sender<PlaybackCommand>) -> Self {
        BroadcastPort { tx }
    }
}

impl PlaybackPort for BroadcastPort {
    fn send(&self, command: PlaybackCommand) {
        trace!("playback: {:?}", command);
        // No subscribers just means no client is connected yet
        let _ = self.tx.send(command);
    }
}

/// Test port: records every command in order.
#[derive(Clone, Default)]
pub struct RecordingPort {
    commands: Arc<Mutex<Vec<PlaybackCommand>>>,
}

impl RecordingPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<PlaybackCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.commands.lock().unwrap().clear();
    }

    /// Commands addressed to one item, in order.
    pub fn for_event(&self, event_id: &str) -> Vec<PlaybackCommand> {
        self.commands()
            .into_iter()
            .filter(|c| c.event_id() == event_id)
            .collect()
    }
}

impl PlaybackPort for RecordingPort {
    fn send(&self, command: PlaybackCommand) {
        self.commands.lock().unwrap().push(command);
    }
}

/// The set of players currently mounted in the client. The scheduler only
/// addresses mounted items; commands for an unmounted player would be
/// dropped on the floor anyway.
#[derive(Debug, Default)]
pub struct PlaybackRegistry {
    mounted: BTreeSet<String>,
}

impl PlaybackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mounted player. Re-mounting is a no-op.
    pub fn mount(&mut self, event_id: &str) -> bool {
        self.mounted.insert(event_id.to_string())
    }

    pub fn unmount(&mut self, event_id: &str) -> bool {
        self.mounted.remove(event_id)
    }

    pub fn is_mounted(&self, event_id: &str) -> bool {
        self.mounted.contains(event_id)
    }

    pub fn mounted(&self) -> impl Iterator<Item = &str> {
        self.mounted.iter().map(String::as_str)
    }
}
