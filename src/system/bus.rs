//! Event queue between the engine and presentation code.
//!
//! The engine pushes [`GameEvent`]s while it ticks; the presentation layer
//! drains them once per frame. Both ends are `crossbeam-channel` handles,
//! so the receiver can live on another thread.

use crate::models::chart::SampleId;
use crate::models::stats::{NoteHitInfo, ScoreInfo};
use crossbeam_channel::{Receiver, Sender, TryIter, unbounded};

/// Notifications produced by a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Key state for the lane's key sprite.
    KeyVisual {
        lane: usize,
        pressed: bool,
        /// True when the press hit a note or a hold is being held.
        active: bool,
    },
    /// A note was judged and the counters changed.
    ScoreChanged { hit: NoteHitInfo, score: ScoreInfo },
    /// The jam gauge filled.
    JamTriggered { jam_combo: u32 },
    /// Hold credit ticked or a hold chain broke.
    LongNoteCredit { ln_combo: u32 },
    Finished { score: ScoreInfo },
}

/// Commands sent to the dedicated audio thread.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCommand {
    Play { id: SampleId, volume: f32, pan: f32 },
    Stop { id: SampleId },
    StopAll,
    Shutdown,
}

/// Both ends of the engine event queue.
#[derive(Clone)]
pub struct EventBus {
    tx: Sender<GameEvent>,
    rx: Receiver<GameEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Never blocks; a closed queue drops the event.
    pub fn emit(&self, event: GameEvent) {
        let _ = self.tx.send(event);
    }

    /// Receiver for presentation code on another thread.
    pub fn subscribe(&self) -> Receiver<GameEvent> {
        self.rx.clone()
    }

    /// Takes every queued event.
    pub fn drain(&self) -> TryIter<'_, GameEvent> {
        self.rx.try_iter()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
