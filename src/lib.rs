//! Gameplay core for an O2Jam-style vertical scrolling rhythm game.
//!
//! Charts are read from OJN, BMS or osu!mania files, normalized into a
//! [`Chart`], and played by a [`RhythmEngine`] that owns the clock, the
//! per-lane tracks, judgement and scoring. Audio output is pluggable
//! through [`SampleStore`].

pub mod database;
pub mod formats;
pub mod logic;
pub mod models;
pub mod normalize;
pub mod state;
pub mod system;

pub use formats::{ParseError, ParseFormat, ParseWarning, load_chart};
pub use logic::audio::{SampleScheduler, SampleStore, SilentSampleStore};
pub use models::chart::{Chart, NoteInfo, NoteType, TimingInfo};
pub use models::replay::ReplayData;
pub use models::settings::{JudgeMode, SessionConfig};
pub use models::stats::{NoteResult, ScoreInfo};
pub use state::game::{GameplaySnapshot, ScoreAggregator};
pub use state::{EngineState, InputEvent, RhythmEngine, Snapshot, Update};
pub use system::bus::{EventBus, GameEvent};
