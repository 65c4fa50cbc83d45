//! Session state: the engine and its per-lane tracks.

pub mod game;
pub mod traits;

pub use game::{EngineState, InputEvent, RhythmEngine};
pub use traits::{Snapshot, Update};
