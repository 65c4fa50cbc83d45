pub mod constants;
pub mod hit_window;
pub mod note;
pub mod timing;

pub use constants::*;
pub use hit_window::{BeatJudge, JudgePolicy, MsJudge, judge_for};
pub use note::{Note, NoteEvent, NoteState};
pub use timing::{StaticTiming, TimingResolver, VelocityTiming, resolver_for};
