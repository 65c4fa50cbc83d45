//! Judge policies: hit windows in beat ticks or in milliseconds.

use super::constants::{MS_PER_MEASURE_AT_1BPM, TICKS_PER_MEASURE};
use super::note::Note;
use crate::models::settings::JudgeMode;
use crate::models::stats::NoteResult;

/// Classifies a press against a note's current hit time.
///
/// `time` is the logical clock at the key event. Every method judges
/// against [`Note::hit_time`], so a hold is judged on its head until the
/// head is resolved and on its tail afterwards.
pub trait JudgePolicy: Send {
    /// Returns whether the press counts, and its result.
    fn calculate_result(&self, note: &Note, time: f64) -> (bool, NoteResult);

    /// True once `time` is past the last window with no press.
    fn is_missed(&self, note: &Note, time: f64) -> bool;

    /// False while the note is still too far ahead to be pressed.
    fn is_accepted(&self, note: &Note, time: f64) -> bool;
}

/// Windows in 1/192 measure ticks at the note's tempo.
#[derive(Debug, Clone, Copy)]
pub struct BeatJudge {
    pub cool: f64,
    pub good: f64,
    pub bad: f64,
}

impl Default for BeatJudge {
    fn default() -> Self {
        Self {
            cool: 6.0,
            good: 18.0,
            bad: 25.0,
        }
    }
}

impl BeatJudge {
    /// Signed `note - press` distance in ticks.
    fn ticks(&self, note: &Note, time: f64) -> f64 {
        let measure_ms = MS_PER_MEASURE_AT_1BPM / note.hit_bpm();
        (note.hit_time() - time) / measure_ms * TICKS_PER_MEASURE
    }
}

impl JudgePolicy for BeatJudge {
    fn calculate_result(&self, note: &Note, time: f64) -> (bool, NoteResult) {
        let ticks = self.ticks(note, time).abs();
        if ticks <= self.cool {
            (true, NoteResult::Cool)
        } else if ticks <= self.good {
            (true, NoteResult::Good)
        } else if ticks <= self.bad {
            (true, NoteResult::Bad)
        } else {
            (false, NoteResult::Miss)
        }
    }

    fn is_missed(&self, note: &Note, time: f64) -> bool {
        self.ticks(note, time) < -self.bad
    }

    fn is_accepted(&self, note: &Note, time: f64) -> bool {
        self.ticks(note, time) <= self.bad
    }
}

/// Fixed millisecond windows.
#[derive(Debug, Clone, Copy)]
pub struct MsJudge {
    pub cool_ms: f64,
    pub good_ms: f64,
    pub bad_ms: f64,
    /// Presses between `bad_ms` and this still count, as a Miss.
    pub miss_ms: f64,
}

impl Default for MsJudge {
    fn default() -> Self {
        Self {
            cool_ms: 41.0,
            good_ms: 125.0,
            bad_ms: 173.0,
            miss_ms: 184.0,
        }
    }
}

impl JudgePolicy for MsJudge {
    fn calculate_result(&self, note: &Note, time: f64) -> (bool, NoteResult) {
        let delta = (note.hit_time() - time).abs();
        if delta <= self.cool_ms {
            (true, NoteResult::Cool)
        } else if delta <= self.good_ms {
            (true, NoteResult::Good)
        } else if delta <= self.bad_ms {
            (true, NoteResult::Bad)
        } else if delta <= self.miss_ms {
            (true, NoteResult::Miss)
        } else {
            (false, NoteResult::Miss)
        }
    }

    fn is_missed(&self, note: &Note, time: f64) -> bool {
        note.hit_time() - time < -self.miss_ms
    }

    fn is_accepted(&self, note: &Note, time: f64) -> bool {
        note.hit_time() - time <= self.bad_ms
    }
}

/// Builds the policy for a judge mode.
pub fn judge_for(mode: JudgeMode) -> Box<dyn JudgePolicy> {
    match mode {
        JudgeMode::Beat => Box::new(BeatJudge::default()),
        JudgeMode::Millisecond => Box::new(MsJudge::default()),
    }
}
