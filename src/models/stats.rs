//! Judgement results and accumulated play statistics.

use serde::{Deserialize, Serialize};

/// Result of judging one note event, from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteResult {
    Cool,
    Good,
    Bad,
    Miss,
}

impl NoteResult {
    /// Returns true for results that keep the combo going.
    pub fn keeps_combo(&self) -> bool {
        matches!(self, NoteResult::Cool | NoteResult::Good)
    }
}

/// Progress of a hold while it is being pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldResult {
    /// The hold chain was broken.
    Break,
    /// One more hold-credit tick.
    Add,
}

/// Everything the score aggregator needs to know about one judgement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteHitInfo {
    pub lane: usize,
    pub result: NoteResult,
    /// Signed `press - note` delta in milliseconds.
    pub delta_ms: f64,
    /// True when this judgement is a hold release.
    pub is_release: bool,
    pub is_hold: bool,
}

/// Counters exposed to presentation code.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreInfo {
    pub score: u64,
    pub life: f64,
    pub combo: u32,
    pub max_combo: u32,
    pub cool_combo: u32,
    pub jam_gauge: u32,
    pub jam_combo: u32,
    pub max_jam_combo: u32,
    pub ln_combo: u32,
    pub ln_max_combo: u32,
    pub pills: u32,
    pub hit_stats: HitStats,
}

/// Accumulated hit statistics for a play session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HitStats {
    pub cool: u32,
    pub good: u32,
    pub bad: u32,
    pub miss: u32,
}

impl HitStats {
    /// Creates empty hit statistics.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: NoteResult) {
        match result {
            NoteResult::Cool => self.cool += 1,
            NoteResult::Good => self.good += 1,
            NoteResult::Bad => self.bad += 1,
            NoteResult::Miss => self.miss += 1,
        }
    }

    /// Total number of judged events.
    pub fn total(&self) -> u32 {
        self.cool + self.good + self.bad + self.miss
    }

    /// Weighted accuracy percentage (Cool 100%, Good 50%, Bad 10%).
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let weighted = self.cool as f64 + self.good as f64 * 0.5 + self.bad as f64 * 0.1;
        weighted / total as f64 * 100.0
    }
}
