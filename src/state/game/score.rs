//! Score, life, combo, jam gauge and pill bookkeeping.

use crate::models::stats::{HoldResult, NoteHitInfo, NoteResult, ScoreInfo};

pub const MAX_LIFE: f64 = 100.0;
pub const MAX_PILLS: u32 = 5;
pub const COOLS_PER_PILL: u32 = 15;
pub const JAM_GAUGE_MAX: u32 = 100;

const COOL_LIFE: f64 = 0.1;
const GOOD_LIFE: f64 = 0.05;
const BAD_LIFE: f64 = -0.5;
const MISS_LIFE: f64 = -3.0;
const COOL_JAM: u32 = 4;
const MISS_SCORE: u64 = 10;

/// What a single judgement changed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreUpdate {
    /// Result after a pill upgrade.
    pub result: NoteResult,
    pub pill_used: bool,
    pub pill_gained: bool,
    /// Set when the jam gauge filled, with the new jam combo.
    pub jam: Option<u32>,
    /// False for a Miss scored after life reached zero.
    pub notify: bool,
}

/// Pure state machine over judgement results.
#[derive(Debug, Clone)]
pub struct ScoreAggregator {
    info: ScoreInfo,
}

impl Default for ScoreAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreAggregator {
    pub fn new() -> Self {
        Self {
            info: ScoreInfo {
                life: MAX_LIFE,
                ..ScoreInfo::default()
            },
        }
    }

    pub fn info(&self) -> &ScoreInfo {
        &self.info
    }

    pub fn is_dead(&self) -> bool {
        self.info.life <= 0.0
    }

    fn add_life(&mut self, amount: f64) {
        if self.info.life > 0.0 {
            self.info.life = (self.info.life + amount).clamp(0.0, MAX_LIFE);
        }
    }

    fn cool(&mut self) {
        self.add_life(COOL_LIFE);
        self.info.jam_gauge += COOL_JAM;
        self.info.score += 200 + 10 * self.info.jam_combo as u64;
    }

    /// Applies one note judgement.
    pub fn apply(&mut self, hit: &NoteHitInfo) -> ScoreUpdate {
        let mut update = ScoreUpdate {
            result: hit.result,
            pill_used: false,
            pill_gained: false,
            jam: None,
            notify: true,
        };

        match hit.result {
            NoteResult::Cool => self.cool(),
            NoteResult::Good => {
                self.add_life(GOOD_LIFE);
                self.info.score += 100 + 5 * self.info.jam_combo as u64;
            }
            NoteResult::Bad if self.info.pills > 0 => {
                self.info.pills -= 1;
                update.pill_used = true;
                update.result = NoteResult::Cool;
                self.cool();
            }
            NoteResult::Bad => {
                self.add_life(BAD_LIFE);
                self.info.jam_gauge = 0;
                self.info.cool_combo = 0;
                self.info.score += 4;
                self.info.combo = 0;
            }
            NoteResult::Miss => {
                self.info.jam_combo = 0;
                self.info.jam_gauge = 0;
                self.info.combo = 0;
                if self.info.life > 0.0 {
                    self.info.score = self.info.score.saturating_sub(MISS_SCORE);
                } else {
                    update.notify = false;
                }
                self.add_life(MISS_LIFE);
            }
        }

        if update.result == NoteResult::Cool {
            self.info.cool_combo += 1;
            if self.info.cool_combo >= COOLS_PER_PILL {
                self.info.cool_combo = 0;
                if self.info.pills < MAX_PILLS {
                    self.info.pills += 1;
                    update.pill_gained = true;
                }
            }
        } else {
            self.info.cool_combo = 0;
        }

        if update.result.keeps_combo() {
            self.info.combo += 1;
            self.info.max_combo = self.info.max_combo.max(self.info.combo);
        }

        if self.info.jam_gauge >= JAM_GAUGE_MAX {
            self.info.jam_gauge = 0;
            self.info.jam_combo += 1;
            self.info.max_jam_combo = self.info.max_jam_combo.max(self.info.jam_combo);
            update.jam = Some(self.info.jam_combo);
        }

        self.info.hit_stats.record(update.result);
        update
    }

    /// Applies one hold-progress tick. Returns the new long-note combo.
    pub fn apply_hold(&mut self, result: HoldResult) -> u32 {
        match result {
            HoldResult::Break => self.info.ln_combo = 0,
            HoldResult::Add => {
                self.info.ln_combo += 1;
                self.info.ln_max_combo = self.info.ln_max_combo.max(self.info.ln_combo);
            }
        }
        self.info.ln_combo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(result: NoteResult) -> NoteHitInfo {
        NoteHitInfo {
            lane: 0,
            result,
            delta_ms: 0.0,
            is_release: false,
            is_hold: false,
        }
    }

    #[test]
    fn test_fifteen_cools_grant_one_pill() {
        let mut score = ScoreAggregator::new();
        let gained: Vec<bool> = (0..15)
            .map(|_| score.apply(&hit(NoteResult::Cool)).pill_gained)
            .collect();
        assert_eq!(score.info().pills, 1);
        assert_eq!(gained.iter().filter(|g| **g).count(), 1);
        assert!(gained[14]);
    }

    #[test]
    fn test_pills_are_capped() {
        let mut score = ScoreAggregator::new();
        for _ in 0..15 * 7 {
            score.apply(&hit(NoteResult::Cool));
        }
        assert_eq!(score.info().pills, MAX_PILLS);
    }

    #[test]
    fn test_bad_consumes_pill() {
        let mut score = ScoreAggregator::new();
        for _ in 0..15 {
            score.apply(&hit(NoteResult::Cool));
        }
        let combo = score.info().combo;
        let update = score.apply(&hit(NoteResult::Bad));
        assert!(update.pill_used);
        assert_eq!(update.result, NoteResult::Cool);
        assert_eq!(score.info().pills, 0);
        assert_eq!(score.info().combo, combo + 1);
        assert_eq!(score.info().hit_stats.cool, 16);
    }

    #[test]
    fn test_upgraded_bad_extends_cool_streak() {
        let mut score = ScoreAggregator::new();
        for _ in 0..15 {
            score.apply(&hit(NoteResult::Cool));
        }
        for _ in 0..3 {
            score.apply(&hit(NoteResult::Cool));
        }
        score.apply(&hit(NoteResult::Bad));
        assert_eq!(score.info().pills, 0);
        assert_eq!(score.info().cool_combo, 4);

        for _ in 0..10 {
            score.apply(&hit(NoteResult::Cool));
        }
        let update = score.apply(&hit(NoteResult::Cool));
        assert!(update.pill_gained);
        assert_eq!(score.info().pills, 1);
    }

    #[test]
    fn test_bad_without_pill_breaks_combo() {
        let mut score = ScoreAggregator::new();
        score.apply(&hit(NoteResult::Cool));
        score.apply(&hit(NoteResult::Bad));
        assert_eq!(score.info().combo, 0);
        assert_eq!(score.info().jam_gauge, 0);
        assert_eq!(score.info().life, 99.5);
    }

    #[test]
    fn test_miss_zeroes_combo() {
        let mut score = ScoreAggregator::new();
        for _ in 0..40 {
            score.apply(&hit(NoteResult::Good));
        }
        assert_eq!(score.info().max_combo, 40);
        score.apply(&hit(NoteResult::Miss));
        assert_eq!(score.info().combo, 0);
        assert_eq!(score.info().max_combo, 40);
    }

    #[test]
    fn test_jam_gauge_rolls_over() {
        let mut score = ScoreAggregator::new();
        let mut jams = Vec::new();
        for _ in 0..50 {
            if let Some(jam) = score.apply(&hit(NoteResult::Cool)).jam {
                jams.push(jam);
            }
        }
        assert_eq!(jams, vec![1, 2]);
        assert_eq!(score.info().jam_gauge, 0);
        // Jam combo raises the per-Cool score.
        let before = score.info().score;
        score.apply(&hit(NoteResult::Cool));
        assert_eq!(score.info().score - before, 220);
    }

    #[test]
    fn test_life_stays_in_bounds() {
        let mut score = ScoreAggregator::new();
        for _ in 0..2000 {
            score.apply(&hit(NoteResult::Cool));
            assert!(score.info().life <= MAX_LIFE);
        }
        for _ in 0..50 {
            score.apply(&hit(NoteResult::Miss));
            assert!(score.info().life >= 0.0);
        }
        assert!(score.is_dead());
        let update = score.apply(&hit(NoteResult::Miss));
        assert!(!update.notify);
        assert_eq!(score.info().life, 0.0);
    }

    #[test]
    fn test_miss_score_never_underflows() {
        let mut score = ScoreAggregator::new();
        score.apply(&hit(NoteResult::Miss));
        assert_eq!(score.info().score, 0);
    }

    #[test]
    fn test_hold_combo() {
        let mut score = ScoreAggregator::new();
        assert_eq!(score.apply_hold(HoldResult::Add), 1);
        assert_eq!(score.apply_hold(HoldResult::Add), 2);
        assert_eq!(score.apply_hold(HoldResult::Break), 0);
        assert_eq!(score.info().ln_max_combo, 2);
    }
}
