//! Runtime note and its per-lane state machine.
//!
//! ```text
//! Tap:  Active ──hit──> Passed ──> Remove
//!         └────miss────────────────> Remove
//! Hold: Pending ──hit──> Holding ──release──> Passed ──> Remove
//!          │                │ early release
//!          └──miss──> MissedHeadActive ──late grab──> Passed
//!                           └──tail missed──────────────> Remove
//! ```

use super::constants::HOLD_TICK_MS;
use super::hit_window::JudgePolicy;
use crate::models::chart::{NoteInfo, NoteType, SampleId};
use crate::models::stats::{HoldResult, NoteHitInfo, NoteResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteState {
    /// Tap waiting for a press.
    Active,
    /// Hold waiting for its head.
    Pending,
    /// Hold with its head hit and the key down.
    Holding,
    /// Hold whose head was missed or released early; the tail can still be
    /// grabbed.
    MissedHeadActive,
    /// Judged; kept until it leaves the screen.
    Passed,
    /// Ready to return to the pool.
    Remove,
}

/// Side effects a note transition asks its track to carry out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEvent {
    Judged(NoteHitInfo),
    Hold(HoldResult),
    StopKeysound(SampleId),
}

/// A live note bound to one chart note.
#[derive(Debug, Clone)]
pub struct Note {
    pub info: NoteInfo,
    pub state: NoteState,
    /// Tempo at the head, used by the beat judge.
    pub start_bpm: f64,
    /// Tempo at the tail.
    pub end_bpm: f64,
    /// Track position of the head.
    pub position: f64,
    pub end_position: f64,
    /// Time the last hold-credit tick was granted.
    last_score_time: Option<f64>,
    keysound_armed: bool,
}

impl Note {
    pub fn new(info: NoteInfo, start_bpm: f64, end_bpm: f64, position: f64, end_position: f64) -> Self {
        let state = match info.note_type {
            NoteType::Tap => NoteState::Active,
            NoteType::Hold => NoteState::Pending,
        };
        Self {
            info,
            state,
            start_bpm,
            end_bpm,
            position,
            end_position,
            last_score_time: None,
            keysound_armed: false,
        }
    }

    pub fn lane(&self) -> usize {
        self.info.lane
    }

    pub fn is_hold(&self) -> bool {
        self.info.note_type.is_hold()
    }

    /// Time the next judgement is made against: the head until it is
    /// resolved, the tail afterwards.
    pub fn hit_time(&self) -> f64 {
        match (self.info.note_type, self.state) {
            (NoteType::Tap, _) | (NoteType::Hold, NoteState::Pending) => self.info.start_time,
            _ => self.info.end_time,
        }
    }

    /// Tempo at [`Note::hit_time`].
    pub fn hit_bpm(&self) -> f64 {
        match (self.info.note_type, self.state) {
            (NoteType::Tap, _) | (NoteType::Hold, NoteState::Pending) => self.start_bpm,
            _ => self.end_bpm,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.state == NoteState::Passed
    }

    pub fn is_removable(&self) -> bool {
        self.state == NoteState::Remove
    }

    /// Marks the keysound as the lane's ghost-tap sound once the clock
    /// reaches the note. Returns true the first time.
    pub fn arm_keysound(&mut self, now: f64) -> bool {
        if self.keysound_armed || now < self.info.start_time {
            return false;
        }
        self.keysound_armed = true;
        true
    }

    fn hit_info(&self, result: NoteResult, now: f64, is_release: bool) -> NoteHitInfo {
        NoteHitInfo {
            lane: self.info.lane,
            result,
            delta_ms: now - self.hit_time(),
            is_release,
            is_hold: self.is_hold(),
        }
    }

    /// Advances the note with no key event.
    pub fn update(&mut self, now: f64, judge: &dyn JudgePolicy, out: &mut Vec<NoteEvent>) {
        match self.state {
            NoteState::Active => {
                if judge.is_missed(self, now) {
                    out.push(NoteEvent::Judged(self.hit_info(NoteResult::Miss, now, false)));
                    self.state = NoteState::Remove;
                }
            }
            NoteState::Pending => {
                if judge.is_missed(self, now) {
                    out.push(NoteEvent::Judged(self.hit_info(NoteResult::Miss, now, false)));
                    out.push(NoteEvent::Hold(HoldResult::Break));
                    self.state = NoteState::MissedHeadActive;
                }
            }
            NoteState::Holding => {
                if let Some(mut last) = self.last_score_time {
                    while now - last >= HOLD_TICK_MS
                        && last + HOLD_TICK_MS > self.info.start_time
                        && last + HOLD_TICK_MS <= self.info.end_time
                    {
                        last += HOLD_TICK_MS;
                        out.push(NoteEvent::Hold(HoldResult::Add));
                    }
                    self.last_score_time = Some(last);
                }
                if judge.is_missed(self, now) {
                    out.push(NoteEvent::Judged(self.hit_info(NoteResult::Miss, now, true)));
                    self.state = NoteState::Remove;
                }
            }
            NoteState::MissedHeadActive | NoteState::Passed => {
                if judge.is_missed(self, now) {
                    self.state = NoteState::Remove;
                }
            }
            NoteState::Remove => {}
        }
    }

    /// Judges a key press without changing state.
    pub fn check_hit(&self, now: f64, judge: &dyn JudgePolicy) -> (bool, NoteResult) {
        match self.state {
            NoteState::Active | NoteState::Pending | NoteState::MissedHeadActive => {
                judge.calculate_result(self, now)
            }
            _ => (false, NoteResult::Miss),
        }
    }

    /// Applies a press accepted by [`Note::check_hit`].
    pub fn on_hit(&mut self, result: NoteResult, now: f64, out: &mut Vec<NoteEvent>) {
        match self.state {
            NoteState::Pending => {
                out.push(NoteEvent::Judged(self.hit_info(result, now, false)));
                if result == NoteResult::Miss {
                    self.state = NoteState::MissedHeadActive;
                    out.push(NoteEvent::Hold(HoldResult::Break));
                } else {
                    self.state = NoteState::Holding;
                    self.last_score_time = Some(now);
                    out.push(NoteEvent::Hold(HoldResult::Add));
                }
            }
            NoteState::MissedHeadActive => {
                out.push(NoteEvent::Judged(self.hit_info(result, now, true)));
                out.push(NoteEvent::Hold(HoldResult::Break));
                self.state = NoteState::Passed;
            }
            NoteState::Active => {
                out.push(NoteEvent::Judged(self.hit_info(result, now, false)));
                self.state = NoteState::Passed;
            }
            _ => {}
        }
    }

    /// Judges a key release. Only held or grabbable holds respond.
    pub fn check_release(&self, now: f64, judge: &dyn JudgePolicy) -> (bool, NoteResult) {
        if !matches!(self.state, NoteState::Holding | NoteState::MissedHeadActive) {
            return (false, NoteResult::Miss);
        }
        let (accepted, result) = judge.calculate_result(self, now);
        match (accepted, self.state) {
            (true, NoteState::MissedHeadActive) => (true, NoteResult::Bad),
            (true, _) => (true, result),
            (false, NoteState::Holding) => (true, NoteResult::Miss),
            (false, _) => (false, NoteResult::Miss),
        }
    }

    /// Applies a release accepted by [`Note::check_release`].
    pub fn on_release(&mut self, result: NoteResult, now: f64, out: &mut Vec<NoteEvent>) {
        out.push(NoteEvent::Judged(self.hit_info(result, now, true)));
        if result == NoteResult::Miss {
            if let Some(id) = self.info.keysound {
                out.push(NoteEvent::StopKeysound(id));
            }
            out.push(NoteEvent::Hold(HoldResult::Break));
            self.state = NoteState::MissedHeadActive;
            self.last_score_time = None;
        } else {
            self.state = NoteState::Passed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::engine::hit_window::{BeatJudge, MsJudge};

    fn hold() -> Note {
        Note::new(NoteInfo::hold(1000.0, 2000.0, 3), 120.0, 120.0, 0.0, 0.0)
    }

    fn judged(events: &[NoteEvent]) -> Vec<NoteHitInfo> {
        events
            .iter()
            .filter_map(|e| match e {
                NoteEvent::Judged(info) => Some(*info),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_tap_hit_then_removed() {
        let judge = MsJudge::default();
        let mut note = Note::new(NoteInfo::tap(500.0, 0), 120.0, 120.0, 0.0, 0.0);
        let mut out = Vec::new();

        let (ok, result) = note.check_hit(510.0, &judge);
        assert!(ok);
        note.on_hit(result, 510.0, &mut out);
        assert_eq!(note.state, NoteState::Passed);
        assert_eq!(judged(&out)[0].result, NoteResult::Cool);

        note.update(800.0, &judge, &mut out);
        assert!(note.is_removable());
    }

    #[test]
    fn test_unpressed_tap_misses() {
        let judge = MsJudge::default();
        let mut note = Note::new(NoteInfo::tap(500.0, 0), 120.0, 120.0, 0.0, 0.0);
        let mut out = Vec::new();
        note.update(600.0, &judge, &mut out);
        assert!(out.is_empty());
        note.update(700.0, &judge, &mut out);
        assert!(note.is_removable());
        assert_eq!(judged(&out)[0].result, NoteResult::Miss);
    }

    #[test]
    fn test_hold_press_and_release() {
        let judge = BeatJudge::default();
        let mut note = hold();
        let mut out = Vec::new();

        let (ok, result) = note.check_hit(1005.0, &judge);
        assert!(ok);
        note.on_hit(result, 1005.0, &mut out);
        assert_eq!(note.state, NoteState::Holding);
        assert_eq!(note.hit_time(), 2000.0);

        out.clear();
        note.update(1500.0, &judge, &mut out);
        let ticks = out
            .iter()
            .filter(|e| **e == NoteEvent::Hold(HoldResult::Add))
            .count();
        assert_eq!(ticks, 4);

        let (ok, result) = note.check_release(1995.0, &judge);
        assert!(ok);
        note.on_release(result, 1995.0, &mut out);
        assert_eq!(note.state, NoteState::Passed);
        assert_eq!(result, NoteResult::Cool);
    }

    #[test]
    fn test_hold_ticks_stop_at_tail() {
        let judge = BeatJudge::default();
        let mut note = hold();
        let mut out = Vec::new();
        note.on_hit(NoteResult::Cool, 1000.0, &mut out);
        out.clear();
        note.update(2050.0, &judge, &mut out);
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn test_early_release_breaks_hold() {
        let judge = BeatJudge::default();
        let mut note = hold().with_keysound_for_test(7);
        let mut out = Vec::new();
        note.on_hit(NoteResult::Cool, 1000.0, &mut out);
        out.clear();

        let (ok, result) = note.check_release(1200.0, &judge);
        assert!(ok);
        assert_eq!(result, NoteResult::Miss);
        note.on_release(result, 1200.0, &mut out);
        assert_eq!(note.state, NoteState::MissedHeadActive);
        assert!(out.contains(&NoteEvent::StopKeysound(7)));
        assert!(out.contains(&NoteEvent::Hold(HoldResult::Break)));
    }

    #[test]
    fn test_missed_head_can_grab_tail() {
        let judge = BeatJudge::default();
        let mut note = hold();
        let mut out = Vec::new();
        note.update(1300.0, &judge, &mut out);
        assert_eq!(note.state, NoteState::MissedHeadActive);
        assert_eq!(judged(&out)[0].result, NoteResult::Miss);

        let (ok, result) = note.check_hit(1990.0, &judge);
        assert!(ok);
        note.on_hit(result, 1990.0, &mut out);
        assert_eq!(note.state, NoteState::Passed);
    }

    #[test]
    fn test_missed_head_release_is_bad() {
        let judge = BeatJudge::default();
        let mut note = hold();
        let mut out = Vec::new();
        note.update(1300.0, &judge, &mut out);
        assert_eq!(note.check_release(2000.0, &judge), (true, NoteResult::Bad));
        assert_eq!(note.check_release(1500.0, &judge), (false, NoteResult::Miss));
    }

    impl Note {
        fn with_keysound_for_test(mut self, id: SampleId) -> Self {
            self.info.keysound = Some(id);
            self
        }
    }
}
