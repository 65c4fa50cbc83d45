//! One playable lane: its live notes, key events and keysound feedback.

use crate::logic::audio::SampleStore;
use crate::models::chart::SampleId;
use crate::models::engine::{JudgePolicy, MAX_NOTES_PER_LANE, Note, NoteEvent, NoteState};
use crate::state::game::score::ScoreAggregator;
use crate::system::bus::{EventBus, GameEvent};

/// Collaborators a track reports to while it steps.
pub struct TrackContext<'a> {
    pub judge: &'a dyn JudgePolicy,
    pub score: &'a mut ScoreAggregator,
    pub samples: &'a mut dyn SampleStore,
    pub events: &'a EventBus,
    /// Master volume applied to keysounds.
    pub volume: f32,
}

/// Fixed slots addressed by index, with a free list.
#[derive(Debug, Default)]
struct NotePool {
    slots: Vec<Option<Note>>,
    free: Vec<usize>,
}

impl NotePool {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
        }
    }

    fn insert(&mut self, note: Note, lane: usize) -> usize {
        if let Some(index) = self.free.pop() {
            self.slots[index] = Some(note);
            return index;
        }
        if self.slots.len() == self.slots.capacity() && self.slots.len() >= MAX_NOTES_PER_LANE {
            log::warn!("ENGINE: lane {} note pool full, growing", lane);
        }
        self.slots.push(Some(note));
        self.slots.len() - 1
    }

    fn get(&self, index: usize) -> Option<&Note> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut Note> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    fn release(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            if slot.take().is_some() {
                self.free.push(index);
            }
        }
    }

    fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

/// A lane's notes and key state.
#[derive(Debug)]
pub struct Track {
    lane: usize,
    pool: NotePool,
    /// Pool indices, in note time order.
    active: Vec<usize>,
    /// Judged notes still on screen.
    inactive: Vec<usize>,
    /// Keysound replayed on a press that hits nothing.
    armed: Option<(SampleId, f32, f32)>,
    pressed: bool,
    pending: Vec<NoteEvent>,
}

impl Track {
    pub fn new(lane: usize) -> Self {
        Self {
            lane,
            pool: NotePool::with_capacity(MAX_NOTES_PER_LANE),
            active: Vec::new(),
            inactive: Vec::new(),
            armed: None,
            pressed: false,
            pending: Vec::new(),
        }
    }

    pub fn lane(&self) -> usize {
        self.lane
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Enqueues a note. Notes must arrive in time order.
    ///
    /// The first keysound-bearing note arms the lane right away, so a
    /// press before it still sounds.
    pub fn add_note(&mut self, note: Note) {
        if self.armed.is_none() {
            if let Some(id) = note.info.keysound {
                self.armed = Some((id, note.info.volume, note.info.pan));
            }
        }
        let index = self.pool.insert(note, self.lane);
        self.active.push(index);
    }

    /// Live notes, active first.
    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.active
            .iter()
            .chain(self.inactive.iter())
            .filter_map(|&i| self.pool.get(i))
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Notes currently held in the pool.
    pub fn live_len(&self) -> usize {
        self.pool.live()
    }

    /// Advances every owned note and recycles finished ones.
    pub fn update(&mut self, now: f64, ctx: &mut TrackContext) {
        for &index in &self.active {
            let Some(note) = self.pool.get_mut(index) else {
                continue;
            };
            if note.arm_keysound(now) {
                if let Some(id) = note.info.keysound {
                    self.armed = Some((id, note.info.volume, note.info.pan));
                }
            }
            note.update(now, ctx.judge, &mut self.pending);
        }

        let mut still_active = Vec::with_capacity(self.active.len());
        for index in self.active.drain(..) {
            match self.pool.get(index).map(|n| n.state) {
                Some(NoteState::Passed) => self.inactive.push(index),
                Some(NoteState::Remove) | None => self.pool.release(index),
                Some(_) => still_active.push(index),
            }
        }
        self.active = still_active;

        let pool = &mut self.pool;
        let pending = &mut self.pending;
        self.inactive.retain(|&index| {
            let Some(note) = pool.get_mut(index) else {
                return false;
            };
            note.update(now, ctx.judge, pending);
            if note.is_removable() {
                pool.release(index);
                false
            } else {
                true
            }
        });

        self.dispatch(ctx);
    }

    /// Judges a key press. At most one note is affected.
    ///
    /// Returns true when the press hit a note. A press that hits nothing
    /// replays the most recently armed keysound.
    pub fn on_key_down(&mut self, now: f64, ctx: &mut TrackContext) -> bool {
        self.pressed = true;
        let mut hit_index = None;
        for &index in &self.active {
            let Some(note) = self.pool.get(index) else {
                continue;
            };
            if !ctx.judge.is_accepted(note, now) {
                break;
            }
            let (accepted, result) = note.check_hit(now, ctx.judge);
            if accepted {
                hit_index = Some((index, result));
                break;
            }
        }

        let hit = match hit_index.and_then(|(i, r)| self.pool.get_mut(i).map(|n| (n, r))) {
            Some((note, result)) => {
                note.on_hit(result, now, &mut self.pending);
                if let Some(id) = note.info.keysound {
                    ctx.samples
                        .play(id, note.info.volume * ctx.volume, note.info.pan);
                }
                true
            }
            None => {
                if let Some((id, volume, pan)) = self.armed {
                    ctx.samples.play(id, volume * ctx.volume, pan);
                }
                false
            }
        };

        ctx.events.emit(GameEvent::KeyVisual {
            lane: self.lane,
            pressed: true,
            active: hit,
        });
        self.dispatch(ctx);
        hit
    }

    /// Judges a key release against the first hold that responds.
    pub fn on_key_up(&mut self, now: f64, ctx: &mut TrackContext) {
        self.pressed = false;
        for &index in &self.active {
            let Some(note) = self.pool.get_mut(index) else {
                continue;
            };
            let (accepted, result) = note.check_release(now, ctx.judge);
            if accepted {
                note.on_release(result, now, &mut self.pending);
                break;
            }
        }

        ctx.events.emit(GameEvent::KeyVisual {
            lane: self.lane,
            pressed: false,
            active: false,
        });
        self.dispatch(ctx);
    }

    /// Returns every pooled note.
    pub fn clear(&mut self) {
        for index in self.active.drain(..).chain(self.inactive.drain(..)) {
            self.pool.release(index);
        }
        self.armed = None;
        self.pressed = false;
        self.pending.clear();
    }

    fn dispatch(&mut self, ctx: &mut TrackContext) {
        for event in self.pending.drain(..) {
            match event {
                NoteEvent::Judged(mut hit) => {
                    let update = ctx.score.apply(&hit);
                    hit.result = update.result;
                    if update.notify {
                        ctx.events.emit(GameEvent::ScoreChanged {
                            hit,
                            score: ctx.score.info().clone(),
                        });
                    }
                    if let Some(jam_combo) = update.jam {
                        ctx.events.emit(GameEvent::JamTriggered { jam_combo });
                    }
                }
                NoteEvent::Hold(result) => {
                    let ln_combo = ctx.score.apply_hold(result);
                    ctx.events.emit(GameEvent::LongNoteCredit { ln_combo });
                }
                NoteEvent::StopKeysound(id) => ctx.samples.stop(id),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::audio::tests::RecordingStore;
    use crate::models::chart::NoteInfo;
    use crate::models::engine::{BeatJudge, MsJudge};
    use crate::models::stats::NoteResult;

    struct Fixture {
        judge: Box<dyn JudgePolicy>,
        score: ScoreAggregator,
        samples: RecordingStore,
        events: EventBus,
    }

    impl Fixture {
        fn new(judge: Box<dyn JudgePolicy>) -> Self {
            Self {
                judge,
                score: ScoreAggregator::new(),
                samples: RecordingStore::default(),
                events: EventBus::new(),
            }
        }

        fn ctx(&mut self) -> TrackContext<'_> {
            TrackContext {
                judge: self.judge.as_ref(),
                score: &mut self.score,
                samples: &mut self.samples,
                events: &self.events,
                volume: 1.0,
            }
        }
    }

    fn note(info: NoteInfo) -> Note {
        Note::new(info, 120.0, 120.0, 0.0, 0.0)
    }

    #[test]
    fn test_hold_lifecycle() {
        let mut fx = Fixture::new(Box::new(BeatJudge::default()));
        let mut track = Track::new(0);
        track.add_note(note(NoteInfo::hold(1000.0, 2000.0, 0)));

        track.update(1000.0, &mut fx.ctx());
        assert!(track.on_key_down(1005.0, &mut fx.ctx()));
        assert_eq!(track.notes().next().map(|n| n.state), Some(NoteState::Holding));

        track.update(1500.0, &mut fx.ctx());
        track.on_key_up(1995.0, &mut fx.ctx());
        assert_eq!(track.notes().next().map(|n| n.state), Some(NoteState::Passed));

        track.update(1996.0, &mut fx.ctx());
        assert_eq!(track.active_len(), 0);
        assert_eq!(track.live_len(), 1);

        track.update(3000.0, &mut fx.ctx());
        assert_eq!(track.live_len(), 0);
        assert_eq!(fx.score.info().hit_stats.cool, 2);
        assert!(fx.score.info().ln_max_combo >= 5);
    }

    #[test]
    fn test_only_first_note_is_hit() {
        let mut fx = Fixture::new(Box::new(MsJudge::default()));
        let mut track = Track::new(2);
        track.add_note(note(NoteInfo::tap(1000.0, 2)));
        track.add_note(note(NoteInfo::tap(1050.0, 2)));

        assert!(track.on_key_down(1020.0, &mut fx.ctx()));
        let states: Vec<NoteState> = track.notes().map(|n| n.state).collect();
        assert_eq!(states, vec![NoteState::Passed, NoteState::Active]);
        assert_eq!(fx.score.info().hit_stats.total(), 1);
    }

    #[test]
    fn test_early_press_is_ignored() {
        let mut fx = Fixture::new(Box::new(MsJudge::default()));
        let mut track = Track::new(0);
        track.add_note(note(NoteInfo::tap(1000.0, 0)));
        assert!(!track.on_key_down(500.0, &mut fx.ctx()));
        assert_eq!(fx.score.info().hit_stats.total(), 0);
    }

    #[test]
    fn test_ghost_tap_replays_armed_keysound() {
        let mut fx = Fixture::new(Box::new(MsJudge::default()));
        let mut track = Track::new(0);
        track.add_note(note(NoteInfo::tap(100.0, 0).with_keysound(4)));
        track.add_note(note(NoteInfo::tap(5000.0, 0).with_keysound(5)));

        assert!(track.on_key_down(100.0, &mut fx.ctx()));
        track.on_key_up(150.0, &mut fx.ctx());
        track.update(200.0, &mut fx.ctx());
        assert!(!track.on_key_down(1000.0, &mut fx.ctx()));
        let ids: Vec<SampleId> = fx.samples.played.iter().map(|p| p.0).collect();
        assert_eq!(ids, vec![4, 4]);
    }

    #[test]
    fn test_press_before_first_note_plays_its_keysound() {
        let mut fx = Fixture::new(Box::new(MsJudge::default()));
        let mut track = Track::new(0);
        track.add_note(note(NoteInfo::tap(1000.0, 0).with_keysound(4)));
        track.add_note(note(NoteInfo::tap(2000.0, 0).with_keysound(7)));

        track.update(400.0, &mut fx.ctx());
        assert!(!track.on_key_down(500.0, &mut fx.ctx()));
        let ids: Vec<SampleId> = fx.samples.played.iter().map(|p| p.0).collect();
        assert_eq!(ids, vec![4]);
    }

    #[test]
    fn test_unhit_note_misses_and_recycles() {
        let mut fx = Fixture::new(Box::new(MsJudge::default()));
        let mut track = Track::new(0);
        track.add_note(note(NoteInfo::tap(100.0, 0)));
        track.update(400.0, &mut fx.ctx());
        assert_eq!(track.live_len(), 0);
        assert_eq!(fx.score.info().hit_stats.miss, 1);

        let misses = fx
            .events
            .drain()
            .filter(|e| matches!(e, GameEvent::ScoreChanged { hit, .. } if hit.result == NoteResult::Miss))
            .count();
        assert_eq!(misses, 1);

        // The freed slot is reused.
        track.add_note(note(NoteInfo::tap(500.0, 0)));
        assert_eq!(track.live_len(), 1);
    }

    #[test]
    fn test_early_release_stops_keysound() {
        let mut fx = Fixture::new(Box::new(BeatJudge::default()));
        let mut track = Track::new(0);
        track.add_note(note(NoteInfo::hold(1000.0, 3000.0, 0).with_keysound(8)));
        track.on_key_down(1000.0, &mut fx.ctx());
        track.on_key_up(1500.0, &mut fx.ctx());
        assert_eq!(fx.samples.stopped, vec![8]);
        assert_eq!(fx.score.info().ln_combo, 0);
    }
}
