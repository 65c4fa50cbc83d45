//! Core gameplay engine.
//!
//! The `RhythmEngine` owns one session:
//! - the logical clock and track position
//! - note spawning into per-lane tracks
//! - key event judgement and scoring
//! - sample scheduling, autoplay and replay recording

mod snapshot;

pub mod score;
pub mod track;

pub use score::{ScoreAggregator, ScoreUpdate};
pub use snapshot::{GameplaySnapshot, NoteView};
pub use track::{Track, TrackContext};

use crate::logic::audio::{SampleScheduler, SampleStore};
use crate::models::chart::Chart;
use crate::models::engine::{
    END_GRACE_MS, JudgePolicy, Note, PREBUFFER_MS, PREBUFFER_POSITION, TimingResolver, judge_for,
    resolver_for,
};
use crate::models::replay::ReplayData;
use crate::models::settings::SessionConfig;
use crate::state::traits::Update;
use crate::system::bus::{EventBus, GameEvent};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Built, waiting for `start`.
    Idle,
    Playing,
    /// Clock passed the chart end.
    Finished,
}

/// A debounced key event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputEvent {
    pub lane: usize,
    pub pressed: bool,
    /// Chart time of the event in milliseconds.
    pub time: f64,
}

/// Replay frames fed back as key events.
struct Playback {
    replay: ReplayData,
    cursor: usize,
}

/// Runs one play session over a normalized chart.
pub struct RhythmEngine {
    chart: Chart,
    config: SessionConfig,
    state: EngineState,

    /// Logical audio position in milliseconds.
    clock: f64,
    track_position: f64,
    timing: Box<dyn TimingResolver>,
    timing_hint: usize,
    judge: Box<dyn JudgePolicy>,

    tracks: Vec<Track>,
    /// Next chart note to spawn.
    next_note: usize,
    score: ScoreAggregator,
    scheduler: SampleScheduler,
    samples: Box<dyn SampleStore>,
    events: EventBus,

    inputs: VecDeque<InputEvent>,
    replay: ReplayData,
    playback: Option<Playback>,
    keysounds_automatic: bool,
}

impl RhythmEngine {
    /// Builds a session and loads the chart's samples into `samples`.
    pub fn new(chart: Chart, config: SessionConfig, mut samples: Box<dyn SampleStore>) -> Self {
        let config = config.sanitized();
        samples.load(&chart, config.pitch_preserve);

        let keysounds_automatic = config.keysounds_are_automatic();
        let scheduler = SampleScheduler::from_chart(
            &chart,
            keysounds_automatic,
            config.audio_offset_ms,
            config.volume,
        );
        let playback = config.autoplay.then(|| Playback {
            replay: ReplayData::autoplay(&chart, config.rate, config.judge_mode),
            cursor: 0,
        });

        log::info!(
            "ENGINE: {} notes on {} lanes, judge {:?}, rate {:.2}{}",
            chart.notes.len(),
            chart.key_count,
            config.judge_mode,
            config.rate,
            if config.autoplay { ", autoplay" } else { "" }
        );

        Self {
            timing: resolver_for(&chart, config.no_sv),
            timing_hint: 0,
            judge: judge_for(config.judge_mode),
            tracks: (0..chart.key_count).map(Track::new).collect(),
            next_note: 0,
            score: ScoreAggregator::new(),
            scheduler,
            samples,
            events: EventBus::new(),
            inputs: VecDeque::new(),
            replay: ReplayData::new(config.rate, config.judge_mode, &chart.hash),
            playback,
            keysounds_automatic,
            clock: -config.lead_in_ms,
            track_position: 0.0,
            state: EngineState::Idle,
            chart,
            config,
        }
    }

    pub fn start(&mut self) {
        if self.state == EngineState::Idle {
            log::info!("ENGINE: starting at {:.0}ms", self.clock);
            self.state = EngineState::Playing;
        }
    }

    /// Feeds a recorded play back as key events.
    pub fn play_replay(&mut self, replay: ReplayData) {
        self.playback = Some(Playback { replay, cursor: 0 });
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == EngineState::Finished
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn track_position(&self) -> f64 {
        self.track_position
    }

    pub fn chart(&self) -> &Chart {
        &self.chart
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn score(&self) -> &ScoreAggregator {
        &self.score
    }

    pub fn track(&self, lane: usize) -> Option<&Track> {
        self.tracks.get(lane)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn replay(&self) -> &ReplayData {
        &self.replay
    }

    pub fn into_replay(self) -> ReplayData {
        self.replay
    }

    /// Queues a key event, judged on the next tick.
    pub fn queue_input(&mut self, event: InputEvent) {
        self.inputs.push_back(event);
    }

    pub fn key_down(&mut self, lane: usize) {
        self.queue_input(InputEvent {
            lane,
            pressed: true,
            time: self.clock,
        });
    }

    pub fn key_up(&mut self, lane: usize) {
        self.queue_input(InputEvent {
            lane,
            pressed: false,
            time: self.clock,
        });
    }

    /// Advances the clock by `dt` seconds scaled by the rate.
    ///
    /// The clock integrates `dt * rate` and is never resynchronized with
    /// the audio device.
    pub fn tick(&mut self, dt: f64) {
        if self.state != EngineState::Playing {
            return;
        }
        self.clock += dt * 1000.0 * self.config.rate;
        self.step();
    }

    /// Runs one tick at the current clock without advancing it.
    pub fn step(&mut self) {
        if self.state != EngineState::Playing {
            return;
        }
        let now = self.clock;
        self.track_position = self.timing.offset_at_hinted(now, &mut self.timing_hint);

        self.spawn_notes(now);
        self.feed_playback(now);

        let mut ctx = TrackContext {
            judge: self.judge.as_ref(),
            score: &mut self.score,
            samples: self.samples.as_mut(),
            events: &self.events,
            volume: self.config.volume,
        };

        // Note state first, then this tick's key events.
        for track in &mut self.tracks {
            track.update(now, &mut ctx);
        }
        while let Some(input) = self.inputs.pop_front() {
            let Some(track) = self.tracks.get_mut(input.lane) else {
                log::debug!("ENGINE: key event on unknown lane {}", input.lane);
                continue;
            };
            if input.pressed {
                track.on_key_down(input.time, &mut ctx);
            } else {
                track.on_key_up(input.time, &mut ctx);
            }
            self.replay.add_input(input.time, input.lane, input.pressed);
        }

        self.scheduler.update(now, self.samples.as_mut());

        if now > self.chart.length() + END_GRACE_MS {
            self.finish();
        }
    }

    fn spawn_notes(&mut self, now: f64) {
        let distance = PREBUFFER_POSITION * 10.0 / self.config.scroll_speed;
        while let Some(info) = self.chart.notes.get(self.next_note) {
            let position = self.timing.offset_at(info.start_time);
            let due = info.start_time <= now + PREBUFFER_MS
                || position - self.track_position <= distance;
            if !due {
                break;
            }

            let mut info = info.clone();
            if self.keysounds_automatic {
                info.keysound = None;
            }
            let lane = info.lane;
            let note = Note::new(
                info.clone(),
                self.chart.bpm_at(info.start_time),
                self.chart.bpm_at(info.end_time),
                position,
                self.timing.offset_at(info.end_time),
            );
            if let Some(track) = self.tracks.get_mut(lane) {
                track.add_note(note);
            }
            self.next_note += 1;
        }
    }

    fn feed_playback(&mut self, now: f64) {
        let Some(playback) = &mut self.playback else {
            return;
        };
        while let Some(input) = playback.replay.inputs.get(playback.cursor) {
            let time = input.time_ms();
            if time > now {
                break;
            }
            let (lane, pressed) = input.unpack();
            self.inputs.push_back(InputEvent {
                lane,
                pressed,
                time,
            });
            playback.cursor += 1;
        }
    }

    fn finish(&mut self) {
        self.state = EngineState::Finished;
        self.samples.stop_all();
        for track in &mut self.tracks {
            track.clear();
        }
        let score = self.score.info().clone();
        log::info!(
            "ENGINE: finished, score {} max combo {} ({:.2}%)",
            score.score,
            score.max_combo,
            score.hit_stats.accuracy()
        );
        self.events.emit(GameEvent::Finished { score });
    }

    /// Stops the session early and returns pooled notes.
    pub fn end_session(&mut self) {
        if self.state != EngineState::Finished {
            self.finish();
        }
    }
}

impl Update for RhythmEngine {
    fn update(&mut self, dt: f64) {
        self.tick(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::audio::tests::RecordingStore;
    use crate::models::chart::{ChartMetadata, NoteInfo, TimingInfo};
    use crate::models::engine::NoteState;
    use crate::models::stats::NoteResult;
    use std::path::PathBuf;

    fn chart(notes: Vec<NoteInfo>) -> Chart {
        Chart {
            metadata: ChartMetadata::default(),
            directory: PathBuf::new(),
            notes,
            bpms: vec![TimingInfo::bpm(0.0, 120.0)],
            svs: Vec::new(),
            measures: Vec::new(),
            samples: Vec::new(),
            auto_samples: Vec::new(),
            key_count: 7,
            base_bpm: 120.0,
            initial_sv_multiplier: 1.0,
            hash: "test".into(),
            audio_length: None,
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            lead_in_ms: 0.0,
            ..SessionConfig::default()
        }
    }

    fn engine(notes: Vec<NoteInfo>, config: SessionConfig) -> RhythmEngine {
        let mut engine = RhythmEngine::new(chart(notes), config, Box::new(RecordingStore::default()));
        engine.start();
        engine
    }

    fn run_until(engine: &mut RhythmEngine, time: f64) {
        while engine.clock() < time && !engine.is_finished() {
            engine.tick(0.005);
        }
    }

    fn lane_state(engine: &RhythmEngine, lane: usize) -> Option<NoteState> {
        engine.track(lane)?.notes().next().map(|n| n.state)
    }

    #[test]
    fn test_idle_engine_does_not_advance() {
        let mut engine = RhythmEngine::new(
            chart(Vec::new()),
            config(),
            Box::new(RecordingStore::default()),
        );
        engine.tick(1.0);
        assert_eq!(engine.clock(), 0.0);
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_lead_in_starts_negative() {
        let engine = RhythmEngine::new(
            chart(Vec::new()),
            SessionConfig::default(),
            Box::new(RecordingStore::default()),
        );
        assert_eq!(engine.clock(), -3000.0);
    }

    #[test]
    fn test_hold_reaches_holding_then_passed() {
        let mut engine = engine(vec![NoteInfo::hold(1000.0, 2000.0, 3)], config());
        run_until(&mut engine, 1000.0);
        engine.queue_input(InputEvent {
            lane: 3,
            pressed: true,
            time: 1005.0,
        });
        engine.step();
        assert_eq!(lane_state(&engine, 3), Some(NoteState::Holding));

        run_until(&mut engine, 1990.0);
        engine.queue_input(InputEvent {
            lane: 3,
            pressed: false,
            time: 1995.0,
        });
        engine.step();
        assert_eq!(lane_state(&engine, 3), Some(NoteState::Passed));
        assert_eq!(engine.score().info().hit_stats.cool, 2);
    }

    #[test]
    fn test_inputs_are_recorded() {
        let mut engine = engine(vec![NoteInfo::tap(100.0, 0)], config());
        run_until(&mut engine, 100.0);
        engine.key_down(0);
        engine.key_up(0);
        engine.step();
        assert_eq!(engine.replay().inputs.len(), 2);
        assert_eq!(engine.replay().chart_hash, "test");
    }

    #[test]
    fn test_autoplay_is_all_cool() {
        let notes = vec![
            NoteInfo::tap(500.0, 0),
            NoteInfo::tap(520.0, 0),
            NoteInfo::hold(600.0, 1400.0, 4),
            NoteInfo::tap(900.0, 6),
        ];
        let config = SessionConfig {
            autoplay: true,
            ..config()
        };
        let mut engine = engine(notes, config);
        run_until(&mut engine, 10_000.0);

        assert!(engine.is_finished());
        let stats = &engine.score().info().hit_stats;
        assert_eq!(stats.miss, 0);
        assert_eq!(stats.cool, 5);
    }

    #[test]
    fn test_untouched_notes_miss_and_session_ends() {
        let mut engine = engine(vec![NoteInfo::tap(100.0, 0), NoteInfo::tap(200.0, 1)], config());
        run_until(&mut engine, 5000.0);
        assert!(engine.is_finished());
        assert_eq!(engine.score().info().hit_stats.miss, 2);
        let finished = engine
            .events()
            .drain()
            .any(|e| matches!(e, GameEvent::Finished { .. }));
        assert!(finished);
    }

    #[test]
    fn test_judgement_events_are_emitted() {
        let mut engine = engine(vec![NoteInfo::tap(100.0, 0)], config());
        run_until(&mut engine, 100.0);
        engine.key_down(0);
        engine.step();
        let results: Vec<NoteResult> = engine
            .events()
            .drain()
            .filter_map(|e| match e {
                GameEvent::ScoreChanged { hit, .. } => Some(hit.result),
                _ => None,
            })
            .collect();
        assert_eq!(results, vec![NoteResult::Cool]);
    }
}
