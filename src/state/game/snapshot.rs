//! Read-only capture of a running session for presentation code.

use super::{EngineState, RhythmEngine};
use crate::models::engine::NoteState;
use crate::models::stats::ScoreInfo;
use crate::state::traits::Snapshot;

/// One live note as presentation code sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct NoteView {
    pub lane: usize,
    /// Scroll position of the head, comparable with `track_position`.
    pub position: f64,
    pub end_position: f64,
    pub state: NoteState,
    pub is_hold: bool,
}

/// Snapshot of gameplay state.
#[derive(Clone, Debug)]
pub struct GameplaySnapshot {
    /// Engine clock in milliseconds.
    pub audio_time: f64,
    pub track_position: f64,
    /// Tempo in effect at `audio_time`.
    pub bpm: f64,
    pub rate: f64,
    pub scroll_speed: f64,
    pub state: EngineState,

    pub notes: Vec<NoteView>,
    /// Per-lane key held state.
    pub keys_held: Vec<bool>,

    pub score: ScoreInfo,
    pub remaining_notes: usize,
}

impl Snapshot for RhythmEngine {
    type Output = GameplaySnapshot;

    fn create_snapshot(&self) -> GameplaySnapshot {
        let notes = self
            .tracks
            .iter()
            .flat_map(|track| track.notes())
            .filter(|note| note.state != NoteState::Remove)
            .map(|note| NoteView {
                lane: note.lane(),
                position: note.position,
                end_position: note.end_position,
                state: note.state,
                is_hold: note.is_hold(),
            })
            .collect();

        let unspawned = self.chart.note_count().saturating_sub(self.next_note);
        let unjudged: usize = self.tracks.iter().map(|t| t.active_len()).sum();

        GameplaySnapshot {
            audio_time: self.clock,
            track_position: self.track_position,
            bpm: self.chart.bpm_at(self.clock.max(0.0)),
            rate: self.config.rate,
            scroll_speed: self.config.scroll_speed,
            state: self.state,
            notes,
            keys_held: self.tracks.iter().map(|t| t.is_pressed()).collect(),
            remaining_notes: unspawned + unjudged,
            score: self.score.info().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::audio::SilentSampleStore;
    use crate::models::chart::{Chart, ChartMetadata, NoteInfo, TimingInfo};
    use crate::models::settings::SessionConfig;
    use std::path::PathBuf;

    #[test]
    fn test_snapshot_lists_spawned_notes() {
        let chart = Chart {
            metadata: ChartMetadata::default(),
            directory: PathBuf::new(),
            notes: vec![NoteInfo::tap(500.0, 1), NoteInfo::hold(800.0, 1200.0, 2)],
            bpms: vec![TimingInfo::bpm(0.0, 150.0)],
            svs: Vec::new(),
            measures: Vec::new(),
            samples: Vec::new(),
            auto_samples: Vec::new(),
            key_count: 7,
            base_bpm: 150.0,
            initial_sv_multiplier: 1.0,
            hash: String::new(),
            audio_length: None,
        };
        let config = SessionConfig {
            lead_in_ms: 0.0,
            ..SessionConfig::default()
        };
        let mut engine = RhythmEngine::new(chart, config, Box::new(SilentSampleStore));
        engine.start();
        engine.key_down(1);
        engine.step();

        let snapshot = engine.create_snapshot();
        assert_eq!(snapshot.notes.len(), 2);
        assert!(snapshot.notes.iter().any(|n| n.is_hold && n.lane == 2));
        assert_eq!(snapshot.keys_held.len(), 7);
        assert!(snapshot.keys_held[1]);
        assert_eq!(snapshot.bpm, 150.0);
        assert_eq!(snapshot.remaining_notes, 2);
    }
}
