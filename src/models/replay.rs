//! Recorded key events and the autoplay generator.
//!
//! Timestamps are stored in **microseconds (i64)** so replays survive
//! serialization without float drift.

use crate::models::chart::{Chart, NoteType};
use crate::models::engine::AUTOPLAY_RELEASE_MS;
use crate::models::settings::JudgeMode;
use serde::{Deserialize, Serialize};

pub const REPLAY_FORMAT_VERSION: u8 = 1;

pub const US_PER_MS: f64 = 1000.0;

/// A single key event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayInput {
    /// Chart time in microseconds.
    pub time_us: i64,
    /// Bit 0: is_press. Bits 1-7: lane.
    pub payload: u8,
}

impl ReplayInput {
    pub fn new(time_ms: f64, lane: usize, is_press: bool) -> Self {
        Self {
            time_us: (time_ms * US_PER_MS).round() as i64,
            payload: ((lane as u8) << 1) | (is_press as u8),
        }
    }

    #[inline]
    pub fn unpack(&self) -> (usize, bool) {
        let is_press = (self.payload & 1) != 0;
        let lane = (self.payload >> 1) as usize;
        (lane, is_press)
    }

    pub fn time_ms(&self) -> f64 {
        self.time_us as f64 / US_PER_MS
    }
}

/// Raw inputs of one play, enough to re-simulate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayData {
    pub version: u8,
    /// Chronological.
    pub inputs: Vec<ReplayInput>,
    pub rate: f64,
    pub judge_mode: JudgeMode,
    /// Content hash of the chart the inputs were recorded on.
    #[serde(default)]
    pub chart_hash: String,
}

impl ReplayData {
    pub fn new(rate: f64, judge_mode: JudgeMode, chart_hash: &str) -> Self {
        Self {
            version: REPLAY_FORMAT_VERSION,
            inputs: Vec::new(),
            rate,
            judge_mode,
            chart_hash: chart_hash.to_string(),
        }
    }

    pub fn add_input(&mut self, time_ms: f64, lane: usize, is_press: bool) {
        self.inputs.push(ReplayInput::new(time_ms, lane, is_press));
    }

    /// Builds a perfect play: every note pressed on time.
    ///
    /// Holds release at their tail. Taps release after a short delay,
    /// cut to 90% of the gap when the next note in the lane comes sooner.
    pub fn autoplay(chart: &Chart, rate: f64, judge_mode: JudgeMode) -> Self {
        let mut replay = Self::new(rate, judge_mode, &chart.hash);
        let mut next_start = vec![f64::INFINITY; chart.key_count];
        let mut events: Vec<(f64, usize, bool)> = Vec::with_capacity(chart.notes.len() * 2);

        for note in chart.notes.iter().rev() {
            let Some(next) = next_start.get_mut(note.lane) else {
                continue;
            };
            let release = match note.note_type {
                NoteType::Hold => note.end_time,
                NoteType::Tap => {
                    let gap = *next - note.start_time;
                    note.start_time + AUTOPLAY_RELEASE_MS.min(gap * 0.9)
                }
            };
            events.push((note.start_time, note.lane, true));
            events.push((release, note.lane, false));
            *next = note.start_time;
        }

        // Releases first when a release and a press share a timestamp.
        events.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.2.cmp(&b.2)));
        for (time, lane, is_press) in events {
            replay.add_input(time, lane, is_press);
        }
        replay
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
