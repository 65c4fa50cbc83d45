//! Normalized chart model shared by every format.
//!
//! A [`Chart`] is produced once per session by the normalizer and is
//! read-only afterwards. All times are in milliseconds relative to the
//! chart's zero reference (the first tempo point).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Index into the external sample store.
pub type SampleId = u32;

/// Kind of playable note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteType {
    /// Single press.
    Tap,
    /// Press, hold until `end_time`, release.
    Hold,
}

impl NoteType {
    /// Returns true if this is a hold note.
    pub fn is_hold(&self) -> bool {
        matches!(self, NoteType::Hold)
    }

    /// Returns true if this is a tap note.
    pub fn is_tap(&self) -> bool {
        matches!(self, NoteType::Tap)
    }
}

/// A playable note as it appears in the chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteInfo {
    pub start_time: f64,
    /// Only meaningful for holds.
    pub end_time: f64,
    pub lane: usize,
    pub note_type: NoteType,
    pub keysound: Option<SampleId>,
    /// 0.0 to 1.0.
    pub volume: f32,
    /// -1.0 (left) to 1.0 (right).
    pub pan: f32,
}

impl NoteInfo {
    /// Creates a tap note with no keysound at full volume.
    pub fn tap(start_time: f64, lane: usize) -> Self {
        Self {
            start_time,
            end_time: start_time,
            lane,
            note_type: NoteType::Tap,
            keysound: None,
            volume: 1.0,
            pan: 0.0,
        }
    }

    /// Creates a hold note with no keysound at full volume.
    pub fn hold(start_time: f64, end_time: f64, lane: usize) -> Self {
        Self {
            start_time,
            end_time,
            lane,
            note_type: NoteType::Hold,
            keysound: None,
            volume: 1.0,
            pan: 0.0,
        }
    }

    pub fn with_keysound(mut self, id: SampleId) -> Self {
        self.keysound = Some(id);
        self
    }

    /// Time at which the lane becomes free again.
    pub fn occupied_until(&self) -> f64 {
        match self.note_type {
            NoteType::Hold => self.end_time,
            NoteType::Tap => self.start_time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingType {
    /// Beats per minute.
    Bpm,
    /// Scroll velocity multiplier.
    Sv,
}

/// A tempo or scroll-velocity change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingInfo {
    pub start_time: f64,
    /// BPM for tempo points, multiplier for velocity points.
    pub value: f64,
    /// Beats per measure.
    pub time_signature: f64,
    /// Cumulative beat count at `start_time` (tempo points only).
    pub beat: f64,
    pub timing_type: TimingType,
}

impl TimingInfo {
    pub fn bpm(start_time: f64, value: f64) -> Self {
        Self {
            start_time,
            value,
            time_signature: 4.0,
            beat: 0.0,
            timing_type: TimingType::Bpm,
        }
    }

    pub fn sv(start_time: f64, value: f64) -> Self {
        Self {
            start_time,
            value,
            time_signature: 4.0,
            beat: 0.0,
            timing_type: TimingType::Sv,
        }
    }

    pub fn with_time_signature(mut self, time_signature: f64) -> Self {
        self.time_signature = time_signature;
        self
    }

    /// Beat reached at `offset` when this tempo is in effect.
    pub fn calculate_beat(&self, offset: f64) -> f64 {
        self.beat + (offset - self.start_time) * self.value / 60000.0
    }
}

/// Where the bytes for a sample come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SampleSource {
    /// File name relative to the chart directory.
    File(String),
    /// Entry inside a companion sample container (e.g. an OJM bank).
    Container { file: String, entry: u32 },
}

/// A sample the chart references by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: SampleId,
    pub source: SampleSource,
}

/// An audio cue fired by elapsed time alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoSample {
    pub start_time: f64,
    pub sample: SampleId,
    pub volume: f32,
    pub pan: f32,
}

impl AutoSample {
    pub fn new(start_time: f64, sample: SampleId) -> Self {
        Self {
            start_time,
            sample,
            volume: 1.0,
            pan: 0.0,
        }
    }
}

/// Text metadata carried along with the chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartMetadata {
    pub title: String,
    pub artist: String,
    pub creator: String,
    pub background: Option<String>,
    pub level: i32,
}

/// The normalized song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub metadata: ChartMetadata,
    /// Directory samples are resolved against.
    pub directory: PathBuf,
    /// Sorted by start time, then lane.
    pub notes: Vec<NoteInfo>,
    /// Tempo points, strictly ascending.
    pub bpms: Vec<TimingInfo>,
    /// Normalized scroll-velocity points, strictly ascending.
    pub svs: Vec<TimingInfo>,
    /// Measure boundary timestamps.
    pub measures: Vec<f64>,
    pub samples: Vec<Sample>,
    /// Sorted by start time.
    pub auto_samples: Vec<AutoSample>,
    pub key_count: usize,
    /// Tempo with the longest on-screen duration.
    pub base_bpm: f64,
    /// Velocity in effect before the first SV point.
    pub initial_sv_multiplier: f64,
    /// Hex md5 over every note's start+end.
    pub hash: String,
    /// Length declared by the source format, if any.
    pub audio_length: Option<f64>,
}

impl Chart {
    /// Chart length in milliseconds.
    pub fn length(&self) -> f64 {
        if let Some(length) = self.audio_length {
            return length;
        }
        self.notes
            .iter()
            .map(NoteInfo::occupied_until)
            .fold(0.0, f64::max)
    }

    /// Tempo in effect at `time`. Zero-tempo stop spans are skipped.
    pub fn bpm_at(&self, time: f64) -> f64 {
        let idx = self.bpms.partition_point(|t| t.start_time <= time);
        self.bpms[..idx]
            .iter()
            .rev()
            .find(|t| t.value > 0.0)
            .or_else(|| self.bpms.iter().find(|t| t.value > 0.0))
            .map(|t| t.value)
            .unwrap_or(self.base_bpm)
    }

    /// Scroll-velocity multiplier in effect at `time`.
    pub fn sv_at(&self, time: f64) -> f64 {
        let idx = self.svs.partition_point(|t| t.start_time <= time);
        if idx == 0 {
            self.initial_sv_multiplier
        } else {
            self.svs[idx - 1].value
        }
    }

    /// Cumulative beat at `time`.
    pub fn beat_at(&self, time: f64) -> f64 {
        let idx = self.bpms.partition_point(|t| t.start_time <= time);
        match idx {
            0 => self
                .bpms
                .first()
                .map(|t| t.calculate_beat(time))
                .unwrap_or(0.0),
            _ => self.bpms[idx - 1].calculate_beat(time),
        }
    }

    /// Number of playable notes.
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }
}
