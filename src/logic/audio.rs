//! Sample playback seam and the time-ordered sample scheduler.
//!
//! The engine never talks to an audio device. It calls a [`SampleStore`]
//! handed to it at construction; the real one lives in
//! `audio_thread` (feature `audio-output`), tests pass a recording fake.

use crate::models::chart::{AutoSample, Chart, SampleId};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extensions tried, in order, when a sample file is missing.
pub const FALLBACK_EXTENSIONS: [&str; 3] = ["wav", "ogg", "mp3"];

#[derive(Debug, Error)]
pub enum SampleError {
    /// The note keeps playing silently.
    #[error("sample resource missing: {0}")]
    ResourceMissing(String),
    #[error("cannot decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
}

/// Externally owned sample playback.
///
/// `play` and `stop` are fire-and-forget and safe to call every tick.
pub trait SampleStore {
    /// Prepares every sample the chart references.
    fn load(&mut self, chart: &Chart, pitch_preserve: bool);

    fn play(&mut self, id: SampleId, volume: f32, pan: f32);

    fn stop(&mut self, id: SampleId);

    fn stop_all(&mut self) {}
}

/// Store that plays nothing, for headless sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSampleStore;

impl SampleStore for SilentSampleStore {
    fn load(&mut self, _chart: &Chart, _pitch_preserve: bool) {}
    fn play(&mut self, _id: SampleId, _volume: f32, _pan: f32) {}
    fn stop(&mut self, _id: SampleId) {}
}

/// Finds a sample file under `directory`.
///
/// Tries the stored name, then the same stem with each fallback extension.
pub fn resolve_sample_path(directory: &Path, name: &str) -> Result<PathBuf, SampleError> {
    let exact = directory.join(name);
    if exact.is_file() {
        return Ok(exact);
    }
    FALLBACK_EXTENSIONS
        .iter()
        .map(|ext| exact.with_extension(ext))
        .find(|path| path.is_file())
        .ok_or_else(|| SampleError::ResourceMissing(exact.display().to_string()))
}

/// Fires auto-samples exactly once as the clock crosses them.
#[derive(Debug, Clone, Default)]
pub struct SampleScheduler {
    /// Sorted by start time.
    events: Vec<AutoSample>,
    next: usize,
    volume: f32,
}

impl SampleScheduler {
    pub fn new(mut events: Vec<AutoSample>, volume: f32) -> Self {
        events.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        Self {
            events,
            next: 0,
            volume,
        }
    }

    /// Builds the schedule for a chart.
    ///
    /// With `keysounds` set, every note keysound is scheduled at its note
    /// time too. Every event is shifted by `offset_ms`.
    pub fn from_chart(chart: &Chart, keysounds: bool, offset_ms: f64, volume: f32) -> Self {
        let mut events = chart.auto_samples.clone();
        if keysounds {
            events.extend(chart.notes.iter().filter_map(|note| {
                note.keysound.map(|sample| AutoSample {
                    start_time: note.start_time,
                    sample,
                    volume: note.volume,
                    pan: note.pan,
                })
            }));
        }
        for event in events.iter_mut() {
            event.start_time += offset_ms;
        }
        Self::new(events, volume)
    }

    /// Plays every event due at `now`. Returns how many fired.
    pub fn update(&mut self, now: f64, store: &mut dyn SampleStore) -> usize {
        let start = self.next;
        while let Some(event) = self.events.get(self.next) {
            if event.start_time > now {
                break;
            }
            store.play(event.sample, event.volume * self.volume, event.pan);
            self.next += 1;
        }
        self.next - start
    }

    /// Skips everything before `time` without playing it.
    pub fn seek(&mut self, time: f64) {
        self.next = self.events.partition_point(|e| e.start_time < time);
    }

    pub fn remaining(&self) -> usize {
        self.events.len() - self.next
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
