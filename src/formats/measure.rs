//! Measure-relative to absolute time integration.
//!
//! OJN and BMS place events at a fractional position inside a numbered
//! measure. Events are sorted by `measure + position` and walked once with
//! a [`MeasureClock`], which accumulates milliseconds from the tempo and
//! measure length in effect.

use super::{ParseResult, ParseWarning};
use crate::models::chart::{NoteInfo, NoteType};
use std::cmp::Ordering;

/// Milliseconds of one 4/4 measure at 1 BPM.
pub const MS_PER_MEASURE_AT_1BPM: f64 = 4.0 * 60_000.0;

/// Subdivisions of a measure used by stop lengths and beat judging.
pub const TICKS_PER_MEASURE: f64 = 192.0;

/// Lowest tempo accepted from a chart.
pub const MIN_BPM: f64 = 0.01;

/// Tie-break rank for events sharing one instant. Lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventRank {
    /// Measure length changes.
    Signature = 0,
    /// Tempo changes.
    Tempo = 1,
    /// Notes and samples.
    Object = 2,
    /// Stops, so notes at the stop instant sound before the pause.
    Stop = 3,
}

/// An event positioned inside a measure.
#[derive(Debug, Clone)]
pub struct MeasureEvent<T> {
    pub measure: u32,
    /// 0.0 (inclusive) to 1.0 (exclusive).
    pub position: f64,
    pub rank: EventRank,
    /// Channel number, used as the last tie-break.
    pub channel: u32,
    pub kind: T,
}

impl<T> MeasureEvent<T> {
    fn beat_position(&self) -> f64 {
        self.measure as f64 + self.position
    }

    fn order(&self, other: &Self) -> Ordering {
        self.beat_position()
            .total_cmp(&other.beat_position())
            .then(self.rank.cmp(&other.rank))
            .then(self.channel.cmp(&other.channel))
    }
}

/// Stable sort by `(measure + position, rank, channel)`.
pub fn sort_events<T>(events: &mut [MeasureEvent<T>]) {
    events.sort_by(|a, b| a.order(b));
}

/// Walks measures forward and converts positions to milliseconds.
#[derive(Debug, Clone)]
pub struct MeasureClock {
    measure: u32,
    bpm: f64,
    fraction: f64,
    position: f64,
    timer: f64,
    boundaries: Vec<f64>,
}

impl MeasureClock {
    pub fn new(start_time: f64, bpm: f64) -> Self {
        Self {
            measure: 0,
            bpm: bpm.max(MIN_BPM),
            fraction: 1.0,
            position: 0.0,
            timer: start_time,
            boundaries: vec![start_time],
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn time(&self) -> f64 {
        self.timer
    }

    /// Moves to `position` inside `measure` and returns the absolute time.
    ///
    /// Every measure boundary crossed on the way is recorded, and the
    /// measure length resets to a full measure at each boundary.
    pub fn advance(&mut self, measure: u32, position: f64) -> f64 {
        while self.measure < measure {
            self.timer += MS_PER_MEASURE_AT_1BPM * (self.fraction - self.position) / self.bpm;
            self.boundaries.push(self.timer);

            self.measure += 1;
            self.position = 0.0;
            self.fraction = 1.0;
        }

        let position = position * self.fraction;
        self.timer += MS_PER_MEASURE_AT_1BPM * (position - self.position) / self.bpm;
        self.position = position;
        self.timer
    }

    /// Applies a tempo change, clamping unusable values to [`MIN_BPM`].
    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), ParseWarning> {
        if bpm < MIN_BPM || !bpm.is_finite() {
            self.bpm = MIN_BPM;
            return Err(ParseWarning::TempoClamped {
                time: self.timer,
                value: bpm,
            });
        }
        self.bpm = bpm;
        Ok(())
    }

    /// Sets the length of the current measure, 1.0 being a full 4/4.
    pub fn set_measure_fraction(&mut self, fraction: f64) {
        if fraction > 0.0 && fraction.is_finite() {
            self.fraction = fraction;
        }
    }

    /// Pauses for `ticks` 1/192 measures. Returns `(start, end)`.
    pub fn stop(&mut self, ticks: f64) -> (f64, f64) {
        let start = self.timer;
        let duration = (ticks / TICKS_PER_MEASURE) * (MS_PER_MEASURE_AT_1BPM / self.bpm);
        self.timer += duration.max(0.0);
        (start, self.timer)
    }

    /// Closes the current measure and returns every boundary seen.
    pub fn finish(mut self) -> Vec<f64> {
        self.timer += MS_PER_MEASURE_AT_1BPM * (self.fraction - self.position) / self.bpm;
        self.boundaries.push(self.timer);
        self.boundaries
    }
}

/// Pairs hold start and end markers per lane.
#[derive(Debug, Clone)]
pub struct HoldPairing {
    open: Vec<Option<NoteInfo>>,
}

impl HoldPairing {
    pub fn new(lanes: usize) -> Self {
        Self {
            open: vec![None; lanes],
        }
    }

    pub fn is_open(&self, lane: usize) -> bool {
        self.open.get(lane).is_some_and(Option::is_some)
    }

    /// Places a tap. A tap landing on an open hold is demoted.
    pub fn tap(&mut self, tag: &str, note: NoteInfo, out: &mut ParseResult) {
        if self.is_open(note.lane) {
            out.demote_to_auto_sample(tag, &note);
            return;
        }
        out.notes.push(note);
    }

    /// Opens a hold on the note's lane.
    pub fn start(&mut self, tag: &str, note: NoteInfo, out: &mut ParseResult) {
        match self.open.get_mut(note.lane) {
            Some(slot @ None) => *slot = Some(note),
            Some(Some(_)) => out.demote_to_auto_sample(tag, &note),
            None => out.warn(tag, ParseWarning::SkippedLine(format!("lane {}", note.lane))),
        }
    }

    /// Closes the lane's open hold at `end_time`.
    ///
    /// `keysound` replaces the start marker's sample when given.
    pub fn end(
        &mut self,
        tag: &str,
        lane: usize,
        end_time: f64,
        keysound: Option<u32>,
        out: &mut ParseResult,
    ) {
        let Some(mut note) = self.open.get_mut(lane).and_then(Option::take) else {
            out.warn(
                tag,
                ParseWarning::DanglingHoldEnd {
                    lane,
                    time: end_time,
                },
            );
            return;
        };

        note.end_time = end_time;
        note.note_type = NoteType::Hold;
        if keysound.is_some() {
            note.keysound = keysound;
        }
        out.notes.push(note);
    }

    /// Converts the lane's last tap into a hold ending at `end_time`.
    ///
    /// Used for `#LNOBJ` style charts where the end marker follows a tap.
    pub fn extend_last_tap(
        &self,
        tag: &str,
        lane: usize,
        end_time: f64,
        out: &mut ParseResult,
    ) {
        let last = out
            .notes
            .iter_mut()
            .rev()
            .find(|n| n.lane == lane && n.note_type == NoteType::Tap);
        match last {
            Some(note) => {
                note.note_type = NoteType::Hold;
                note.end_time = end_time;
            }
            None => out.warn(
                tag,
                ParseWarning::DanglingHoldEnd {
                    lane,
                    time: end_time,
                },
            ),
        }
    }

    /// Reports every hold still open once the stream is exhausted.
    pub fn finish(self, tag: &str, out: &mut ParseResult) {
        for note in self.open.into_iter().flatten() {
            out.warn(
                tag,
                ParseWarning::UnreleasedHold {
                    lane: note.lane,
                    time: note.start_time,
                },
            );
        }
    }
}
