//! Tempo and scroll-velocity normalization.
//!
//! Tempo changes become visual speed changes by expressing every velocity
//! point relative to one common tempo: the BPM active for the longest
//! stretch of the chart.

use crate::models::chart::TimingInfo;
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

/// Sorts by start time and keeps only the last point of each timestamp.
pub fn dedupe_timings(points: &mut Vec<TimingInfo>) {
    points.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    let mut out: Vec<TimingInfo> = Vec::with_capacity(points.len());
    for point in points.drain(..) {
        match out.last_mut() {
            Some(last) if last.start_time == point.start_time => *last = point,
            _ => out.push(point),
        }
    }
    *points = out;
}

/// Fills in the cumulative beat of every tempo point.
pub fn compute_beats(bpms: &mut [TimingInfo]) {
    for i in 0..bpms.len() {
        bpms[i].beat = match i {
            0 => 0.0,
            _ => bpms[i - 1].calculate_beat(bpms[i].start_time),
        };
    }
}

/// The tempo that stays in effect for the longest time before `last_time`.
///
/// Walks the tempo points backwards from the last note; zero-tempo stop
/// spans never qualify.
pub fn common_bpm(bpms: &[TimingInfo], last_time: f64) -> f64 {
    let Some(first) = bpms.first() else {
        return 0.0;
    };

    let mut durations: BTreeMap<OrderedFloat<f64>, f64> = BTreeMap::new();
    let mut last_time = last_time;
    for (i, point) in bpms.iter().enumerate().rev() {
        if point.start_time > last_time {
            continue;
        }
        let duration = last_time - if i == 0 { 0.0 } else { point.start_time };
        last_time = point.start_time;
        if point.value > 0.0 {
            *durations.entry(OrderedFloat(point.value)).or_default() += duration;
        }
    }

    durations
        .into_iter()
        .filter(|(_, duration)| *duration > 0.0)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(bpm, _)| bpm.into_inner())
        .unwrap_or(first.value)
}

/// Result of merging tempo and velocity points.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedVelocity {
    /// Multiplier before the first point.
    pub initial: f64,
    pub points: Vec<TimingInfo>,
}

/// Collapses tempo and velocity lists into one velocity sequence relative
/// to `base_bpm`.
///
/// Both inputs must already be sorted and deduplicated. A tempo point
/// resets the authored velocity to 1.0 unless a velocity point shares its
/// timestamp, in which case the two combine into one point.
pub fn normalize(bpms: &[TimingInfo], svs: &[TimingInfo], base_bpm: f64) -> NormalizedVelocity {
    let mut result = Vec::new();
    let Some(first) = bpms.first() else {
        return NormalizedVelocity {
            initial: 1.0,
            points: svs.to_vec(),
        };
    };
    let base_bpm = if base_bpm > 0.0 { base_bpm } else { first.value.max(1.0) };

    let mut current_bpm = first.value;
    let mut sv_index = 0;
    let mut sv_start: Option<f64> = None;
    let mut sv_value = 1.0;
    let mut adjusted: Option<f64> = None;
    let mut initial: Option<f64> = None;

    let mut emit = |time: f64, multiplier: f64, adjusted: &mut Option<f64>| {
        if adjusted.is_none() {
            *adjusted = Some(multiplier);
            initial = Some(multiplier);
        }
        if *adjusted != Some(multiplier) {
            result.push(TimingInfo::sv(time, multiplier));
            *adjusted = Some(multiplier);
        }
    };

    for tp in bpms {
        while let Some(sv) = svs.get(sv_index) {
            if sv.start_time > tp.start_time {
                break;
            }
            if sv.start_time < tp.start_time {
                emit(sv.start_time, sv.value * (current_bpm / base_bpm), &mut adjusted);
            }
            sv_start = Some(sv.start_time);
            sv_value = sv.value;
            sv_index += 1;
        }

        if sv_start.is_none_or(|start| start < tp.start_time) {
            sv_value = 1.0;
        }

        current_bpm = tp.value;
        emit(tp.start_time, sv_value * (current_bpm / base_bpm), &mut adjusted);
    }

    for sv in &svs[sv_index.min(svs.len())..] {
        emit(sv.start_time, sv.value * (current_bpm / base_bpm), &mut adjusted);
    }

    NormalizedVelocity {
        initial: initial.unwrap_or(1.0),
        points: result,
    }
}
