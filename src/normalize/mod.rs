//! Turns a reader's [`ParseResult`] into a playable [`Chart`].
//!
//! Steps, in order: note cleanup and sorting, key-count inference with lane
//! compaction, overlap resolution, lane mods, tempo/velocity normalization
//! and content hashing.

pub mod mods;
pub mod velocity;

use crate::formats::{ParseResult, ParseWarning};
use crate::formats::measure::MIN_BPM;
use crate::models::chart::{Chart, NoteInfo, NoteType, TimingInfo};
use crate::models::settings::SessionConfig;

const TAG: &str = "CHART";

pub const MAX_LANES: usize = 7;

/// Lane patterns of the O2Jam layouts, checked in order.
///
/// `X X X X X X X`, `X X X X X X -`, `X X - X - X X`, `X X - - - X X`.
const KEY_PATTERNS: [(usize, [bool; MAX_LANES]); 4] = [
    (7, [true, true, true, true, true, true, true]),
    (6, [true, true, true, true, true, true, false]),
    (5, [true, true, false, true, false, true, true]),
    (4, [true, true, false, false, false, true, true]),
];

/// Infers the key count from the set of used lanes.
///
/// Returns the key count and, for the reduced layouts, the pattern whose
/// used lanes should be compacted to `0..keys`.
pub fn infer_key_count(notes: &[NoteInfo]) -> (usize, Option<[bool; MAX_LANES]>) {
    let mut used = [false; MAX_LANES];
    for note in notes {
        if let Some(slot) = used.get_mut(note.lane) {
            *slot = true;
        }
    }

    for (keys, pattern) in KEY_PATTERNS {
        if used == pattern {
            return (keys, Some(pattern));
        }
    }
    log::info!("CHART: unknown lane pattern {:?}, using 7 keys", used);
    (MAX_LANES, None)
}

fn compact_lanes(notes: &mut [NoteInfo], pattern: &[bool; MAX_LANES]) {
    let mut mapping = [0usize; MAX_LANES];
    let mut next = 0;
    for (lane, used) in pattern.iter().enumerate() {
        mapping[lane] = next;
        if *used {
            next += 1;
        }
    }
    for note in notes.iter_mut() {
        note.lane = mapping[note.lane];
    }
}

/// Keeps holds well formed and sorts by `(start, lane)`.
fn clean_notes(parsed: &mut ParseResult) {
    let mut notes = std::mem::take(&mut parsed.notes);
    for note in notes.iter_mut() {
        if note.note_type == NoteType::Hold && note.end_time <= note.start_time {
            parsed.warn(
                TAG,
                ParseWarning::EmptyHold {
                    lane: note.lane,
                    time: note.start_time,
                },
            );
            note.note_type = NoteType::Tap;
        }
        if note.note_type == NoteType::Tap {
            note.end_time = note.start_time;
        }
    }
    notes.sort_by(|a, b| a.start_time.total_cmp(&b.start_time).then(a.lane.cmp(&b.lane)));
    parsed.notes = notes;
}

/// Drops notes that start while their lane is still occupied.
///
/// A dropped note with a keysound is kept as an auto-sample.
fn resolve_overlaps(parsed: &mut ParseResult, key_count: usize) {
    let notes = std::mem::take(&mut parsed.notes);
    let mut busy_until = vec![f64::NEG_INFINITY; key_count];
    let mut last_start = vec![f64::NEG_INFINITY; key_count];
    let mut kept = Vec::with_capacity(notes.len());

    for note in notes {
        let lane = note.lane;
        if lane >= key_count {
            parsed.warn(TAG, ParseWarning::SkippedLine(format!("note on lane {}", lane)));
            continue;
        }
        if note.start_time < busy_until[lane] || note.start_time == last_start[lane] {
            parsed.demote_to_auto_sample(TAG, &note);
            continue;
        }
        busy_until[lane] = note.occupied_until();
        last_start[lane] = note.start_time;
        kept.push(note);
    }
    parsed.notes = kept;
}

fn clean_timings(parsed: &mut ParseResult) {
    for point in parsed.bpms.iter_mut() {
        // Zero marks a stop span; anything below it is an authoring error.
        if point.value < 0.0 || !point.value.is_finite() {
            log::warn!(
                "CHART: {}",
                ParseWarning::TempoClamped {
                    time: point.start_time,
                    value: point.value
                }
            );
            point.value = MIN_BPM;
        }
    }
    velocity::dedupe_timings(&mut parsed.bpms);
    velocity::dedupe_timings(&mut parsed.svs);

    if parsed.bpms.is_empty() {
        log::warn!("CHART: no tempo point, assuming 120 BPM");
        parsed.bpms.push(TimingInfo::bpm(0.0, 120.0));
    }
    velocity::compute_beats(&mut parsed.bpms);
}

/// Hex md5 over every note's `start + end`.
pub fn content_hash(notes: &[NoteInfo]) -> String {
    let mut text = String::new();
    for note in notes {
        let end = match note.note_type {
            NoteType::Hold => note.end_time,
            NoteType::Tap => 0.0,
        };
        text.push_str(&format!("{:.6}", note.start_time + end));
    }
    format!("{:x}", md5::compute(text.as_bytes()))
}

/// Builds the normalized chart.
pub fn normalize(mut parsed: ParseResult, config: &SessionConfig) -> Chart {
    clean_notes(&mut parsed);

    let declared = parsed
        .key_count
        .filter(|&keys| parsed.notes.iter().all(|n| n.lane < keys));
    let key_count = match declared {
        Some(keys) => keys,
        None => {
            let (keys, pattern) = infer_key_count(&parsed.notes);
            if let Some(pattern) = pattern {
                compact_lanes(&mut parsed.notes, &pattern);
            }
            keys
        }
    };

    resolve_overlaps(&mut parsed, key_count);
    mods::apply(&mut parsed.notes, key_count, config);
    parsed
        .notes
        .sort_by(|a, b| a.start_time.total_cmp(&b.start_time).then(a.lane.cmp(&b.lane)));

    clean_timings(&mut parsed);
    let last_time = parsed
        .notes
        .iter()
        .map(NoteInfo::occupied_until)
        .fold(f64::NEG_INFINITY, f64::max);
    let last_time = if last_time.is_finite() { last_time } else { 0.0 };
    let base_bpm = velocity::common_bpm(&parsed.bpms, last_time);
    let normalized = velocity::normalize(&parsed.bpms, &parsed.svs, base_bpm);

    parsed
        .auto_samples
        .sort_by(|a, b| a.start_time.total_cmp(&b.start_time).then(a.sample.cmp(&b.sample)));

    let hash = content_hash(&parsed.notes);
    log::info!(
        "CHART: {} keys, {} notes, base {:.2} BPM, {} velocity points, hash {}",
        key_count,
        parsed.notes.len(),
        base_bpm,
        normalized.points.len(),
        hash
    );

    Chart {
        metadata: parsed.metadata,
        directory: parsed.directory,
        notes: parsed.notes,
        bpms: parsed.bpms,
        svs: normalized.points,
        measures: parsed.measures,
        samples: parsed.samples,
        auto_samples: parsed.auto_samples,
        key_count,
        base_bpm,
        initial_sv_multiplier: normalized.initial,
        hash,
        audio_length: parsed.audio_length,
    }
}
