//! Be-Music Source (`.bms`/`.bme`) reader.
//!
//! Header lines are `#COMMAND value`; data lines are `#mmmcc:data` where
//! `mmm` is the measure, `cc` the channel and `data` a run of two-character
//! base36 cells spread evenly over the measure.

use super::measure::{EventRank, HoldPairing, MeasureClock, MeasureEvent, sort_events};
use super::{ParseOutcome, ParseResult, ParseWarning};
use crate::models::chart::{AutoSample, NoteInfo, Sample, SampleId, SampleSource, TimingInfo};
use std::collections::HashMap;

const TAG: &str = "BMS";

pub const DEFAULT_BPM: f64 = 130.0;

/// Channels 11-15, 18, 19 in lane order.
const PLAY_CHANNELS: [u32; 7] = [11, 12, 13, 14, 15, 18, 19];
/// Long-note counterparts of [`PLAY_CHANNELS`].
const HOLD_CHANNELS: [u32; 7] = [51, 52, 53, 54, 55, 58, 59];
const SCRATCH_CHANNELS: [u32; 2] = [16, 56];

const BGM_CHANNEL: u32 = 1;
const SIGNATURE_CHANNEL: u32 = 2;
const BPM_CHANNEL: u32 = 3;
const BPM_TABLE_CHANNEL: u32 = 8;
const STOP_CHANNEL: u32 = 9;

/// Header commands that carry nothing the engine uses.
const IGNORED_COMMANDS: &[&str] = &[
    "GENRE", "SUBTITLE", "SUBARTIST", "RANK", "TOTAL", "DIFFICULTY", "BANNER", "BACKBMP",
    "VOLWAV", "BMP", "PREVIEW", "MAKER", "COMMENT", "DEFEXRANK", "EXRANK",
];

/// Decodes a two character base36 id (`"0Z"` = 35).
pub fn base36(cell: &str) -> Option<u32> {
    u32::from_str_radix(cell, 36).ok()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EventKind {
    Bgm(u32),
    Signature(f64),
    Bpm(f64),
    Stop(f64),
    Play { lane: usize, id: u32 },
    Hold { lane: usize, id: u32 },
    Scratch(u32),
}

#[derive(Debug, Default)]
struct Header {
    title: String,
    artist: String,
    stage_file: Option<String>,
    level: i32,
    bpm: Option<f64>,
    /// Upper-case base36 id -> (sample index, file).
    wavs: HashMap<String, (SampleId, String)>,
    wav_order: Vec<String>,
    bpm_table: HashMap<String, f64>,
    stop_table: HashMap<String, f64>,
    ln_obj: Option<u32>,
}

impl Header {
    fn sample(&self, id: u32) -> Option<SampleId> {
        let key = format!("{:0>2}", to_base36(id));
        self.wavs.get(&key).map(|(index, _)| *index)
    }
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if value == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Splits `data` into `(position, cell)` pairs, skipping `"00"`.
fn cells(data: &str) -> impl Iterator<Item = (f64, &str)> {
    let count = data.len() / 2;
    (0..count).filter_map(move |i| {
        let cell = data.get(i * 2..i * 2 + 2)?;
        (cell != "00").then(|| (i as f64 / count as f64, cell))
    })
}

fn read_header_line(command: &str, value: &str, header: &mut Header, out: &mut ParseResult) {
    let upper = command.to_ascii_uppercase();
    match upper.as_str() {
        "TITLE" => header.title = value.to_string(),
        "ARTIST" => header.artist = value.to_string(),
        "STAGEFILE" => header.stage_file = Some(value.to_string()),
        "PLAYLEVEL" => header.level = value.parse().unwrap_or(0),
        "BPM" => header.bpm = value.parse().ok(),
        "PLAYER" => match value.parse::<u32>() {
            Ok(1) => {}
            Ok(player) => out.warn(TAG, ParseWarning::UnsupportedPlayer(player)),
            Err(_) => out.warn(TAG, ParseWarning::SkippedLine(format!("#PLAYER {}", value))),
        },
        "LNTYPE" => {
            if value.trim() != "1" {
                log::warn!("BMS: #LNTYPE {} read as type 1", value);
            }
        }
        "LNOBJ" => header.ln_obj = base36(value.trim()),
        _ if upper.len() == 5 && upper.starts_with("WAV") => {
            let id = upper[3..].to_string();
            let index = header.wav_order.len() as SampleId;
            header.wav_order.push(id.clone());
            header.wavs.insert(id, (index, value.to_string()));
        }
        _ if upper.len() == 5 && upper.starts_with("BPM") => {
            if let Ok(bpm) = value.parse() {
                header.bpm_table.insert(upper[3..].to_string(), bpm);
            }
        }
        _ if upper.len() == 6 && upper.starts_with("STOP") => {
            if let Ok(ticks) = value.parse() {
                header.stop_table.insert(upper[4..].to_string(), ticks);
            }
        }
        _ if IGNORED_COMMANDS.iter().any(|c| upper.starts_with(c)) => {}
        _ => out.warn(TAG, ParseWarning::UnknownDirective(format!("#{}", command))),
    }
}

fn read_data_line(
    field: &str,
    data: &str,
    header: &Header,
    events: &mut Vec<MeasureEvent<EventKind>>,
    out: &mut ParseResult,
) {
    let (Some(measure), Some(channel)) = (
        field.get(0..3).and_then(|m| m.parse::<u32>().ok()),
        field.get(3..5).and_then(|c| c.parse::<u32>().ok()),
    ) else {
        out.warn(TAG, ParseWarning::SkippedLine(format!("#{}:{}", field, data)));
        return;
    };
    let data = data.trim();

    let mut push = |position: f64, rank: EventRank, kind: EventKind| {
        events.push(MeasureEvent {
            measure,
            position,
            rank,
            channel,
            kind,
        })
    };

    match channel {
        0 => {}
        SIGNATURE_CHANNEL => {
            if let Ok(fraction) = data.parse::<f64>() {
                push(0.0, EventRank::Signature, EventKind::Signature(fraction));
            }
        }
        BPM_CHANNEL => {
            for (position, cell) in cells(data) {
                if let Ok(bpm) = u32::from_str_radix(cell, 16) {
                    push(position, EventRank::Tempo, EventKind::Bpm(bpm as f64));
                }
            }
        }
        BPM_TABLE_CHANNEL => {
            for (position, cell) in cells(data) {
                if let Some(&bpm) = header.bpm_table.get(&cell.to_ascii_uppercase()) {
                    push(position, EventRank::Tempo, EventKind::Bpm(bpm));
                }
            }
        }
        STOP_CHANNEL => {
            for (position, cell) in cells(data) {
                if let Some(&ticks) = header.stop_table.get(&cell.to_ascii_uppercase()) {
                    push(position, EventRank::Stop, EventKind::Stop(ticks));
                }
            }
        }
        _ => {
            let kind = |id: u32| {
                if channel == BGM_CHANNEL {
                    Some(EventKind::Bgm(id))
                } else if let Some(lane) = PLAY_CHANNELS.iter().position(|&c| c == channel) {
                    Some(EventKind::Play { lane, id })
                } else if let Some(lane) = HOLD_CHANNELS.iter().position(|&c| c == channel) {
                    Some(EventKind::Hold { lane, id })
                } else if SCRATCH_CHANNELS.contains(&channel) {
                    Some(EventKind::Scratch(id))
                } else {
                    None
                }
            };
            for (position, cell) in cells(data) {
                if let Some(kind) = base36(cell).and_then(&kind) {
                    push(position, EventRank::Object, kind);
                }
            }
        }
    }
}

/// Reads a BMS document.
pub fn parse(text: &str) -> ParseOutcome {
    let mut out = ParseResult::default();
    let mut header = Header::default();
    let mut lines = Vec::new();

    // Headers first so tables are complete before data lines use them.
    for line in text.lines() {
        let line = line.trim();
        let Some(body) = line.strip_prefix('#') else {
            continue;
        };
        match body.split_once(':') {
            Some((field, data)) if body.starts_with(|c: char| c.is_ascii_digit()) => {
                lines.push((field.trim(), data));
            }
            _ => {
                let (command, value) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
                read_header_line(command, value.trim(), &mut header, &mut out);
            }
        }
    }

    let mut events = Vec::new();
    for (field, data) in lines {
        read_data_line(field, data, &header, &mut events, &mut out);
    }
    sort_events(&mut events);

    let base_bpm = header.bpm.filter(|b| *b > 0.0).unwrap_or(DEFAULT_BPM);
    let mut clock = MeasureClock::new(0.0, base_bpm);
    out.bpms.push(TimingInfo::bpm(0.0, base_bpm));
    let mut pairing = HoldPairing::new(PLAY_CHANNELS.len());
    let mut fraction = 1.0;
    let mut last_measure = 0;

    for event in &events {
        if event.measure != last_measure {
            fraction = 1.0;
            last_measure = event.measure;
        }
        let time = clock.advance(event.measure, event.position);

        match event.kind {
            EventKind::Bgm(id) | EventKind::Scratch(id) => {
                if let Some(sample) = header.sample(id) {
                    out.auto_samples.push(AutoSample::new(time, sample));
                }
            }
            EventKind::Signature(value) => {
                fraction = value;
                clock.set_measure_fraction(value);
            }
            EventKind::Bpm(bpm) => {
                if let Err(warning) = clock.set_bpm(bpm) {
                    out.warn(TAG, warning);
                }
                out.bpms
                    .push(TimingInfo::bpm(time, clock.bpm()).with_time_signature(4.0 * fraction));
            }
            EventKind::Stop(ticks) => {
                let (start, end) = clock.stop(ticks);
                out.bpms
                    .push(TimingInfo::bpm(start, 0.0).with_time_signature(4.0 * fraction));
                out.bpms
                    .push(TimingInfo::bpm(end, clock.bpm()).with_time_signature(4.0 * fraction));
            }
            EventKind::Play { lane, id } => {
                if header.ln_obj == Some(id) {
                    pairing.extend_last_tap(TAG, lane, time, &mut out);
                    continue;
                }
                let mut note = NoteInfo::tap(time, lane);
                note.keysound = header.sample(id);
                pairing.tap(TAG, note, &mut out);
            }
            EventKind::Hold { lane, id } => {
                if pairing.is_open(lane) {
                    pairing.end(TAG, lane, time, header.sample(id), &mut out);
                } else {
                    let mut note = NoteInfo::tap(time, lane);
                    note.keysound = header.sample(id);
                    pairing.start(TAG, note, &mut out);
                }
            }
        }
    }

    pairing.finish(TAG, &mut out);
    out.audio_length = Some(clock.time() + 500.0);
    out.measures = clock.finish();

    out.metadata.title = header.title;
    out.metadata.artist = header.artist;
    out.metadata.background = header.stage_file;
    out.metadata.level = header.level;
    out.samples = header
        .wav_order
        .iter()
        .filter_map(|id| header.wavs.get(id))
        .map(|(index, file)| Sample {
            id: *index,
            source: SampleSource::File(file.clone()),
        })
        .collect();
    out.samples.sort_by_key(|s| s.id);

    Ok(out)
}
