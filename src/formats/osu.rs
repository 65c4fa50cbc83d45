//! osu!mania (`.osu`) reader.
//!
//! Only mania maps (`Mode: 3`) with 1 to 7 keys are accepted. Times in the
//! file are already absolute milliseconds, so no measure integration is
//! needed here.

use super::{ParseError, ParseOutcome, ParseResult, ParseWarning};
use crate::models::chart::{AutoSample, NoteInfo, NoteType, Sample, SampleId, SampleSource, TimingInfo};

const TAG: &str = "OSU";

const MANIA_MODE: i32 = 3;
const HOLD_FLAG: u32 = 128;
const PLAYFIELD_WIDTH: f64 = 512.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    General,
    Metadata,
    Difficulty,
    Events,
    TimingPoints,
    HitObjects,
    Other,
}

impl Section {
    fn from_header(name: &str) -> Self {
        match name {
            "General" => Section::General,
            "Metadata" => Section::Metadata,
            "Difficulty" => Section::Difficulty,
            "Events" => Section::Events,
            "TimingPoints" => Section::TimingPoints,
            "HitObjects" => Section::HitObjects,
            _ => Section::Other,
        }
    }
}

/// File names mapped to sample ids in first-seen order.
#[derive(Debug, Default)]
struct SampleTable {
    files: Vec<String>,
}

impl SampleTable {
    fn get_or_insert(&mut self, file: &str) -> SampleId {
        if let Some(index) = self.files.iter().position(|f| f == file) {
            return index as SampleId;
        }
        self.files.push(file.to_string());
        (self.files.len() - 1) as SampleId
    }

    fn into_samples(self) -> Vec<Sample> {
        self.files
            .into_iter()
            .enumerate()
            .map(|(id, file)| Sample {
                id: id as SampleId,
                source: SampleSource::File(file),
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct General {
    audio_file: String,
    lead_in: f64,
    mode: i32,
    key_count: f64,
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches('"').to_string()
}

fn read_event(line: &str, samples: &mut SampleTable, out: &mut ParseResult) {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 3 {
        return;
    }
    let time = fields[1].trim().parse::<f64>().unwrap_or(0.0);
    match fields[0].trim() {
        "0" | "Background" => out.metadata.background = Some(unquote(fields[2])),
        "5" | "Sample" => {
            let Some(file) = fields.get(3).map(|f| unquote(f)) else {
                return;
            };
            let volume = fields
                .get(4)
                .and_then(|v| v.trim().parse::<f32>().ok())
                .map(|v| v / 100.0)
                .unwrap_or(1.0);
            let id = samples.get_or_insert(&file);
            out.auto_samples.push(AutoSample {
                start_time: time,
                sample: id,
                volume,
                pan: 0.0,
            });
        }
        _ => {}
    }
}

fn read_timing_point(line: &str, out: &mut ParseResult) {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let parsed = (
        fields.first().and_then(|f| f.parse::<f64>().ok()),
        fields.get(1).and_then(|f| f.parse::<f64>().ok()),
    );
    let (Some(offset), Some(beat_length)) = parsed else {
        out.warn(TAG, ParseWarning::SkippedLine(line.to_string()));
        return;
    };
    let meter = fields
        .get(2)
        .and_then(|f| f.parse::<f64>().ok())
        .filter(|m| *m > 0.0)
        .unwrap_or(4.0);
    let uninherited = fields.get(6).map(|f| *f == "1").unwrap_or(true);

    if !uninherited || beat_length < 0.0 {
        let multiplier = (-100.0 / beat_length).clamp(0.1, 10.0);
        out.svs.push(TimingInfo::sv(offset, multiplier));
    } else if beat_length > 0.0 {
        let bpm = 60000.0 / beat_length;
        out.bpms
            .push(TimingInfo::bpm(offset, bpm).with_time_signature(meter));
    } else {
        out.warn(
            TAG,
            ParseWarning::TempoClamped {
                time: offset,
                value: beat_length,
            },
        );
    }
}

fn read_hit_object(line: &str, keys: usize, samples: &mut SampleTable, out: &mut ParseResult) {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 4 {
        out.warn(TAG, ParseWarning::SkippedLine(line.to_string()));
        return;
    }
    let (Ok(x), Ok(start), Ok(kind)) = (
        fields[0].parse::<f64>(),
        fields[2].parse::<f64>(),
        fields[3].parse::<u32>(),
    ) else {
        out.warn(TAG, ParseWarning::SkippedLine(line.to_string()));
        return;
    };

    let lane = ((x * keys as f64 / PLAYFIELD_WIDTH).floor().max(0.0) as usize).min(keys - 1);
    let is_hold = kind & HOLD_FLAG != 0;
    let extras: Vec<&str> = fields
        .get(5)
        .map(|e| e.split(':').collect())
        .unwrap_or_default();

    let mut note = NoteInfo::tap(start, lane);
    if is_hold {
        let end = extras.first().and_then(|e| e.parse::<f64>().ok());
        match end {
            Some(end) => {
                note.note_type = NoteType::Hold;
                note.end_time = end;
            }
            None => out.warn(TAG, ParseWarning::EmptyHold { lane, time: start }),
        }
    }

    // Hold extras carry the end time first, shifting every field by one.
    let volume_field = if is_hold { 4 } else { 3 };
    if let Some(volume) = extras.get(volume_field).and_then(|v| v.parse::<i32>().ok()) {
        if volume > 0 {
            note.volume = volume.min(100) as f32 / 100.0;
        }
    }
    if let Some(file) = extras.get(volume_field + 1).filter(|f| !f.is_empty()) {
        note.keysound = Some(samples.get_or_insert(file));
    }

    out.notes.push(note);
}

/// Reads an osu!mania document.
pub fn parse(text: &str) -> ParseOutcome {
    let mut out = ParseResult::default();
    let mut general = General::default();
    let mut samples = SampleTable::default();
    let mut section = Section::None;
    let mut hit_objects = Vec::new();

    for raw in text.lines() {
        let line = raw.trim().trim_start_matches('\u{feff}');
        if line.is_empty() || line.starts_with("//") || line.starts_with("osu file format") {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            section = Section::from_header(&line[1..line.len() - 1]);
            continue;
        }

        match section {
            Section::General | Section::Metadata | Section::Difficulty => {
                let Some((key, value)) = line.split_once(':') else {
                    continue;
                };
                let value = value.trim();
                match (section, key.trim()) {
                    (Section::General, "AudioFilename") => general.audio_file = value.to_string(),
                    (Section::General, "AudioLeadIn") => {
                        general.lead_in = value.parse().unwrap_or(0.0)
                    }
                    (Section::General, "Mode") => general.mode = value.parse().unwrap_or(0),
                    (Section::Metadata, "Title") => out.metadata.title = value.to_string(),
                    (Section::Metadata, "Artist") => out.metadata.artist = value.to_string(),
                    (Section::Metadata, "Creator") => out.metadata.creator = value.to_string(),
                    (Section::Difficulty, "CircleSize") => {
                        general.key_count = value.parse().unwrap_or(0.0)
                    }
                    _ => {}
                }
            }
            Section::Events => read_event(line, &mut samples, &mut out),
            Section::TimingPoints => read_timing_point(line, &mut out),
            // Keys are only known once [Difficulty] has been read.
            Section::HitObjects => hit_objects.push(line),
            Section::None | Section::Other => {}
        }
    }

    if general.mode != MANIA_MODE {
        return Err(ParseError::Unsupported(format!(
            "osu mode {} is not mania",
            general.mode
        )));
    }
    if !(1.0..=7.0).contains(&general.key_count) {
        return Err(ParseError::Unsupported(format!(
            "{} keys is out of range",
            general.key_count
        )));
    }
    let keys = general.key_count as usize;
    out.key_count = Some(keys);

    for line in hit_objects {
        read_hit_object(line, keys, &mut samples, &mut out);
    }

    if !general.audio_file.is_empty() {
        let id = samples.get_or_insert(&general.audio_file);
        out.auto_samples.push(AutoSample::new(general.lead_in, id));
    }
    out.samples = samples.into_samples();

    if out.bpms.is_empty() {
        return Err(ParseError::Malformed("no uninherited timing point".into()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(keys: u32, timing: &str, objects: &str) -> String {
        format!(
            "osu file format v14\n\n[General]\nAudioFilename: song.mp3\nAudioLeadIn: 0\nMode: 3\n\n\
             [Metadata]\nTitle:Song\nArtist:Band\nCreator:mapper\n\n[Difficulty]\nCircleSize:{}\n\n\
             [Events]\n0,0,\"bg.jpg\",0,0\nSample,500,0,\"clap.wav\",70\n\n\
             [TimingPoints]\n{}\n\n[HitObjects]\n{}\n",
            keys, timing, objects
        )
    }

    #[test]
    fn test_reads_mania_map() {
        let text = map(
            7,
            "0,500,4,1,0,100,1,0\n1000,-50,4,1,0,100,0,0",
            "36,192,1000,1,0,0:0:0:0:\n475,192,1000,128,0,2000:0:0:0:80:hit.wav",
        );
        let result = parse(&text).unwrap();

        assert_eq!(result.key_count, Some(7));
        assert_eq!(result.metadata.title, "Song");
        assert_eq!(result.metadata.background.as_deref(), Some("bg.jpg"));
        assert_eq!(result.bpms.len(), 1);
        assert_eq!(result.bpms[0].value, 120.0);
        assert_eq!(result.svs.len(), 1);
        assert_eq!(result.svs[0].value, 2.0);

        assert_eq!(result.notes.len(), 2);
        assert_eq!(result.notes[0].lane, 0);
        assert_eq!(result.notes[1].lane, 6);
        assert_eq!(result.notes[1].note_type, NoteType::Hold);
        assert_eq!(result.notes[1].end_time, 2000.0);
        assert_eq!(result.notes[1].volume, 0.8);
        assert_eq!(result.notes[1].keysound, Some(1));
    }

    #[test]
    fn test_samples_share_ids() {
        let text = map(4, "0,500,4,1,0,100,1,0", "64,192,100,1,0,0:0:0:0:clap.wav");
        let result = parse(&text).unwrap();
        // clap.wav from [Events], then the song itself.
        assert_eq!(result.samples.len(), 2);
        assert_eq!(result.notes[0].keysound, Some(0));
        assert_eq!(result.auto_samples.len(), 2);
        assert_eq!(result.auto_samples[0].volume, 0.7);
    }

    #[test]
    fn test_double_slash_only_starts_comments() {
        let text = map(4, "// tempo\n0,500,4,1,0,100,1,0", "")
            .replace("Title:Song", "Title:Either//Or")
            .replace("[Events]\n", "[Events]\n// storyboard\n");
        let result = parse(&text).unwrap();
        assert_eq!(result.metadata.title, "Either//Or");
        assert_eq!(result.bpms.len(), 1);
    }

    #[test]
    fn test_velocity_is_clamped() {
        let text = map(4, "0,500,4,1,0,100,1,0\n10,-1,4,1,0,100,0,0", "");
        let result = parse(&text).unwrap();
        assert_eq!(result.svs[0].value, 10.0);
    }

    #[test]
    fn test_rejects_non_mania() {
        let text = map(4, "0,500,4,1,0,100,1,0", "").replace("Mode: 3", "Mode: 0");
        assert!(matches!(parse(&text), Err(ParseError::Unsupported(_))));
    }

    #[test]
    fn test_rejects_too_many_keys() {
        let text = map(9, "0,500,4,1,0,100,1,0", "");
        assert!(matches!(parse(&text), Err(ParseError::Unsupported(_))));
    }
}
