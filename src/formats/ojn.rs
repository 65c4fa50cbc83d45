//! O2Jam `.ojn` reader.
//!
//! The file starts with a fixed 300 byte little-endian header followed by
//! three difficulty streams. Each stream is a list of packages:
//! `(measure: u32, channel: u16, event_count: u16, events[event_count])`.
//! Channels 0 and 1 carry 4 byte floats (measure length and tempo); every
//! other channel carries `(value: u16, volpan: u8, type: u8)`.

use super::measure::{EventRank, HoldPairing, MeasureClock, MeasureEvent, sort_events};
use super::{ParseError, ParseOutcome, ParseResult, ParseWarning};
use crate::models::chart::{
    AutoSample, ChartMetadata, NoteInfo, NoteType, Sample, SampleId, SampleSource, TimingInfo,
};
use crate::models::settings::Difficulty;
use std::collections::BTreeSet;

const TAG: &str = "OJN";

pub const SIGNATURE: &[u8] = b"ojn\0";
pub const ENCRYPTED_SIGNATURE: &[u8] = b"new";

pub const HEADER_SIZE: usize = 300;

/// Notes start this long after the stream's zero reference.
pub const START_TIME: f64 = 1500.0;

/// Largest number of events one package may hold.
pub const MAX_EVENTS_PER_PACKAGE: usize = 192;

/// Keysound ids at or above this live in the OGG bank of the OJM.
pub const OGG_BANK_OFFSET: u32 = 1000;

const LANES: usize = 7;

/// Little-endian cursor over the decrypted file.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.data.len());
        let Some(end) = end else {
            return Err(ParseError::Malformed(format!(
                "unexpected end of data at offset {} (wanted {} bytes)",
                self.pos, len
            )));
        };
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_u16_le(&mut self) -> Result<u16, ParseError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    fn read_i16_le(&mut self) -> Result<i16, ParseError> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    fn read_u32_le(&mut self) -> Result<u32, ParseError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_i32_le(&mut self) -> Result<i32, ParseError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    fn read_f32_le(&mut self) -> Result<f32, ParseError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    fn read_string(&mut self, len: usize) -> Result<String, ParseError> {
        let bytes = self.read_bytes(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).trim().to_string())
    }
}

/// Fixed OJN header.
#[derive(Debug, Clone, Default)]
pub struct OjnHeader {
    pub song_id: i32,
    pub encode_version: f32,
    pub genre: i32,
    pub bpm: f32,
    pub level: [i16; 4],
    pub event_count: [i32; 3],
    pub note_count: [i32; 3],
    pub measure_count: [i32; 3],
    pub package_count: [i32; 3],
    pub bmp_size: i32,
    pub title: String,
    pub artist: String,
    pub noter: String,
    pub ojm_file: String,
    pub cover_size: i32,
    /// Duration per difficulty in seconds.
    pub time: [i32; 3],
    /// Stream start offsets, the fourth being the cover image.
    pub data_offset: [i32; 4],
}

impl OjnHeader {
    fn read(reader: &mut ByteReader) -> Result<Self, ParseError> {
        let song_id = reader.read_i32_le()?;
        let signature = reader.read_bytes(4)?;
        if signature != SIGNATURE {
            return Err(ParseError::Malformed(format!(
                "bad signature {:?}",
                String::from_utf8_lossy(signature)
            )));
        }

        let mut header = OjnHeader {
            song_id,
            encode_version: reader.read_f32_le()?,
            genre: reader.read_i32_le()?,
            bpm: reader.read_f32_le()?,
            ..Default::default()
        };
        for level in header.level.iter_mut() {
            *level = reader.read_i16_le()?;
        }
        for counts in [
            &mut header.event_count,
            &mut header.note_count,
            &mut header.measure_count,
            &mut header.package_count,
        ] {
            for count in counts.iter_mut() {
                *count = reader.read_i32_le()?;
            }
        }

        // old_encode_version, old_songid, old_genre
        reader.read_bytes(2 + 2 + 20)?;
        header.bmp_size = reader.read_i32_le()?;
        // old_file_version
        reader.read_i32_le()?;
        header.title = reader.read_string(64)?;
        header.artist = reader.read_string(32)?;
        header.noter = reader.read_string(32)?;
        header.ojm_file = reader.read_string(32)?;
        header.cover_size = reader.read_i32_le()?;
        for time in header.time.iter_mut() {
            *time = reader.read_i32_le()?;
        }
        for offset in header.data_offset.iter_mut() {
            *offset = reader.read_i32_le()?;
        }

        Ok(header)
    }
}

/// Undoes the XOR scrambling of `"new"` files.
///
/// Bytes 3..7 hold the block size and the main, middle and initial keys;
/// the payload after them is stored back to front.
pub fn decrypt(input: &[u8]) -> Result<Vec<u8>, ParseError> {
    if input.len() < 7 {
        return Err(ParseError::Malformed("encrypted header truncated".into()));
    }
    let block_size = input[3] as usize;
    let (main_key, mid_key, initial_key) = (input[4], input[5], input[6]);
    if block_size == 0 {
        return Err(ParseError::Malformed("encrypted block size is zero".into()));
    }

    let mut key = vec![main_key; block_size];
    key[0] = initial_key;
    key[block_size / 2] = mid_key;

    let out_len = input.len() - 7;
    let output = (0..out_len)
        .map(|offset| input[input.len() - (offset + 1)] ^ key[offset % block_size])
        .collect();
    Ok(output)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EventKind {
    MeasureFraction(f64),
    Bpm(f64),
    Note(NoteEvent),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct NoteEvent {
    sample: SampleId,
    volume: f32,
    pan: f32,
    marker: Marker,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Marker {
    Tap,
    HoldStart,
    HoldEnd,
}

fn decode_note(value: u16, volpan: u8, note_type: u8) -> NoteEvent {
    let mut sample = value as u32 - 1;
    if note_type % 8 > 3 {
        sample += OGG_BANK_OFFSET;
    }

    let mut volume = ((volpan >> 4) & 0x0F) as f32 / 16.0;
    if volume == 0.0 {
        volume = 1.0;
    }
    let mut pan = (volpan & 0x0F) as f32;
    if pan == 0.0 {
        pan = 8.0;
    }
    let pan = (pan - 8.0) / 8.0;

    let marker = match note_type % 4 {
        2 => Marker::HoldStart,
        3 => Marker::HoldEnd,
        _ => Marker::Tap,
    };

    NoteEvent {
        sample,
        volume,
        pan,
        marker,
    }
}

fn read_stream(
    reader: &mut ByteReader,
    header: &OjnHeader,
    index: usize,
) -> Result<Vec<MeasureEvent<EventKind>>, ParseError> {
    let start = header.data_offset[index].max(0) as usize;
    let end = header.data_offset[index + 1].max(0) as usize;
    let mut events = Vec::new();
    if end <= start {
        return Ok(events);
    }

    reader.seek(start);
    for _ in 0..header.package_count[index].max(0) {
        if reader.position() > end {
            return Err(ParseError::Malformed(format!(
                "package data overflows difficulty {} block",
                index
            )));
        }

        let measure = reader.read_u32_le()?;
        let channel = reader.read_u16_le()?;
        let count = reader.read_u16_le()? as usize;
        if count > MAX_EVENTS_PER_PACKAGE {
            return Err(ParseError::Malformed(format!(
                "measure {} has {} events (limit {})",
                measure, count, MAX_EVENTS_PER_PACKAGE
            )));
        }

        for f in 0..count {
            let position = f as f64 / count as f64;
            let (rank, kind) = match channel {
                0 | 1 => {
                    let value = reader.read_f32_le()? as f64;
                    if value == 0.0 {
                        continue;
                    }
                    if channel == 0 {
                        (EventRank::Signature, EventKind::MeasureFraction(value))
                    } else {
                        (EventRank::Tempo, EventKind::Bpm(value))
                    }
                }
                _ => {
                    let value = reader.read_u16_le()?;
                    let volpan = reader.read_u8()?;
                    let note_type = reader.read_u8()?;
                    if value == 0 {
                        continue;
                    }
                    (
                        EventRank::Object,
                        EventKind::Note(decode_note(value, volpan, note_type)),
                    )
                }
            };
            events.push(MeasureEvent {
                measure,
                position,
                rank,
                channel: channel as u32,
                kind,
            });
        }
    }

    sort_events(&mut events);
    Ok(events)
}

fn build(header: &OjnHeader, events: &[MeasureEvent<EventKind>]) -> ParseResult {
    let mut out = ParseResult {
        metadata: ChartMetadata {
            title: header.title.clone(),
            artist: header.artist.clone(),
            creator: header.noter.clone(),
            background: None,
            level: 0,
        },
        key_count: None,
        ..Default::default()
    };

    let mut clock = MeasureClock::new(START_TIME, header.bpm as f64);
    out.bpms.push(TimingInfo::bpm(START_TIME, clock.bpm()));
    let mut pairing = HoldPairing::new(LANES);
    let mut used_samples = BTreeSet::new();

    for event in events {
        let time = clock.advance(event.measure, event.position);
        match event.kind {
            EventKind::MeasureFraction(fraction) => clock.set_measure_fraction(fraction),
            EventKind::Bpm(bpm) => {
                if let Err(warning) = clock.set_bpm(bpm) {
                    out.warn(TAG, warning);
                }
                out.bpms.push(TimingInfo::bpm(time, clock.bpm()));
            }
            EventKind::Note(note) => {
                used_samples.insert(note.sample);
                if (2..9).contains(&event.channel) {
                    let lane = (event.channel - 2) as usize;
                    let info = NoteInfo {
                        start_time: time,
                        end_time: time,
                        lane,
                        note_type: NoteType::Tap,
                        keysound: Some(note.sample),
                        volume: note.volume,
                        pan: note.pan,
                    };
                    match note.marker {
                        Marker::Tap => pairing.tap(TAG, info, &mut out),
                        Marker::HoldStart => pairing.start(TAG, info, &mut out),
                        Marker::HoldEnd => {
                            pairing.end(TAG, lane, time, Some(note.sample), &mut out)
                        }
                    }
                } else {
                    out.auto_samples.push(AutoSample {
                        start_time: time,
                        sample: note.sample,
                        volume: note.volume,
                        pan: note.pan,
                    });
                }
            }
        }
    }

    pairing.finish(TAG, &mut out);
    out.audio_length = Some(clock.time() + 500.0);
    out.measures = clock.finish();
    out.samples = used_samples
        .into_iter()
        .map(|id| Sample {
            id,
            source: SampleSource::Container {
                file: header.ojm_file.clone(),
                entry: id,
            },
        })
        .collect();
    out
}

/// Reads the header only.
pub fn parse_header(data: &[u8]) -> Result<OjnHeader, ParseError> {
    let data = if data.starts_with(ENCRYPTED_SIGNATURE) {
        decrypt(data)?
    } else {
        data.to_vec()
    };
    OjnHeader::read(&mut ByteReader::new(&data))
}

/// Reads one difficulty of an OJN file.
pub fn parse(data: &[u8], difficulty: Difficulty) -> ParseOutcome {
    let data = if data.starts_with(ENCRYPTED_SIGNATURE) {
        log::debug!("OJN: decrypting scrambled file");
        decrypt(data)?
    } else {
        data.to_vec()
    };

    let mut reader = ByteReader::new(&data);
    let header = OjnHeader::read(&mut reader)?;
    debug_assert_eq!(reader.position(), HEADER_SIZE);

    let mut key_count = None;
    if header.encode_version == 5.0 {
        let declared = reader.read_i32_le()?;
        if (1..=7).contains(&declared) {
            key_count = Some(declared as usize);
        } else {
            log::warn!("OJN: ignoring declared key count {}", declared);
        }
    }

    let index = difficulty.index();
    let events = read_stream(&mut reader, &header, index)?;
    let mut out = build(&header, &events);
    out.key_count = key_count;
    out.metadata.level = header.level[index] as i32;

    if out.notes.is_empty() {
        out.warn(
            TAG,
            ParseWarning::SkippedLine(format!("difficulty {:?} has no notes", difficulty)),
        );
    }
    Ok(out)
}
