//! Chart format readers.
//!
//! Each reader turns a source buffer into a [`ParseResult`]: notes, tempo
//! and velocity points in absolute milliseconds, plus sample references.
//! [`ParseFormat`] picks the reader from a file extension or by sniffing
//! the first bytes, and [`load_chart`] runs the result through the
//! normalizer.

pub mod bms;
pub mod measure;
pub mod ojn;
pub mod osu;

use crate::models::chart::{AutoSample, Chart, ChartMetadata, NoteInfo, Sample, TimingInfo};
use crate::models::settings::SessionConfig;
use crate::normalize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal reader failure. No partial chart is returned.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed chart: {0}")]
    Malformed(String),
    #[error("unsupported chart: {0}")]
    Unsupported(String),
    #[error("failed to read chart: {0}")]
    Io(#[from] std::io::Error),
}

/// Recoverable oddity found while reading. Logged, never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseWarning {
    #[error("hold on lane {lane} opened at {time:.1}ms was never released")]
    UnreleasedHold { lane: usize, time: f64 },
    #[error("hold end on lane {lane} at {time:.1}ms has no open start")]
    DanglingHoldEnd { lane: usize, time: f64 },
    #[error("note on lane {lane} at {time:.1}ms overlaps an open note, kept as auto-sample")]
    OverlappingNote { lane: usize, time: f64 },
    #[error("hold on lane {lane} at {time:.1}ms has no length, kept as tap")]
    EmptyHold { lane: usize, time: f64 },
    #[error("unknown directive {0}")]
    UnknownDirective(String),
    #[error("skipped line: {0}")]
    SkippedLine(String),
    #[error("player mode {0} is not single play")]
    UnsupportedPlayer(u32),
    #[error("tempo {value} at {time:.1}ms clamped")]
    TempoClamped { time: f64, value: f64 },
}

pub type ParseOutcome = Result<ParseResult, ParseError>;

/// Format-independent reader output, before normalization.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub metadata: ChartMetadata,
    pub directory: PathBuf,
    /// Lane indices are raw (0..7) until the normalizer compacts them.
    pub notes: Vec<NoteInfo>,
    pub bpms: Vec<TimingInfo>,
    /// Velocity multipliers authored by the chart.
    pub svs: Vec<TimingInfo>,
    pub measures: Vec<f64>,
    pub samples: Vec<Sample>,
    pub auto_samples: Vec<AutoSample>,
    /// Set when the format declares it.
    pub key_count: Option<usize>,
    pub audio_length: Option<f64>,
    pub warnings: Vec<ParseWarning>,
}

impl ParseResult {
    /// Logs and records a warning.
    pub fn warn(&mut self, tag: &str, warning: ParseWarning) {
        log::warn!("{}: {}", tag, warning);
        self.warnings.push(warning);
    }

    /// Turns a colliding note into a fire-once auto-sample.
    pub fn demote_to_auto_sample(&mut self, tag: &str, note: &NoteInfo) {
        self.warn(
            tag,
            ParseWarning::OverlappingNote {
                lane: note.lane,
                time: note.start_time,
            },
        );
        if let Some(sample) = note.keysound {
            self.auto_samples.push(AutoSample {
                start_time: note.start_time,
                sample,
                volume: note.volume,
                pan: note.pan,
            });
        }
    }
}

/// The three supported chart formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFormat {
    /// O2Jam packed binary measures.
    Ojn,
    /// Be-Music Source text.
    Bms,
    /// osu!mania sectioned text.
    Osu,
}

impl ParseFormat {
    /// Picks a format from the file extension.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "ojn" => Some(ParseFormat::Ojn),
            "bms" | "bme" | "bml" => Some(ParseFormat::Bms),
            "osu" => Some(ParseFormat::Osu),
            _ => None,
        }
    }

    /// Guesses the format from the leading bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.len() >= 8 && &data[4..8] == ojn::SIGNATURE {
            return Some(ParseFormat::Ojn);
        }
        if data.starts_with(ojn::ENCRYPTED_SIGNATURE) {
            return Some(ParseFormat::Ojn);
        }

        let head = String::from_utf8_lossy(&data[..data.len().min(512)]);
        let head = head.trim_start_matches('\u{feff}').trim_start();
        if head.starts_with("osu file format") {
            return Some(ParseFormat::Osu);
        }
        if head.lines().any(|l| l.trim_start().starts_with('#')) {
            return Some(ParseFormat::Bms);
        }
        None
    }

    /// Extension first, then content sniffing.
    pub fn detect(path: &Path, data: &[u8]) -> Option<Self> {
        Self::from_extension(path).or_else(|| Self::sniff(data))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParseFormat::Ojn => "OJN",
            ParseFormat::Bms => "BMS",
            ParseFormat::Osu => "OSU",
        }
    }

    /// Runs the matching reader over an in-memory buffer.
    pub fn parse(&self, data: &[u8], directory: &Path, config: &SessionConfig) -> ParseOutcome {
        let mut result = match self {
            ParseFormat::Ojn => ojn::parse(data, config.ojn_difficulty)?,
            ParseFormat::Bms => bms::parse(&String::from_utf8_lossy(data))?,
            ParseFormat::Osu => osu::parse(&String::from_utf8_lossy(data))?,
        };
        result.directory = directory.to_path_buf();
        Ok(result)
    }
}

fn parse_file(
    path: &Path,
    data: &[u8],
    format: ParseFormat,
    config: &SessionConfig,
) -> Result<Chart, ParseError> {
    let directory = path.parent().unwrap_or_else(|| Path::new(""));
    let parsed = format.parse(data, directory, config)?;
    log::info!(
        "{}: read {} notes, {} tempo points from {}",
        format.name(),
        parsed.notes.len(),
        parsed.bpms.len(),
        path.display()
    );
    Ok(normalize::normalize(parsed, config))
}

fn read_with(path: &Path, format: ParseFormat, config: &SessionConfig) -> Result<Chart, ParseError> {
    let data = fs::read(path)?;
    parse_file(path, &data, format, config)
}

/// Loads any supported chart.
pub fn load_chart(path: &Path, config: &SessionConfig) -> Result<Chart, ParseError> {
    let data = fs::read(path)?;
    let format = ParseFormat::detect(path, &data)
        .ok_or_else(|| ParseError::Unsupported(format!("unknown chart type: {}", path.display())))?;
    parse_file(path, &data, format, config)
}

pub fn load_bms(path: &Path, config: &SessionConfig) -> Result<Chart, ParseError> {
    read_with(path, ParseFormat::Bms, config)
}

pub fn load_ojn(path: &Path, config: &SessionConfig) -> Result<Chart, ParseError> {
    read_with(path, ParseFormat::Ojn, config)
}

pub fn load_osu(path: &Path, config: &SessionConfig) -> Result<Chart, ParseError> {
    read_with(path, ParseFormat::Osu, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_detection() {
        assert_eq!(
            ParseFormat::from_extension(Path::new("song/o2ma100.OJN")),
            Some(ParseFormat::Ojn)
        );
        assert_eq!(
            ParseFormat::from_extension(Path::new("a.bme")),
            Some(ParseFormat::Bms)
        );
        assert_eq!(ParseFormat::from_extension(Path::new("a.txt")), None);
    }

    #[test]
    fn test_sniffing() {
        assert_eq!(
            ParseFormat::sniff(b"osu file format v14\n\n[General]"),
            Some(ParseFormat::Osu)
        );
        assert_eq!(
            ParseFormat::sniff(b"\n*---HEADER\n#TITLE x\n"),
            Some(ParseFormat::Bms)
        );
        assert_eq!(
            ParseFormat::sniff(b"\x01\x00\x00\x00ojn\x00rest"),
            Some(ParseFormat::Ojn)
        );
        assert_eq!(ParseFormat::sniff(b"hello"), None);
    }

    #[test]
    fn test_unknown_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "nothing to see").unwrap();
        let err = load_chart(&path, &SessionConfig::default()).unwrap_err();
        assert!(matches!(err, ParseError::Unsupported(_)));
    }
}
