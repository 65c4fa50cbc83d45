//! Session configuration.
//!
//! Everything that changes how a chart is loaded or played (mods, rate,
//! judge mode, audio offset) lives in [`SessionConfig`] and is threaded
//! explicitly through loading and the engine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const MIN_RATE: f64 = 0.05;
pub const MAX_RATE: f64 = 2.0;

/// Which judge policy the engine builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JudgeMode {
    /// Windows in 1/192 measure ticks, scaled by the note's tempo.
    #[default]
    Beat,
    /// Fixed millisecond windows.
    Millisecond,
}

/// OJN difficulty slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Normal,
    #[default]
    Hard,
}

impl Difficulty {
    pub fn index(&self) -> usize {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Normal => 1,
            Difficulty::Hard => 2,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Playback rate, clamped to `MIN_RATE..=MAX_RATE`.
    pub rate: f64,
    pub mirror: bool,
    pub random: bool,
    /// Explicit lane permutation, `rearrange[lane] = new_lane`.
    pub rearrange: Option<Vec<usize>>,
    /// Seed for the random mod. `None` uses the thread RNG.
    pub random_seed: Option<u64>,
    /// Ignore velocity changes and scroll linearly.
    pub no_sv: bool,
    pub judge_mode: JudgeMode,
    /// Fire note keysounds on time instead of on key press.
    pub auto_sound: bool,
    pub audio_offset_ms: f64,
    /// 0.0 to 1.0, applied on top of per-sample volume.
    pub volume: f32,
    pub pitch_preserve: bool,
    pub autoplay: bool,
    /// Scroll speed setting, 10 = 1.0x.
    pub scroll_speed: f64,
    /// Pre-roll before the chart's zero reference.
    pub lead_in_ms: f64,
    pub ojn_difficulty: Difficulty,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rate: 1.0,
            mirror: false,
            random: false,
            rearrange: None,
            random_seed: None,
            no_sv: false,
            judge_mode: JudgeMode::Beat,
            auto_sound: false,
            audio_offset_ms: 0.0,
            volume: 1.0,
            pitch_preserve: false,
            autoplay: false,
            scroll_speed: 10.0,
            lead_in_ms: 3000.0,
            ojn_difficulty: Difficulty::Hard,
        }
    }
}

impl SessionConfig {
    /// Parses a TOML document, filling missing keys with defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = toml::from_str(text)?;
        Ok(config.sanitized())
    }

    /// Loads the config at `path`, or the defaults if the file is absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("CONFIG: {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Clamps out-of-range values.
    pub fn sanitized(mut self) -> Self {
        if !(MIN_RATE..=MAX_RATE).contains(&self.rate) {
            log::warn!("CONFIG: rate {} out of range, clamping", self.rate);
            self.rate = self.rate.clamp(MIN_RATE, MAX_RATE);
        }
        self.volume = self.volume.clamp(0.0, 1.0);
        if self.scroll_speed <= 0.0 {
            self.scroll_speed = 10.0;
        }
        self.lead_in_ms = self.lead_in_ms.max(0.0);
        self
    }

    /// True when note keysounds should be scheduled like auto-samples.
    pub fn keysounds_are_automatic(&self) -> bool {
        self.auto_sound || self.audio_offset_ms != 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = SessionConfig::from_toml_str("mirror = true\nrate = 1.5\n").unwrap();
        assert!(config.mirror);
        assert_eq!(config.rate, 1.5);
        assert_eq!(config.judge_mode, JudgeMode::Beat);
        assert_eq!(config.lead_in_ms, 3000.0);
    }

    #[test]
    fn test_rate_is_clamped() {
        let config = SessionConfig::from_toml_str("rate = 5.0").unwrap();
        assert_eq!(config.rate, MAX_RATE);
    }

    #[test]
    fn test_enum_fields() {
        let text = "judge_mode = \"Millisecond\"\nojn_difficulty = \"Easy\"\n";
        let config = SessionConfig::from_toml_str(text).unwrap();
        assert_eq!(config.judge_mode, JudgeMode::Millisecond);
        assert_eq!(config.ojn_difficulty.index(), 0);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = SessionConfig {
            random: true,
            random_seed: Some(7),
            ..SessionConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(SessionConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, SessionConfig::default());
    }
}
