use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const WPM_RANGE: RangeInclusive<i64> = 10..=300;
pub const JITTER_RANGE: RangeInclusive<i64> = 5..=45;
pub const PERCENT_RANGE: RangeInclusive<i64> = 0..=100;
pub const LONG_PAUSE_MIN_RANGE: RangeInclusive<i64> = 50..=20_000;
pub const LONG_PAUSE_MAX_RANGE: RangeInclusive<i64> = 50..=30_000;
pub const MISTAKE_CHARS_RANGE: RangeInclusive<i64> = 1..=6;
pub const CONCURRENT_MISTAKES_RANGE: RangeInclusive<i64> = 1..=6;
pub const HOLD_MIN_RANGE: RangeInclusive<i64> = 2..=1000;
pub const HOLD_MAX_RANGE: RangeInclusive<i64> = 2..=2000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown config key `{0}`")]
    UnknownKey(String),
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
    #[error("expected key=value, got `{0}`")]
    MissingValue(String),
    #[error("unknown preset `{0}` (expected human-slow, human-fast or bot-flat)")]
    UnknownPreset(String),
}

/// What happens to CR/LF characters outside code mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewlineMode {
    /// Pass CR and LF through unchanged.
    Keep,
    /// Replace each CR or LF with one space.
    #[default]
    Space,
    /// Drop every CR and LF.
    Remove,
}

impl FromStr for NewlineMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "keep" => Ok(NewlineMode::Keep),
            "1" | "space" => Ok(NewlineMode::Space),
            "2" | "remove" => Ok(NewlineMode::Remove),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LongPause {
    pub enabled: bool,
    /// Chance (percent) of a long pause before each space.
    pub percent: u32,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for LongPause {
    fn default() -> Self {
        Self {
            enabled: true,
            percent: 5,
            min_ms: 600,
            max_ms: 1200,
        }
    }
}

/// Playback configuration.
///
/// The host keeps one of these as the pending configuration; every session
/// captures its own copy by value at start, so updates pushed while a session
/// runs only take effect for the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingConfig {
    pub wpm: u32,
    /// Disable the randomized extra pauses and mistakes; keep drift-corrected pacing.
    pub strict_pace: bool,
    pub jitter_percent: u32,
    pub mistake_chance_percent: u32,
    pub typos_enabled: bool,
    pub max_mistake_chars: usize,
    pub max_concurrent_mistakes: usize,
    pub hold_min_ms: u64,
    pub hold_max_ms: u64,
    pub long_pause: LongPause,
    /// 1-in-N chance of a thinking pause after a space; 0 disables.
    pub thinking_space_chance: u32,
    pub newline_mode: NewlineMode,
    pub code_mode: bool,
    pub punctuation_pause: bool,
    pub logging_enabled: bool,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            wpm: 100,
            strict_pace: false,
            jitter_percent: 12,
            mistake_chance_percent: 3,
            typos_enabled: true,
            max_mistake_chars: 1,
            max_concurrent_mistakes: 1,
            hold_min_ms: 18,
            hold_max_ms: 100,
            long_pause: LongPause::default(),
            thinking_space_chance: 0,
            newline_mode: NewlineMode::Space,
            code_mode: false,
            punctuation_pause: true,
            logging_enabled: false,
        }
    }
}

fn clamp(value: i64, range: &RangeInclusive<i64>) -> i64 {
    value.clamp(*range.start(), *range.end())
}

fn clamp_unsigned(value: u64, range: &RangeInclusive<i64>) -> u64 {
    clamp(i64::try_from(value).unwrap_or(i64::MAX), range) as u64
}

impl TypingConfig {
    /// Clamp every field into its range and swap inverted min/max pairs.
    pub fn normalized(mut self) -> Self {
        self.wpm = clamp_unsigned(self.wpm.into(), &WPM_RANGE) as u32;
        self.jitter_percent = clamp_unsigned(self.jitter_percent.into(), &JITTER_RANGE) as u32;
        self.mistake_chance_percent =
            clamp_unsigned(self.mistake_chance_percent.into(), &PERCENT_RANGE) as u32;
        self.thinking_space_chance =
            clamp_unsigned(self.thinking_space_chance.into(), &PERCENT_RANGE) as u32;
        self.max_mistake_chars =
            clamp_unsigned(self.max_mistake_chars as u64, &MISTAKE_CHARS_RANGE) as usize;
        self.max_concurrent_mistakes =
            clamp_unsigned(self.max_concurrent_mistakes as u64, &CONCURRENT_MISTAKES_RANGE) as usize;
        self.hold_min_ms = clamp_unsigned(self.hold_min_ms, &HOLD_MIN_RANGE);
        self.hold_max_ms = clamp_unsigned(self.hold_max_ms, &HOLD_MAX_RANGE);
        self.long_pause.percent =
            clamp_unsigned(self.long_pause.percent.into(), &PERCENT_RANGE) as u32;
        self.long_pause.min_ms = clamp_unsigned(self.long_pause.min_ms, &LONG_PAUSE_MIN_RANGE);
        self.long_pause.max_ms = clamp_unsigned(self.long_pause.max_ms, &LONG_PAUSE_MAX_RANGE);
        self.repair_ranges();
        self
    }

    fn repair_ranges(&mut self) {
        if self.hold_min_ms > self.hold_max_ms {
            std::mem::swap(&mut self.hold_min_ms, &mut self.hold_max_ms);
        }
        if self.long_pause.min_ms > self.long_pause.max_ms {
            std::mem::swap(&mut self.long_pause.min_ms, &mut self.long_pause.max_ms);
        }
    }
}

/// A partial configuration push. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub wpm: Option<i64>,
    pub strict_pace: Option<bool>,
    pub jitter_percent: Option<i64>,
    pub thinking_space_chance: Option<i64>,
    pub typos_enabled: Option<bool>,
    pub long_pause_enabled: Option<bool>,
    pub long_pause_percent: Option<i64>,
    pub long_pause_min_ms: Option<i64>,
    pub long_pause_max_ms: Option<i64>,
    pub newline_mode: Option<NewlineMode>,
    pub code_mode: Option<bool>,
    pub max_mistake_chars: Option<i64>,
    pub mistake_chance_percent: Option<i64>,
    pub hold_min_ms: Option<i64>,
    pub hold_max_ms: Option<i64>,
    pub max_concurrent_mistakes: Option<i64>,
    pub punctuation_pause: Option<bool>,
    pub logging_enabled: Option<bool>,
}

fn parse_int(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" => Ok(true),
        "false" | "off" | "no" => Ok(false),
        other => other
            .parse::<i64>()
            .map(|n| n != 0)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            }),
    }
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parse `key=value` pairs separated by `&` or whitespace, e.g.
    /// `wpm=120&strict=1` or `nl=keep codemode=on`.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let mut update = Self::default();
        for pair in input
            .split(|c: char| c == '&' || c.is_whitespace())
            .filter(|p| !p.is_empty())
        {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ConfigError::MissingValue(pair.to_string()))?;
            update.set(key, value)?;
        }
        Ok(update)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "wpm" => self.wpm = Some(parse_int(key, value)?),
            "strict" => self.strict_pace = Some(parse_flag(key, value)?),
            "jitter" => self.jitter_percent = Some(parse_int(key, value)?),
            "think" => self.thinking_space_chance = Some(parse_int(key, value)?),
            "typos" => self.typos_enabled = Some(parse_flag(key, value)?),
            "lpen" => self.long_pause_enabled = Some(parse_flag(key, value)?),
            "lpc" => self.long_pause_percent = Some(parse_int(key, value)?),
            "lpmin" => self.long_pause_min_ms = Some(parse_int(key, value)?),
            "lpmax" => self.long_pause_max_ms = Some(parse_int(key, value)?),
            "nl" => {
                let mode = value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
                self.newline_mode = Some(mode);
            }
            "codemode" => self.code_mode = Some(parse_flag(key, value)?),
            "typoMax" => self.max_mistake_chars = Some(parse_int(key, value)?),
            "mistake" => self.mistake_chance_percent = Some(parse_int(key, value)?),
            "holdMin" => self.hold_min_ms = Some(parse_int(key, value)?),
            "holdMax" => self.hold_max_ms = Some(parse_int(key, value)?),
            "maxErrors" => self.max_concurrent_mistakes = Some(parse_int(key, value)?),
            "punct" => self.punctuation_pause = Some(parse_flag(key, value)?),
            "log" => self.logging_enabled = Some(parse_flag(key, value)?),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Clamp, repair and apply in one step. Returns whether anything changed.
    pub fn apply_to(&self, config: &mut TypingConfig) -> bool {
        let mut next = config.clone();

        if let Some(v) = self.wpm {
            next.wpm = clamp(v, &WPM_RANGE) as u32;
        }
        if let Some(v) = self.strict_pace {
            next.strict_pace = v;
        }
        if let Some(v) = self.jitter_percent {
            next.jitter_percent = clamp(v, &JITTER_RANGE) as u32;
        }
        if let Some(v) = self.thinking_space_chance {
            next.thinking_space_chance = clamp(v, &PERCENT_RANGE) as u32;
        }
        if let Some(v) = self.typos_enabled {
            next.typos_enabled = v;
        }
        if let Some(v) = self.long_pause_enabled {
            next.long_pause.enabled = v;
        }
        if let Some(v) = self.long_pause_percent {
            next.long_pause.percent = clamp(v, &PERCENT_RANGE) as u32;
        }
        if let Some(v) = self.long_pause_min_ms {
            next.long_pause.min_ms = clamp(v, &LONG_PAUSE_MIN_RANGE) as u64;
        }
        if let Some(v) = self.long_pause_max_ms {
            next.long_pause.max_ms = clamp(v, &LONG_PAUSE_MAX_RANGE) as u64;
        }
        if let Some(v) = self.newline_mode {
            next.newline_mode = v;
        }
        if let Some(v) = self.code_mode {
            next.code_mode = v;
        }
        if let Some(v) = self.max_mistake_chars {
            next.max_mistake_chars = clamp(v, &MISTAKE_CHARS_RANGE) as usize;
        }
        if let Some(v) = self.mistake_chance_percent {
            next.mistake_chance_percent = clamp(v, &PERCENT_RANGE) as u32;
        }
        if let Some(v) = self.hold_min_ms {
            next.hold_min_ms = clamp(v, &HOLD_MIN_RANGE) as u64;
        }
        if let Some(v) = self.hold_max_ms {
            next.hold_max_ms = clamp(v, &HOLD_MAX_RANGE) as u64;
        }
        if let Some(v) = self.max_concurrent_mistakes {
            next.max_concurrent_mistakes = clamp(v, &CONCURRENT_MISTAKES_RANGE) as usize;
        }
        if let Some(v) = self.punctuation_pause {
            next.punctuation_pause = v;
        }
        if let Some(v) = self.logging_enabled {
            next.logging_enabled = v;
        }
        next.repair_ranges();

        let changed = next != *config;
        *config = next;
        changed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    HumanSlow,
    HumanFast,
    /// Flat, mistake-free pacing. Useful for producing detectable signatures.
    BotFlat,
}

impl Preset {
    pub fn update(self) -> ConfigUpdate {
        let (wpm, jitter, mistake, typos) = match self {
            Preset::HumanSlow => (70, 18, 6, true),
            Preset::HumanFast => (120, 10, 2, true),
            Preset::BotFlat => (110, 2, 0, false),
        };
        ConfigUpdate {
            wpm: Some(wpm),
            jitter_percent: Some(jitter),
            max_mistake_chars: Some(1),
            mistake_chance_percent: Some(mistake),
            typos_enabled: Some(typos),
            ..Default::default()
        }
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "human-slow" | "slow" | "1" => Ok(Preset::HumanSlow),
            "human-fast" | "fast" | "2" => Ok(Preset::HumanFast),
            "bot-flat" | "bot" | "flat" | "3" => Ok(Preset::BotFlat),
            _ => Err(ConfigError::UnknownPreset(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_style_keys() {
        let update = ConfigUpdate::parse("wpm=120&strict=1&nl=keep codemode=on typoMax=3").unwrap();
        assert_eq!(update.wpm, Some(120));
        assert_eq!(update.strict_pace, Some(true));
        assert_eq!(update.newline_mode, Some(NewlineMode::Keep));
        assert_eq!(update.code_mode, Some(true));
        assert_eq!(update.max_mistake_chars, Some(3));
    }

    #[test]
    fn rejects_malformed_pairs() {
        assert_eq!(
            ConfigUpdate::parse("wpm"),
            Err(ConfigError::MissingValue("wpm".to_string()))
        );
        assert_eq!(
            ConfigUpdate::parse("speed=3"),
            Err(ConfigError::UnknownKey("speed".to_string()))
        );
        assert!(matches!(
            ConfigUpdate::parse("wpm=fast"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            ConfigUpdate::parse("nl=7"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn clamps_out_of_range_values() {
        let mut cfg = TypingConfig::default();
        let update = ConfigUpdate::parse("wpm=600 jitter=1 typoMax=9 mistake=-4").unwrap();
        assert!(update.apply_to(&mut cfg));
        assert_eq!(cfg.wpm, 300);
        assert_eq!(cfg.jitter_percent, 5);
        assert_eq!(cfg.max_mistake_chars, 6);
        assert_eq!(cfg.mistake_chance_percent, 0);
    }

    #[test]
    fn swaps_inverted_ranges_on_apply() {
        let mut cfg = TypingConfig::default();
        ConfigUpdate::parse("holdMin=90 holdMax=30 lpmin=2000 lpmax=700")
            .unwrap()
            .apply_to(&mut cfg);
        assert_eq!((cfg.hold_min_ms, cfg.hold_max_ms), (30, 90));
        assert_eq!((cfg.long_pause.min_ms, cfg.long_pause.max_ms), (700, 2000));
    }

    #[test]
    fn reports_no_change_for_identical_values() {
        let mut cfg = TypingConfig::default();
        let update = ConfigUpdate::parse("wpm=100 typos=1").unwrap();
        assert!(!update.apply_to(&mut cfg));
    }

    #[test]
    fn normalizes_loaded_config() {
        let cfg: TypingConfig =
            serde_json::from_str(r#"{"wpm": 5000, "hold_min_ms": 500, "hold_max_ms": 20}"#).unwrap();
        let cfg = cfg.normalized();
        assert_eq!(cfg.wpm, 300);
        assert_eq!((cfg.hold_min_ms, cfg.hold_max_ms), (20, 500));
        assert_eq!(cfg.jitter_percent, 12);
    }

    #[test]
    fn bot_flat_preset_clamps_jitter_and_disables_typos() {
        let mut cfg = TypingConfig::default();
        "bot-flat".parse::<Preset>().unwrap().update().apply_to(&mut cfg);
        assert_eq!(cfg.wpm, 110);
        assert_eq!(cfg.jitter_percent, 5);
        assert!(!cfg.typos_enabled);
        assert_eq!(cfg.mistake_chance_percent, 0);
    }
}
