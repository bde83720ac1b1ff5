use crate::game::geometry::{HOLD_CAP_PX, JUDGE_LINE_Y};
use crate::game::history::DEFAULT_HISTORY_SIZE;
use crate::game::playfield::Playfield;
use crate::game::sync::{
    DEFAULT_LEAD_OFFSET_MS, DEFAULT_RESYNC_COOLDOWN_MS, DEFAULT_RESYNC_THRESHOLD_S, DEFAULT_START_DELAY_MS,
    LeadOffset, SyncConfig,
};
use crate::game::timing::GridSnapper;
use ini::Ini;
use log::{info, warn};
use std::path::Path;
use std::str::FromStr;

pub const CONFIG_PATH: &str = "notefall.ini";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    // [Sync]
    pub lead_offset_ms: f64,
    pub start_delay_ms: f64,
    pub resync_threshold_s: f64,
    pub resync_cooldown_ms: f64,
    pub playback_rate: f64,
    // [Editor]
    pub bpm: Option<f64>,
    pub grid_division: f64,
    pub hold_duration_ms: Option<f64>,
    pub history_size: usize,
    // [Display]
    pub speed: f64,
    pub judge_line_y: f32,
    pub hold_cap_px: f32,
    // [Options]
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lead_offset_ms: DEFAULT_LEAD_OFFSET_MS,
            start_delay_ms: DEFAULT_START_DELAY_MS,
            resync_threshold_s: DEFAULT_RESYNC_THRESHOLD_S,
            resync_cooldown_ms: DEFAULT_RESYNC_COOLDOWN_MS,
            playback_rate: 1.0,
            bpm: Some(120.0),
            grid_division: 4.0,
            hold_duration_ms: None,
            history_size: DEFAULT_HISTORY_SIZE,
            speed: 1.0,
            judge_line_y: JUDGE_LINE_Y,
            hold_cap_px: HOLD_CAP_PX,
            log_level: LogLevel::Info,
        }
    }
}

#[inline(always)]
fn get<T: FromStr>(conf: &Ini, section: &str, key: &str) -> Option<T> {
    conf.get_from(Some(section), key).and_then(|v| v.trim().parse::<T>().ok())
}

/// Finite and strictly positive.
#[inline(always)]
fn positive(v: f64) -> Option<f64> {
    (v.is_finite() && v > 0.0).then_some(v)
}

impl Config {
    /// Reads every known key, falling back to the default for anything
    /// missing or malformed.
    pub fn from_ini(conf: &Ini) -> Self {
        let default = Self::default();
        Self {
            lead_offset_ms: get::<f64>(conf, "Sync", "LeadOffsetMs")
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(default.lead_offset_ms),
            start_delay_ms: get::<f64>(conf, "Sync", "StartDelayMs")
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(default.start_delay_ms),
            resync_threshold_s: get::<f64>(conf, "Sync", "ResyncThresholdSeconds")
                .and_then(positive)
                .unwrap_or(default.resync_threshold_s),
            resync_cooldown_ms: get::<f64>(conf, "Sync", "ResyncCooldownMs")
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(default.resync_cooldown_ms),
            playback_rate: get::<f64>(conf, "Sync", "PlaybackRate")
                .and_then(positive)
                .unwrap_or(default.playback_rate),
            // Bpm=0 turns snapping off.
            bpm: match get::<f64>(conf, "Editor", "Bpm") {
                Some(v) => positive(v),
                None => default.bpm,
            },
            grid_division: get::<f64>(conf, "Editor", "GridDivision")
                .and_then(positive)
                .unwrap_or(default.grid_division),
            hold_duration_ms: get::<f64>(conf, "Editor", "HoldDurationMs")
                .and_then(positive)
                .or(default.hold_duration_ms),
            history_size: get::<usize>(conf, "Editor", "HistorySize")
                .filter(|v| *v > 0)
                .unwrap_or(default.history_size),
            speed: get::<f64>(conf, "Display", "Speed")
                .and_then(positive)
                .unwrap_or(default.speed),
            judge_line_y: get::<f32>(conf, "Display", "JudgeLineY")
                .filter(|v| v.is_finite() && *v > 0.0)
                .unwrap_or(default.judge_line_y),
            hold_cap_px: get::<f32>(conf, "Display", "HoldCapPx")
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(default.hold_cap_px),
            log_level: get::<LogLevel>(conf, "Options", "LogLevel").unwrap_or(default.log_level),
        }
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let conf = Ini::load_from_str(content).map_err(|e| format!("invalid config: {e}"))?;
        Ok(Self::from_ini(&conf))
    }

    pub fn to_ini(&self) -> Ini {
        let mut conf = Ini::new();
        conf.with_section(Some("Sync"))
            .set("LeadOffsetMs", self.lead_offset_ms.to_string())
            .set("StartDelayMs", self.start_delay_ms.to_string())
            .set("ResyncThresholdSeconds", self.resync_threshold_s.to_string())
            .set("ResyncCooldownMs", self.resync_cooldown_ms.to_string())
            .set("PlaybackRate", self.playback_rate.to_string());
        conf.with_section(Some("Editor"))
            .set("Bpm", self.bpm.unwrap_or(0.0).to_string())
            .set("GridDivision", self.grid_division.to_string())
            .set("HoldDurationMs", self.hold_duration_ms.unwrap_or(0.0).to_string())
            .set("HistorySize", self.history_size.to_string());
        conf.with_section(Some("Display"))
            .set("Speed", self.speed.to_string())
            .set("JudgeLineY", self.judge_line_y.to_string())
            .set("HoldCapPx", self.hold_cap_px.to_string());
        conf.with_section(Some("Options"))
            .set("LogLevel", self.log_level.as_str());
        conf
    }

    /// Loads `path`, writing a default file first when it does not exist.
    /// Unreadable files fall back to defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("'{}' not found, creating with default values.", path.display());
            if let Err(e) = Self::default().to_ini().write_to_file(path) {
                warn!("Failed to create default config file: {e}");
            }
        }
        match Ini::load_from_file(path) {
            Ok(conf) => {
                let cfg = Self::from_ini(&conf);
                info!("Configuration loaded from '{}'.", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load '{}': {e}. Using default values.", path.display());
                Self::default()
            }
        }
    }

    pub fn sync_config(&self, start_time_ms: f64) -> SyncConfig {
        SyncConfig {
            lead: LeadOffset::from_ms(self.lead_offset_ms),
            start_delay_ms: self.start_delay_ms,
            start_time_ms: 0.0,
            playback_rate: self.playback_rate,
            resync_threshold_s: self.resync_threshold_s,
            resync_cooldown_ms: self.resync_cooldown_ms,
        }
        .with_start_time(start_time_ms)
    }

    pub fn grid_snapper(&self) -> GridSnapper {
        match self.bpm {
            Some(bpm) => GridSnapper::from_bpm(bpm, self.grid_division),
            None => GridSnapper::new(None, self.grid_division),
        }
    }

    pub fn playfield(&self) -> Playfield {
        Playfield::new(self.speed, self.judge_line_y, self.hold_cap_px)
    }
}
