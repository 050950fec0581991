//! Metronome configuration loaded from ~/.tempomap/metronome.yaml.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, CurveError};
use crate::metronome::{ClickVoice, MetronomeSettings, SchedulerTiming, SettingsUpdate};
use crate::tempo::{TempoCurve, TempoRange, DEFAULT_TEMPO};

/// A tempo point as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSpec {
    pub bar: f64,
    pub bpm: f64,
}

/// Metronome configuration loaded from YAML. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub numerator: u32,
    pub denominator: u32,
    pub volume: f32,
    pub accent_level: f32,
    pub wake_interval_ms: u64,
    pub schedule_ahead_ms: u64,
    pub tempo_min: f64,
    pub tempo_max: f64,
    pub downbeat_hz: f64,
    pub beat_hz: f64,
    pub sample_rate: u32,
    pub points: Vec<PointSpec>,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        let range = TempoRange::default();
        let voice = ClickVoice::default();
        let settings = MetronomeSettings::default();
        let timing = SchedulerTiming::default();
        Self {
            numerator: settings.numerator,
            denominator: settings.denominator,
            volume: settings.volume,
            accent_level: settings.accent_level,
            wake_interval_ms: timing.wake_interval.as_millis() as u64,
            schedule_ahead_ms: timing.schedule_ahead.as_millis() as u64,
            tempo_min: range.min(),
            tempo_max: range.max(),
            downbeat_hz: voice.downbeat_hz,
            beat_hz: voice.beat_hz,
            sample_rate: 48_000,
            points: vec![PointSpec {
                bar: 0.0,
                bpm: DEFAULT_TEMPO,
            }],
        }
    }
}

impl MetronomeConfig {
    /// Standard config path (~/.tempomap/metronome.yaml).
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::home_dir()?.join(".tempomap").join("metronome.yaml"))
    }

    /// Load config from the standard path.
    /// Returns None if the file doesn't exist or doesn't parse.
    pub fn load() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            return None;
        }
        match Self::load_from(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring config file");
                None
            }
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Write the config, creating parent directories as needed.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml).map_err(io_err)
    }

    pub fn timing(&self) -> SchedulerTiming {
        SchedulerTiming {
            wake_interval: Duration::from_millis(self.wake_interval_ms.max(1)),
            schedule_ahead: Duration::from_millis(self.schedule_ahead_ms),
        }
    }

    pub fn range(&self) -> Result<TempoRange, CurveError> {
        TempoRange::new(self.tempo_min, self.tempo_max).ok_or(CurveError::InvalidRange {
            min: self.tempo_min,
            max: self.tempo_max,
        })
    }

    pub fn voice(&self) -> ClickVoice {
        ClickVoice {
            downbeat_hz: self.downbeat_hz,
            beat_hz: self.beat_hz,
            ..ClickVoice::default()
        }
    }

    /// The configured curve. No points means a constant default tempo.
    pub fn curve(&self) -> Result<TempoCurve, CurveError> {
        let range = self.range()?;
        if self.points.is_empty() {
            return Ok(TempoCurve::new(DEFAULT_TEMPO, range));
        }
        TempoCurve::from_points(self.points.iter().map(|p| (p.bar, p.bpm)), range)
    }

    pub fn settings(&self) -> Result<MetronomeSettings, CurveError> {
        let mut settings = MetronomeSettings::default();
        settings.apply(
            SettingsUpdate::default()
                .with_curve(Arc::new(self.curve()?))
                .with_volume(self.volume)
                .with_accent_level(self.accent_level)
                .with_time_signature(self.numerator, self.denominator),
        );
        Ok(settings)
    }
}
