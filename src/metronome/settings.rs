//! Live-mutable metronome settings and scheduler timing constants.

use std::sync::Arc;
use std::time::Duration;

use crate::tempo::{TempoCurve, BEATS_PER_BAR};

/// Largest accepted time signature denominator.
pub const MAX_DENOMINATOR: u32 = 64;

/// Settings read by every scheduling pass.
#[derive(Debug, Clone)]
pub struct MetronomeSettings {
    pub curve: Arc<TempoCurve>,
    /// Clicks per measure.
    pub numerator: u32,
    /// Note value of one click (4 = quarter, 8 = eighth).
    pub denominator: u32,
    /// Master click volume, 0.0..=1.0.
    pub volume: f32,
    /// Gain of non-downbeat clicks relative to the downbeat, 0.0..=1.0.
    pub accent_level: f32,
}

impl MetronomeSettings {
    /// Grid step in beats: `4 / denominator`.
    pub fn grid_step(&self) -> f64 {
        BEATS_PER_BAR / self.denominator as f64
    }

    /// Gain of a click at `measure_position`.
    pub fn gain_for(&self, measure_position: u32) -> f32 {
        let accent = if measure_position == 0 {
            1.0
        } else {
            self.accent_level
        };
        self.volume * accent
    }

    pub fn set_numerator(&mut self, numerator: u32) {
        if numerator == 0 {
            tracing::warn!("ignoring numerator 0");
        } else {
            self.numerator = numerator;
        }
    }

    pub fn set_denominator(&mut self, denominator: u32) {
        if denominator == 0 || denominator > MAX_DENOMINATOR {
            tracing::warn!(denominator, "ignoring out-of-range denominator");
        } else {
            self.denominator = denominator;
        }
    }

    /// Reset a zero numerator or out-of-range denominator to the default.
    pub fn sanitize_signature(&mut self) {
        let defaults = Self::default();
        if self.numerator == 0 {
            tracing::warn!(
                numerator = defaults.numerator,
                "numerator 0 is invalid, using default"
            );
            self.numerator = defaults.numerator;
        }
        if self.denominator == 0 || self.denominator > MAX_DENOMINATOR {
            tracing::warn!(
                denominator = self.denominator,
                "denominator out of range, using default"
            );
            self.denominator = defaults.denominator;
        }
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(volume) = update.volume {
            self.volume = clamp_unit(volume, self.volume);
        }
        if let Some(accent) = update.accent_level {
            self.accent_level = clamp_unit(accent, self.accent_level);
        }
        if let Some(curve) = update.curve {
            self.curve = curve;
        }
        if let Some(numerator) = update.numerator {
            self.set_numerator(numerator);
        }
        if let Some(denominator) = update.denominator {
            self.set_denominator(denominator);
        }
    }
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            curve: Arc::new(TempoCurve::default()),
            numerator: 4,
            denominator: 4,
            volume: 0.5,
            accent_level: 0.8,
        }
    }
}

fn clamp_unit(value: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Partial settings update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub volume: Option<f32>,
    pub accent_level: Option<f32>,
    pub curve: Option<Arc<TempoCurve>>,
    pub numerator: Option<u32>,
    pub denominator: Option<u32>,
}

impl SettingsUpdate {
    pub fn with_curve(mut self, curve: Arc<TempoCurve>) -> Self {
        self.curve = Some(curve);
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_accent_level(mut self, accent_level: f32) -> Self {
        self.accent_level = Some(accent_level);
        self
    }

    pub fn with_time_signature(mut self, numerator: u32, denominator: u32) -> Self {
        self.numerator = Some(numerator);
        self.denominator = Some(denominator);
        self
    }
}

/// Wake cadence and look-ahead window of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerTiming {
    /// How often the scheduling loop wakes.
    pub wake_interval: Duration,
    /// How far ahead of the hardware clock triggers are emitted.
    pub schedule_ahead: Duration,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            wake_interval: Duration::from_millis(25),
            schedule_ahead: Duration::from_millis(100),
        }
    }
}
