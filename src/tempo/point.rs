//! Tempo control points and the tempo range they are clamped into.

use serde::{Deserialize, Serialize};

/// Quarter notes per bar for mapping purposes, independent of the
/// time signature used for accenting.
pub const BEATS_PER_BAR: f64 = 4.0;

/// Fallback tempo for empty or corrupted curves.
pub const DEFAULT_TEMPO: f64 = 120.0;

/// Opaque identifier of a point within a [`TempoCurve`](super::TempoCurve).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointId(pub u64);

impl PointId {
    /// The anchor point at position 0. Always present.
    pub const ANCHOR: PointId = PointId(0);

    pub fn is_anchor(self) -> bool {
        self == Self::ANCHOR
    }
}

impl std::fmt::Display for PointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pt-{}", self.0)
    }
}

/// A tempo pinned to a musical position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoPoint {
    pub id: PointId,
    /// Position in bars.
    pub position: f64,
    /// Tempo in quarter notes per minute.
    pub tempo: f64,
}

impl TempoPoint {
    pub fn new(id: PointId, position: f64, tempo: f64) -> Self {
        Self {
            id,
            position,
            tempo,
        }
    }

    /// Position in beats (quarter notes).
    #[inline]
    pub fn beat(&self) -> f64 {
        self.position * BEATS_PER_BAR
    }
}

/// Inclusive tempo bounds enforced when points are edited.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoRange {
    min: f64,
    max: f64,
}

impl TempoRange {
    /// Returns `None` unless `0 < min <= max` and both are finite.
    pub fn new(min: f64, max: f64) -> Option<Self> {
        if min.is_finite() && max.is_finite() && min > 0.0 && min <= max {
            Some(Self { min, max })
        } else {
            None
        }
    }

    /// Clamp a tempo into the range. NaN has no meaningful clamp and is rejected.
    pub fn clamp(&self, tempo: f64) -> Option<f64> {
        if tempo.is_nan() {
            None
        } else {
            Some(tempo.clamp(self.min, self.max))
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, tempo: f64) -> bool {
        tempo >= self.min && tempo <= self.max
    }
}

impl Default for TempoRange {
    fn default() -> Self {
        Self {
            min: 20.0,
            max: 300.0,
        }
    }
}
