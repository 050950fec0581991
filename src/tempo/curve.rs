//! The editable tempo curve: an ordered set of points with a fixed anchor.

use super::convert;
use super::point::{PointId, TempoPoint, TempoRange, DEFAULT_TEMPO};
use crate::error::CurveError;

/// Partial edit of a single point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointUpdate {
    pub position: Option<f64>,
    pub tempo: Option<f64>,
}

/// A piecewise-linear tempo curve owned by the document.
///
/// Points are kept sorted by position. Exactly one point, the anchor, sits at
/// bar 0; it can be retuned but never removed or moved. Tempos are clamped
/// into [`TempoRange`] on every edit so the conversion functions only ever
/// see positive tempos.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoCurve {
    points: Vec<TempoPoint>,
    range: TempoRange,
    next_id: u64,
}

impl TempoCurve {
    /// Create a curve holding only the anchor.
    pub fn new(anchor_tempo: f64, range: TempoRange) -> Self {
        let tempo = range.clamp(anchor_tempo).unwrap_or(DEFAULT_TEMPO);
        Self {
            points: vec![TempoPoint::new(PointId::ANCHOR, 0.0, tempo)],
            range,
            next_id: 1,
        }
    }

    /// Build a curve from `(bar, bpm)` pairs in any order.
    ///
    /// Exactly one pair must sit at bar 0; it becomes the anchor.
    pub fn from_points<I>(points: I, range: TempoRange) -> Result<Self, CurveError>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut anchor = None;
        let mut rest = Vec::new();
        for (bar, bpm) in points {
            let tempo = range.clamp(bpm).ok_or(CurveError::InvalidTempo(bpm))?;
            if bar == 0.0 {
                if anchor.replace(tempo).is_some() {
                    return Err(CurveError::DuplicateAnchor);
                }
            } else {
                validate_position(bar)?;
                rest.push((bar, tempo));
            }
        }

        let mut curve = Self::new(anchor.ok_or(CurveError::MissingAnchor)?, range);
        for (bar, tempo) in rest {
            curve.insert(bar, tempo);
        }
        Ok(curve)
    }

    /// Points in ascending position order. Never empty.
    pub fn points(&self) -> &[TempoPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// A curve always holds its anchor, so this is false.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn anchor(&self) -> &TempoPoint {
        &self.points[0]
    }

    pub fn get(&self, id: PointId) -> Option<&TempoPoint> {
        self.points.iter().find(|p| p.id == id)
    }

    pub fn range(&self) -> TempoRange {
        self.range
    }

    /// Add a point after bar 0, clamping its tempo. Returns the new id.
    pub fn add_point(&mut self, bar: f64, bpm: f64) -> Result<PointId, CurveError> {
        validate_position(bar)?;
        let tempo = self.range.clamp(bpm).ok_or(CurveError::InvalidTempo(bpm))?;
        Ok(self.insert(bar, tempo))
    }

    /// Apply a partial edit to one point.
    pub fn update_point(&mut self, id: PointId, update: PointUpdate) -> Result<(), CurveError> {
        let idx = self.index_of(id)?;

        let tempo = match update.tempo {
            Some(bpm) => Some(self.range.clamp(bpm).ok_or(CurveError::InvalidTempo(bpm))?),
            None => None,
        };
        if let Some(position) = update.position {
            if id.is_anchor() {
                if position != 0.0 {
                    return Err(CurveError::AnchorImmutable);
                }
            } else {
                validate_position(position)?;
            }
        }

        let point = &mut self.points[idx];
        if let Some(tempo) = tempo {
            point.tempo = tempo;
        }
        if let Some(position) = update.position {
            point.position = position;
            self.sort();
        }
        Ok(())
    }

    /// Remove a point. The anchor cannot be removed.
    pub fn remove_point(&mut self, id: PointId) -> Result<TempoPoint, CurveError> {
        if id.is_anchor() {
            return Err(CurveError::AnchorImmutable);
        }
        let idx = self.index_of(id)?;
        Ok(self.points.remove(idx))
    }

    /// Replace the tempo range and re-clamp every point into it.
    pub fn set_range(&mut self, range: TempoRange) {
        self.range = range;
        for point in &mut self.points {
            point.tempo = range.clamp(point.tempo).unwrap_or(range.min());
        }
    }

    /// See [`convert::time_at_beat`].
    pub fn time_at_beat(&self, beat: f64) -> f64 {
        convert::time_at_beat(&self.points, beat)
    }

    /// See [`convert::beat_at_time`].
    pub fn beat_at_time(&self, seconds: f64) -> f64 {
        convert::beat_at_time(&self.points, seconds)
    }

    /// See [`convert::tempo_at_beat`].
    pub fn tempo_at_beat(&self, beat: f64) -> f64 {
        convert::tempo_at_beat(&self.points, beat)
    }

    /// See [`convert::tempo_at_time`].
    pub fn tempo_at_time(&self, seconds: f64) -> f64 {
        convert::tempo_at_time(&self.points, seconds)
    }

    fn insert(&mut self, bar: f64, tempo: f64) -> PointId {
        let id = PointId(self.next_id);
        self.next_id += 1;
        // After any existing point at the same position, so a later point
        // at an equal bar becomes the tempo after the jump.
        let idx = self.points.partition_point(|p| p.position <= bar);
        self.points.insert(idx, TempoPoint::new(id, bar, tempo));
        id
    }

    fn index_of(&self, id: PointId) -> Result<usize, CurveError> {
        self.points
            .iter()
            .position(|p| p.id == id)
            .ok_or(CurveError::UnknownPoint(id))
    }

    fn sort(&mut self) {
        // Stable, so equal positions keep their relative order.
        self.points.sort_by(|a, b| a.position.total_cmp(&b.position));
    }
}

impl Default for TempoCurve {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPO, TempoRange::default())
    }
}

fn validate_position(bar: f64) -> Result<(), CurveError> {
    if bar.is_finite() && bar > 0.0 {
        Ok(())
    } else {
        Err(CurveError::InvalidPosition(bar))
    }
}
