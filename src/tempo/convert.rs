//! Beat ↔ seconds conversion under a piecewise-linear tempo curve.
//!
//! Tempo is linear in *beat position* between consecutive points, so the
//! seconds-per-beat `60 / tempo(b)` is a reciprocal of a linear function and
//! its integral over a ramp is logarithmic:
//!
//! ```text
//! Δt(x) = (60 / m) · ln((T0 + m·x) / T0)        m = (T1 − T0) / (b1 − b0)
//! Δb(t) = (T0 / m) · (exp(t·m / 60) − 1)        inverse of the above
//! ```
//!
//! Both are evaluated through `ln_1p` / `exp_m1` so that shallow ramps stay
//! accurate instead of cancelling to zero.
//!
//! Every function here is pure and total over a sorted slice of points: no
//! allocation, one bounded pass over the points, no panics. Corrupted input
//! degrades to constant-tempo behaviour rather than NaN.

use super::point::{TempoPoint, DEFAULT_TEMPO};

/// Slopes (BPM per beat) below this are treated as constant tempo.
pub const SLOPE_EPSILON: f64 = 1e-9;

/// Positive, finite tempo or the default.
#[inline]
fn sanitize(tempo: f64) -> f64 {
    if tempo.is_finite() && tempo > 0.0 {
        tempo
    } else {
        DEFAULT_TEMPO
    }
}

#[inline]
fn constant_seconds(beats: f64, tempo: f64) -> f64 {
    beats * 60.0 / tempo
}

#[inline]
fn constant_beats(seconds: f64, tempo: f64) -> f64 {
    seconds * tempo / 60.0
}

/// The stretch of curve between two consecutive points.
#[derive(Debug, Clone, Copy)]
struct Segment {
    start_beat: f64,
    length: f64,
    start_tempo: f64,
    slope: f64,
}

impl Segment {
    fn between(from: &TempoPoint, to: &TempoPoint) -> Self {
        let start_tempo = sanitize(from.tempo);
        let end_tempo = sanitize(to.tempo);
        let start_beat = from.beat();
        let length = to.beat() - start_beat;
        let slope = if length > 0.0 {
            (end_tempo - start_tempo) / length
        } else {
            0.0
        };
        Self {
            start_beat,
            length,
            start_tempo,
            slope,
        }
    }

    /// Zero-length (or corrupted) segments are tempo jumps: no time passes.
    fn is_jump(&self) -> bool {
        !(self.length > 0.0)
    }

    /// Whether the log/exp model applies. A ramp whose end tempo would not be
    /// positive falls back to constant tempo.
    fn is_ramp(&self) -> bool {
        self.slope.is_finite()
            && self.slope.abs() >= SLOPE_EPSILON
            && self.start_tempo + self.slope * self.length > 0.0
    }

    /// Seconds from the segment start to `offset` beats into it.
    fn seconds_to(&self, offset: f64) -> f64 {
        if self.is_ramp() {
            let m = self.slope;
            (60.0 / m) * (m * offset / self.start_tempo).ln_1p()
        } else {
            constant_seconds(offset, self.start_tempo)
        }
    }

    fn duration(&self) -> f64 {
        self.seconds_to(self.length)
    }

    /// Beats from the segment start after `seconds` have elapsed inside it.
    fn beats_after(&self, seconds: f64) -> f64 {
        let beats = if self.is_ramp() {
            let m = self.slope;
            (self.start_tempo / m) * (seconds * m / 60.0).exp_m1()
        } else {
            constant_beats(seconds, self.start_tempo)
        };
        beats.max(0.0).min(self.length)
    }
}

/// Seconds from the musical origin (beat 0) to `beat`.
///
/// Before the first point the first point's tempo is extrapolated as a
/// constant (including negative beats); after the last point the last tempo
/// is held. An empty curve maps at 120 BPM.
pub fn time_at_beat(points: &[TempoPoint], beat: f64) -> f64 {
    let Some(first) = points.first() else {
        return constant_seconds(beat, DEFAULT_TEMPO);
    };
    let first_tempo = sanitize(first.tempo);
    if !(beat >= first.beat()) {
        return constant_seconds(beat, first_tempo);
    }

    let mut elapsed = constant_seconds(first.beat(), first_tempo);
    for pair in points.windows(2) {
        let segment = Segment::between(&pair[0], &pair[1]);
        if segment.is_jump() {
            continue;
        }
        if beat <= pair[1].beat() {
            return elapsed + segment.seconds_to(beat - segment.start_beat);
        }
        elapsed += segment.duration();
    }

    let last = &points[points.len() - 1];
    elapsed + constant_seconds(beat - last.beat(), sanitize(last.tempo))
}

/// Beat position reached `seconds` after the musical origin.
///
/// Exact inverse of [`time_at_beat`], segment by segment.
pub fn beat_at_time(points: &[TempoPoint], seconds: f64) -> f64 {
    let Some(first) = points.first() else {
        return constant_beats(seconds, DEFAULT_TEMPO);
    };
    let first_tempo = sanitize(first.tempo);
    let origin = constant_seconds(first.beat(), first_tempo);
    if !(seconds >= origin) {
        return constant_beats(seconds, first_tempo);
    }

    let mut elapsed = origin;
    for pair in points.windows(2) {
        let segment = Segment::between(&pair[0], &pair[1]);
        if segment.is_jump() {
            continue;
        }
        let duration = segment.duration();
        if seconds <= elapsed + duration {
            return segment.start_beat + segment.beats_after(seconds - elapsed);
        }
        elapsed += duration;
    }

    let last = &points[points.len() - 1];
    last.beat() + constant_beats(seconds - elapsed, sanitize(last.tempo))
}

/// Instantaneous tempo at `beat`.
///
/// Linear between the bracketing points, held constant outside the curve.
/// Exactly on a jump the tempo after the jump is returned.
pub fn tempo_at_beat(points: &[TempoPoint], beat: f64) -> f64 {
    let Some(first) = points.first() else {
        return DEFAULT_TEMPO;
    };
    if !(beat >= first.beat()) {
        return sanitize(first.tempo);
    }

    // Last point at or before `beat`; at least `first` qualifies.
    let idx = points.partition_point(|p| p.beat() <= beat).saturating_sub(1);
    let from = &points[idx];
    match points.get(idx + 1) {
        None => sanitize(from.tempo),
        Some(to) => {
            let start = sanitize(from.tempo);
            let end = sanitize(to.tempo);
            let length = to.beat() - from.beat();
            if !(length > 0.0) {
                return end;
            }
            start + (end - start) * (beat - from.beat()) / length
        }
    }
}

/// Instantaneous tempo `seconds` after the musical origin.
pub fn tempo_at_time(points: &[TempoPoint], seconds: f64) -> f64 {
    tempo_at_beat(points, beat_at_time(points, seconds))
}
