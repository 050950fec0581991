//! Tempo curve model and the beat ↔ time conversion engine.
//!
//! A [`TempoCurve`] pins tempos to bar positions; tempo is linear in beats
//! between points. The functions in [`convert`] map between musical position
//! and seconds under that curve. They hold no state: every call derives its
//! answer from the points it is given, so edits are visible on the next query.

pub mod convert;
pub mod curve;
pub mod point;

pub use convert::{beat_at_time, tempo_at_beat, tempo_at_time, time_at_beat, SLOPE_EPSILON};
pub use curve::{PointUpdate, TempoCurve};
pub use point::{PointId, TempoPoint, TempoRange, BEATS_PER_BAR, DEFAULT_TEMPO};
