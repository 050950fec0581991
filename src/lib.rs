//! tempomap: variable tempo curves, closed-form beat/time conversion and a
//! lookahead metronome.

pub mod audio;
pub mod config;
pub mod error;
pub mod metronome;
pub mod tempo;
pub mod transport;

pub use error::{ConfigError, CurveError};
