//! Click synthesis: a short sine blip with an exponential attack and decay.

use std::f64::consts::TAU;

/// Envelope floor. Exponential ramps cannot start or end at zero.
const SILENCE: f64 = 0.001;

/// Parameters of the click sound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickVoice {
    /// Oscillator frequency of the downbeat click, in Hz.
    pub downbeat_hz: f64,
    /// Oscillator frequency of every other click, in Hz.
    pub beat_hz: f64,
    /// Rise time to full gain, in seconds.
    pub attack: f64,
    /// Total click length, in seconds.
    pub length: f64,
}

impl Default for ClickVoice {
    fn default() -> Self {
        Self {
            downbeat_hz: 1000.0,
            beat_hz: 800.0,
            attack: 0.005,
            length: 0.05,
        }
    }
}

impl ClickVoice {
    pub fn frequency_for(&self, measure_position: u32) -> f64 {
        if measure_position == 0 {
            self.downbeat_hz
        } else {
            self.beat_hz
        }
    }

    /// Click length in frames at `sample_rate`.
    pub fn length_frames(&self, sample_rate: u32) -> u64 {
        (self.length * sample_rate as f64).round().max(0.0) as u64
    }

    /// Envelope amplitude `t` seconds into a click of peak `gain`.
    ///
    /// Ramps exponentially from the floor to `gain` over `attack`, then back
    /// to the floor at `length`. Zero outside the click and for gains at or
    /// below the floor.
    pub fn envelope(&self, t: f64, gain: f64) -> f64 {
        if gain <= SILENCE || !(t >= 0.0) || t >= self.length {
            return 0.0;
        }
        if t < self.attack {
            exp_ramp(SILENCE, gain, t / self.attack)
        } else {
            let decay = self.length - self.attack;
            if decay <= 0.0 {
                return 0.0;
            }
            exp_ramp(gain, SILENCE, (t - self.attack) / decay)
        }
    }

    /// One output sample, `frame_offset` frames after the click started.
    pub fn sample_at(&self, frame_offset: u64, sample_rate: u32, frequency: f64, gain: f32) -> f32 {
        let t = frame_offset as f64 / sample_rate as f64;
        let amp = self.envelope(t, gain as f64);
        if amp == 0.0 {
            return 0.0;
        }
        ((t * frequency * TAU).sin() * amp) as f32
    }
}

/// Exponential interpolation from `from` to `to`, both positive, at `frac`.
#[inline]
fn exp_ramp(from: f64, to: f64, frac: f64) -> f64 {
    from * (to / from).powf(frac)
}
