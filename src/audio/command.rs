//! Commands sent from the scheduler side to the audio thread via ring buffer.

/// Commands sent to the audio thread via ring buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioCommand {
    /// Start a click at an absolute output frame.
    Click {
        start_frame: u64,
        frequency: f64,
        gain: f32,
    },

    /// Cut every sounding and pending click.
    Stop,
}
