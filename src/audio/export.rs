//! Offline click-track rendering and WAV export.
//!
//! Runs the same scheduler, command queue and callback as live playback,
//! but drives the clock from the render loop instead of a sound card.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use thiserror::Error;

use super::click_pipeline;
use crate::metronome::{ClickVoice, LookaheadScheduler, MetronomeSettings, SchedulerTiming};

/// Frames rendered per callback block.
const RENDER_BLOCK: usize = 256;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write WAV file: {0}")]
    Wav(#[from] hound::Error),
}

/// Render `duration` seconds of mono click track starting at
/// `start_project_time`, using `settings.curve` and its time signature.
pub fn render_click_track(
    settings: &MetronomeSettings,
    timing: SchedulerTiming,
    voice: ClickVoice,
    start_project_time: f64,
    duration: f64,
    sample_rate: u32,
) -> Vec<f32> {
    let sr = sample_rate as f64;
    let total = (duration.max(0.0) * sr).ceil() as usize;
    let wake_frames = ((timing.wake_interval.as_secs_f64() * sr).round() as usize).max(1);

    let (mut callback, clock, sink) = click_pipeline(voice, 1, sample_rate);
    let mut scheduler = LookaheadScheduler::new(clock, sink, settings.clone(), timing);
    scheduler.start(
        settings.curve.clone(),
        settings.numerator,
        settings.denominator,
        start_project_time,
    );

    tracing::debug!(total_frames = total, sample_rate, "rendering click track");

    let mut output = vec![0.0f32; total];
    let mut position = 0;
    let mut next_wake = wake_frames;
    for block in output.chunks_mut(RENDER_BLOCK) {
        if position >= next_wake {
            scheduler.wake();
            next_wake += wake_frames;
        }
        callback.process(block);
        position += block.len();
    }
    scheduler.stop();

    output
}

/// Write mono samples as a 16-bit PCM WAV file.
pub fn write_wav(
    path: impl AsRef<Path>,
    samples: &[f32],
    sample_rate: u32,
) -> Result<(), ExportError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;

    tracing::info!(path = %path.as_ref().display(), frames = samples.len(), "wrote click track");
    Ok(())
}
