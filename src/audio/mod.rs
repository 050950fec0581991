//! Click output: cpal stream, lock-free command queue, sample-accurate clock.
//!
//! The engine owns the cpal output stream and talks to it through a lock-free
//! ring buffer. The scheduler side pushes [`AudioCommand`]s through a
//! [`ClickSink`]; the audio callback drains them and mixes clicks at the
//! exact frame they were scheduled for. [`AudioClock`] reads the callback's
//! frame counter, so the scheduler measures time in rendered audio.

pub mod callback;
pub mod command;
pub mod export;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    traits::{Producer, Split},
    HeapProd, HeapRb,
};
use thiserror::Error;

pub use callback::AudioCallback;
pub use command::AudioCommand;
pub use export::{render_click_track, write_wav, ExportError};

use crate::metronome::{ClickVoice, HardwareClock, Trigger, TriggerSink};

/// Ring buffer capacity (number of commands).
pub const RING_BUFFER_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device found")]
    NoOutputDevice,
    #[error("device config error: {0}")]
    DeviceConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("stream build error: {0}")]
    StreamBuild(#[from] cpal::BuildStreamError),
    #[error("stream play error: {0}")]
    StreamPlay(#[from] cpal::PlayStreamError),
    #[error("stream pause error: {0}")]
    StreamPause(#[from] cpal::PauseStreamError),
}

/// Hardware clock driven by rendered audio frames.
#[derive(Debug, Clone)]
pub struct AudioClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl AudioClock {
    pub fn new(frames: Arc<AtomicU64>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }
}

impl HardwareClock for AudioClock {
    fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Turns scheduler triggers into frame-stamped click commands.
pub struct ClickSink {
    producer: HeapProd<AudioCommand>,
    voice: ClickVoice,
    sample_rate: u32,
}

impl ClickSink {
    pub fn new(producer: HeapProd<AudioCommand>, voice: ClickVoice, sample_rate: u32) -> Self {
        Self {
            producer,
            voice,
            sample_rate,
        }
    }

    /// Output frame for a hardware time in seconds.
    pub fn frame_at(&self, seconds: f64) -> u64 {
        (seconds * self.sample_rate as f64).round().max(0.0) as u64
    }
}

impl TriggerSink for ClickSink {
    fn on_trigger(&mut self, trigger: Trigger) {
        let cmd = AudioCommand::Click {
            start_frame: self.frame_at(trigger.hardware_time),
            frequency: self.voice.frequency_for(trigger.measure_position),
            gain: trigger.gain,
        };
        if self.producer.try_push(cmd).is_err() {
            tracing::warn!(beat = trigger.beat, "audio command queue full, click dropped");
        }
    }

    fn on_stop(&mut self) {
        if self.producer.try_push(AudioCommand::Stop).is_err() {
            tracing::warn!("audio command queue full, stop dropped");
        }
    }
}

/// Build a connected callback, clock and sink that share one command queue.
pub fn click_pipeline(
    voice: ClickVoice,
    channels: u16,
    sample_rate: u32,
) -> (AudioCallback, AudioClock, ClickSink) {
    let rb = HeapRb::<AudioCommand>::new(RING_BUFFER_CAPACITY);
    let (producer, consumer) = rb.split();
    let callback = AudioCallback::new(consumer, voice, channels, sample_rate);
    let clock = AudioClock::new(callback.frame_counter(), sample_rate);
    let sink = ClickSink::new(producer, voice, sample_rate);
    (callback, clock, sink)
}

/// The audio engine. Owns the cpal stream and, until taken, the click sink.
pub struct AudioEngine {
    stream: cpal::Stream,
    clock: AudioClock,
    sink: Option<ClickSink>,
    sample_rate: u32,
    channels: u16,
}

impl AudioEngine {
    /// Create and start the audio engine with the default output device.
    pub fn new(voice: ClickVoice) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;

        let config = device.default_output_config()?;
        Self::build_with_device(&device, voice, config.sample_rate().0, config.channels())
    }

    /// Create the audio engine with a specific sample rate and channel count.
    pub fn with_config(
        voice: ClickVoice,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;

        Self::build_with_device(&device, voice, sample_rate, channels)
    }

    fn build_with_device(
        device: &cpal::Device,
        voice: ClickVoice,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self, AudioError> {
        let (mut callback, clock, sink) = click_pipeline(voice, channels, sample_rate);

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_fn = |err: cpal::StreamError| {
            tracing::error!(%err, "audio stream error");
        };

        let stream = device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                callback.process(data);
            },
            err_fn,
            None,
        )?;
        stream.play()?;

        tracing::info!(sample_rate, channels, "audio output started");

        Ok(Self {
            stream,
            clock,
            sink: Some(sink),
            sample_rate,
            channels,
        })
    }

    /// Clock that advances with rendered output frames.
    pub fn clock(&self) -> AudioClock {
        self.clock.clone()
    }

    /// The sink feeding this engine. There is one; later calls return `None`.
    pub fn take_click_sink(&mut self) -> Option<ClickSink> {
        self.sink.take()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn pause(&self) -> Result<(), AudioError> {
        Ok(self.stream.pause()?)
    }

    pub fn play(&self) -> Result<(), AudioError> {
        Ok(self.stream.play()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(measure_position: u32, hardware_time: f64) -> Trigger {
        Trigger {
            measure_position,
            hardware_time,
            beat: 0.0,
            gain: 0.5,
        }
    }

    #[test]
    #[ignore] // Requires audio device, run manually with `cargo test -- --ignored`
    fn test_audio_engine_creation() {
        let mut engine = AudioEngine::new(ClickVoice::default()).expect("no audio device");
        assert!(engine.sample_rate() > 0);
        assert!(engine.channels() > 0);
        assert!(engine.take_click_sink().is_some());
        assert!(engine.take_click_sink().is_none());
        assert!(engine.pause().is_ok());
        assert!(engine.play().is_ok());
    }

    #[test]
    fn test_audio_error_display() {
        assert_eq!(
            AudioError::NoOutputDevice.to_string(),
            "no audio output device found"
        );
    }

    #[test]
    fn test_clock_tracks_rendered_frames() {
        let (mut callback, clock, _sink) = click_pipeline(ClickVoice::default(), 2, 48_000);
        assert_eq!(clock.now(), 0.0);
        let mut output = vec![0.0f32; 48_000];
        callback.process(&mut output);
        assert_eq!(clock.frames(), 24_000);
        assert!((clock.now() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_sink_stamps_frames_and_pitch() {
        let (mut callback, _clock, mut sink) = click_pipeline(ClickVoice::default(), 1, 48_000);
        assert_eq!(sink.frame_at(0.5), 24_000);
        assert_eq!(sink.frame_at(-1.0), 0);

        sink.on_trigger(trigger(0, 0.001));
        let mut output = vec![0.0f32; 256];
        callback.process(&mut output);
        assert!(output[..48].iter().all(|&s| s == 0.0));
        assert!(output[49..].iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_sink_stop_silences_callback() {
        let (mut callback, _clock, mut sink) = click_pipeline(ClickVoice::default(), 1, 48_000);
        sink.on_trigger(trigger(1, 0.0));
        sink.on_stop();
        let mut output = vec![0.0f32; 256];
        callback.process(&mut output);
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_sink_survives_full_queue() {
        let (_callback, _clock, mut sink) = click_pipeline(ClickVoice::default(), 1, 48_000);
        for i in 0..(RING_BUFFER_CAPACITY + 10) {
            sink.on_trigger(trigger(0, i as f64));
        }
        sink.on_stop();
    }
}
