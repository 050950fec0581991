//! Audio callback: runs on the cpal audio thread.
//!
//! Drains click commands from the ring buffer, mixes every sounding click
//! into the output block, clamps to the output ceiling and advances the
//! shared frame counter that [`AudioClock`](super::AudioClock) reads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::traits::Consumer;
use ringbuf::HeapCons;

use super::command::AudioCommand;
use crate::metronome::ClickVoice;

/// Most clicks mixed at once. Further clicks are dropped until one ends.
pub const MAX_VOICES: usize = 32;

/// Output is hard-clamped to `[-OUTPUT_CEILING, OUTPUT_CEILING]`.
pub const OUTPUT_CEILING: f32 = 0.95;

#[derive(Debug, Clone, Copy)]
struct Voice {
    start_frame: u64,
    frequency: f64,
    gain: f32,
}

/// State that lives on the audio thread. Accessed only from the cpal callback.
pub struct AudioCallback {
    consumer: HeapCons<AudioCommand>,
    voices: Vec<Voice>,
    click: ClickVoice,
    frames: Arc<AtomicU64>,
    channels: u16,
    sample_rate: u32,
}

impl AudioCallback {
    pub fn new(
        consumer: HeapCons<AudioCommand>,
        click: ClickVoice,
        channels: u16,
        sample_rate: u32,
    ) -> Self {
        Self {
            consumer,
            voices: Vec::with_capacity(MAX_VOICES),
            click,
            frames: Arc::new(AtomicU64::new(0)),
            channels: channels.max(1),
            sample_rate,
        }
    }

    /// Shared counter of frames rendered so far.
    pub fn frame_counter(&self) -> Arc<AtomicU64> {
        self.frames.clone()
    }

    /// Fill an interleaved `output` block.
    pub fn process(&mut self, output: &mut [f32]) {
        let channels = self.channels as usize;
        let block_start = self.frames.load(Ordering::Acquire);
        let block_frames = (output.len() / channels) as u64;

        while let Some(cmd) = self.consumer.try_pop() {
            match cmd {
                AudioCommand::Click {
                    start_frame,
                    frequency,
                    gain,
                } => {
                    if self.voices.len() >= MAX_VOICES {
                        continue;
                    }
                    // A click that arrives late sounds at once instead of never.
                    self.voices.push(Voice {
                        start_frame: start_frame.max(block_start),
                        frequency,
                        gain,
                    });
                }
                AudioCommand::Stop => self.voices.clear(),
            }
        }

        for (i, frame) in output.chunks_mut(channels).enumerate() {
            let now = block_start + i as u64;
            let mut mixed = 0.0f32;
            for voice in &self.voices {
                if now >= voice.start_frame {
                    mixed += self.click.sample_at(
                        now - voice.start_frame,
                        self.sample_rate,
                        voice.frequency,
                        voice.gain,
                    );
                }
            }
            let mixed = mixed.clamp(-OUTPUT_CEILING, OUTPUT_CEILING);
            frame.fill(mixed);
        }

        let block_end = block_start + block_frames;
        let length = self.click.length_frames(self.sample_rate);
        self.voices
            .retain(|v| v.start_frame >= block_end || block_end - v.start_frame < length);

        self.frames.store(block_end, Ordering::Release);
    }

    /// Clicks currently sounding or waiting to start.
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::{
        traits::{Producer, Split},
        HeapRb,
    };

    const SR: u32 = 48_000;

    fn setup(channels: u16) -> (ringbuf::HeapProd<AudioCommand>, AudioCallback) {
        let rb = HeapRb::<AudioCommand>::new(64);
        let (prod, cons) = rb.split();
        let callback = AudioCallback::new(cons, ClickVoice::default(), channels, SR);
        (prod, callback)
    }

    fn click(start_frame: u64, gain: f32) -> AudioCommand {
        AudioCommand::Click {
            start_frame,
            frequency: 1000.0,
            gain,
        }
    }

    fn peak(block: &[f32]) -> f32 {
        block.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_silence_without_clicks() {
        let (_prod, mut callback) = setup(2);
        let mut output = vec![999.0f32; 64];
        callback.process(&mut output);
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_frame_counter_advances_per_frame() {
        let (_prod, mut callback) = setup(2);
        let frames = callback.frame_counter();
        let mut output = vec![0.0f32; 512];
        callback.process(&mut output);
        callback.process(&mut output);
        assert_eq!(frames.load(Ordering::Acquire), 512);
    }

    #[test]
    fn test_click_starts_at_its_frame() {
        let (mut prod, mut callback) = setup(1);
        prod.try_push(click(300, 0.8)).unwrap();

        let mut output = vec![0.0f32; 256];
        callback.process(&mut output);
        assert_eq!(peak(&output), 0.0);

        let mut output = vec![0.0f32; 256];
        callback.process(&mut output);
        assert!(output[..44].iter().all(|&s| s == 0.0));
        assert!(peak(&output[44..]) > 0.0);
    }

    #[test]
    fn test_late_click_starts_at_block_start() {
        let (mut prod, mut callback) = setup(1);
        let mut output = vec![0.0f32; 1024];
        callback.process(&mut output);

        prod.try_push(click(10, 0.8)).unwrap();
        callback.process(&mut output);
        assert_eq!(callback.active_voices(), 1);
        assert!(peak(&output[..240]) > 0.0);
    }

    #[test]
    fn test_channels_receive_same_sample() {
        let (mut prod, mut callback) = setup(2);
        prod.try_push(click(0, 0.8)).unwrap();
        let mut output = vec![0.0f32; 512];
        callback.process(&mut output);
        for frame in output.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_voice_released_after_click_length() {
        let (mut prod, mut callback) = setup(1);
        prod.try_push(click(0, 0.8)).unwrap();

        let mut output = vec![0.0f32; 2400];
        callback.process(&mut output);
        assert_eq!(callback.active_voices(), 0);
    }

    #[test]
    fn test_stop_cuts_clicks() {
        let (mut prod, mut callback) = setup(1);
        prod.try_push(click(0, 0.8)).unwrap();
        prod.try_push(click(100, 0.8)).unwrap();
        prod.try_push(AudioCommand::Stop).unwrap();

        let mut output = vec![999.0f32; 256];
        callback.process(&mut output);
        assert!(output.iter().all(|&s| s == 0.0));
        assert_eq!(callback.active_voices(), 0);
    }

    #[test]
    fn test_output_clamped_to_ceiling() {
        let (mut prod, mut callback) = setup(1);
        for _ in 0..8 {
            prod.try_push(click(0, 1.0)).unwrap();
        }
        let mut output = vec![0.0f32; 2400];
        callback.process(&mut output);
        assert!((peak(&output) - OUTPUT_CEILING).abs() < 1e-6);
    }

    #[test]
    fn test_voice_limit() {
        let (mut prod, mut callback) = setup(1);
        for i in 0..(MAX_VOICES as u64 + 8) {
            prod.try_push(click(100_000 + i, 0.5)).unwrap();
        }
        let mut output = vec![0.0f32; 16];
        callback.process(&mut output);
        assert_eq!(callback.active_voices(), MAX_VOICES);
    }
}
