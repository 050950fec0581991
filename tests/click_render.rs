//! Integration tests for offline click-track rendering.
//!
//! Renders through the scheduler, command queue and audio callback, then
//! checks the samples. No audio hardware required.

use std::sync::Arc;

use tempomap::audio::{render_click_track, write_wav};
use tempomap::metronome::{ClickVoice, MetronomeSettings, SchedulerTiming};
use tempomap::tempo::{TempoCurve, TempoRange};

const SAMPLE_RATE: u32 = 48_000;
const CLICK_FRAMES: usize = 2_400;

fn settings(points: &[(f64, f64)], numerator: u32) -> MetronomeSettings {
    let curve = TempoCurve::from_points(points.iter().copied(), TempoRange::default()).unwrap();
    MetronomeSettings {
        curve: Arc::new(curve),
        numerator,
        ..Default::default()
    }
}

fn render(settings: &MetronomeSettings, seconds: f64) -> Vec<f32> {
    render_click_track(
        settings,
        SchedulerTiming::default(),
        ClickVoice::default(),
        0.0,
        seconds,
        SAMPLE_RATE,
    )
}

fn frame_of(seconds: f64) -> usize {
    (seconds * SAMPLE_RATE as f64).round() as usize
}

/// Positive-to-negative zero crossings in one click starting at `start`.
fn crossings(samples: &[f32], start: usize) -> usize {
    let end = (start + CLICK_FRAMES + 10).min(samples.len());
    samples[start..end]
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] <= 0.0)
        .count()
}

#[test]
fn clicks_follow_the_ramp() {
    let settings = settings(&[(0.0, 90.0), (2.0, 150.0)], 4);
    let curve = settings.curve.clone();
    let samples = render(&settings, 6.0);

    let mut beat = 0.0;
    while curve.time_at_beat(beat + 1.0) < 5.9 {
        let here = frame_of(curve.time_at_beat(beat));
        let next = frame_of(curve.time_at_beat(beat + 1.0));

        assert!(
            samples[here + 1..here + 40].iter().any(|&s| s != 0.0),
            "no click at beat {beat}"
        );
        assert!(
            samples[here + CLICK_FRAMES + 2..next - 2].iter().all(|&s| s == 0.0),
            "noise between beat {beat} and the next"
        );
        beat += 1.0;
    }
    assert!(beat >= 10.0);
}

#[test]
fn downbeats_are_pitched_higher() {
    let settings = settings(&[(0.0, 120.0)], 3);
    let samples = render(&settings, 3.0);

    for beat in 0..5 {
        let start = frame_of(beat as f64 * 0.5);
        let n = crossings(&samples, start);
        if beat % 3 == 0 {
            assert!((49..=51).contains(&n), "downbeat {beat}: {n} crossings");
        } else {
            assert!((39..=41).contains(&n), "beat {beat}: {n} crossings");
        }
    }
}

#[test]
fn accent_level_scales_off_beats() {
    let mut settings = settings(&[(0.0, 120.0)], 2);
    settings.volume = 0.8;
    settings.accent_level = 0.25;
    let samples = render(&settings, 1.2);

    let peak = |start: usize| {
        samples[start..start + CLICK_FRAMES]
            .iter()
            .fold(0.0f32, |m, s| m.max(s.abs()))
    };
    let down = peak(0);
    let off = peak(frame_of(0.5));
    // Sampled peaks sit a little under the envelope peak.
    assert!(down > 0.7 && down <= 0.8, "downbeat peak {down}");
    let ratio = off / down;
    assert!((ratio - 0.25).abs() < 0.01, "accent ratio {ratio}");
}

#[test]
fn muted_track_is_silent() {
    let mut settings = settings(&[(0.0, 120.0)], 4);
    settings.volume = 0.0;
    let samples = render(&settings, 2.0);
    assert!(samples.iter().all(|&s| s == 0.0));
}

#[test]
fn rendered_track_round_trips_through_wav() {
    let settings = settings(&[(0.0, 120.0)], 4);
    let samples = render(&settings, 1.0);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clicks.wav");
    write_wav(&path, &samples, SAMPLE_RATE).unwrap();

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);

    let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read.len(), samples.len());
    for (&written, &original) in read.iter().zip(&samples).step_by(97) {
        let expected = (original * i16::MAX as f32) as i16;
        assert!((written - expected).abs() <= 1);
    }
}

#[test]
fn zero_numerator_renders_in_default_meter() {
    let settings = settings(&[(0.0, 120.0)], 0);
    let samples = render(&settings, 2.2);

    // Falls back to 4/4: beats 0 and 4 are downbeats.
    for beat in 0..5 {
        let n = crossings(&samples, frame_of(beat as f64 * 0.5));
        if beat % 4 == 0 {
            assert!((49..=51).contains(&n), "downbeat {beat}: {n} crossings");
        } else {
            assert!((39..=41).contains(&n), "beat {beat}: {n} crossings");
        }
    }
}
