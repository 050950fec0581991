//! Lookahead metronome scheduler.
//!
//! The [`LookaheadScheduler`] turns a tempo curve and a time signature into a
//! stream of [`Trigger`]s timed against a [`HardwareClock`]. It wakes on a
//! coarse timer and, each wake, emits every grid click due within a short
//! look-ahead window. A late wake therefore never leaves a gap, while the
//! window stays short enough that a tempo edit reaches the next click.
//!
//! The scheduler is single-threaded: settings updates and wakes run on the
//! same thread. [`Metronome`] runs one on a dedicated OS thread and feeds it
//! commands between wakes.

pub mod click;
pub mod clock;
pub mod settings;
pub mod thread;
pub mod trigger;

pub use click::ClickVoice;
pub use clock::{HardwareClock, ManualClock, MonotonicClock};
pub use settings::{MetronomeSettings, SchedulerTiming, SettingsUpdate, MAX_DENOMINATOR};
pub use thread::Metronome;
pub use trigger::{Trigger, TriggerFn, TriggerSink};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::tempo::{convert, TempoCurve};

/// Tolerance when snapping a start position onto the grid, so a position that
/// sits on a grid line up to rounding error plays that line.
const GRID_EPSILON: f64 = 1e-9;

/// Upper bound on clicks emitted by one wake.
const MAX_TRIGGERS_PER_WAKE: usize = 1024;

/// Running bit of the stop handle state. The remaining bits count stops.
const RUNNING: u64 = 1;

/// Shared running flag. Clearing it stops emission immediately, even from
/// another thread in the middle of a wake.
///
/// Every call to [`StopHandle::stop`] also advances a generation counter, so a
/// start request read before the stop can be told apart from one made after.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    state: Arc<AtomicU64>,
}

impl StopHandle {
    /// Stop emitting and invalidate start requests made in earlier generations.
    pub fn stop(&self) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| Some((s | RUNNING) + 1));
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) & RUNNING != 0
    }

    /// Number of stops so far.
    pub fn generation(&self) -> u64 {
        self.state.load(Ordering::Acquire) >> 1
    }

    /// Set running if stopped and still in `generation`.
    fn resume(&self, generation: u64) -> bool {
        let stopped = generation << 1;
        self.state
            .compare_exchange(stopped, stopped | RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clear the running bit. Returns whether it was set.
    fn halt(&self) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (s & RUNNING != 0).then_some(s + 1)
            })
            .is_ok()
    }
}

/// Grid-aligned trigger scheduler.
pub struct LookaheadScheduler<C, S> {
    clock: C,
    sink: S,
    settings: MetronomeSettings,
    timing: SchedulerTiming,
    running: StopHandle,
    /// Hardware time at which project time was 0.
    project_zero_time: f64,
    /// Next grid beat to emit.
    cursor_beat: f64,
    /// Measure position of `cursor_beat`.
    measure_position: u32,
    /// Hardware time of `cursor_beat`.
    next_trigger_time: f64,
}

impl<C: HardwareClock, S: TriggerSink> LookaheadScheduler<C, S> {
    /// A zero numerator or out-of-range denominator in `settings` falls back
    /// to the default.
    pub fn new(
        clock: C,
        sink: S,
        mut settings: MetronomeSettings,
        timing: SchedulerTiming,
    ) -> Self {
        settings.sanitize_signature();
        Self {
            clock,
            sink,
            settings,
            timing,
            running: StopHandle::default(),
            project_zero_time: 0.0,
            cursor_beat: 0.0,
            measure_position: 0,
            next_trigger_time: 0.0,
        }
    }

    /// Start emitting from the first grid slot at or after
    /// `current_project_time`, then run the first scheduling pass.
    ///
    /// No-op while already running.
    pub fn start(
        &mut self,
        curve: Arc<TempoCurve>,
        numerator: u32,
        denominator: u32,
        current_project_time: f64,
    ) {
        let generation = self.running.generation();
        self.start_in_generation(generation, curve, numerator, denominator, current_project_time);
    }

    /// Like [`start`](Self::start), but only if the stop handle is still in
    /// `generation`. A stop issued after the generation was read wins.
    ///
    /// Returns whether the scheduler started.
    pub fn start_in_generation(
        &mut self,
        generation: u64,
        curve: Arc<TempoCurve>,
        numerator: u32,
        denominator: u32,
        current_project_time: f64,
    ) -> bool {
        if !self.running.resume(generation) {
            tracing::debug!(
                generation,
                running = self.is_running(),
                "start ignored, metronome running or stopped since request"
            );
            return false;
        }

        self.settings.curve = curve;
        self.settings.set_numerator(numerator);
        self.settings.set_denominator(denominator);

        self.project_zero_time = self.clock.now() - current_project_time;

        let step = self.settings.grid_step();
        let current_beat = convert::beat_at_time(self.settings.curve.points(), current_project_time);
        self.cursor_beat = (current_beat / step - GRID_EPSILON).ceil() * step;
        self.measure_position = self.grid_measure_position();
        self.next_trigger_time = self.hardware_time_of(self.cursor_beat);

        tracing::debug!(
            project_time = current_project_time,
            cursor_beat = self.cursor_beat,
            measure_position = self.measure_position,
            "metronome started"
        );

        self.wake();
        true
    }

    /// Stop emitting. Idempotent.
    pub fn stop(&mut self) {
        if self.running.halt() {
            tracing::debug!(cursor_beat = self.cursor_beat, "metronome stopped");
        }
        self.sink.on_stop();
    }

    /// Apply a partial settings update; the next wake reads it.
    pub fn update_settings(&mut self, update: SettingsUpdate) {
        let curve_changed = update.curve.is_some();
        self.settings.apply(update);
        self.measure_position %= self.settings.numerator;
        if curve_changed && self.is_running() {
            self.next_trigger_time = self.hardware_time_of(self.cursor_beat);
        }
    }

    /// One scheduling pass.
    ///
    /// Emits every trigger due before `now + schedule_ahead` and returns the
    /// interval until the next wake, or `None` once stopped.
    pub fn wake(&mut self) -> Option<Duration> {
        if !self.is_running() {
            return None;
        }

        let now = self.clock.now();
        let horizon = now + self.timing.schedule_ahead.as_secs_f64();
        // The curve may have changed since the last advance.
        self.next_trigger_time = self.hardware_time_of(self.cursor_beat);

        let mut late_emitted = false;
        let mut emitted = 0;
        while self.next_trigger_time < horizon && emitted < MAX_TRIGGERS_PER_WAKE {
            if !self.is_running() {
                return None;
            }
            if self.next_trigger_time < now {
                if late_emitted {
                    self.resync(now);
                    continue;
                }
                late_emitted = true;
            }
            self.emit();
            self.advance();
            emitted += 1;
        }

        Some(self.timing.wake_interval)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_running()
    }

    /// Handle for stopping emission from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.running.clone()
    }

    pub fn cursor_beat(&self) -> f64 {
        self.cursor_beat
    }

    pub fn measure_position(&self) -> u32 {
        self.measure_position
    }

    pub fn next_trigger_time(&self) -> f64 {
        self.next_trigger_time
    }

    pub fn project_zero_time(&self) -> f64 {
        self.project_zero_time
    }

    pub fn settings(&self) -> &MetronomeSettings {
        &self.settings
    }

    pub fn timing(&self) -> SchedulerTiming {
        self.timing
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn emit(&mut self) {
        let trigger = Trigger {
            measure_position: self.measure_position,
            hardware_time: self.next_trigger_time,
            beat: self.cursor_beat,
            gain: self.settings.gain_for(self.measure_position),
        };
        self.sink.on_trigger(trigger);
    }

    fn advance(&mut self) {
        self.cursor_beat += self.settings.grid_step();
        self.next_trigger_time = self.hardware_time_of(self.cursor_beat);
        self.measure_position = (self.measure_position + 1) % self.settings.numerator;
    }

    /// Skip missed grid slots: move the cursor to the first slot at or after
    /// the hardware time `now`.
    fn resync(&mut self, now: f64) {
        let step = self.settings.grid_step();
        let project_now = now - self.project_zero_time;
        let points = self.settings.curve.points();

        let mut cursor = (convert::beat_at_time(points, project_now) / step).ceil() * step;
        while convert::time_at_beat(points, cursor) < project_now {
            cursor += step;
        }
        let skipped = cursor - self.cursor_beat;
        self.cursor_beat = cursor.max(self.cursor_beat);
        self.measure_position = self.grid_measure_position();
        self.next_trigger_time = self.hardware_time_of(self.cursor_beat);

        tracing::warn!(
            skipped_beats = skipped,
            cursor_beat = self.cursor_beat,
            "metronome fell behind, skipping missed clicks"
        );
    }

    /// Measure position of the cursor assuming measure 0 starts at beat 0.
    fn grid_measure_position(&self) -> u32 {
        let index = (self.cursor_beat / self.settings.grid_step()).round() as i64;
        index.rem_euclid(self.settings.numerator as i64) as u32
    }

    fn hardware_time_of(&self, beat: f64) -> f64 {
        self.project_zero_time + convert::time_at_beat(self.settings.curve.points(), beat)
    }
}
