//! Playback transport and playhead broadcast.
//!
//! The transport tracks project time against a [`HardwareClock`] and pushes
//! the playhead to any number of subscribers. Subscribers get the latest
//! position they have room for; a slow reader skips positions instead of
//! stalling the publisher.

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::metronome::HardwareClock;

/// Fan-out of playhead positions, in project seconds.
#[derive(Debug, Default)]
pub struct PlayheadBroadcaster {
    subscribers: Vec<Sender<f64>>,
}

impl PlayheadBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<f64> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.subscribers.push(tx);
        rx
    }

    /// Send `project_time` to every subscriber with room for it.
    pub fn publish(&mut self, project_time: f64) {
        self.subscribers
            .retain(|tx| match tx.try_send(project_time) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Play/pause/stop state over project time.
pub struct Transport<C> {
    clock: C,
    playing: bool,
    /// Project time when last paused or seeked.
    offset: f64,
    /// Clock time at which `offset` was taken while playing.
    resumed_at: f64,
    start_marker: f64,
    playhead: PlayheadBroadcaster,
}

impl<C: HardwareClock> Transport<C> {
    /// A stopped transport at project time 0.
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            playing: false,
            offset: 0.0,
            resumed_at: 0.0,
            start_marker: 0.0,
            playhead: PlayheadBroadcaster::new(),
        }
    }

    /// Current project time in seconds.
    pub fn position(&self) -> f64 {
        if self.playing {
            self.offset + (self.clock.now() - self.resumed_at)
        } else {
            self.offset
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn start_marker(&self) -> f64 {
        self.start_marker
    }

    pub fn play(&mut self) {
        if self.playing {
            return;
        }
        self.resumed_at = self.clock.now();
        self.playing = true;
        tracing::debug!(position = self.offset, "transport playing");
    }

    /// Hold the current position.
    pub fn pause(&mut self) {
        if !self.playing {
            return;
        }
        self.offset = self.position();
        self.playing = false;
        tracing::debug!(position = self.offset, "transport paused");
        self.playhead.publish(self.offset);
    }

    /// Stop and return to the start marker.
    pub fn stop(&mut self) {
        self.playing = false;
        self.offset = self.start_marker;
        tracing::debug!(position = self.offset, "transport stopped");
        self.playhead.publish(self.offset);
    }

    /// Jump to `project_time`, keeping the play state.
    pub fn seek(&mut self, project_time: f64) {
        if !project_time.is_finite() {
            tracing::warn!(project_time, "ignoring seek to non-finite time");
            return;
        }
        self.offset = project_time;
        self.resumed_at = self.clock.now();
        self.playhead.publish(project_time);
    }

    pub fn set_start_marker(&mut self, project_time: f64) {
        if !project_time.is_finite() {
            tracing::warn!(project_time, "ignoring non-finite start marker");
            return;
        }
        self.start_marker = project_time;
    }

    /// Publish the current position and return it.
    pub fn tick(&mut self) -> f64 {
        let position = self.position();
        self.playhead.publish(position);
        position
    }

    pub fn subscribe(&mut self) -> Receiver<f64> {
        self.playhead.subscribe()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
