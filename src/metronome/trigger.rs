//! Trigger events and the sinks that consume them.

use crossbeam_channel::{Sender, TrySendError};

/// One scheduled click.
///
/// Emitted ahead of `hardware_time`; the consumer is expected to schedule
/// the sound for that instant rather than play it on receipt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    /// 0-based position within the measure. 0 is the downbeat.
    pub measure_position: u32,
    /// Hardware-clock instant the click should sound at, in seconds.
    pub hardware_time: f64,
    /// Grid beat (quarter notes from the musical origin).
    pub beat: f64,
    /// Output gain: the volume, scaled by the accent level off the downbeat.
    pub gain: f32,
}

impl Trigger {
    pub fn is_downbeat(&self) -> bool {
        self.measure_position == 0
    }
}

/// Receives triggers from the scheduler.
pub trait TriggerSink: Send {
    fn on_trigger(&mut self, trigger: Trigger);

    /// Called when the scheduler stops. Sinks may silence pending clicks.
    fn on_stop(&mut self) {}
}

/// Boxed callback sink.
pub type TriggerFn = Box<dyn FnMut(Trigger) + Send>;

impl TriggerSink for TriggerFn {
    fn on_trigger(&mut self, trigger: Trigger) {
        (**self)(trigger)
    }
}

impl TriggerSink for Vec<Trigger> {
    fn on_trigger(&mut self, trigger: Trigger) {
        self.push(trigger);
    }
}

impl TriggerSink for Sender<Trigger> {
    fn on_trigger(&mut self, trigger: Trigger) {
        match self.try_send(trigger) {
            Ok(()) => {}
            Err(TrySendError::Full(t)) => {
                tracing::warn!(beat = t.beat, "trigger channel full, click dropped");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
