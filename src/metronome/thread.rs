//! Threaded metronome: a [`LookaheadScheduler`] on its own OS thread.
//!
//! The thread sleeps on the command channel with a deadline at the next wake,
//! so commands are applied between wakes and never race a scheduling pass.
//! Each start request carries the stop generation it was made in; a stop
//! issued afterwards makes it stale, even while it still sits in the queue.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::{
    HardwareClock, LookaheadScheduler, MetronomeSettings, SchedulerTiming, SettingsUpdate,
    StopHandle, TriggerSink,
};
use crate::tempo::TempoCurve;

#[derive(Debug)]
enum Command {
    Start {
        generation: u64,
        curve: Arc<TempoCurve>,
        numerator: u32,
        denominator: u32,
        project_time: f64,
    },
    Stop,
    Update(SettingsUpdate),
    Shutdown,
}

/// Handle to a metronome thread. Dropping it shuts the thread down.
pub struct Metronome {
    command_tx: Sender<Command>,
    stop: StopHandle,
    thread: Option<JoinHandle<()>>,
}

impl Metronome {
    /// Spawn the scheduler thread. The metronome starts stopped.
    pub fn spawn<C, S>(
        clock: C,
        sink: S,
        settings: MetronomeSettings,
        timing: SchedulerTiming,
    ) -> io::Result<Self>
    where
        C: HardwareClock + 'static,
        S: TriggerSink + 'static,
    {
        let (command_tx, command_rx) = crossbeam_channel::bounded(64);
        let scheduler = LookaheadScheduler::new(clock, sink, settings, timing);
        let stop = scheduler.stop_handle();

        let thread = thread::Builder::new()
            .name("metronome".into())
            .spawn(move || run(scheduler, command_rx))?;

        Ok(Self {
            command_tx,
            stop,
            thread: Some(thread),
        })
    }

    pub fn start(
        &self,
        curve: Arc<TempoCurve>,
        numerator: u32,
        denominator: u32,
        current_project_time: f64,
    ) {
        self.send(Command::Start {
            generation: self.stop.generation(),
            curve,
            numerator,
            denominator,
            project_time: current_project_time,
        });
    }

    /// Stop emitting. Takes effect immediately, even mid-wake, and cancels
    /// any start still waiting in the queue.
    pub fn stop(&self) {
        self.stop.stop();
        self.send(Command::Stop);
    }

    pub fn update_settings(&self, update: SettingsUpdate) {
        self.send(Command::Update(update));
    }

    pub fn is_running(&self) -> bool {
        self.stop.is_running()
    }

    fn send(&self, command: Command) {
        if self.command_tx.send(command).is_err() {
            tracing::warn!("metronome thread is gone, command dropped");
        }
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.stop.stop();
        let _ = self.command_tx.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("metronome thread panicked");
            }
        }
    }
}

fn run<C: HardwareClock, S: TriggerSink>(
    mut scheduler: LookaheadScheduler<C, S>,
    commands: Receiver<Command>,
) {
    let mut next_wake: Option<Instant> = None;

    loop {
        let received = match next_wake {
            Some(deadline) => commands.recv_deadline(deadline),
            None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(command) => {
                let mut pending = Some(command);
                while let Some(command) = pending.take() {
                    match command {
                        Command::Start {
                            generation,
                            curve,
                            numerator,
                            denominator,
                            project_time,
                        } => {
                            scheduler.start_in_generation(
                                generation,
                                curve,
                                numerator,
                                denominator,
                                project_time,
                            );
                        }
                        Command::Stop => scheduler.stop(),
                        Command::Update(update) => scheduler.update_settings(update),
                        Command::Shutdown => {
                            scheduler.stop();
                            return;
                        }
                    }
                    pending = commands.try_recv().ok();
                }
                next_wake = if scheduler.is_running() {
                    next_wake.or_else(|| Some(Instant::now() + scheduler.timing().wake_interval))
                } else {
                    None
                };
            }
            Err(RecvTimeoutError::Timeout) => {
                next_wake = scheduler.wake().map(|interval| Instant::now() + interval);
            }
            Err(RecvTimeoutError::Disconnected) => {
                scheduler.stop();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metronome::{MonotonicClock, Trigger, TriggerFn};
    use crate::tempo::TempoRange;
    use std::time::Duration;

    fn spawn_fast() -> (Metronome, Receiver<Trigger>) {
        let (tx, rx) = crossbeam_channel::unbounded::<Trigger>();
        let metronome = Metronome::spawn(
            MonotonicClock::new(),
            tx,
            MetronomeSettings::default(),
            SchedulerTiming::default(),
        )
        .unwrap();
        (metronome, rx)
    }

    fn fast_curve() -> Arc<TempoCurve> {
        // 300 BPM sixteenths: one click every 50 ms.
        Arc::new(TempoCurve::new(300.0, TempoRange::default()))
    }

    #[test]
    fn idle_until_started() {
        let (metronome, rx) = spawn_fast();
        assert!(!metronome.is_running());
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn clicks_after_start() {
        let (metronome, rx) = spawn_fast();
        metronome.start(fast_curve(), 4, 16, 0.0);

        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.measure_position, 0);
        assert_eq!(first.beat, 0.0);

        let second = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(second.measure_position, 1);
        assert!((second.hardware_time - first.hardware_time - 0.05).abs() < 1e-9);
        assert!(metronome.is_running());
    }

    #[test]
    fn stop_silences() {
        let (metronome, rx) = spawn_fast();
        metronome.start(fast_curve(), 4, 16, 0.0);
        rx.recv_timeout(Duration::from_secs(1)).unwrap();

        metronome.stop();
        assert!(!metronome.is_running());
        thread::sleep(Duration::from_millis(50));
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn stop_right_after_start_cancels_it() {
        let (emitted_tx, emitted_rx) = crossbeam_channel::unbounded::<Instant>();
        let sink: TriggerFn = Box::new(move |_| {
            let _ = emitted_tx.send(Instant::now());
        });
        let metronome = Metronome::spawn(
            MonotonicClock::new(),
            sink,
            MetronomeSettings::default(),
            SchedulerTiming::default(),
        )
        .unwrap();

        for _ in 0..20 {
            metronome.start(fast_curve(), 4, 16, 0.0);
            metronome.stop();
            let stopped_at = Instant::now();
            assert!(!metronome.is_running());

            thread::sleep(Duration::from_millis(60));
            assert!(!metronome.is_running());
            let late: Vec<Instant> = emitted_rx.try_iter().filter(|&t| t > stopped_at).collect();
            assert!(late.is_empty(), "{} clicks after stop", late.len());
        }
    }

    #[test]
    fn start_after_stop_still_plays() {
        let (metronome, rx) = spawn_fast();
        metronome.start(fast_curve(), 4, 16, 0.0);
        metronome.stop();
        metronome.start(fast_curve(), 4, 16, 0.0);
        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.measure_position, 0);
        assert!(metronome.is_running());
    }

    #[test]
    fn update_applies_to_later_clicks() {
        let (metronome, rx) = spawn_fast();
        metronome.update_settings(SettingsUpdate::default().with_volume(0.2));
        metronome.start(fast_curve(), 4, 16, 0.0);
        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!((first.gain - 0.2).abs() < 1e-6);
    }

    #[test]
    fn drop_joins_thread() {
        let (metronome, rx) = spawn_fast();
        metronome.start(fast_curve(), 4, 16, 0.0);
        drop(metronome);
        while rx.try_recv().is_ok() {}
        assert!(rx.recv().is_err());
    }
}
