//! Fixed-interval tick driver for date playback.
//!
//! The driver owns at most one background loop. Every run is tagged with a
//! caller-chosen generation; ticks carry it so the receiver can drop ticks
//! from a run it has already stopped. Stopping is synchronous from the
//! caller's side: once [`AnimationDriver::stop`] returns, the loop will not
//! invoke the sink again unless a tick was already executing.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Tick {
    pub generation: u64,
    /// 1-based index within the run.
    pub sequence: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Stop,
}

pub trait TickSink: Send + Sync + 'static {
    fn on_tick(&self, tick: Tick) -> TickOutcome;
}

impl<F> TickSink for F
where
    F: Fn(Tick) -> TickOutcome + Send + Sync + 'static,
{
    fn on_tick(&self, tick: Tick) -> TickOutcome {
        self(tick)
    }
}

struct ActiveRun {
    generation: u64,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct AnimationDriver {
    interval: Duration,
    runtime: Handle,
    active: Option<ActiveRun>,
}

impl AnimationDriver {
    /// A zero `interval` falls back to [`DEFAULT_TICK_INTERVAL`].
    pub fn new(interval: Duration, runtime: Handle) -> Self {
        let interval = if interval.is_zero() {
            warn!("zero tick interval, using default");
            DEFAULT_TICK_INTERVAL
        } else {
            interval
        };
        Self {
            interval,
            runtime,
            active: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts a loop for `generation`, replacing any run in progress.
    /// The first tick fires one interval after the call.
    pub fn start(&mut self, generation: u64, sink: Arc<dyn TickSink>) {
        self.stop();
        let (cancel, cancelled) = watch::channel(false);
        let task = self
            .runtime
            .spawn(run_loop(self.interval, generation, cancelled, sink));
        debug!(generation, interval_ms = self.interval.as_millis() as u64, "animation started");
        self.active = Some(ActiveRun {
            generation,
            cancel,
            task,
        });
    }

    /// Cancels the current run. Returns its generation if one was active.
    pub fn stop(&mut self) -> Option<u64> {
        let run = self.active.take()?;
        // A send error means the loop already exited on its own.
        let _ = run.cancel.send(true);
        drop(run.task);
        debug!(generation = run.generation, "animation stopped");
        Some(run.generation)
    }

    /// True while a loop is scheduled and has not exited.
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|run| !run.task.is_finished())
    }

    pub fn generation(&self) -> Option<u64> {
        self.active.as_ref().map(|run| run.generation)
    }
}

impl Drop for AnimationDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    period: Duration,
    generation: u64,
    mut cancelled: watch::Receiver<bool>,
    sink: Arc<dyn TickSink>,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sequence = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancelled.changed() => break,
            _ = ticker.tick() => {}
        }
        if *cancelled.borrow() {
            break;
        }
        sequence += 1;
        if sink.on_tick(Tick {
            generation,
            sequence,
        }) == TickOutcome::Stop
        {
            break;
        }
    }
    debug!(generation, ticks = sequence, "animation loop exited");
}
