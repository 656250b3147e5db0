use crate::{sampler::Sampler, snapshot::MetricsSnapshot, Error, Result};
use std::sync::{
    mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender},
    Arc, Condvar, Mutex, PoisonError,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const THREAD_NAME: &str = "gcpulse-sampler";
const TICK_POLL: Duration = Duration::from_millis(5);

/// Cancellation flag shared between a [`SamplingHandle`] and its thread.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.condvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `timeout` unless stopped first. Returns true if stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            // Too far out to represent: wait for stop alone.
            while !*stopped {
                stopped = self
                    .condvar
                    .wait(stopped)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            return true;
        };
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .condvar
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            stopped = guard;
        }
        true
    }
}

/// Decides when the sampling loop takes its next sample.
pub trait Pacer: Send + 'static {
    /// Block until the next sample is due. Returns false once the loop should exit.
    fn wait_next(&mut self, stop: &StopSignal) -> bool;
}

/// Waits a fixed interval before every sample, including the first one.
pub struct IntervalPacer {
    interval: Duration,
}

impl IntervalPacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Pacer for IntervalPacer {
    fn wait_next(&mut self, stop: &StopSignal) -> bool {
        !stop.wait_timeout(self.interval)
    }
}

/// Samples once per tick sent on its channel; used to drive the loop from tests.
pub struct TickPacer {
    ticks: Receiver<()>,
}

impl TickPacer {
    /// The sender blocks until the loop picks the tick up.
    pub fn channel() -> (SyncSender<()>, TickPacer) {
        let (tx, rx) = mpsc::sync_channel(0);
        (tx, TickPacer { ticks: rx })
    }
}

impl Pacer for TickPacer {
    fn wait_next(&mut self, stop: &StopSignal) -> bool {
        loop {
            if stop.is_stopped() {
                return false;
            }
            match self.ticks.recv_timeout(TICK_POLL) {
                Ok(()) => return !stop.is_stopped(),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }
}

/// Owns the background sampling thread. Dropping the handle stops and joins it.
#[derive(Debug)]
pub struct SamplingHandle {
    stop: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

impl SamplingHandle {
    /// Ask the loop to exit without waiting for it.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    pub fn stop_and_join(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.stop.stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| Error::Io(std::io::Error::other("sampler thread panicked"))),
            None => Ok(()),
        }
    }
}

impl Drop for SamplingHandle {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            error!("{err}");
        }
    }
}

/// Sample every `interval` on a dedicated thread until the handle is stopped.
///
/// The first sample is taken one full interval after the call returns.
pub fn start_periodic_sampling(sampler: Arc<Sampler>, interval: Duration) -> Result<SamplingHandle> {
    check_interval(interval)?;
    spawn_sampling_loop(sampler, IntervalPacer::new(interval))
}

/// Like [`start_periodic_sampling`], but every committed record is also sent,
/// in order, on the returned receiver. The receiver disconnects once the loop exits.
pub fn start_periodic_export(
    sampler: Arc<Sampler>,
    interval: Duration,
) -> Result<(SamplingHandle, Receiver<MetricsSnapshot>)> {
    check_interval(interval)?;
    spawn_exporting_loop(sampler, IntervalPacer::new(interval))
}

pub fn spawn_sampling_loop(sampler: Arc<Sampler>, pacer: impl Pacer) -> Result<SamplingHandle> {
    spawn_loop(sampler, pacer, None)
}

pub fn spawn_exporting_loop(
    sampler: Arc<Sampler>,
    pacer: impl Pacer,
) -> Result<(SamplingHandle, Receiver<MetricsSnapshot>)> {
    let (tx, rx) = mpsc::channel();
    let handle = spawn_loop(sampler, pacer, Some(tx))?;
    Ok((handle, rx))
}

fn check_interval(interval: Duration) -> Result<()> {
    if interval.is_zero() {
        return Err(Error::InvalidArgs(
            "sampling interval must be positive".to_string(),
        ));
    }
    Ok(())
}

fn spawn_loop(
    sampler: Arc<Sampler>,
    mut pacer: impl Pacer,
    published: Option<Sender<MetricsSnapshot>>,
) -> Result<SamplingHandle> {
    let stop = Arc::new(StopSignal::new());
    let thread_stop = stop.clone();
    let thread = thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || {
            debug!("sampling loop started");
            while pacer.wait_next(&thread_stop) {
                match sampler.sample() {
                    Ok(snapshot) => {
                        if let Some(tx) = &published {
                            if tx.send(snapshot).is_err() {
                                debug!(sequence = snapshot.sequence, "export receiver dropped");
                            }
                        }
                    }
                    Err(err) => warn!("{err}"),
                }
            }
            debug!("sampling loop stopped");
        })?;
    Ok(SamplingHandle {
        stop,
        thread: Some(thread),
    })
}
