//! Background sweep that expires idle identities.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::{self, Handle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::registry::Registry;
use crate::error::{FloodgateError, Result};

/// Where the sweep loop runs.
#[derive(Debug)]
enum Task {
    /// Spawned on the caller's runtime
    Tokio(JoinHandle<()>),
    /// Dedicated thread driving its own current-thread runtime
    Thread(thread::JoinHandle<()>),
}

/// Periodic task calling [`Registry::evict_idle`] until stopped.
///
/// Inside a Tokio runtime the task is spawned on it. Otherwise a dedicated
/// `floodgate-evictor` thread drives it. Dropping the evictor without calling
/// [`Evictor::stop`] also ends the task, because the stop channel closes.
#[derive(Debug)]
pub struct Evictor {
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<Task>>,
}

impl Evictor {
    /// Start sweeping `registry` every `frequency`, removing entries idle for
    /// at least `ttl`.
    pub fn spawn(registry: Arc<Registry>, frequency: Duration, ttl: Duration) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();

        info!(
            frequency_ms = frequency.as_millis() as u64,
            ttl_ms = ttl.as_millis() as u64,
            "Starting idle bucket evictor"
        );

        let task = match Handle::try_current() {
            Ok(handle) => Some(Task::Tokio(handle.spawn(run(registry, frequency, ttl, stop_rx)))),
            Err(_) => spawn_thread(registry, frequency, ttl, stop_rx),
        };

        Self {
            stop_tx: Mutex::new(Some(stop_tx)),
            task: Mutex::new(task),
        }
    }

    /// Signal the task to stop.
    ///
    /// A sweep already in progress runs to completion; no sweep starts after
    /// the signal is observed. Returns [`FloodgateError::AlreadyStopped`] on
    /// every call after the first.
    pub fn stop(&self) -> Result<()> {
        let Some(stop_tx) = self.stop_tx.lock().take() else {
            warn!("Evictor stop requested more than once");
            return Err(FloodgateError::AlreadyStopped);
        };

        // The receiver is gone only if the task already exited.
        let _ = stop_tx.send(());
        Ok(())
    }

    /// Wait for the task to exit. Returns immediately if already joined.
    pub async fn join(&self) {
        let task = self.task.lock().take();
        match task {
            Some(Task::Tokio(handle)) => {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Evictor task ended abnormally");
                }
            }
            Some(Task::Thread(handle)) => {
                match tokio::task::spawn_blocking(move || handle.join()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => warn!("Evictor thread panicked"),
                    Err(e) => warn!(error = %e, "Failed to join evictor thread"),
                }
            }
            None => {}
        }
    }

    /// Whether a stop has not yet been requested.
    pub fn is_running(&self) -> bool {
        self.stop_tx.lock().is_some()
    }
}

/// Drive the sweep loop without an ambient runtime.
fn spawn_thread(
    registry: Arc<Registry>,
    frequency: Duration,
    ttl: Duration,
    stop_rx: oneshot::Receiver<()>,
) -> Option<Task> {
    let rt = match runtime::Builder::new_current_thread().enable_time().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to build evictor runtime, idle buckets will not expire");
            return None;
        }
    };

    debug!("No Tokio runtime available, running evictor on its own thread");
    match thread::Builder::new()
        .name("floodgate-evictor".to_string())
        .spawn(move || rt.block_on(run(registry, frequency, ttl, stop_rx)))
    {
        Ok(handle) => Some(Task::Thread(handle)),
        Err(e) => {
            error!(error = %e, "Failed to spawn evictor thread, idle buckets will not expire");
            None
        }
    }
}

async fn run(
    registry: Arc<Registry>,
    frequency: Duration,
    ttl: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    // interval panics on a zero period
    let frequency = frequency.max(Duration::from_millis(1));
    let mut ticker = time::interval_at(Instant::now() + frequency, frequency);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                let removed = registry.evict_idle(ttl);
                if removed > 0 {
                    info!(
                        removed = removed,
                        remaining = registry.len(),
                        "Evicted idle token buckets"
                    );
                } else {
                    debug!(remaining = registry.len(), "Eviction sweep found nothing idle");
                }
            }
        }
    }

    info!("Idle bucket evictor stopped");
}
