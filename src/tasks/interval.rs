//! Repeating Task
//!
//! Runs an action on a fixed period on the tokio runtime, with explicit
//! start/stop and signals for observing the transitions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};

/// The work an [`Interval`] performs on every tick.
pub type Action = Arc<dyn Fn() -> Result<()> + Send + Sync>;

// == Signal ==
/// A one-way flag that can be polled or awaited.
#[derive(Debug, Clone)]
pub struct Signal {
    rx: watch::Receiver<bool>,
}

impl Signal {
    /// Returns true if the signal has been raised.
    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until the signal is raised.
    ///
    /// Returns immediately if it already is.
    pub async fn wait(mut self) {
        let _ = self.rx.wait_for(|raised| *raised).await;
    }
}

struct Running {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Signal senders plus the generation of the run allowed to drive them.
struct Lifecycle {
    generation: u64,
    started: watch::Sender<bool>,
    stopped: watch::Sender<bool>,
}

impl Lifecycle {
    /// Records a run entering or leaving its loop, unless a newer run has begun.
    fn mark(lifecycle: &Mutex<Lifecycle>, generation: u64, running: bool) -> bool {
        let lifecycle = lifecycle.lock();
        if lifecycle.generation != generation {
            return false;
        }
        lifecycle.started.send_replace(running);
        lifecycle.stopped.send_replace(!running);
        true
    }
}

// == Interval ==
/// A repeating task.
///
/// The first run happens one period after [`Interval::start`]. Missed ticks
/// are delayed rather than replayed. Dropping the interval stops the task.
pub struct Interval {
    every: Duration,
    action: Action,
    running: Mutex<Option<Running>>,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl Interval {
    // == Constructor ==
    /// Creates a stopped interval that runs `action` every `every`.
    pub fn new<F>(every: Duration, action: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        Self {
            every,
            action: Arc::new(action),
            running: Mutex::new(None),
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                generation: 0,
                started: watch::channel(false).0,
                stopped: watch::channel(false).0,
            })),
        }
    }

    /// The period between runs.
    pub fn every(&self) -> Duration {
        self.every
    }

    /// Returns true between a successful `start` and the matching `stop`.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    // == Start ==
    /// Spawns the repeating task on the current tokio runtime.
    ///
    /// # Errors
    /// - [`CacheError::AlreadyStarted`] if the task is running
    /// - [`CacheError::NoRuntime`] if called outside a tokio runtime
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running
            .as_ref()
            .is_some_and(|current| !current.handle.is_finished())
        {
            return Err(CacheError::AlreadyStarted);
        }
        let runtime =
            Handle::try_current().map_err(|err| CacheError::NoRuntime(err.to_string()))?;

        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let every = self.every;
        let action = Arc::clone(&self.action);
        let lifecycle = Arc::clone(&self.lifecycle);
        // A run still winding down from the last stop() no longer owns the signals.
        let generation = {
            let mut current = self.lifecycle.lock();
            current.generation += 1;
            current.started.send_replace(false);
            current.stopped.send_replace(false);
            current.generation
        };

        let handle = runtime.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            Lifecycle::mark(&lifecycle, generation, true);
            info!(every_ms = every.as_millis() as u64, generation, "Interval started");

            loop {
                tokio::select! {
                    // Fires on stop() and when the sender is dropped with the interval.
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        if let Err(err) = action() {
                            warn!(error = %err, "Interval action failed");
                        }
                    }
                }
            }

            if Lifecycle::mark(&lifecycle, generation, false) {
                info!(generation, "Interval stopped");
            } else {
                debug!(generation, "Superseded interval run exited");
            }
        });

        *running = Some(Running { shutdown, handle });
        Ok(())
    }

    // == Stop ==
    /// Signals the repeating task to exit.
    ///
    /// The task finishes asynchronously; await [`Interval::notify_stopped`]
    /// to observe it.
    ///
    /// # Errors
    /// - [`CacheError::NotStarted`] if the task is not running
    pub fn stop(&self) -> Result<()> {
        let running = self.running.lock().take().ok_or(CacheError::NotStarted)?;
        if running.shutdown.send(()).is_err() {
            debug!("Interval already exited before stop");
        }
        Ok(())
    }

    /// Raised once the task is running; cleared when it exits.
    pub fn notify_started(&self) -> Signal {
        Signal {
            rx: self.lifecycle.lock().started.subscribe(),
        }
    }

    /// Raised once the task has exited; cleared by the next start.
    pub fn notify_stopped(&self) -> Signal {
        Signal {
            rx: self.lifecycle.lock().stopped.subscribe(),
        }
    }
}

impl fmt::Debug for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interval")
            .field("every", &self.every)
            .field("running", &self.is_running())
            .finish()
    }
}
