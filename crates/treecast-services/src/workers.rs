//! Owner of the long-running tasks of one peer.
//!
//! Every loop receives its own subscription to a shared shutdown broadcast.
//! `stop` fires it; `join` waits for the tasks to return.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Interval;

/// Shortest period a worker loop ticks at.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Interval for a worker loop. A zero period, which `tokio::time::interval`
/// rejects, is raised to [`MIN_PERIOD`].
pub fn ticker(period: Duration) -> Interval {
    tokio::time::interval(period.max(MIN_PERIOD))
}

pub struct Workers {
    shutdown: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Workers {
    pub fn new() -> Self {
        let (shutdown, _) = broadcast::channel::<()>(1);
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Spawn `task`, handing it a shutdown receiver.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, task: F)
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task(self.shutdown.subscribe()));
        tracing::debug!(task = name, "worker spawned");
        self.tasks.push((name, handle));
    }

    /// A receiver for code that is not a worker but should stop with them.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Sender half, for handing to something that may request shutdown.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task to finish. Panicked tasks are logged.
    pub async fn join(self) {
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                tracing::error!(task = name, error = %e, "worker did not exit cleanly");
            }
        }
    }
}

impl Default for Workers {
    fn default() -> Self {
        Self::new()
    }
}
