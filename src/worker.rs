//! Supervised background workers with explicit start/stop hooks.

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a spawned background worker. Dropping it detaches the worker;
/// call `stop()` for a clean shutdown.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn new(shutdown: watch::Sender<bool>, handle: JoinHandle<()>) -> Self {
        WorkerHandle { shutdown, handle }
    }

    /// Signal shutdown and wait for the worker to finish its current cycle.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }

    /// Hard-cancel without waiting.
    pub fn abort(self) {
        let _ = self.shutdown.send(true);
        self.handle.abort();
    }
}
