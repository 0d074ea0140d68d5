use std::sync::Mutex as StdMutex;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Tracks the connection tasks started by the runner.
///
/// Every task is spawned inside a span carrying the pool id, so log lines of one connection can
/// be told apart. Handles are kept until the runner either joins or aborts them at shutdown.
pub struct TaskManager {
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: StdMutex::new(Vec::new()),
        }
    }

    /// Spawns `fut` for pool `pool_id` and keeps its handle.
    #[track_caller]
    pub fn spawn<F>(&self, pool_id: u32, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let location = std::panic::Location::caller();
        let span = tracing::trace_span!(
            "pool",
            id = pool_id,
            file = location.file(),
            line = location.line(),
        );

        let handle = tokio::spawn(fut.instrument(span));
        self.lock().push(handle);
    }

    /// Waits for all managed tasks to complete.
    pub async fn join_all(&self) {
        let handles = std::mem::take(&mut *self.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Aborts all managed tasks without waiting for them.
    pub fn abort_all(&self) {
        for handle in self.lock().drain(..) {
            handle.abort();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
