//! Fire-and-forget tasks that outlive the event that spawned them.
//!
//! Tasks run detached on the runtime, so dropping the tracker (for example
//! with a retired worker) leaves pending writes running to completion.
//! Tasks must handle their own errors; panics are logged when reaped.

use std::future::Future;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tracing::warn;

/// Tracker for detached work such as opportunistic cache writes.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task onto the current runtime without waiting for it.
    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut handles = self.handles.lock().await;
        // Reap finished tasks so the list does not grow without bound.
        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut *handles)
            .into_iter()
            .partition(JoinHandle::is_finished);
        *handles = running;
        for handle in finished {
            if let Some(result) = handle.now_or_never() {
                log_join_error(result);
            }
        }
        handles.push(tokio::spawn(task));
    }

    /// Number of tasks not yet reaped.
    pub async fn pending(&self) -> usize {
        self.handles.lock().await.len()
    }

    /// Wait for every task spawned so far.
    pub async fn settle(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for result in join_all(handles).await {
            log_join_error(result);
        }
    }
}

fn log_join_error(result: Result<(), JoinError>) {
    if let Err(e) = result {
        warn!(error = %e, "Background task did not complete");
    }
}
