//! Background loop lifecycle: cooperative shutdown with a bounded wait.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default timeout for graceful shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How a background loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The loop observed the signal and returned.
    Graceful,
    /// The loop did not return in time and was aborted.
    TimedOut,
    /// The loop task panicked or was cancelled before shutdown.
    Failed,
}

/// Handle to a spawned background loop.
pub struct LoopHandle {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHandle")
            .field("name", &self.name)
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

impl LoopHandle {
    /// Spawn `run` with a shutdown receiver it must poll between iterations.
    pub(crate) fn spawn<F, Fut>(name: &'static str, run: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(shutdown_rx));
        Self {
            name,
            shutdown_tx,
            task,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal shutdown and wait up to [`DEFAULT_SHUTDOWN_TIMEOUT`].
    pub async fn shutdown(self) -> ShutdownOutcome {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Signal shutdown and wait up to `timeout`, aborting the loop afterwards.
    pub async fn shutdown_with_timeout(mut self, timeout: Duration) -> ShutdownOutcome {
        // Receiver may already be gone if the loop exited on its own.
        let _ = self.shutdown_tx.send(true);

        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(())) => {
                tracing::info!(task = self.name, "Shutdown complete");
                ShutdownOutcome::Graceful
            }
            Ok(Err(e)) => {
                tracing::error!(task = self.name, error = %e, "Background task failed");
                ShutdownOutcome::Failed
            }
            Err(_) => {
                self.task.abort();
                tracing::warn!(task = self.name, ?timeout, "Shutdown timed out; task aborted");
                ShutdownOutcome::TimedOut
            }
        }
    }
}

/// Resolve once shutdown is requested or the sender is dropped.
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_graceful_shutdown() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let handle = LoopHandle::spawn("test-loop", move |mut shutdown| async move {
            loop {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(10)) => {}
                    _ = shutdown_requested(&mut shutdown) => break,
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.name(), "test-loop");
        assert_eq!(handle.shutdown().await, ShutdownOutcome::Graceful);
        assert!(ticks.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_shutdown_times_out_and_aborts() {
        // Ignores the signal entirely.
        let handle = LoopHandle::spawn("stubborn", |_shutdown| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let outcome = handle
            .shutdown_with_timeout(Duration::from_millis(50))
            .await;
        assert_eq!(outcome, ShutdownOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_shutdown_requested_on_dropped_sender() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), shutdown_requested(&mut rx))
            .await
            .unwrap();
    }
}
