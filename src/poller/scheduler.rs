//! Fleet-wide polling loop.
//!
//! Each cycle reads the directory and polls every device concurrently. A
//! device that fails, panics or stalls never affects its siblings, and no
//! cycle-level failure ends the loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

use crate::lifecycle::{LoopHandle, shutdown_requested};
use crate::poller::{DevicePoller, PollError, PollOutcome};
use crate::storage::StateStore;

/// Per-cycle tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Devices in the directory at cycle start.
    pub devices: usize,
    /// Reachable devices whose cycle committed.
    pub polled: usize,
    /// Devices recorded as down.
    pub unreachable: usize,
    /// Devices whose poll errored or panicked; nothing was committed for them.
    pub failed: usize,
}

/// Drives [`DevicePoller`] over the whole fleet on a fixed interval.
pub struct PollScheduler {
    poller: Arc<DevicePoller>,
    store: Arc<dyn StateStore>,
    interval: Duration,
    limiter: Option<Arc<Semaphore>>,
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("interval", &self.interval)
            .field(
                "max_concurrency",
                &self.limiter.as_ref().map(|l| l.available_permits()),
            )
            .finish_non_exhaustive()
    }
}

impl PollScheduler {
    pub fn new(poller: DevicePoller, store: Arc<dyn StateStore>, interval: Duration) -> Self {
        Self {
            poller: Arc::new(poller),
            store,
            interval,
            limiter: None,
        }
    }

    /// Cap the number of devices polled at the same time.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.limiter = Some(Arc::new(Semaphore::new(limit.max(1))));
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll every device in the directory once and wait for all of them.
    pub async fn run_cycle(&self) -> Result<CycleReport, PollError> {
        let devices = self.store.list_devices().await?;
        let mut report = CycleReport {
            devices: devices.len(),
            ..Default::default()
        };

        let mut tasks = JoinSet::new();
        for device in devices {
            let poller = Arc::clone(&self.poller);
            let limiter = self.limiter.clone();
            tasks.spawn(async move {
                // Held for the duration of this device's poll.
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire_owned().await.ok(),
                    None => None,
                };
                let result = AssertUnwindSafe(poller.poll(&device)).catch_unwind().await;
                (device.hostname, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Ok(PollOutcome::Reachable(_))))) => report.polled += 1,
                Ok((_, Ok(Ok(PollOutcome::Unreachable)))) => report.unreachable += 1,
                Ok((hostname, Ok(Err(e)))) => {
                    tracing::error!(device = %hostname, error = %e, "Device poll failed; cycle rolled back");
                    report.failed += 1;
                }
                Ok((hostname, Err(panic))) => {
                    tracing::error!(device = %hostname, panic = panic_message(&panic), "Device poll panicked");
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Device poll task did not complete");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Start the loop on the runtime.
    pub fn spawn(self) -> LoopHandle {
        LoopHandle::spawn("poll-scheduler", move |shutdown| self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval = ?self.interval, "Polling scheduler started");

        loop {
            let started = Instant::now();
            match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                Ok(Ok(report)) => tracing::info!(
                    devices = report.devices,
                    polled = report.polled,
                    unreachable = report.unreachable,
                    failed = report.failed,
                    elapsed = ?started.elapsed(),
                    "Polling cycle complete"
                ),
                Ok(Err(e)) => tracing::error!(error = %e, "Polling cycle failed"),
                Err(panic) => {
                    tracing::error!(panic = panic_message(&panic), "Polling cycle panicked")
                }
            }

            let pause = self.interval.saturating_sub(started.elapsed());
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        tracing::info!("Polling scheduler stopped");
    }
}

pub(crate) fn panic_message(panic: &Box<dyn Any + Send>) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
