//! # Dispatch Executor
//!
//! Handler invocations and transport writes run on a bounded pool: every job
//! waits for a semaphore permit and then runs on tokio's blocking pool, so a
//! slow device handler can neither stall a timer nor fan out without limit.
//!
//! Resend, pop-wait and watcher timers are plain tasks on the same runtime.
//! They sleep in fixed ticks and observe a [`CancellationToken`] at every tick.

use crate::config::ExecutorConfig;
use crate::error::{BidCoSError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

#[derive(Debug, Clone)]
pub struct Executor {
    handle: Handle,
    permits: Arc<Semaphore>,
    limit: usize,
}

impl Executor {
    pub fn new(handle: Handle, config: &ExecutorConfig) -> Self {
        let limit = config.max_concurrent_dispatches.max(1);
        Self {
            handle,
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Build an executor on the runtime the caller is running on.
    pub fn current(config: &ExecutorConfig) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| BidCoSError::ConfigError(format!("No tokio runtime available: {e}")))?;
        Ok(Self::new(handle, config))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Queue a blocking job. Jobs beyond the concurrency limit wait for a permit.
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.handle.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                trace!("Executor closed, dropping job");
                return;
            };
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                error!(error = %e, "Dispatched job panicked");
            }
        });
    }

    /// Spawn a timer task.
    pub fn spawn_timer<F>(&self, timer: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(timer)
    }

    /// Number of jobs currently allowed to start without waiting.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Reject all jobs that have not started yet.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

/// Sleep `ticks` times `tick`, checking `token` at every tick boundary.
///
/// Returns `false` as soon as the token is cancelled.
pub async fn sleep_ticks(token: &CancellationToken, tick: Duration, ticks: u32) -> bool {
    for _ in 0..ticks {
        tokio::select! {
            _ = token.cancelled() => return false,
            _ = tokio::time::sleep(tick) => {}
        }
    }
    !token.is_cancelled()
}
