//! Periodic cleanup of expired limiter state.
//!
//! Sweeping only bounds memory. An expired entry that is still present
//! behaves exactly like one that was removed, so a late or skipped sweep
//! never changes a decision.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{Result, TurnstileError};

/// Something holding expirable state.
pub trait Sweep: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Remove expired entries, returning how many were removed.
    fn sweep(&self) -> usize;
}

/// Sweeps a set of registries on a fixed period.
pub struct Sweeper {
    targets: Vec<Arc<dyn Sweep>>,
    period: Duration,
}

impl Sweeper {
    pub fn new(period: Duration) -> Self {
        Self {
            targets: Vec::new(),
            period,
        }
    }

    /// Add a registry to sweep.
    pub fn with_target(mut self, target: Arc<dyn Sweep>) -> Self {
        self.targets.push(target);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sweep every target once, right now.
    pub fn sweep_now(&self) -> usize {
        self.targets
            .iter()
            .map(|target| {
                let removed = target.sweep();
                debug!(target = target.name(), removed, "Sweep pass");
                removed
            })
            .sum()
    }

    /// Spawn the sweep loop on the current tokio runtime.
    ///
    /// The loop runs until [`SweeperHandle::shutdown`] is awaited or the
    /// handle is dropped.
    pub fn start(self) -> Result<SweeperHandle> {
        if self.period.is_zero() {
            return Err(TurnstileError::Config(
                "sweep interval must be greater than 0".to_string(),
            ));
        }

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        info!(
            period_ms = self.period.as_millis() as u64,
            targets = self.targets.len(),
            "Starting sweeper"
        );

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_now();
                    }
                    _ = &mut stop_rx => {
                        info!("Sweeper stopped");
                        break;
                    }
                }
            }
        });

        Ok(SweeperHandle {
            stop: Some(stop_tx),
            task,
        })
    }
}

/// Owner of a running sweep loop.
pub struct SweeperHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the loop and wait for it to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(stop) = self.stop.take() {
            // The loop may already be gone; that is a finished shutdown too.
            let _ = stop.send(());
        }
        (&mut self.task)
            .await
            .map_err(|e| TurnstileError::Task(e.to_string()))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
