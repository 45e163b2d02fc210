//! Task polling with exponential backoff.
//!
//! `TaskPoller` is what `WorkerPool::run` (worker/pool.rs) drives on every
//! iteration of its claim loop: it backs off towards `max_interval` when
//! `claim_task` returns nothing (the store has no `"dispatch_task"`/
//! `"persist_task_state"` work queued) and resets to `min_interval` as soon
//! as it claims anything, so an idle worker doesn't hammer the store while
//! a busy one still drains its queue promptly.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, instrument, trace};

use crate::persistence::{ClaimedTask, StoreError, WorkflowEventStore};

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollerConfig {
    /// Minimum poll interval (when tasks are available)
    #[serde(with = "duration_millis")]
    pub min_interval: Duration,

    /// Maximum poll interval (when idle)
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier when no tasks found
    pub backoff_multiplier: f64,

    /// Maximum tasks to claim per poll
    pub batch_size: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            backoff_multiplier: 1.5,
            batch_size: 10,
        }
    }
}

impl PollerConfig {
    /// Create a new poller configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set minimum poll interval
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Set maximum poll interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Set batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }
}

/// Task poller with adaptive backoff
///
/// Polls for tasks with exponential backoff when idle and resets to
/// minimum interval when tasks are found.
pub struct TaskPoller {
    store: Arc<dyn WorkflowEventStore>,
    worker_id: String,
    activity_types: Vec<String>,
    config: PollerConfig,
    current_interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskPoller {
    /// Create a new task poller
    pub fn new(
        store: Arc<dyn WorkflowEventStore>,
        worker_id: String,
        activity_types: Vec<String>,
        config: PollerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            worker_id,
            activity_types,
            config: config.clone(),
            current_interval: config.min_interval,
            shutdown_rx,
        }
    }

    /// Poll for available tasks
    ///
    /// Returns claimed tasks and updates internal backoff state.
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn poll(&mut self, max_tasks: usize) -> Result<Vec<ClaimedTask>, PollerError> {
        // Check for shutdown
        if *self.shutdown_rx.borrow() {
            debug!("Poller shutdown requested");
            return Ok(vec![]);
        }

        let batch_size = max_tasks.min(self.config.batch_size);

        let tasks = self
            .store
            .claim_task(&self.worker_id, &self.activity_types, batch_size)
            .await
            .map_err(PollerError::Store)?;

        if tasks.is_empty() {
            // No tasks, increase backoff
            self.increase_backoff();
            trace!(
                interval_ms = self.current_interval.as_millis(),
                "No tasks found, backing off"
            );
        } else {
            // Found tasks, reset to minimum interval
            self.reset_backoff();
            debug!(count = tasks.len(), "Claimed tasks");
        }

        Ok(tasks)
    }

    /// Wait for the current backoff interval
    ///
    /// Returns early if shutdown is signaled.
    pub async fn wait(&mut self) -> bool {
        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(self.current_interval) => false,
            _ = shutdown_rx.changed() => {
                debug!("Shutdown signal received during wait");
                true
            }
        }
    }

    /// Get the current poll interval
    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Reset backoff to minimum interval
    fn reset_backoff(&mut self) {
        self.current_interval = self.config.min_interval;
    }

    /// Increase backoff interval
    fn increase_backoff(&mut self) {
        let new_interval = Duration::from_secs_f64(
            self.current_interval.as_secs_f64() * self.config.backoff_multiplier,
        );
        self.current_interval = new_interval.min(self.config.max_interval);
    }
}

/// Poller errors
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Worker shutdown
    #[error("worker is shutting down")]
    Shutdown,
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PollerConfig::default();
        assert_eq!(config.min_interval, Duration::from_millis(100));
        assert_eq!(config.max_interval, Duration::from_secs(5));
        assert_eq!(config.backoff_multiplier, 1.5);
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn test_config_builder() {
        let config = PollerConfig::new()
            .with_min_interval(Duration::from_millis(50))
            .with_max_interval(Duration::from_secs(10))
            .with_backoff_multiplier(2.0)
            .with_batch_size(20);

        assert_eq!(config.min_interval, Duration::from_millis(50));
        assert_eq!(config.max_interval, Duration::from_secs(10));
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.batch_size, 20);
    }

}
