//! Admission control for concurrent batches.
//!
//! At most `max_workers` batches run at once. Up to `queue_capacity` more
//! may wait for a slot; a submission beyond that is rejected immediately
//! with [`ExamlensError::CapacityExceeded`] instead of waiting.

use crate::config::PoolConfig;
use crate::error::ExamlensError;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Semaphore, TryAcquireError};
use tracing::{debug, warn};

/// Bounded worker pool for batch requests.
#[derive(Debug)]
pub struct WorkerPool {
    permits: Semaphore,
    queued: AtomicUsize,
    config: PoolConfig,
}

/// Holds one queue slot; released on drop, including when the waiting
/// submission is cancelled.
struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Result<Self, ExamlensError> {
        config.validate()?;
        Ok(Self {
            permits: Semaphore::new(config.max_workers),
            queued: AtomicUsize::new(0),
            config,
        })
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Batches currently holding a worker slot.
    pub fn running(&self) -> usize {
        self.config.max_workers - self.permits.available_permits()
    }

    /// Batches waiting for a worker slot.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Run `task` once a worker slot is free.
    ///
    /// # Errors
    /// [`ExamlensError::CapacityExceeded`] when every worker is busy and the
    /// queue is full. The task is not started in that case.
    pub async fn submit<F: Future>(&self, task: F) -> Result<F::Output, ExamlensError> {
        let _permit = match self.permits.try_acquire() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                let limit = self.config.queue_capacity;
                if self
                    .queued
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |q| {
                        (q < limit).then_some(q + 1)
                    })
                    .is_err()
                {
                    let err = ExamlensError::CapacityExceeded {
                        running: self.running(),
                        queued: self.queued(),
                        limit,
                    };
                    warn!("Rejecting batch: {}", err);
                    return Err(err);
                }
                let slot = QueueSlot(&self.queued);
                debug!("All {} workers busy, batch queued", self.config.max_workers);
                let permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| ExamlensError::Internal("worker pool closed".into()))?;
                drop(slot);
                permit
            }
            Err(TryAcquireError::Closed) => {
                return Err(ExamlensError::Internal("worker pool closed".into()))
            }
        };

        Ok(task.await)
    }
}
