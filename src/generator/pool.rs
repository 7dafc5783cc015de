//! Bounded-concurrency worker pool.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::generator::CancelToken;
use crate::models::{KothasetError, Result};

/// Semaphore-backed pool providing backpressure for provider calls.
///
/// At most `size` permits are ever out at once; the returned permit releases
/// its slot on drop.
pub struct WorkerPool {
    sem: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool with the given concurrency limit (minimum 1).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            sem: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Reserve one slot, or fail with `Cancelled` when the cancel token
    /// fires first.
    pub async fn acquire(&self, cancel: &CancelToken) -> Result<OwnedSemaphorePermit> {
        tokio::select! {
            _ = cancel.cancelled() => Err(KothasetError::Cancelled),
            permit = Arc::clone(&self.sem).acquire_owned() => {
                permit.map_err(|_| KothasetError::Cancelled)
            }
        }
    }

    /// Pool capacity.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of slots currently reserved.
    pub fn active(&self) -> usize {
        self.size - self.sem.available_permits()
    }
}
