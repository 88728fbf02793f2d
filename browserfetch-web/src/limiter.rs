use std::sync::Arc;

use browserfetch_common::{FetchError, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Admission gate for in-flight fetch and screenshot operations.
///
/// Backed by a tokio [`Semaphore`], which queues waiters in FIFO order.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    permits: Arc<Semaphore>,
    ceiling: usize,
}

/// One admitted operation. Dropping the slot releases it.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    pub fn new(ceiling: usize) -> Self {
        let ceiling = ceiling.max(1);
        Self {
            permits: Arc::new(Semaphore::new(ceiling)),
            ceiling,
        }
    }

    /// Wait until a permit is free.
    pub async fn acquire(&self) -> Result<Slot> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FetchError::ResourceLimitExceeded("concurrency limiter closed".into()))?;
        tracing::trace!(available = self.available(), "limiter.acquired");
        Ok(Slot { _permit: permit })
    }

    /// Give the slot back. Consuming it makes a double release impossible.
    pub fn release(&self, slot: Slot) {
        drop(slot);
        tracing::trace!(available = self.available(), "limiter.released");
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.ceiling - self.available()
    }
}
