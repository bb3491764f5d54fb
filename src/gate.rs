//! Concurrency gate
//!
//! Admits a bounded number of simultaneous calculations and rejects the rest
//! immediately. Failing fast keeps overload visible to callers (who retry
//! with backoff) instead of queuing latency inside the engine.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// The calculation ceiling was reached; the call is retryable.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("calculation ceiling of {0} reached; retry with backoff")]
pub struct Overloaded(pub usize);

/// An admitted calculation slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

/// Bounded admission counter for concurrent calculations.
#[derive(Debug)]
pub(crate) struct ConcurrencyGate {
    permits: Arc<Semaphore>,
    ceiling: usize,
}

impl ConcurrencyGate {
    /// Creates a gate admitting at most `ceiling` concurrent calculations.
    pub(crate) fn new(ceiling: usize) -> Self {
        let ceiling = ceiling.max(1);

        Self {
            permits: Arc::new(Semaphore::new(ceiling)),
            ceiling,
        }
    }

    /// Claims a slot, or fails immediately when the ceiling is reached.
    ///
    /// # Errors
    ///
    /// Returns [`Overloaded`] when all slots are taken.
    pub(crate) fn admit(&self) -> Result<GatePermit, Overloaded> {
        match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => Ok(GatePermit { _permit: permit }),
            Err(_) => Err(Overloaded(self.ceiling)),
        }
    }

    /// Slots currently free.
    pub(crate) fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
