//! Request and concurrency limits.
//!
//! # Responsibilities
//! - Cap the number of batches in flight (503 when saturated)
//! - Cap the inbound envelope size (413 on an oversized Content-Length,
//!   stream error once a chunked body crosses the limit)
//!
//! # Design Decisions
//! - Saturation is rejected immediately rather than queued
//! - A permit lives as long as the batch, including its streaming phase

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower_http::limit::RequestBodyLimitLayer;

use crate::observability::metrics;

/// Bounds concurrently running batches.
#[derive(Debug, Clone)]
pub struct BatchLimiter {
    slots: Arc<Semaphore>,
    max_batches: usize,
}

impl BatchLimiter {
    pub fn new(max_batches: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_batches)),
            max_batches,
        }
    }

    /// Claim a batch slot, or `None` when all are taken.
    pub fn try_acquire(&self) -> Option<BatchPermit> {
        let permit = Arc::clone(&self.slots).try_acquire_owned().ok()?;
        metrics::batch_started();
        Some(BatchPermit { _permit: permit })
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_batches(&self) -> usize {
        self.max_batches
    }
}

/// A claimed batch slot, released on drop.
#[derive(Debug)]
pub struct BatchPermit {
    _permit: OwnedSemaphorePermit,
}

impl Drop for BatchPermit {
    fn drop(&mut self) {
        metrics::batch_finished();
    }
}

/// Layer rejecting envelopes larger than `max_bytes`.
pub fn body_limit_layer(max_bytes: usize) -> RequestBodyLimitLayer {
    RequestBodyLimitLayer::new(max_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_rejects_when_saturated() {
        let limiter = BatchLimiter::new(2);
        let a = limiter.try_acquire().unwrap();
        let _b = limiter.try_acquire().unwrap();
        assert!(limiter.try_acquire().is_none());
        assert_eq!(limiter.available(), 0);

        drop(a);
        assert_eq!(limiter.available(), 1);
        assert!(limiter.try_acquire().is_some());
    }
}
