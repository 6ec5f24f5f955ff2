//! Reusable request/response buffers.
//!
//! A batch acquires one `Exchange` for its whole lifetime and resets it before
//! every sub-request. The guard hands the pair back on drop, which also covers
//! early returns and panic unwinding.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use crate::batch::model::{SubRequest, SubResponse};

/// The buffer pair a batch works with.
#[derive(Debug, Default)]
pub struct Exchange {
    pub request: SubRequest,
    pub response: SubResponse,
}

impl Exchange {
    pub fn reset(&mut self) {
        self.request.reset();
        self.response.reset();
    }
}

/// Bounded free-list of `Exchange` buffers.
#[derive(Debug)]
pub struct ExchangePool {
    free: Mutex<Vec<Exchange>>,
    capacity: usize,
}

impl ExchangePool {
    /// Create a pool that keeps at most `capacity` idle buffers.
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Take a buffer pair, allocating a fresh one when the pool is empty.
    pub fn acquire(self: &Arc<Self>) -> PooledExchange {
        let exchange = self
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_default();
        PooledExchange {
            exchange: Some(exchange),
            pool: Arc::clone(self),
        }
    }

    /// Number of idle buffers.
    pub fn idle(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }

    fn release(&self, mut exchange: Exchange) {
        exchange.reset();
        // Poisoned lock: the buffer is dropped instead.
        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.capacity {
                free.push(exchange);
            }
        }
    }
}

/// Guard returning its `Exchange` to the pool when dropped.
#[derive(Debug)]
pub struct PooledExchange {
    exchange: Option<Exchange>,
    pool: Arc<ExchangePool>,
}

impl Deref for PooledExchange {
    type Target = Exchange;

    fn deref(&self) -> &Exchange {
        self.exchange.as_ref().expect("exchange present until drop")
    }
}

impl DerefMut for PooledExchange {
    fn deref_mut(&mut self) -> &mut Exchange {
        self.exchange.as_mut().expect("exchange present until drop")
    }
}

impl Drop for PooledExchange {
    fn drop(&mut self) {
        if let Some(exchange) = self.exchange.take() {
            self.pool.release(exchange);
        }
    }
}
