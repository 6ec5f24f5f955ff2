//! Outbound HTTP dispatch.
//!
//! # Data Flow
//! ```text
//! SubRequest (method, url, headers, body)
//!     → Dispatcher::dispatch
//!     → SubResponse (status, headers, body) | DispatchError
//! ```
//!
//! # Design Decisions
//! - One call per sub-request; no retries, caching or deduplication
//! - A `DispatchError` is final for that sub-request and becomes an error
//!   element in the envelope
//! - The dispatcher is shared by all batches and must be `Send + Sync`

pub mod client;

pub use client::HyperDispatcher;

use async_trait::async_trait;

use crate::batch::model::{SubRequest, SubResponse};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid method: {0}")]
    InvalidMethod(String),
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid header {0}")]
    InvalidHeader(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("request timed out after {0} ms")]
    Timeout(u64),
}

/// Performs one outbound HTTP exchange.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Send `req` and fill `res`, which the caller has reset.
    async fn dispatch(&self, req: &SubRequest, res: &mut SubResponse)
        -> Result<(), DispatchError>;
}
