//! Batch pipeline.
//!
//! # Data Flow
//! ```text
//! inbound envelope (multipart/mixed | application/json)
//!     → content_type.rs (pick format, parse boundary)
//!     → reader/ (lazily yields SubRequests)
//!     → dispatch::Dispatcher (one outbound call per SubRequest)
//!     → writer/ (streams response or error elements)
//!     → outbound envelope, same format as the inbound one
//! ```
//!
//! # Design Decisions
//! - Sub-requests are dispatched sequentially; output order equals input order
//! - Errors before the envelope is opened are plain-text 4xx/5xx responses
//! - Once the envelope is streaming, failures become error elements and the
//!   envelope is still closed
//! - Request/response buffers come from a pool and are reused per element

pub mod content_type;
pub mod handler;
pub mod model;
pub mod pool;
pub mod reader;
pub mod writer;

pub use content_type::EnvelopeFormat;
pub use handler::BatchHandler;
pub use model::{HeaderList, SubRequest, SubResponse};

use crate::batch::reader::ReadError;
use crate::batch::writer::WriteError;

/// Failures that end a batch before its envelope starts streaming.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
    #[error("failed to parse multipart boundary")]
    MissingBoundary,
    #[error("failed to parse json body: {0}")]
    InvalidJson(String),
    #[error("failed to read request body: {0}")]
    Body(String),
    #[error("{0}")]
    Read(#[from] ReadError),
    #[error("failed to open response: {0}")]
    Open(WriteError),
    #[error("too many concurrent batches")]
    Overloaded,
}
