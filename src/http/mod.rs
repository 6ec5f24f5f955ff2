//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, batch slot)
//!     → request.rs (request ID)
//!     → batch::BatchHandler (envelope in, streamed envelope out)
//!     → response.rs (plain-text errors before the envelope opens)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeBatchId, X_REQUEST_ID};
pub use server::HttpServer;
