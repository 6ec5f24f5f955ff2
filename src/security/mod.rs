//! Security and resource protection subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming batch
//!     → limits.rs (envelope size cap, concurrent batch slots)
//!     → batch handler
//! ```
//!
//! # Design Decisions
//! - Limits are enforced before any outbound call is made
//! - Authentication is left to the network in front of the proxy

pub mod limits;

pub use limits::{BatchLimiter, BatchPermit};
