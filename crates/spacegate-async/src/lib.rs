//! # Spacegate Async
//!
//! Coordination primitives shared by the space state machine and the
//! lifecycle manager:
//!
//! - [`Lock`] - FIFO async mutual exclusion with optional hold diagnostics
//! - [`Context`] - Cancellation scope that owns spawned work
//! - [`with_timeout`] - Deadline wrapper

pub mod context;
pub mod error;
pub mod lock;
pub mod timeout;

pub use context::Context;
pub use error::{AsyncError, Result};
pub use lock::{Lock, LockGuard};
pub use timeout::with_timeout;
