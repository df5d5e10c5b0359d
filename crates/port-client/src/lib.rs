//! Minimal Port REST client: client-credential authentication and action run
//! status updates. Implements `StatusReporter` for the dispatcher.

mod client;
mod error;

pub use client::{PortClient, RetryPolicy, DEFAULT_BASE_URL};
pub use error::{PortError, Result};
