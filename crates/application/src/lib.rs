//! Application layer - Use cases and orchestration
//!
//! Contains the sync queue, conflict resolution, cache and vault services
//! and the port definitions they run on. Orchestrates domain objects and
//! infrastructure adapters.

pub mod backoff;
pub mod error;
pub mod ports;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::RetryPolicy;
pub use error::ApplicationError;
pub use ports::*;
pub use services::*;
