//! Domain layer for the offline sync engine
//!
//! Contains the queue, conflict, cache and vault entities, the value objects
//! they are built from, and the events the engine publishes.
//! This layer performs no I/O.

pub mod entities;
pub mod errors;
pub mod events;
pub mod value_objects;

pub use entities::*;
pub use errors::DomainError;
pub use events::{SyncEvent, SyncEventKind};
pub use value_objects::*;
