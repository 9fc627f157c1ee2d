//! Value Objects - Immutable, identity-less domain primitives

mod conflict_id;
mod conflict_strategy;
mod connectivity;
mod draft_id;
mod entity_id;
mod entity_type;
mod queue_item_id;
mod sync_operation;
mod sync_status;

pub use conflict_id::ConflictId;
pub use conflict_strategy::{ConflictStrategy, ResolutionChoice};
pub use connectivity::Connectivity;
pub use draft_id::DraftId;
pub use entity_id::{EntityId, TEMP_ID_PREFIX};
pub use entity_type::EntityType;
pub use queue_item_id::QueueItemId;
pub use sync_operation::SyncOperation;
pub use sync_status::SyncStatus;
