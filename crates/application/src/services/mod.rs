//! Application services - Use case implementations

mod cache_manager;
mod conflict_resolver;
mod draft_vault;
mod event_notifier;
mod sync_engine;
mod sync_queue_service;

pub use cache_manager::CacheManager;
pub use conflict_resolver::{ConflictResolver, ConflictStrategies};
pub use draft_vault::{DraftSummary, DraftVault, OpenedDraft};
pub use event_notifier::{EventHandler, EventNotifier};
pub use sync_engine::{SyncEngine, SyncEngineConfig, SyncEnginePorts};
pub use sync_queue_service::{DrainReport, SyncQueueService};
