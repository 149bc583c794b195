pub mod config;
pub mod merge;
pub mod queue;
pub mod remote;
pub mod scheduler;
pub mod session;
pub mod status;

pub use config::{
    FlushReason, FlushReport, LifecycleEvent, PersistenceConfig, SyncState, SyncStatus,
    PERSISTENCE_CONFIG_FILE,
};
pub use merge::{merge_projects, MergeOutcome, MergeStats};
pub use queue::{PendingQueue, QueueItem, SyncOperation};
pub use remote::{
    migrate_local, HybridRemote, MigrationReport, PushOutcome, RemoteAdapter, RemoteError,
    SkipReason,
};
pub use scheduler::{start_sync_scheduler, SchedulerMessage, SyncScheduler};
pub use session::{start_session, SessionStart};
pub use status::{project_status, StatusBoard};

/// File the pending queue is persisted to, inside the data directory
pub const SYNC_QUEUE_FILE: &str = "sync_queue.json";
