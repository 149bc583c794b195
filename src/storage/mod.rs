pub mod backup;
mod local_store;
mod models;

pub use local_store::{
    lock_store, ChangeKind, ChangeListener, LocalStore, Result, SharedStore, StorageError,
    SNAPSHOT_FILE,
};
pub use models::*;
