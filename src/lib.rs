//! Offline-first game design documents.
//!
//! Projects live in a local snapshot and are edited synchronously; a
//! background scheduler pushes changes to the remote store and a merge on
//! sign-in reconciles both sides by `updated_at`.

pub mod config;
pub mod server;
pub mod storage;
pub mod sync;
pub mod workspace;
