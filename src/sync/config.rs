use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File holding the persistence tunables, next to the project snapshot
pub const PERSISTENCE_CONFIG_FILE: &str = "gdd-persistence.json";

/// Lower bound for every timer so a bad value cannot spin the scheduler
const MIN_TIMER_MS: u64 = 50;

/// Timing and trigger settings for the sync scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceConfig {
    /// Quiet period after the last edit before a batch push
    pub debounce_ms: u64,
    /// Recurring flush, independent of the debounce
    pub autosave_interval_ms: u64,
    /// Delay before retrying items a flush left pending
    pub retry_backoff_ms: u64,
    pub sync_on_blur: bool,
    pub sync_on_visibility_hidden: bool,
    pub sync_on_page_hide: bool,
    pub sync_on_before_unload: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1500,
            autosave_interval_ms: 30_000,
            retry_backoff_ms: 5000,
            sync_on_blur: true,
            sync_on_visibility_hidden: true,
            sync_on_page_hide: true,
            sync_on_before_unload: true,
        }
    }
}

impl PersistenceConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(MIN_TIMER_MS))
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms.max(MIN_TIMER_MS))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.max(MIN_TIMER_MS))
    }

    /// Whether a lifecycle event should flush pending syncs
    pub fn flushes_on(&self, event: LifecycleEvent) -> bool {
        match event {
            LifecycleEvent::Blur => self.sync_on_blur,
            LifecycleEvent::VisibilityHidden => self.sync_on_visibility_hidden,
            LifecycleEvent::PageHide => self.sync_on_page_hide,
            LifecycleEvent::BeforeUnload => self.sync_on_before_unload,
        }
    }

    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(PERSISTENCE_CONFIG_FILE)
    }

    /// Load from the data directory, falling back to defaults
    pub fn load(data_dir: &Path) -> Result<Self, std::io::Error> {
        let path = Self::path(data_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)?;
        serde_json::from_str(&data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn save(&self, data_dir: &Path) -> Result<(), std::io::Error> {
        fs::create_dir_all(data_dir)?;
        let data = serde_json::to_string_pretty(self)?;
        fs::write(Self::path(data_dir), data)
    }
}

/// Application lifecycle signals that may flush pending syncs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleEvent {
    /// Window lost focus
    Blur,
    /// Document visibility turned hidden
    VisibilityHidden,
    PageHide,
    BeforeUnload,
}

/// Why a flush was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlushReason {
    Created,
    Debounce,
    Autosave,
    Retry,
    Lifecycle(LifecycleEvent),
    Manual,
    Shutdown,
}

/// Current sync state, as shown on the status badge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Nothing in flight and nothing confirmed yet
    #[default]
    Idle,
    /// A flush is in flight
    Syncing,
    /// Everything pending has been confirmed by the remote store
    Synced,
    /// Last flush hit a hard failure
    Error,
}

/// Observable sync status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub sync_status: SyncState,
    pub pending_sync_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_error: Option<String>,
}

/// Result of one flush
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    /// Items confirmed by the remote store
    pub pushed: usize,
    /// Items skipped because no identity was available
    pub skipped: usize,
    /// Items that failed with a hard error
    pub failed: usize,
    /// Items still pending afterwards
    pub pending: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
