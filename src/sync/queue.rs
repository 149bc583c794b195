use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Projects with local changes not yet confirmed by the remote store
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PendingQueue {
    pub items: Vec<QueueItem>,
}

/// A single queued sync operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Unique ID for this queue item; a newer change to the same project
    /// gets a new item, so completing an older one never clears it
    pub id: Uuid,
    pub project_id: String,
    pub operation: SyncOperation,
    /// When this item was queued
    pub queued_at: DateTime<Utc>,
    /// Push attempts so far, carried over when the item is superseded
    pub attempts: u32,
    /// Last error message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Types of sync operations that can be queued
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SyncOperation {
    /// Push the full project (create or modify)
    Upsert,
    /// Remove the project remotely
    Delete,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Add an operation, replacing any pending one for the same project
    pub fn enqueue(&mut self, project_id: &str, operation: SyncOperation) -> Uuid {
        let attempts = self
            .items
            .iter()
            .find(|item| item.project_id == project_id)
            .map_or(0, |item| item.attempts);

        self.items.retain(|item| item.project_id != project_id);

        let id = Uuid::new_v4();
        self.items.push(QueueItem {
            id,
            project_id: project_id.to_string(),
            operation,
            queued_at: Utc::now(),
            attempts,
            last_error: None,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains_project(&self, project_id: &str) -> bool {
        self.items.iter().any(|item| item.project_id == project_id)
    }

    pub fn get(&self, item_id: Uuid) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Items for one project (at most one after deduplication)
    pub fn project_items(&self, project_id: &str) -> Vec<QueueItem> {
        self.items
            .iter()
            .filter(|item| item.project_id == project_id)
            .cloned()
            .collect()
    }

    /// Record an attempt on an item that is about to be pushed
    pub fn begin_attempt(&mut self, item_id: Uuid) {
        if let Some(item) = self.items.iter_mut().find(|i| i.id == item_id) {
            item.attempts += 1;
        }
    }

    /// Mark an item as completed (remove it). No-op if it was superseded.
    pub fn complete(&mut self, item_id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != item_id);
        self.items.len() != before
    }

    /// Keep an item pending and remember why
    pub fn fail(&mut self, item_id: Uuid, error: String) {
        if let Some(item) = self.items.iter_mut().find(|i| i.id == item_id) {
            item.last_error = Some(error);
        }
    }

    /// Load queue from file
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save queue to file
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)
    }
}
