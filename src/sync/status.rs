//! Observable sync status.
//!
//! The board owns the pending queue plus the facts about the last flush,
//! and republishes a freshly projected [`SyncStatus`] on a watch channel
//! after every transition.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use super::config::{FlushReport, SyncState, SyncStatus};
use super::queue::{PendingQueue, QueueItem, SyncOperation};

/// How one queued item fared during a flush
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// Confirmed by the remote store
    Pushed,
    /// No identity available; stays pending
    Skipped,
    /// Hard failure; stays pending
    Failed(String),
    /// Nothing left to push (project vanished locally)
    Dropped,
}

/// Project the status badge from the scheduler's facts
pub fn project_status(
    pending: usize,
    in_flight: bool,
    last_synced_at: Option<DateTime<Utc>>,
    last_error: Option<&str>,
) -> SyncStatus {
    let sync_status = if in_flight {
        SyncState::Syncing
    } else if last_error.is_some() {
        SyncState::Error
    } else if pending == 0 && last_synced_at.is_some() {
        SyncState::Synced
    } else {
        SyncState::Idle
    };

    SyncStatus {
        sync_status,
        pending_sync_count: pending,
        last_synced_at,
        last_sync_error: last_error.map(str::to_string),
    }
}

#[derive(Debug, Default)]
struct BoardState {
    queue: PendingQueue,
    in_flight: bool,
    last_synced_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    /// Queue items whose last push failed hard, oldest first
    failed: Vec<(Uuid, String)>,
}

impl BoardState {
    fn status(&self) -> SyncStatus {
        project_status(
            self.queue.len(),
            self.in_flight,
            self.last_synced_at,
            self.last_error.as_deref(),
        )
    }
}

/// Pending set and sync status shared by the store listener and the scheduler loop
pub struct StatusBoard {
    state: Mutex<BoardState>,
    tx: watch::Sender<SyncStatus>,
    queue_path: Option<PathBuf>,
}

impl StatusBoard {
    pub fn new(queue: PendingQueue, queue_path: Option<PathBuf>) -> Self {
        let state = BoardState {
            queue,
            ..Default::default()
        };
        let (tx, _rx) = watch::channel(state.status());
        Self {
            state: Mutex::new(state),
            tx,
            queue_path,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &BoardState) {
        self.tx.send_replace(state.status());
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> SyncStatus {
        self.lock().status()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn pending_items(&self) -> Vec<QueueItem> {
        self.lock().queue.items.clone()
    }

    /// Mark a project dirty (or deleted)
    pub fn enqueue(&self, project_id: &str, operation: SyncOperation) -> Uuid {
        let mut state = self.lock();
        let id = state.queue.enqueue(project_id, operation);
        self.publish(&state);
        id
    }

    /// Take the items to push and flip to `syncing`.
    /// `only_project` restricts the batch to one project.
    pub fn begin_flush(&self, only_project: Option<&str>) -> Vec<QueueItem> {
        let mut state = self.lock();

        let batch: Vec<QueueItem> = state
            .queue
            .items
            .iter()
            .filter(|item| only_project.map_or(true, |p| item.project_id == p))
            .cloned()
            .collect();

        if batch.is_empty() {
            return batch;
        }

        for item in &batch {
            state.queue.begin_attempt(item.id);
        }
        state.in_flight = true;
        self.publish(&state);
        batch
    }

    /// Fold the per-item outcomes back into the queue and status
    pub fn finish_flush(&self, results: Vec<(QueueItem, ItemOutcome)>) -> FlushReport {
        let mut report = FlushReport::default();
        let mut first_error: Option<String> = None;

        let mut state = self.lock();
        for (item, outcome) in results {
            match outcome {
                ItemOutcome::Pushed => {
                    state.queue.complete(item.id);
                    report.pushed += 1;
                }
                ItemOutcome::Dropped => {
                    state.queue.complete(item.id);
                }
                ItemOutcome::Skipped => {
                    state.queue.fail(item.id, "unauthenticated".to_string());
                    report.skipped += 1;
                }
                ItemOutcome::Failed(error) => {
                    state.queue.fail(item.id, error.clone());
                    state.failed.retain(|(id, _)| *id != item.id);
                    state.failed.push((item.id, error.clone()));
                    first_error.get_or_insert(error);
                    report.failed += 1;
                }
            }
        }

        state.in_flight = false;
        if report.pushed > 0 {
            state.last_synced_at = Some(Utc::now());
        }
        // A failure stays visible until its item is pushed or superseded
        let BoardState { queue, failed, .. } = &mut *state;
        failed.retain(|(id, _)| queue.get(*id).is_some());
        let last_error = first_error
            .clone()
            .or_else(|| failed.first().map(|(_, error)| error.clone()));
        state.last_error = last_error;
        report.pending = state.queue.len();
        report.error = first_error;

        self.save_queue(&state.queue);
        self.publish(&state);
        report
    }

    /// Persist the pending set if a queue path was configured
    pub fn save(&self) {
        let state = self.lock();
        self.save_queue(&state.queue);
    }

    fn save_queue(&self, queue: &PendingQueue) {
        if let Some(path) = &self.queue_path {
            if let Err(e) = queue.save(path) {
                log::warn!("Sync: failed to save pending queue to {:?}: {}", path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_rules() {
        let now = Utc::now();
        assert_eq!(project_status(0, false, None, None).sync_status, SyncState::Idle);
        assert_eq!(project_status(2, true, None, None).sync_status, SyncState::Syncing);
        assert_eq!(project_status(0, false, Some(now), None).sync_status, SyncState::Synced);
        assert_eq!(project_status(1, false, Some(now), None).sync_status, SyncState::Idle);
        let errored = project_status(1, false, Some(now), Some("network down"));
        assert_eq!(errored.sync_status, SyncState::Error);
        assert_eq!(errored.last_sync_error.as_deref(), Some("network down"));
    }

    #[test]
    fn test_enqueue_publishes_pending_count() {
        let board = StatusBoard::new(PendingQueue::new(), None);
        let rx = board.subscribe();

        board.enqueue("p1", SyncOperation::Upsert);
        board.enqueue("p2", SyncOperation::Upsert);

        assert_eq!(rx.borrow().pending_sync_count, 2);
    }

    #[test]
    fn test_flush_cycle() {
        let board = StatusBoard::new(PendingQueue::new(), None);
        let rx = board.subscribe();
        board.enqueue("p1", SyncOperation::Upsert);
        board.enqueue("p2", SyncOperation::Upsert);

        let batch = board.begin_flush(None);
        assert_eq!(batch.len(), 2);
        assert_eq!(rx.borrow().sync_status, SyncState::Syncing);

        let results = vec![
            (batch[0].clone(), ItemOutcome::Pushed),
            (batch[1].clone(), ItemOutcome::Skipped),
        ];
        let report = board.finish_flush(results);

        assert_eq!(report.pushed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.pending, 1);
        let status = rx.borrow().clone();
        assert_eq!(status.sync_status, SyncState::Idle);
        assert_eq!(status.pending_sync_count, 1);
        assert!(status.last_synced_at.is_some());
    }

    #[test]
    fn test_hard_failure_surfaces_error() {
        let board = StatusBoard::new(PendingQueue::new(), None);
        board.enqueue("p1", SyncOperation::Upsert);

        let batch = board.begin_flush(None);
        let report = board.finish_flush(vec![(batch[0].clone(), ItemOutcome::Failed("HTTP 500".to_string()))]);

        assert_eq!(report.failed, 1);
        let status = board.current();
        assert_eq!(status.sync_status, SyncState::Error);
        assert_eq!(status.pending_sync_count, 1);
        assert_eq!(status.last_sync_error.as_deref(), Some("HTTP 500"));
    }

    #[test]
    fn test_error_survives_flush_of_other_project() {
        let board = StatusBoard::new(PendingQueue::new(), None);
        board.enqueue("p1", SyncOperation::Upsert);
        let batch = board.begin_flush(None);
        board.finish_flush(vec![(batch[0].clone(), ItemOutcome::Failed("HTTP 422".to_string()))]);

        board.enqueue("p2", SyncOperation::Upsert);
        let batch = board.begin_flush(Some("p2"));
        board.finish_flush(vec![(batch[0].clone(), ItemOutcome::Pushed)]);

        let status = board.current();
        assert_eq!(status.sync_status, SyncState::Error);
        assert_eq!(status.last_sync_error.as_deref(), Some("HTTP 422"));

        let batch = board.begin_flush(Some("p1"));
        board.finish_flush(vec![(batch[0].clone(), ItemOutcome::Pushed)]);
        let status = board.current();
        assert_eq!(status.sync_status, SyncState::Synced);
        assert!(status.last_sync_error.is_none());
    }

    #[test]
    fn test_superseded_failure_clears_error() {
        let board = StatusBoard::new(PendingQueue::new(), None);
        board.enqueue("p1", SyncOperation::Upsert);
        let batch = board.begin_flush(None);
        board.finish_flush(vec![(batch[0].clone(), ItemOutcome::Failed("HTTP 422".to_string()))]);

        // A newer edit replaces the failed item; the next flush only skips it
        board.enqueue("p1", SyncOperation::Upsert);
        let batch = board.begin_flush(None);
        board.finish_flush(vec![(batch[0].clone(), ItemOutcome::Skipped)]);

        let status = board.current();
        assert_eq!(status.sync_status, SyncState::Idle);
        assert!(status.last_sync_error.is_none());
    }

    #[test]
    fn test_begin_flush_for_single_project() {
        let board = StatusBoard::new(PendingQueue::new(), None);
        board.enqueue("p1", SyncOperation::Upsert);
        board.enqueue("p2", SyncOperation::Upsert);

        let batch = board.begin_flush(Some("p2"));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].project_id, "p2");
    }
}
