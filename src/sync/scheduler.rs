use std::collections::HashMap;
use std::future::pending;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};

use super::config::{FlushReason, FlushReport, LifecycleEvent, PersistenceConfig, SyncStatus};
use super::queue::{PendingQueue, QueueItem, SyncOperation};
use super::remote::{PushOutcome, RemoteAdapter};
use super::status::{ItemOutcome, StatusBoard};
use crate::storage::{lock_store, ChangeKind, ChangeListener, Project, SharedStore};

/// Messages to control the sync scheduler
#[derive(Debug)]
pub enum SchedulerMessage {
    /// Local edit; restart the debounce window
    Nudge,
    /// Push one project immediately, bypassing the debounce
    PushNow(String),
    /// Flush everything pending now
    Flush {
        reason: FlushReason,
        reply: Option<oneshot::Sender<FlushReport>>,
    },
    Lifecycle(LifecycleEvent),
    /// Identity changed (login/logout); timers are recreated
    SetUser(Option<String>),
    /// Persistence settings changed; timers are recreated
    Reconfigure(PersistenceConfig),
    /// Final flush, save the queue, stop
    Shutdown { reply: oneshot::Sender<FlushReport> },
}

/// Handle for the sync scheduler. Cheap to clone; also the store's change listener.
#[derive(Clone)]
pub struct SyncScheduler {
    sender: mpsc::UnboundedSender<SchedulerMessage>,
    board: Arc<StatusBoard>,
}

impl SyncScheduler {
    fn send(&self, message: SchedulerMessage) {
        if self.sender.send(message).is_err() {
            log::debug!("Sync scheduler: loop has stopped, message dropped");
        }
    }

    /// Queue a project for the next debounced batch
    pub fn mark_dirty(&self, project_id: &str) {
        self.board.enqueue(project_id, SyncOperation::Upsert);
        self.send(SchedulerMessage::Nudge);
    }

    /// Queue a project and push it without waiting for the debounce
    pub fn push_now(&self, project_id: &str) {
        self.board.enqueue(project_id, SyncOperation::Upsert);
        self.send(SchedulerMessage::PushNow(project_id.to_string()));
    }

    /// Queue a remote delete for a project removed locally
    pub fn mark_deleted(&self, project_id: &str) {
        self.board.enqueue(project_id, SyncOperation::Delete);
        self.send(SchedulerMessage::Nudge);
    }

    pub fn notify_lifecycle(&self, event: LifecycleEvent) {
        self.send(SchedulerMessage::Lifecycle(event));
    }

    /// Flush everything pending and wait for the result
    pub async fn sync_now(&self) -> FlushReport {
        let (reply, rx) = oneshot::channel();
        self.send(SchedulerMessage::Flush {
            reason: FlushReason::Manual,
            reply: Some(reply),
        });
        rx.await.unwrap_or_else(|_| self.idle_report())
    }

    pub fn set_user(&self, user_id: Option<String>) {
        self.send(SchedulerMessage::SetUser(user_id));
    }

    pub fn reconfigure(&self, config: PersistenceConfig) {
        self.send(SchedulerMessage::Reconfigure(config));
    }

    /// Subscribe to status changes
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.board.subscribe()
    }

    pub fn current_status(&self) -> SyncStatus {
        self.board.current()
    }

    pub fn pending_count(&self) -> usize {
        self.board.pending_count()
    }

    pub fn pending_items(&self) -> Vec<QueueItem> {
        self.board.pending_items()
    }

    /// Final flush, then stop the loop
    pub async fn shutdown(&self) -> FlushReport {
        let (reply, rx) = oneshot::channel();
        self.send(SchedulerMessage::Shutdown { reply });
        rx.await.unwrap_or_else(|_| self.idle_report())
    }

    fn idle_report(&self) -> FlushReport {
        FlushReport {
            pending: self.board.pending_count(),
            ..Default::default()
        }
    }
}

impl ChangeListener for SyncScheduler {
    fn project_changed(&self, project_id: &str, kind: ChangeKind) {
        match kind {
            ChangeKind::Created => self.push_now(project_id),
            ChangeKind::Updated => self.mark_dirty(project_id),
            ChangeKind::Deleted => self.mark_deleted(project_id),
        }
    }
}

/// Start the sync scheduler.
///
/// Spawns the loop on the current tokio runtime. The pending queue is
/// restored from `queue_path` when given and saved back after every flush.
pub fn start_sync_scheduler(
    store: SharedStore,
    remote: Arc<dyn RemoteAdapter>,
    config: PersistenceConfig,
    queue_path: Option<PathBuf>,
) -> SyncScheduler {
    let queue = match &queue_path {
        Some(path) => PendingQueue::load(path).unwrap_or_else(|e| {
            log::warn!("Sync scheduler: discarding unreadable queue {:?}: {}", path, e);
            PendingQueue::new()
        }),
        None => PendingQueue::new(),
    };
    if !queue.is_empty() {
        log::info!("Sync scheduler: restored {} pending item(s)", queue.len());
    }

    let board = Arc::new(StatusBoard::new(queue, queue_path));
    let (tx, rx) = mpsc::unbounded_channel();

    let state = SchedulerLoop {
        store,
        remote,
        board: board.clone(),
        autosave: autosave_timer(&config),
        config,
        user_id: None,
        debounce_at: None,
        retry_at: None,
    };
    tokio::spawn(state.run(rx));

    SyncScheduler { sender: tx, board }
}

fn autosave_timer(config: &PersistenceConfig) -> Interval {
    let period = config.autosave_interval();
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Sleep until the deadline, or forever when there is none
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

struct SchedulerLoop {
    store: SharedStore,
    remote: Arc<dyn RemoteAdapter>,
    board: Arc<StatusBoard>,
    config: PersistenceConfig,
    user_id: Option<String>,
    debounce_at: Option<Instant>,
    retry_at: Option<Instant>,
    autosave: Interval,
}

impl SchedulerLoop {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<SchedulerMessage>) {
        log::info!("Sync scheduler started");

        loop {
            tokio::select! {
                message = receiver.recv() => {
                    let Some(message) = message else {
                        log::info!("Sync scheduler: all handles dropped, stopping");
                        self.board.save();
                        break;
                    };
                    if !self.handle(message).await {
                        break;
                    }
                }
                _ = wait_until(self.debounce_at) => {
                    self.debounce_at = None;
                    self.flush(FlushReason::Debounce, None).await;
                }
                _ = wait_until(self.retry_at) => {
                    self.retry_at = None;
                    self.flush(FlushReason::Retry, None).await;
                }
                _ = self.autosave.tick() => {
                    if self.board.pending_count() > 0 {
                        self.flush(FlushReason::Autosave, None).await;
                    }
                }
            }
        }

        log::info!("Sync scheduler stopped");
    }

    /// Returns false when the loop should stop
    async fn handle(&mut self, message: SchedulerMessage) -> bool {
        match message {
            SchedulerMessage::Nudge => {
                self.debounce_at = Some(Instant::now() + self.config.debounce());
            }
            SchedulerMessage::PushNow(project_id) => {
                self.flush(FlushReason::Created, Some(project_id.as_str())).await;
            }
            SchedulerMessage::Flush { reason, reply } => {
                self.debounce_at = None;
                let report = self.flush(reason, None).await;
                if let Some(reply) = reply {
                    let _ = reply.send(report);
                }
            }
            SchedulerMessage::Lifecycle(event) => {
                if !self.config.flushes_on(event) {
                    log::debug!("Sync scheduler: {:?} flush disabled", event);
                } else if self.board.pending_count() > 0 {
                    log::info!("Sync scheduler: flushing on {:?}", event);
                    self.debounce_at = None;
                    self.flush(FlushReason::Lifecycle(event), None).await;
                }
            }
            SchedulerMessage::SetUser(user_id) => {
                log::info!(
                    "Sync scheduler: identity changed to {}, resetting timers",
                    user_id.as_deref().unwrap_or("<none>")
                );
                self.user_id = user_id;
                self.reset_timers();
            }
            SchedulerMessage::Reconfigure(config) => {
                log::info!("Sync scheduler: settings changed, resetting timers");
                self.config = config;
                self.reset_timers();
            }
            SchedulerMessage::Shutdown { reply } => {
                let report = self.flush(FlushReason::Shutdown, None).await;
                self.board.save();
                let _ = reply.send(report);
                return false;
            }
        }
        true
    }

    fn reset_timers(&mut self) {
        self.retry_at = None;
        self.autosave = autosave_timer(&self.config);
        self.debounce_at = if self.user_id.is_some() && self.board.pending_count() > 0 {
            Some(Instant::now() + self.config.debounce())
        } else {
            None
        };
    }

    async fn flush(&mut self, reason: FlushReason, only_project: Option<&str>) -> FlushReport {
        let Some(user_id) = self.user_id.clone() else {
            log::debug!("Sync scheduler: no signed-in user, {:?} flush left pending", reason);
            return FlushReport {
                pending: self.board.pending_count(),
                ..Default::default()
            };
        };

        let batch = self.board.begin_flush(only_project);
        if batch.is_empty() {
            return FlushReport::default();
        }
        log::info!("Sync scheduler: {:?} flush of {} item(s)", reason, batch.len());

        let projects: HashMap<String, Project> = lock_store(&self.store)
            .freshest_projects()
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let pushes = batch.into_iter().map(|item| {
            let project = projects.get(&item.project_id);
            let remote = self.remote.as_ref();
            let user_id = user_id.as_str();
            async move {
                let outcome = push_item(remote, &item, project, user_id).await;
                (item, outcome)
            }
        });
        let results = join_all(pushes).await;

        let report = self.board.finish_flush(results);
        if report.failed > 0 || report.skipped > 0 {
            let backoff = self.config.retry_backoff();
            log::info!(
                "Sync scheduler: {} item(s) still pending, retrying in {:?}",
                report.pending,
                backoff
            );
            self.retry_at = Some(Instant::now() + backoff);
        } else {
            log::info!("Sync scheduler: pushed {} item(s)", report.pushed);
        }
        report
    }
}

async fn push_item(
    remote: &dyn RemoteAdapter,
    item: &QueueItem,
    project: Option<&Project>,
    user_id: &str,
) -> ItemOutcome {
    let result = match item.operation {
        SyncOperation::Upsert => match project {
            Some(project) => remote.upsert_project(project, Some(user_id)).await,
            None => {
                log::warn!(
                    "Sync scheduler: project {} no longer exists locally, dropping queued push",
                    item.project_id
                );
                return ItemOutcome::Dropped;
            }
        },
        SyncOperation::Delete => remote.delete_project(&item.project_id, Some(user_id)).await,
    };

    match result {
        Ok(PushOutcome::Pushed) => ItemOutcome::Pushed,
        Ok(PushOutcome::Skipped(reason)) => {
            log::debug!("Sync scheduler: push of {} skipped ({:?})", item.project_id, reason);
            ItemOutcome::Skipped
        }
        Err(e) => {
            log::error!("Sync scheduler: push of {} failed: {}", item.project_id, e);
            ItemOutcome::Failed(e.to_string())
        }
    }
}
