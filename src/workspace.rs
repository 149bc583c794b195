//! The editor session: local store, scheduler and remote wired together.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::RemoteConfig;
use crate::storage::{lock_store, LocalStore, Project, Result, SharedStore};
use crate::sync::remote::{
    HybridRemote, PushOutcome, RestRowClient, SessionIdentity, SkipReason, SyncEndpointClient,
};
use crate::sync::{
    start_session, start_sync_scheduler, FlushReport, LifecycleEvent, PersistenceConfig,
    RemoteAdapter, RemoteError, SessionStart, SyncScheduler, SyncStatus, SYNC_QUEUE_FILE,
};

/// Remote used when no table API is configured: nothing to read, nothing sent
struct DetachedRemote;

#[async_trait]
impl RemoteAdapter for DetachedRemote {
    async fn fetch_all(&self) -> Option<Vec<Project>> {
        None
    }

    async fn upsert_project(
        &self,
        _project: &Project,
        _user_hint: Option<&str>,
    ) -> std::result::Result<PushOutcome, RemoteError> {
        Ok(PushOutcome::Skipped(SkipReason::Unauthenticated))
    }

    async fn delete_project(
        &self,
        _project_id: &str,
        _user_hint: Option<&str>,
    ) -> std::result::Result<PushOutcome, RemoteError> {
        Ok(PushOutcome::Skipped(SkipReason::Unauthenticated))
    }
}

/// Remote adapter plus the identity it resolves sessions from
pub struct RemoteConnection {
    pub remote: Arc<dyn RemoteAdapter>,
    pub identity: Arc<SessionIdentity>,
}

/// Build the remote adapter described by the config
pub fn connect_remote(config: &RemoteConfig, data_dir: &Path) -> RemoteConnection {
    let identity = Arc::new(SessionIdentity::new(config.auth_url.clone(), data_dir));

    let remote: Arc<dyn RemoteAdapter> = match &config.rest_url {
        Some(rest_url) => Arc::new(HybridRemote::new(
            config.sync_endpoint.clone().map(SyncEndpointClient::new),
            Arc::new(RestRowClient::new(rest_url.clone())),
            identity.clone(),
        )),
        None => {
            log::info!("Sync: no remote configured, running local-only");
            Arc::new(DetachedRemote)
        }
    };

    RemoteConnection { remote, identity }
}

pub struct Workspace {
    data_dir: PathBuf,
    store: SharedStore,
    remote: Arc<dyn RemoteAdapter>,
    scheduler: SyncScheduler,
    config: PersistenceConfig,
    user_id: Option<String>,
}

impl Workspace {
    /// Open the store under `data_dir` and start the scheduler.
    /// Must be called from within a tokio runtime.
    pub fn open(data_dir: PathBuf, remote: Arc<dyn RemoteAdapter>) -> Result<Self> {
        let store = LocalStore::open(data_dir.clone())?;
        let config = PersistenceConfig::load(&data_dir).unwrap_or_else(|e| {
            log::warn!("Sync: unreadable persistence settings, using defaults: {}", e);
            PersistenceConfig::default()
        });

        let store: SharedStore = Arc::new(Mutex::new(store));
        let scheduler = start_sync_scheduler(
            store.clone(),
            remote.clone(),
            config.clone(),
            Some(data_dir.join(SYNC_QUEUE_FILE)),
        );
        lock_store(&store).attach_listener(Arc::new(scheduler.clone()));

        Ok(Self {
            data_dir,
            store,
            remote,
            scheduler,
            config,
            user_id: None,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Start an authenticated session: pull, merge, queue local winners
    pub async fn sign_in(&mut self, user_id: &str) -> Result<SessionStart> {
        self.user_id = Some(user_id.to_string());
        start_session(
            &self.store,
            self.remote.as_ref(),
            &self.scheduler,
            user_id,
            &self.data_dir,
        )
        .await
    }

    /// Stop syncing; pending changes stay queued for the next sign-in
    pub fn sign_out(&mut self) {
        self.user_id = None;
        self.scheduler.set_user(None);
    }

    pub async fn sync_now(&self) -> FlushReport {
        self.scheduler.sync_now().await
    }

    pub fn notify_lifecycle(&self, event: LifecycleEvent) {
        self.scheduler.notify_lifecycle(event);
    }

    pub fn persistence_config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// Persist new settings next to the snapshot and recreate the timers
    pub fn set_persistence_config(&mut self, config: PersistenceConfig) -> Result<()> {
        config.save(&self.data_dir)?;
        self.scheduler.reconfigure(config.clone());
        self.config = config;
        Ok(())
    }

    pub fn status(&self) -> SyncStatus {
        self.scheduler.current_status()
    }

    /// Final flush (as on page teardown) and stop the scheduler
    pub async fn shutdown(self) -> FlushReport {
        lock_store(&self.store).detach_listener();
        self.scheduler.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::remote::{IdentityProvider, MemoryRowStore, RowStore, Session};
    use crate::sync::SyncState;
    use tempfile::TempDir;

    struct Fixed(Session);

    #[async_trait]
    impl IdentityProvider for Fixed {
        fn cached_session(&self) -> Option<Session> {
            Some(self.0.clone())
        }

        async fn fetch_session(&self) -> crate::sync::remote::Result<Option<Session>> {
            Ok(Some(self.0.clone()))
        }
    }

    fn alice() -> Session {
        Session {
            user_id: "alice".to_string(),
            access_token: "alice-token".to_string(),
        }
    }

    #[tokio::test]
    async fn test_edit_sign_in_and_sync() {
        let temp = TempDir::new().unwrap();
        let rows = Arc::new(MemoryRowStore::new());
        let remote = Arc::new(HybridRemote::new(None, rows.clone(), Arc::new(Fixed(alice()))));

        let mut workspace = Workspace::open(temp.path().to_path_buf(), remote).unwrap();
        let project_id = lock_store(workspace.store()).add_project("Tidebreak", "").unwrap();
        lock_store(workspace.store())
            .add_section(&project_id, "Mechanics", "", None)
            .unwrap();

        workspace.sign_in("alice").await.unwrap();
        let report = workspace.sync_now().await;

        assert_eq!(report.pending, 0);
        assert_eq!(workspace.status().sync_status, SyncState::Synced);
        let remote_projects = rows.fetch_projects(&alice()).await.unwrap();
        assert_eq!(remote_projects.len(), 1);
        assert_eq!(rows.section_count(), 1);

        workspace.shutdown().await;
    }

    #[tokio::test]
    async fn test_persistence_settings_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let mut workspace = Workspace::open(temp.path().to_path_buf(), Arc::new(DetachedRemote)).unwrap();

        let config = PersistenceConfig {
            debounce_ms: 900,
            sync_on_blur: false,
            ..Default::default()
        };
        workspace.set_persistence_config(config.clone()).unwrap();
        workspace.shutdown().await;

        let reopened = Workspace::open(temp.path().to_path_buf(), Arc::new(DetachedRemote)).unwrap();
        assert_eq!(reopened.persistence_config(), &config);
        reopened.shutdown().await;
    }

    #[tokio::test]
    async fn test_pending_changes_survive_restart_while_signed_out() {
        let temp = TempDir::new().unwrap();
        let workspace = Workspace::open(temp.path().to_path_buf(), Arc::new(DetachedRemote)).unwrap();
        lock_store(workspace.store()).add_project("Offline work", "").unwrap();
        let report = workspace.shutdown().await;
        assert_eq!(report.pending, 1);

        let reopened = Workspace::open(temp.path().to_path_buf(), Arc::new(DetachedRemote)).unwrap();
        assert_eq!(reopened.status().pending_sync_count, 1);
        assert_eq!(lock_store(reopened.store()).projects().len(), 1);
        reopened.shutdown().await;
    }

    #[test]
    fn test_unconfigured_remote_is_detached() {
        let temp = TempDir::new().unwrap();
        let connection = connect_remote(&RemoteConfig::default(), temp.path());
        assert!(connection.identity.cached_session().is_none());
    }
}
