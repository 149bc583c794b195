//! Pull-and-merge at the start of an authenticated session.
//!
//! - Remote unreachable: keep working from the local snapshot.
//! - Remote empty but local has projects, first time for this user: push
//!   everything once (marker file under `migrations/`), then pull again.
//! - Projects deleted locally but not yet remotely are left out of the
//!   merge, so the pending delete is not undone.
//! - Merge, replace the store wholesale, queue the projects whose local
//!   copy won.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::merge::{merge_projects, MergeStats};
use super::queue::SyncOperation;
use super::remote::{migrate_local, MigrationReport, RemoteAdapter};
use super::scheduler::SyncScheduler;
use crate::storage::{lock_store, Result, SharedStore};

const MIGRATIONS_DIR: &str = "migrations";

/// How a session start went
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SessionStart {
    /// Remote could not be read; the local snapshot stays authoritative
    LocalOnly { projects: usize },
    Merged {
        projects: usize,
        to_push: usize,
        stats: MergeStats,
        #[serde(skip_serializing_if = "Option::is_none")]
        migration: Option<MigrationReport>,
    },
}

fn migration_marker(data_dir: &Path, user_id: &str) -> PathBuf {
    let safe: String = user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    data_dir.join(MIGRATIONS_DIR).join(format!("{}.migrated", safe))
}

pub async fn start_session(
    store: &SharedStore,
    remote: &dyn RemoteAdapter,
    scheduler: &SyncScheduler,
    user_id: &str,
    data_dir: &Path,
) -> Result<SessionStart> {
    scheduler.set_user(Some(user_id.to_string()));

    let Some(mut remote_projects) = remote.fetch_all().await else {
        log::warn!("Sync: remote unavailable at session start, working from local snapshot");
        let mut local = lock_store(store);
        local.load_from_storage()?;
        return Ok(SessionStart::LocalOnly {
            projects: local.projects().len(),
        });
    };

    let local_projects = lock_store(store).freshest_projects();

    let marker = migration_marker(data_dir, user_id);
    let mut migration = None;
    if remote_projects.is_empty() && !local_projects.is_empty() && !marker.exists() {
        log::info!(
            "Sync: remote empty for {}, migrating {} local project(s)",
            user_id,
            local_projects.len()
        );
        let report = migrate_local(remote, &local_projects, user_id).await;
        if let Some(parent) = marker.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&marker, "migrated")?;

        remote_projects = remote.fetch_all().await.unwrap_or_default();
        migration = Some(report);
    }

    let deleted: HashSet<String> = scheduler
        .pending_items()
        .into_iter()
        .filter(|item| item.operation == SyncOperation::Delete)
        .map(|item| item.project_id)
        .collect();
    if !deleted.is_empty() {
        remote_projects.retain(|p| !deleted.contains(&p.id));
        log::debug!("Sync: {} pending delete(s) kept out of the merge", deleted.len());
    }

    let outcome = merge_projects(local_projects, remote_projects);
    log::info!(
        "Sync: merged {} project(s) (local wins {}, remote wins {}, local only {}, remote only {})",
        outcome.projects.len(),
        outcome.stats.local_wins,
        outcome.stats.remote_wins,
        outcome.stats.local_only,
        outcome.stats.remote_only
    );

    let total = outcome.projects.len();
    lock_store(store).replace_all(outcome.projects)?;

    for project_id in &outcome.to_push {
        scheduler.mark_dirty(project_id);
    }

    Ok(SessionStart::Merged {
        projects: total,
        to_push: outcome.to_push.len(),
        stats: outcome.stats,
        migration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LocalStore, Project};
    use crate::sync::config::PersistenceConfig;
    use crate::sync::remote::{HybridRemote, IdentityProvider, MemoryRowStore, RowStore, Session};
    use crate::sync::scheduler::start_sync_scheduler;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::{Arc, Mutex};
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

    /// Remote that is never reachable
    struct Offline;

    #[async_trait]
    impl RemoteAdapter for Offline {
        async fn fetch_all(&self) -> Option<Vec<Project>> {
            None
        }

        async fn upsert_project(
            &self,
            _project: &Project,
            _user_hint: Option<&str>,
        ) -> crate::sync::remote::Result<crate::sync::remote::PushOutcome> {
            Err(crate::sync::remote::RemoteError::Rejected("offline".to_string()))
        }

        async fn delete_project(
            &self,
            _project_id: &str,
            _user_hint: Option<&str>,
        ) -> crate::sync::remote::Result<crate::sync::remote::PushOutcome> {
            Err(crate::sync::remote::RemoteError::Rejected("offline".to_string()))
        }
    }

    fn alice() -> Session {
        Session {
            user_id: "alice".to_string(),
            access_token: "alice-token".to_string(),
        }
    }

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    fn project(id: &str, title: &str, updated_at: &str) -> Project {
        let mut p = Project::new(title.to_string(), String::new());
        p.id = id.to_string();
        p.updated_at = at(updated_at);
        p.created_at = p.updated_at;
        p
    }

    fn open_store(temp: &TempDir, projects: Vec<Project>) -> SharedStore {
        let mut store = LocalStore::open(temp.path().to_path_buf()).unwrap();
        store.replace_all(projects).unwrap();
        Arc::new(Mutex::new(store))
    }

    #[tokio::test]
    async fn test_merge_scenario_queues_local_winners() {
        let temp = TempDir::new().unwrap();
        let rows = Arc::new(MemoryRowStore::new());
        let remote = HybridRemote::new(None, rows.clone(), Arc::new(Fixed(alice())));
        for p in [
            project("p-same", "remote title", "2024-05-01T10:30:00Z"),
            project("p-remote-only", "theirs", "2024-05-01T09:00:00Z"),
        ] {
            remote.upsert_project(&p, None).await.unwrap();
        }

        let store = open_store(
            &temp,
            vec![
                project("p-same", "local title", "2024-05-01T12:00:00Z"),
                project("p-local-only", "mine", "2024-05-01T09:00:00Z"),
            ],
        );
        let scheduler = start_sync_scheduler(store.clone(), Arc::new(Offline), PersistenceConfig::default(), None);

        let start = start_session(&store, &remote, &scheduler, "alice", temp.path())
            .await
            .unwrap();

        match start {
            SessionStart::Merged { projects, to_push, migration, .. } => {
                assert_eq!(projects, 3);
                assert_eq!(to_push, 2);
                assert!(migration.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
        let local = lock_store(&store);
        assert_eq!(local.projects().len(), 3);
        assert_eq!(local.get_project("p-same").unwrap().title, "local title");

        let mut pending: Vec<String> = scheduler.pending_items().into_iter().map(|i| i.project_id).collect();
        pending.sort();
        assert_eq!(pending, vec!["p-local-only".to_string(), "p-same".to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_remote_keeps_local_snapshot() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp, vec![project("p1", "kept", "2024-01-01T00:00:00Z")]);
        let scheduler = start_sync_scheduler(store.clone(), Arc::new(Offline), PersistenceConfig::default(), None);

        let start = start_session(&store, &Offline, &scheduler, "alice", temp.path())
            .await
            .unwrap();

        assert_eq!(start, SessionStart::LocalOnly { projects: 1 });
        assert_eq!(lock_store(&store).projects().len(), 1);
    }

    #[tokio::test]
    async fn test_first_login_migrates_once() {
        let temp = TempDir::new().unwrap();
        let rows = Arc::new(MemoryRowStore::new());
        let remote = HybridRemote::new(None, rows.clone(), Arc::new(Fixed(alice())));
        let store = open_store(
            &temp,
            vec![
                project("a", "anon one", "2024-01-01T00:00:00Z"),
                project("b", "anon two", "2024-01-02T00:00:00Z"),
            ],
        );
        let scheduler = start_sync_scheduler(store.clone(), Arc::new(Offline), PersistenceConfig::default(), None);

        let start = start_session(&store, &remote, &scheduler, "alice", temp.path())
            .await
            .unwrap();

        match start {
            SessionStart::Merged { migration: Some(report), to_push, .. } => {
                assert_eq!(report.migrated, 2);
                assert!(report.errors.is_empty());
                // Migrated copies carry the same timestamps, so nothing is re-pushed
                assert_eq!(to_push, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(rows.fetch_projects(&alice()).await.unwrap().len(), 2);
        assert!(temp.path().join("migrations").join("alice.migrated").exists());

        // Remote emptied elsewhere: the marker prevents a second migration
        for id in ["a", "b"] {
            rows.delete_project(&alice(), id).await.unwrap();
        }
        let again = start_session(&store, &remote, &scheduler, "alice", temp.path())
            .await
            .unwrap();
        match again {
            SessionStart::Merged { migration, to_push, .. } => {
                assert!(migration.is_none());
                assert_eq!(to_push, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_while_signed_out_is_not_undone_by_sign_in() {
        let temp = TempDir::new().unwrap();
        let rows = Arc::new(MemoryRowStore::new());
        let remote = Arc::new(HybridRemote::new(None, rows.clone(), Arc::new(Fixed(alice()))));
        let store = open_store(&temp, Vec::new());
        let scheduler = start_sync_scheduler(store.clone(), remote.clone(), PersistenceConfig::default(), None);
        lock_store(&store).attach_listener(Arc::new(scheduler.clone()));

        start_session(&store, remote.as_ref(), &scheduler, "alice", temp.path())
            .await
            .unwrap();
        let id = lock_store(&store).add_project("Doomed", "").unwrap();
        scheduler.sync_now().await;
        assert_eq!(rows.project_count(), 1);

        scheduler.set_user(None);
        lock_store(&store).delete_project(&id).unwrap();

        start_session(&store, remote.as_ref(), &scheduler, "alice", temp.path())
            .await
            .unwrap();
        assert!(lock_store(&store).get_project(&id).is_none());

        let report = scheduler.sync_now().await;
        assert_eq!(report.pending, 0);
        assert_eq!(rows.project_count(), 0);
        assert!(lock_store(&store).get_project(&id).is_none());

        lock_store(&store).detach_listener();
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_restored_backup_survives_sign_in() {
        let temp = TempDir::new().unwrap();
        let rows = Arc::new(MemoryRowStore::new());
        let remote = Arc::new(HybridRemote::new(None, rows.clone(), Arc::new(Fixed(alice()))));
        let store = open_store(&temp, Vec::new());
        let scheduler = start_sync_scheduler(store.clone(), remote.clone(), PersistenceConfig::default(), None);
        lock_store(&store).attach_listener(Arc::new(scheduler.clone()));

        start_session(&store, remote.as_ref(), &scheduler, "alice", temp.path())
            .await
            .unwrap();
        let id = lock_store(&store).add_project("Original", "").unwrap();
        let doc = crate::storage::backup::export_project(lock_store(&store).get_project(&id).unwrap()).unwrap();
        lock_store(&store).update_project(&id, Some("Bad edit"), None).unwrap();
        scheduler.sync_now().await;

        scheduler.set_user(None);
        lock_store(&store).import_backup(&doc, Some(&id)).unwrap();

        let start = start_session(&store, remote.as_ref(), &scheduler, "alice", temp.path())
            .await
            .unwrap();
        match start {
            SessionStart::Merged { stats, .. } => assert_eq!(stats.local_wins, 1),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(lock_store(&store).get_project(&id).unwrap().title, "Original");

        scheduler.sync_now().await;
        let remote_projects = rows.fetch_projects(&alice()).await.unwrap();
        assert_eq!(remote_projects[0].title, "Original");

        lock_store(&store).detach_listener();
        scheduler.shutdown().await;
    }

    #[test]
    fn test_marker_name_is_path_safe() {
        let marker = migration_marker(Path::new("/data"), "../evil/user");
        assert_eq!(marker, Path::new("/data/migrations/___evil_user.migrated"));
    }
}
