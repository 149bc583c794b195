//! Remote Adapter: moving projects between the local shape and the remote store.
//!
//! Writes try the server-mediated sync endpoint first and fall back to the
//! directly-authenticated table client. A missing identity is a soft
//! outcome ([`PushOutcome::Skipped`]), never an error.

mod endpoint;
mod hybrid;
mod identity;
mod memory;
mod rest;
pub mod rows;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::storage::Project;

pub use endpoint::{EndpointReply, SyncEndpointClient, SESSION_COOKIE};
pub use hybrid::HybridRemote;
pub use identity::{IdentityProvider, Session, SessionIdentity, SESSION_FILE};
pub use memory::MemoryRowStore;
pub use rest::RestRowClient;
use rows::{ProjectRow, SectionRow};

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server error: {status} - {message}")]
    Status { status: u16, message: String },
    #[error("Not authorized for this record")]
    Unauthorized,
    #[error("Rejected: {0}")]
    Rejected(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Why a write was skipped without being attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    Unauthenticated,
}

/// Non-error result of a remote write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// Retry later, once identity is available
    Skipped(SkipReason),
}

#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Every project of the current user. `None` when the remote store is
    /// unreachable or no identity is available.
    async fn fetch_all(&self) -> Option<Vec<Project>>;

    /// Upsert the project row, its section rows, and drop remote sections
    /// no longer present locally.
    async fn upsert_project(&self, project: &Project, user_hint: Option<&str>) -> Result<PushOutcome>;

    async fn delete_project(&self, project_id: &str, user_hint: Option<&str>) -> Result<PushOutcome>;
}

/// Table-level access to the remote store
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn fetch_projects(&self, session: &Session) -> Result<Vec<ProjectRow>>;
    async fn fetch_sections(&self, session: &Session, project_ids: &[String]) -> Result<Vec<SectionRow>>;
    async fn upsert_project(&self, session: &Session, row: &ProjectRow) -> Result<()>;
    async fn upsert_sections(&self, session: &Session, rows: &[SectionRow]) -> Result<()>;
    /// Delete the project's sections whose id is not in `keep` (all of them when empty)
    async fn delete_sections_except(&self, session: &Session, project_id: &str, keep: &[String]) -> Result<()>;
    async fn delete_project(&self, session: &Session, project_id: &str) -> Result<()>;
}

/// Full project write: project row, section rows, then tombstones by set difference.
pub async fn write_project(store: &dyn RowStore, session: &Session, project: &Project) -> Result<()> {
    if project.id.is_empty() {
        return Err(RemoteError::Rejected("project id is missing".to_string()));
    }

    store
        .upsert_project(session, &ProjectRow::from_project(project, &session.user_id))
        .await?;

    let section_rows = rows::section_rows(project);
    if !section_rows.is_empty() {
        store.upsert_sections(session, &section_rows).await?;
    }

    let keep: Vec<String> = project.sections.iter().map(|s| s.id.clone()).collect();
    store.delete_sections_except(session, &project.id, &keep).await
}

/// Read every project of the session's user, sections included
pub async fn read_projects(store: &dyn RowStore, session: &Session) -> Result<Vec<Project>> {
    let project_rows = store.fetch_projects(session).await?;
    let ids: Vec<String> = project_rows.iter().map(|p| p.id.clone()).collect();
    let section_rows = store.fetch_sections(session, &ids).await?;
    Ok(rows::assemble(project_rows, section_rows))
}

/// Result of the one-time local to remote migration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub migrated: usize,
    pub errors: Vec<String>,
}

/// Push every local project under `user_id`, one after another.
pub async fn migrate_local(remote: &dyn RemoteAdapter, projects: &[Project], user_id: &str) -> MigrationReport {
    let mut report = MigrationReport::default();

    for project in projects {
        match remote.upsert_project(project, Some(user_id)).await {
            Ok(PushOutcome::Pushed) => report.migrated += 1,
            Ok(PushOutcome::Skipped(reason)) => {
                report.errors.push(format!("{}: skipped ({:?})", project.id, reason));
            }
            Err(e) => report.errors.push(format!("{}: {}", project.id, e)),
        }
    }

    log::info!(
        "Remote: migrated {} of {} local projects for {}",
        report.migrated,
        projects.len(),
        user_id
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Section;

    fn alice() -> Session {
        Session {
            user_id: "alice".to_string(),
            access_token: "alice-token".to_string(),
        }
    }

    #[tokio::test]
    async fn test_write_project_drops_removed_sections() {
        let store = MemoryRowStore::new();
        let mut project = Project::new("Tombstones".to_string(), String::new());
        project.sections.push(Section::new("Keep".to_string(), String::new(), None, 0));
        project.sections.push(Section::new("Drop".to_string(), String::new(), None, 1));
        write_project(&store, &alice(), &project).await.unwrap();
        assert_eq!(store.section_count(), 2);

        project.sections.pop();
        write_project(&store, &alice(), &project).await.unwrap();

        let fetched = read_projects(&store, &alice()).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].sections.len(), 1);
        assert_eq!(fetched[0].sections[0].title, "Keep");
    }

    #[tokio::test]
    async fn test_write_project_without_sections_clears_remote() {
        let store = MemoryRowStore::new();
        let mut project = Project::new("Empty".to_string(), String::new());
        project.sections.push(Section::new("Gone".to_string(), String::new(), None, 0));
        write_project(&store, &alice(), &project).await.unwrap();

        project.sections.clear();
        write_project(&store, &alice(), &project).await.unwrap();

        assert_eq!(store.section_count(), 0);
        assert_eq!(store.project_count(), 1);
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let store = MemoryRowStore::new();
        let mut project = Project::new("Twice".to_string(), String::new());
        project.sections.push(Section::new("A".to_string(), String::new(), None, 0));

        write_project(&store, &alice(), &project).await.unwrap();
        let first = read_projects(&store, &alice()).await.unwrap();
        write_project(&store, &alice(), &project).await.unwrap();
        let second = read_projects(&store, &alice()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second[0], project);
    }

    #[tokio::test]
    async fn test_missing_id_is_rejected() {
        let store = MemoryRowStore::new();
        let mut project = Project::new("No id".to_string(), String::new());
        project.id.clear();

        let result = write_project(&store, &alice(), &project).await;
        assert!(matches!(result, Err(RemoteError::Rejected(_))));
    }
}
