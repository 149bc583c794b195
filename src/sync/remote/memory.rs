//! In-memory remote tables, used by the reference sync server and in tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::identity::Session;
use super::rows::{ProjectRow, SectionRow};
use super::{RemoteError, Result, RowStore};

#[derive(Debug, Default)]
struct Tables {
    projects: HashMap<String, ProjectRow>,
    sections: HashMap<String, SectionRow>,
}

impl Tables {
    fn owned_by(&self, project_id: &str, user_id: &str) -> Option<bool> {
        self.projects.get(project_id).map(|p| p.owner_id == user_id)
    }
}

/// Row store with owner checks and cascading project deletes
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    tables: Mutex<Tables>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn project_count(&self) -> usize {
        self.lock().projects.len()
    }

    pub fn section_count(&self) -> usize {
        self.lock().sections.len()
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn fetch_projects(&self, session: &Session) -> Result<Vec<ProjectRow>> {
        let tables = self.lock();
        let mut rows: Vec<ProjectRow> = tables
            .projects
            .values()
            .filter(|p| p.owner_id == session.user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rows)
    }

    async fn fetch_sections(&self, session: &Session, project_ids: &[String]) -> Result<Vec<SectionRow>> {
        let tables = self.lock();
        let wanted: HashSet<&str> = project_ids.iter().map(String::as_str).collect();
        Ok(tables
            .sections
            .values()
            .filter(|s| wanted.contains(s.project_id.as_str()))
            .filter(|s| tables.owned_by(&s.project_id, &session.user_id) == Some(true))
            .cloned()
            .collect())
    }

    async fn upsert_project(&self, session: &Session, row: &ProjectRow) -> Result<()> {
        if row.owner_id != session.user_id {
            return Err(RemoteError::Unauthorized);
        }
        let mut tables = self.lock();
        if tables.owned_by(&row.id, &session.user_id) == Some(false) {
            return Err(RemoteError::Unauthorized);
        }
        tables.projects.insert(row.id.clone(), row.clone());
        Ok(())
    }

    async fn upsert_sections(&self, session: &Session, rows: &[SectionRow]) -> Result<()> {
        let mut tables = self.lock();
        for row in rows {
            match tables.owned_by(&row.project_id, &session.user_id) {
                Some(true) => {}
                Some(false) => return Err(RemoteError::Unauthorized),
                None => {
                    return Err(RemoteError::Rejected(format!(
                        "section {} references unknown project {}",
                        row.id, row.project_id
                    )))
                }
            }
            if let Some(existing) = tables.sections.get(&row.id) {
                if tables.owned_by(&existing.project_id, &session.user_id) == Some(false) {
                    return Err(RemoteError::Unauthorized);
                }
            }
        }
        for row in rows {
            tables.sections.insert(row.id.clone(), row.clone());
        }
        Ok(())
    }

    async fn delete_sections_except(&self, session: &Session, project_id: &str, keep: &[String]) -> Result<()> {
        let mut tables = self.lock();
        match tables.owned_by(project_id, &session.user_id) {
            Some(false) => return Err(RemoteError::Unauthorized),
            None => return Ok(()),
            Some(true) => {}
        }
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        tables
            .sections
            .retain(|id, s| s.project_id != project_id || keep.contains(id.as_str()));
        Ok(())
    }

    async fn delete_project(&self, session: &Session, project_id: &str) -> Result<()> {
        let mut tables = self.lock();
        match tables.owned_by(project_id, &session.user_id) {
            Some(false) => return Err(RemoteError::Unauthorized),
            None => return Ok(()),
            Some(true) => {}
        }
        tables.projects.remove(project_id);
        tables.sections.retain(|_, s| s.project_id != project_id);
        Ok(())
    }
}
