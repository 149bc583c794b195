use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::backup;
use super::models::{Project, Section, SectionPatch, MIN_PROJECT_TITLE_LEN};

/// File name of the durable local snapshot
pub const SNAPSHOT_FILE: &str = "gdd-projects.json";

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Section not found: {0}")]
    SectionNotFound(String),

    #[error("A section named '{0}' already exists at this level")]
    DuplicateSectionName(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid backup: {0}")]
    InvalidBackup(String),

    #[error("Data directory not found")]
    DataDirNotFound,
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// What happened to a project, as seen by the sync layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// New project; pushed right away instead of waiting for the debounce
    Created,
    Updated,
    Deleted,
}

/// Receives a notification after every persisted mutation
pub trait ChangeListener: Send + Sync {
    fn project_changed(&self, project_id: &str, kind: ChangeKind);
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    projects: Vec<Project>,
}

/// Type alias for a store shared between the UI side and the scheduler
pub type SharedStore = Arc<Mutex<LocalStore>>;

/// Lock a shared store, recovering the data if a holder panicked
pub fn lock_store(store: &SharedStore) -> MutexGuard<'_, LocalStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory project collection with a write-through JSON snapshot
pub struct LocalStore {
    base_path: PathBuf,
    projects: Vec<Project>,
    listener: Option<Arc<dyn ChangeListener>>,
}

impl LocalStore {
    /// Create an empty store rooted at `base_path` without touching disk
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            projects: Vec::new(),
            listener: None,
        }
    }

    /// Create the data directory if needed and hydrate from the snapshot
    pub fn open(base_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_path)?;
        let mut store = Self::new(base_path);
        store.load_from_storage()?;
        Ok(store)
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        dirs::data_local_dir()
            .map(|p| p.join("gdd"))
            .ok_or(StorageError::DataDirNotFound)
    }

    pub fn data_dir(&self) -> &Path {
        &self.base_path
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.base_path.join(SNAPSHOT_FILE)
    }

    pub fn attach_listener(&mut self, listener: Arc<dyn ChangeListener>) {
        self.listener = Some(listener);
    }

    pub fn detach_listener(&mut self) {
        self.listener = None;
    }

    // ===== Snapshot =====

    /// Replace in-memory state with the durable snapshot
    pub fn load_from_storage(&mut self) -> Result<()> {
        self.projects = self.read_snapshot()?;
        log::debug!(
            "Store: loaded {} project(s) from {:?}",
            self.projects.len(),
            self.snapshot_path()
        );
        Ok(())
    }

    /// Read the snapshot without changing in-memory state
    pub fn read_snapshot(&self) -> Result<Vec<Project>> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        Ok(snapshot.projects)
    }

    /// Write the whole collection using atomic write (write to .tmp then rename)
    fn persist(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path)?;
        let path = self.snapshot_path();
        let tmp_path = path.with_extension("json.tmp");
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            projects: self.projects.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Persist, then tell the sync layer
    fn commit(&self, project_id: &str, kind: ChangeKind) -> Result<()> {
        self.persist()?;
        if let Some(listener) = &self.listener {
            listener.project_changed(project_id, kind);
        }
        Ok(())
    }

    // ===== Project Operations =====

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn get_project(&self, project_id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == project_id)
    }

    fn project_mut(&mut self, project_id: &str) -> Result<&mut Project> {
        self.projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .ok_or_else(|| StorageError::ProjectNotFound(project_id.to_string()))
    }

    /// Projects as the sync layer should see them right now: memory first,
    /// the durable snapshot if memory has been emptied in the meantime.
    pub fn freshest_projects(&self) -> Vec<Project> {
        if !self.projects.is_empty() {
            return self.projects.clone();
        }

        match self.read_snapshot() {
            Ok(projects) => {
                if !projects.is_empty() {
                    log::debug!(
                        "Store: memory empty, read {} project(s) from snapshot",
                        projects.len()
                    );
                }
                projects
            }
            Err(e) => {
                log::warn!("Store: failed to read snapshot fallback: {}", e);
                Vec::new()
            }
        }
    }

    pub fn add_project(&mut self, title: &str, description: &str) -> Result<String> {
        let title = title.trim();
        if title.chars().count() < MIN_PROJECT_TITLE_LEN {
            return Err(StorageError::Validation(format!(
                "Project title must be at least {} characters",
                MIN_PROJECT_TITLE_LEN
            )));
        }

        let project = Project::new(title.to_string(), description.to_string());
        let id = project.id.clone();
        self.projects.push(project);
        self.commit(&id, ChangeKind::Created)?;

        log::info!("Store: created project {}", id);
        Ok(id)
    }

    /// Update title and/or description
    pub fn update_project(
        &mut self,
        project_id: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        if let Some(title) = title {
            if title.trim().chars().count() < MIN_PROJECT_TITLE_LEN {
                return Err(StorageError::Validation(format!(
                    "Project title must be at least {} characters",
                    MIN_PROJECT_TITLE_LEN
                )));
            }
        }

        let project = self.project_mut(project_id)?;
        if let Some(title) = title {
            project.title = title.trim().to_string();
        }
        if let Some(description) = description {
            project.description = description.to_string();
        }
        project.touch();

        self.commit(project_id, ChangeKind::Updated)
    }

    /// Replace the mind map layout blob
    pub fn set_mind_map_settings(
        &mut self,
        project_id: &str,
        settings: Option<serde_json::Value>,
    ) -> Result<()> {
        let project = self.project_mut(project_id)?;
        project.mind_map_settings = settings;
        project.touch();
        self.commit(project_id, ChangeKind::Updated)
    }

    pub fn delete_project(&mut self, project_id: &str) -> Result<()> {
        let idx = self
            .projects
            .iter()
            .position(|p| p.id == project_id)
            .ok_or_else(|| StorageError::ProjectNotFound(project_id.to_string()))?;

        self.projects.remove(idx);
        self.commit(project_id, ChangeKind::Deleted)
    }

    /// Insert or replace a whole project by id (backup restore)
    pub fn import_project(&mut self, mut project: Project) -> Result<()> {
        backup::validate_project(&project)?;

        let id = project.id.clone();

        // The restored copy must be newer than anything already stored for it
        if let Some(existing) = self.projects.iter().find(|p| p.id == id) {
            if existing.updated_at > project.updated_at {
                project.updated_at = existing.updated_at;
            }
        }
        project.touch();

        match self.projects.iter_mut().find(|p| p.id == id) {
            Some(existing) => *existing = project,
            None => self.projects.push(project),
        }

        log::info!("Store: imported project {}", id);
        self.commit(&id, ChangeKind::Updated)
    }

    /// Validate a raw backup and import it. Nothing changes on failure.
    pub fn import_backup(&mut self, raw: &str, expected_id: Option<&str>) -> Result<String> {
        let project = backup::parse_backup(raw, expected_id)?;
        let id = project.id.clone();
        self.import_project(project)?;
        Ok(id)
    }

    /// Swap in a merged collection. The caller decides what to push, so
    /// no change notifications are sent.
    pub fn replace_all(&mut self, projects: Vec<Project>) -> Result<()> {
        self.projects = projects;
        self.persist()
    }

    // ===== Section Operations =====

    pub fn add_section(
        &mut self,
        project_id: &str,
        title: &str,
        content: &str,
        parent_id: Option<&str>,
    ) -> Result<String> {
        let project = self.project_mut(project_id)?;

        if let Some(parent) = parent_id {
            if project.section(parent).is_none() {
                return Err(StorageError::SectionNotFound(parent.to_string()));
            }
        }

        if project.has_sibling_named(parent_id, title, None) {
            return Err(StorageError::DuplicateSectionName(title.trim().to_string()));
        }

        let order = project.next_order(parent_id);
        let section = Section::new(
            title.trim().to_string(),
            content.to_string(),
            parent_id.map(str::to_string),
            order,
        );
        let section_id = section.id.clone();
        project.sections.push(section);
        project.touch();

        self.commit(project_id, ChangeKind::Updated)?;
        Ok(section_id)
    }

    /// Apply a field-level patch to a section
    pub fn edit_section(
        &mut self,
        project_id: &str,
        section_id: &str,
        patch: SectionPatch,
    ) -> Result<()> {
        let project = self.project_mut(project_id)?;

        let parent_id = project
            .section(section_id)
            .ok_or_else(|| StorageError::SectionNotFound(section_id.to_string()))?
            .parent_id
            .clone();

        if let Some(title) = &patch.title {
            if project.has_sibling_named(parent_id.as_deref(), title, Some(section_id)) {
                return Err(StorageError::DuplicateSectionName(title.trim().to_string()));
            }
        }

        if let Some(section) = project.section_mut(section_id) {
            if let Some(title) = patch.title {
                section.title = title.trim().to_string();
            }
            if let Some(content) = patch.content {
                section.content = content;
            }
            if let Some(order) = patch.order {
                section.order = order;
            }
            if let Some(color) = patch.color {
                section.color = color;
            }
        }
        project.touch();

        self.commit(project_id, ChangeKind::Updated)
    }

    /// Historical call shape: the last argument may carry an order or a color
    pub fn edit_section_legacy(
        &mut self,
        project_id: &str,
        section_id: &str,
        title: &str,
        content: &str,
        color_or_order: Option<&serde_json::Value>,
    ) -> Result<()> {
        let patch = SectionPatch::from_legacy(title.to_string(), content.to_string(), color_or_order);
        self.edit_section(project_id, section_id, patch)
    }

    /// Re-parent a section, keeping the section set a forest
    pub fn move_section(
        &mut self,
        project_id: &str,
        section_id: &str,
        new_parent: Option<&str>,
    ) -> Result<()> {
        let project = self.project_mut(project_id)?;

        let title = project
            .section(section_id)
            .ok_or_else(|| StorageError::SectionNotFound(section_id.to_string()))?
            .title
            .clone();

        if let Some(parent) = new_parent {
            if project.section(parent).is_none() {
                return Err(StorageError::SectionNotFound(parent.to_string()));
            }
        }

        if project.would_cycle(section_id, new_parent) {
            return Err(StorageError::Validation(
                "A section cannot be moved under itself or one of its descendants".to_string(),
            ));
        }

        if project.has_sibling_named(new_parent, &title, Some(section_id)) {
            return Err(StorageError::DuplicateSectionName(title));
        }

        let order = project.next_order(new_parent);
        if let Some(section) = project.section_mut(section_id) {
            section.parent_id = new_parent.map(str::to_string);
            section.order = order;
        }
        project.touch();

        self.commit(project_id, ChangeKind::Updated)
    }

    /// Remove a section and everything below it. Returns the removed ids.
    pub fn remove_section(&mut self, project_id: &str, section_id: &str) -> Result<Vec<String>> {
        let project = self.project_mut(project_id)?;

        if project.section(section_id).is_none() {
            return Err(StorageError::SectionNotFound(section_id.to_string()));
        }

        let mut doomed = project.descendants_of(section_id);
        doomed.insert(section_id.to_string());

        project.sections.retain(|s| !doomed.contains(&s.id));
        project.touch();

        self.commit(project_id, ChangeKind::Updated)?;

        let mut removed: Vec<String> = doomed.into_iter().collect();
        removed.sort();
        Ok(removed)
    }
}
