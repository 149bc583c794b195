use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use gdd_lib::config::AppConfig;
use gdd_lib::storage::{lock_store, LocalStore, Project, Section};
use gdd_lib::sync::remote::{IdentityProvider, SessionIdentity};
use gdd_lib::sync::FlushReport;
use gdd_lib::workspace::{connect_remote, Workspace};

/// Shared application state for CLI commands
pub struct App {
    pub config: AppConfig,
    pub workspace: Workspace,
    pub identity: Arc<SessionIdentity>,
}

impl App {
    /// Load the config, open the workspace and resume a cached session
    pub async fn open(config_path: Option<&Path>) -> Result<Self> {
        let config = AppConfig::load(config_path).context("Failed to load config")?;
        let data_dir = Self::data_dir(&config)?;

        let connection = connect_remote(&config.remote, &data_dir);
        let mut workspace = Workspace::open(data_dir, connection.remote)
            .context("Failed to open project store")?;

        if let Some(session) = connection.identity.cached_session() {
            workspace
                .sign_in(&session.user_id)
                .await
                .context("Failed to start sync session")?;
        }

        Ok(Self {
            config,
            workspace,
            identity: connection.identity,
        })
    }

    pub fn data_dir(config: &AppConfig) -> Result<PathBuf> {
        match &config.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => LocalStore::default_data_dir().context("Failed to get data directory"),
        }
    }

    /// Flush (as on teardown) and stop background sync
    pub async fn close(self) -> FlushReport {
        self.workspace.shutdown().await
    }

    pub fn projects(&self) -> Vec<Project> {
        lock_store(self.workspace.store()).projects().to_vec()
    }

    /// Find a project by id, then title (case-insensitive, exact before prefix)
    pub fn find_project(&self, query: &str) -> Result<Project> {
        let projects = self.projects();

        if let Some(project) = projects.iter().find(|p| p.id == query) {
            return Ok(project.clone());
        }

        let query_lower = query.to_lowercase();
        if let Some(project) = projects.iter().find(|p| p.title.to_lowercase() == query_lower) {
            return Ok(project.clone());
        }

        let matches: Vec<&Project> = projects
            .iter()
            .filter(|p| p.title.to_lowercase().starts_with(&query_lower))
            .collect();

        match matches.len() {
            0 => bail!(
                "No project matching '{}'. Available projects:\n{}",
                query,
                projects
                    .iter()
                    .map(|p| format!("  - {}", p.title))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
            1 => Ok(matches[0].clone()),
            _ => bail!(
                "Ambiguous project name '{}'. Matches:\n{}",
                query,
                matches
                    .iter()
                    .map(|p| format!("  - {} ({})", p.title, p.id))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
        }
    }

    /// Find a section by id, then title (case-insensitive, exact before prefix)
    pub fn find_section(&self, project: &Project, query: &str) -> Result<Section> {
        if let Some(section) = project.section(query) {
            return Ok(section.clone());
        }

        let query_lower = query.to_lowercase();
        if let Some(section) = project
            .sections
            .iter()
            .find(|s| s.title.to_lowercase() == query_lower)
        {
            return Ok(section.clone());
        }

        let matches: Vec<&Section> = project
            .sections
            .iter()
            .filter(|s| s.title.to_lowercase().starts_with(&query_lower))
            .collect();

        match matches.len() {
            0 => bail!("No section matching '{}' in '{}'", query, project.title),
            1 => Ok(matches[0].clone()),
            _ => bail!(
                "Ambiguous section name '{}'. Matches:\n{}",
                query,
                matches
                    .iter()
                    .map(|s| format!("  - {} ({})", s.title, s.id))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
        }
    }
}
