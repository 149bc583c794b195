//! Remote table rows and their conversion to and from the local shape.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{Project, Section};

/// Row of the remote `projects` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRow {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mindmap_settings: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row of the remote `sections` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRow {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ProjectRow {
    pub fn from_project(project: &Project, owner_id: &str) -> Self {
        Self {
            id: project.id.clone(),
            owner_id: owner_id.to_string(),
            title: project.title.clone(),
            description: project.description.clone(),
            mindmap_settings: project.mind_map_settings.clone(),
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }

    pub fn into_project(self, sections: Vec<Section>) -> Project {
        Project {
            id: self.id,
            title: self.title,
            description: self.description,
            sections,
            created_at: self.created_at,
            updated_at: self.updated_at,
            mind_map_settings: self.mindmap_settings,
        }
    }
}

impl SectionRow {
    pub fn from_section(section: &Section, project_id: &str) -> Self {
        Self {
            id: section.id.clone(),
            project_id: project_id.to_string(),
            parent_id: section.parent_id.clone(),
            title: section.title.clone(),
            content: section.content.clone(),
            order: section.order,
            color: section.color.clone(),
            created_at: section.created_at,
        }
    }

    pub fn into_section(self) -> Section {
        Section {
            id: self.id,
            title: self.title,
            content: self.content,
            parent_id: self.parent_id,
            order: self.order,
            color: self.color,
            created_at: self.created_at,
        }
    }
}

/// All section rows of a project
pub fn section_rows(project: &Project) -> Vec<SectionRow> {
    project
        .sections
        .iter()
        .map(|section| SectionRow::from_section(section, &project.id))
        .collect()
}

/// Join fetched rows back into projects. Sections keep remote order by `order`.
pub fn assemble(projects: Vec<ProjectRow>, sections: Vec<SectionRow>) -> Vec<Project> {
    let mut by_project: HashMap<String, Vec<Section>> = HashMap::new();
    for row in sections {
        by_project
            .entry(row.project_id.clone())
            .or_default()
            .push(row.into_section());
    }

    projects
        .into_iter()
        .map(|row| {
            let mut sections = by_project.remove(&row.id).unwrap_or_default();
            sections.sort_by_key(|s| s.order);
            row.into_project(sections)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_rebuild_project() {
        let mut project = Project::new("Skyforge".to_string(), "airships".to_string());
        let root = Section::new("World".to_string(), String::new(), None, 1);
        let child = Section::new("Islands".to_string(), "floating".to_string(), Some(root.id.clone()), 0);
        project.sections = vec![root.clone(), child.clone()];

        let project_row = ProjectRow::from_project(&project, "user-1");
        assert_eq!(project_row.owner_id, "user-1");

        let rebuilt = assemble(vec![project_row], section_rows(&project));
        assert_eq!(rebuilt.len(), 1);
        let rebuilt = &rebuilt[0];
        assert_eq!(rebuilt.id, project.id);
        assert_eq!(rebuilt.updated_at, project.updated_at);
        // Sorted by order
        assert_eq!(rebuilt.sections[0].id, child.id);
        assert_eq!(rebuilt.sections[1].parent_id, None);
    }

    #[test]
    fn test_section_row_uses_snake_case_columns() {
        let section = Section::new("Combat".to_string(), String::new(), Some("p".to_string()), 3);
        let value = serde_json::to_value(SectionRow::from_section(&section, "proj")).unwrap();
        assert_eq!(value["project_id"], "proj");
        assert_eq!(value["parent_id"], "p");
        assert_eq!(value["order"], 3);
    }
}
