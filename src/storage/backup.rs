//! Single-project JSON backups.
//!
//! A backup is the project exactly as it is stored locally. Restoring one
//! is all-or-nothing: the raw document is checked structurally before it
//! is allowed anywhere near the store.

use std::collections::HashSet;

use serde_json::Value;

use super::local_store::{Result, StorageError};
use super::models::Project;

/// Serialize a project as a pretty-printed backup document
pub fn export_project(project: &Project) -> Result<String> {
    Ok(serde_json::to_string_pretty(project)?)
}

/// Parse and validate a backup document.
///
/// When `expected_id` is given the backup must belong to that project.
pub fn parse_backup(raw: &str, expected_id: Option<&str>) -> Result<Project> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| invalid(format!("not valid JSON: {}", e)))?;

    check_shape(&value)?;

    let project: Project = serde_json::from_value(value)
        .map_err(|e| invalid(format!("unexpected field value: {}", e)))?;

    if let Some(expected) = expected_id {
        if project.id != expected {
            return Err(invalid(format!(
                "backup belongs to project '{}', expected '{}'",
                project.id, expected
            )));
        }
    }

    validate_project(&project)?;
    Ok(project)
}

/// Invariants every stored project must satisfy
pub fn validate_project(project: &Project) -> Result<()> {
    if project.id.trim().is_empty() {
        return Err(invalid("project id is empty"));
    }

    let mut ids = HashSet::new();
    for section in &project.sections {
        if section.id.trim().is_empty() {
            return Err(invalid("section id is empty"));
        }
        if !ids.insert(section.id.as_str()) {
            return Err(invalid(format!("duplicate section id '{}'", section.id)));
        }
    }

    for section in &project.sections {
        if let Some(parent) = &section.parent_id {
            if !ids.contains(parent.as_str()) {
                return Err(invalid(format!(
                    "section '{}' references unknown parent '{}'",
                    section.id, parent
                )));
            }
            if project.descendants_of(&section.id).contains(parent) || parent == &section.id {
                return Err(invalid(format!("section '{}' is its own ancestor", section.id)));
            }
        }
    }

    Ok(())
}

/// Required fields, reported by name before serde gets a chance to
/// produce a less helpful message.
fn check_shape(value: &Value) -> Result<()> {
    let obj = value
        .as_object()
        .ok_or_else(|| invalid("top-level value must be an object"))?;

    for field in ["id", "title", "createdAt", "updatedAt"] {
        match obj.get(field) {
            Some(Value::String(_)) => {}
            Some(_) => return Err(invalid(format!("field '{}' must be a string", field))),
            None => return Err(invalid(format!("missing required field '{}'", field))),
        }
    }

    let sections = obj
        .get("sections")
        .ok_or_else(|| invalid("missing required field 'sections'"))?
        .as_array()
        .ok_or_else(|| invalid("field 'sections' must be an array"))?;

    for (idx, section) in sections.iter().enumerate() {
        let section = section
            .as_object()
            .ok_or_else(|| invalid(format!("section #{} must be an object", idx)))?;
        for field in ["id", "title"] {
            if !matches!(section.get(field), Some(Value::String(_))) {
                return Err(invalid(format!(
                    "section #{} is missing string field '{}'",
                    idx, field
                )));
            }
        }
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> StorageError {
    StorageError::InvalidBackup(message.into())
}
