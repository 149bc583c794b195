use anyhow::Result;

use gdd_lib::storage::{lock_store, LegacySlot, SectionPatch};

use crate::app::App;
use crate::OutputFormat;

/// Flags accepted by `section edit`
pub struct EditArgs {
    pub title: Option<String>,
    pub content: Option<String>,
    pub order: Option<i64>,
    pub color: Option<String>,
    pub clear_color: bool,
    pub slot: Option<String>,
}

pub fn run_add(
    app: &App,
    project_query: &str,
    title: &str,
    content: &str,
    parent: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let project = app.find_project(project_query)?;
    let parent_id = match parent {
        Some(query) => Some(app.find_section(&project, query)?.id),
        None => None,
    };

    let id = lock_store(app.workspace.store()).add_section(
        &project.id,
        title,
        content,
        parent_id.as_deref(),
    )?;

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "id": id,
                    "projectId": project.id,
                    "parentId": parent_id,
                }))?
            );
        }
        OutputFormat::Plain => println!("Added section '{}' ({})", title.trim(), id),
    }
    Ok(())
}

pub fn run_edit(app: &App, project_query: &str, section_query: &str, args: EditArgs) -> Result<()> {
    let project = app.find_project(project_query)?;
    let section = app.find_section(&project, section_query)?;

    // The legacy shape always rewrites title and content together
    if let Some(raw) = args.slot {
        let slot = match LegacySlot::parse(&raw) {
            Some(LegacySlot::Order(order)) => Some(serde_json::json!(order)),
            Some(LegacySlot::Color(color)) => Some(serde_json::json!(color)),
            None => None,
        };
        lock_store(app.workspace.store()).edit_section_legacy(
            &project.id,
            &section.id,
            args.title.as_deref().unwrap_or(&section.title),
            args.content.as_deref().unwrap_or(&section.content),
            slot.as_ref(),
        )?;
        println!("Updated section '{}'", section.title);
        return Ok(());
    }

    let patch = SectionPatch {
        title: args.title,
        content: args.content,
        order: args.order,
        color: if args.clear_color {
            Some(None)
        } else {
            args.color.map(Some)
        },
    };
    if patch.is_empty() {
        anyhow::bail!("Nothing to change");
    }

    lock_store(app.workspace.store()).edit_section(&project.id, &section.id, patch)?;
    println!("Updated section '{}'", section.title);
    Ok(())
}

pub fn run_move(
    app: &App,
    project_query: &str,
    section_query: &str,
    parent: Option<&str>,
) -> Result<()> {
    let project = app.find_project(project_query)?;
    let section = app.find_section(&project, section_query)?;
    let parent = match parent {
        Some(query) => Some(app.find_section(&project, query)?),
        None => None,
    };

    lock_store(app.workspace.store()).move_section(
        &project.id,
        &section.id,
        parent.as_ref().map(|p| p.id.as_str()),
    )?;

    match parent {
        Some(parent) => println!("Moved '{}' under '{}'", section.title, parent.title),
        None => println!("Moved '{}' to the top level", section.title),
    }
    Ok(())
}

pub fn run_rm(
    app: &App,
    project_query: &str,
    section_query: &str,
    format: &OutputFormat,
) -> Result<()> {
    let project = app.find_project(project_query)?;
    let section = app.find_section(&project, section_query)?;
    let removed = lock_store(app.workspace.store()).remove_section(&project.id, &section.id)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&removed)?),
        OutputFormat::Plain => {
            println!("Removed '{}' ({} section(s) in total)", section.title, removed.len())
        }
    }
    Ok(())
}
