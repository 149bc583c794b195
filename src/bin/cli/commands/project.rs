use anyhow::Result;

use gdd_lib::storage::lock_store;

use crate::app::App;
use crate::render::terminal::{self, Color};
use crate::OutputFormat;

pub fn run_new(app: &App, title: &str, description: &str, format: &OutputFormat) -> Result<()> {
    let id = lock_store(app.workspace.store()).add_project(title, description)?;

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "id": id, "title": title.trim() }))?
            );
        }
        OutputFormat::Plain => println!("Created project '{}' ({})", title.trim(), id),
    }
    Ok(())
}

pub fn run_list(app: &App, format: &OutputFormat) -> Result<()> {
    let mut projects = app.projects();
    projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    match format {
        OutputFormat::Json => {
            let output: Vec<serde_json::Value> = projects
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "id": p.id,
                        "title": p.title,
                        "description": p.description,
                        "sectionCount": p.sections.len(),
                        "updatedAt": p.updated_at,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if projects.is_empty() {
                println!("(no projects)");
            }
            for p in &projects {
                println!(
                    "{}  {} ({} sections, updated {})",
                    p.id,
                    p.title,
                    p.sections.len(),
                    p.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
    }
    Ok(())
}

pub fn run_show(app: &App, query: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let project = app.find_project(query)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&project)?),
        OutputFormat::Plain => {
            println!("{}", terminal::paint(&project.title, Color::BOLD, use_color));
            if !project.description.is_empty() {
                println!("{}", terminal::paint(&project.description, Color::DIM, use_color));
            }
            println!();
            if project.sections.is_empty() {
                println!("(no sections)");
            } else {
                println!("{}", terminal::render_section_tree(&project, use_color));
            }
        }
    }
    Ok(())
}

pub fn run_edit(
    app: &App,
    query: &str,
    title: Option<&str>,
    description: Option<&str>,
) -> Result<()> {
    if title.is_none() && description.is_none() {
        anyhow::bail!("Nothing to change: pass --title and/or --description");
    }
    let project = app.find_project(query)?;
    lock_store(app.workspace.store()).update_project(&project.id, title, description)?;
    println!("Updated project '{}'", title.map(str::trim).unwrap_or(&project.title));
    Ok(())
}

pub fn run_rm(app: &App, query: &str) -> Result<()> {
    let project = app.find_project(query)?;
    lock_store(app.workspace.store()).delete_project(&project.id)?;
    println!("Deleted project '{}'", project.title);
    Ok(())
}
