use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use gdd_lib::storage::{backup, lock_store};

use crate::app::App;
use crate::OutputFormat;

pub fn run_export(app: &App, query: &str, output: Option<&Path>) -> Result<()> {
    let project = app.find_project(query)?;
    let doc = backup::export_project(&project)?;

    match output {
        Some(path) => {
            fs::write(path, doc).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported '{}' to {}", project.title, path.display());
        }
        None => println!("{}", doc),
    }
    Ok(())
}

pub fn run_import(
    app: &App,
    file: &str,
    expected_id: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let raw = if file == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))?
    };

    let id = lock_store(app.workspace.store())
        .import_backup(&raw, expected_id)
        .context("Backup rejected")?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "id": id }))?)
        }
        OutputFormat::Plain => println!("Restored project {}", id),
    }
    Ok(())
}
