use anyhow::Result;

use crate::app::App;
use crate::render::terminal;
use crate::OutputFormat;

pub async fn run_sync(app: &App, format: &OutputFormat) -> Result<()> {
    let report = app.workspace.sync_now().await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Plain => {
            if app.workspace.user_id().is_none() {
                println!("Not signed in; {} change(s) kept locally", report.pending);
                return Ok(());
            }
            println!(
                "Pushed {}, skipped {}, failed {}, {} still pending",
                report.pushed, report.skipped, report.failed, report.pending
            );
            if let Some(error) = &report.error {
                eprintln!("Last error: {}", error);
            }
        }
    }
    Ok(())
}

pub fn run_status(app: &App, format: &OutputFormat) -> Result<()> {
    let status = app.workspace.status();

    match format {
        OutputFormat::Json => {
            let items = app.workspace.scheduler().pending_items();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "status": status,
                    "userId": app.workspace.user_id(),
                    "pending": items,
                }))?
            );
        }
        OutputFormat::Plain => {
            println!("{}", terminal::render_status(&status, false));
            match app.workspace.user_id() {
                Some(user) => println!("Signed in as {}", user),
                None => println!("Not signed in"),
            }
            for item in app.workspace.scheduler().pending_items() {
                let attempts = if item.attempts > 0 {
                    format!(" ({} attempts)", item.attempts)
                } else {
                    String::new()
                };
                println!("  {:?} {}{}", item.operation, item.project_id, attempts);
            }
        }
    }
    Ok(())
}
