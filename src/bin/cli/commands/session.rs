use anyhow::{bail, Context, Result};

use gdd_lib::sync::SessionStart;

use crate::app::App;
use crate::OutputFormat;

pub async fn run_login(app: &mut App, token: &str, format: &OutputFormat) -> Result<()> {
    if !app.config.remote.is_configured() {
        bail!("No remote configured: set [remote] rest_url in the config file");
    }

    let session = app
        .identity
        .login(token)
        .await
        .context("Failed to reach the auth service")?;
    let Some(session) = session else {
        bail!("Token was not accepted");
    };

    let start = app.workspace.sign_in(&session.user_id).await?;

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "userId": session.user_id,
                    "session": start,
                }))?
            );
        }
        OutputFormat::Plain => {
            println!("Signed in as {}", session.user_id);
            for line in summary_lines(&start) {
                println!("{}", line);
            }
            if let SessionStart::Merged { migration: Some(report), .. } = &start {
                for error in &report.errors {
                    eprintln!("  migration error: {}", error);
                }
            }
        }
    }
    Ok(())
}

/// Plain-text description of a session start
fn summary_lines(start: &SessionStart) -> Vec<String> {
    match start {
        SessionStart::LocalOnly { projects } => {
            vec![format!("Remote unavailable, working from {} local project(s)", projects)]
        }
        SessionStart::Merged { stats, to_push, migration, .. } => {
            let mut lines = vec![format!(
                "Merged: {} local only, {} remote only, {} local newer, {} remote newer",
                stats.local_only, stats.remote_only, stats.local_wins, stats.remote_wins
            )];
            if *to_push > 0 {
                lines.push(format!("Queued {} project(s) for upload", to_push));
            }
            if let Some(report) = migration {
                lines.push(format!("Migrated {} local project(s)", report.migrated));
            }
            lines
        }
    }
}

pub fn run_logout(app: &mut App) -> Result<()> {
    app.identity.logout();
    app.workspace.sign_out();
    println!("Signed out; local changes stay queued");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdd_lib::sync::{MergeStats, MigrationReport};

    #[test]
    fn test_local_only_summary() {
        let lines = summary_lines(&SessionStart::LocalOnly { projects: 3 });
        assert_eq!(lines, vec!["Remote unavailable, working from 3 local project(s)"]);
    }

    #[test]
    fn test_merged_summary_counts() {
        let start = SessionStart::Merged {
            projects: 4,
            to_push: 2,
            stats: MergeStats {
                local_only: 1,
                remote_only: 1,
                local_wins: 1,
                remote_wins: 1,
            },
            migration: Some(MigrationReport {
                migrated: 5,
                errors: Vec::new(),
            }),
        };
        let lines = summary_lines(&start);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "Queued 2 project(s) for upload");
        assert_eq!(lines[2], "Migrated 5 local project(s)");
    }

    #[test]
    fn test_nothing_to_push_is_not_mentioned() {
        let start = SessionStart::Merged {
            projects: 1,
            to_push: 0,
            stats: MergeStats::default(),
            migration: None,
        };
        assert_eq!(summary_lines(&start).len(), 1);
    }
}
