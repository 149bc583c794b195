mod app;
mod commands;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gdd-cli", about = "Game design documents with offline-first sync", version)]
struct Cli {
    /// Config file (default: <config dir>/gdd/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Create, list, inspect and delete projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Edit the section tree of a project
    #[command(subcommand)]
    Section(SectionCommand),

    /// Write a project backup as JSON
    Export {
        /// Project id or title
        project: String,
        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Restore a project from a JSON backup ("-" reads stdin)
    Import {
        file: String,
        /// Refuse the backup unless it carries this project id
        #[arg(long)]
        expect_id: Option<String>,
    },

    /// Sign in with an access token
    Login { token: String },

    /// Forget the cached session
    Logout,

    /// Push everything pending now
    Sync,

    /// Show sync status
    Status,

    /// Persistence and sync timing settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Run the reference sync server
    Serve {
        /// Address to bind (default from config)
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Create a project
    New {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List projects
    List,
    /// Show a project and its section tree
    Show { project: String },
    /// Change title or description
    Edit {
        project: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a project
    Rm { project: String },
}

#[derive(Subcommand)]
enum SectionCommand {
    /// Add a section
    Add {
        project: String,
        title: String,
        #[arg(long, default_value = "")]
        content: String,
        /// Parent section id or title (default: top level)
        #[arg(long)]
        parent: Option<String>,
    },
    /// Edit a section
    Edit {
        project: String,
        section: String,
        #[arg(long)]
        title: Option<String>,
        /// New content ("-" reads stdin)
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        order: Option<i64>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long, conflicts_with = "color")]
        clear_color: bool,
        /// Legacy slot: a number sets the order, anything else the color
        #[arg(long, conflicts_with_all = ["order", "color", "clear_color"])]
        slot: Option<String>,
    },
    /// Move a section under another one (or to the top level)
    Move {
        project: String,
        section: String,
        /// New parent id or title; omit for top level
        #[arg(long)]
        parent: Option<String>,
    },
    /// Remove a section and everything below it
    Rm { project: String, section: String },
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print current settings
    Show,
    /// Change one setting, e.g. `debounceMs 800` or `syncOnBlur false`
    Set { key: String, value: String },
}

/// Read content from stdin when the argument is "-"
fn resolve_content(content: Option<String>) -> std::io::Result<Option<String>> {
    match content.as_deref() {
        Some("-") => {
            let mut buf = String::new();
            std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf)?;
            Ok(Some(buf))
        }
        _ => Ok(content),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let use_color = !cli.no_color && std::io::IsTerminal::is_terminal(&std::io::stdout());

    if let Command::Serve { bind } = &cli.command {
        return commands::serve::run(config_path, bind.as_deref()).await;
    }

    let mut app = app::App::open(config_path).await?;

    let result = match cli.command {
        Command::Project(cmd) => match cmd {
            ProjectCommand::New { title, description } => {
                commands::project::run_new(&app, &title, &description, &cli.format)
            }
            ProjectCommand::List => commands::project::run_list(&app, &cli.format),
            ProjectCommand::Show { project } => {
                commands::project::run_show(&app, &project, &cli.format, use_color)
            }
            ProjectCommand::Edit { project, title, description } => commands::project::run_edit(
                &app,
                &project,
                title.as_deref(),
                description.as_deref(),
            ),
            ProjectCommand::Rm { project } => commands::project::run_rm(&app, &project),
        },
        Command::Section(cmd) => match cmd {
            SectionCommand::Add { project, title, content, parent } => commands::section::run_add(
                &app,
                &project,
                &title,
                &content,
                parent.as_deref(),
                &cli.format,
            ),
            SectionCommand::Edit {
                project,
                section,
                title,
                content,
                order,
                color,
                clear_color,
                slot,
            } => match resolve_content(content) {
                Ok(content) => commands::section::run_edit(
                    &app,
                    &project,
                    &section,
                    commands::section::EditArgs {
                        title,
                        content,
                        order,
                        color,
                        clear_color,
                        slot,
                    },
                ),
                Err(e) => Err(e.into()),
            },
            SectionCommand::Move { project, section, parent } => {
                commands::section::run_move(&app, &project, &section, parent.as_deref())
            }
            SectionCommand::Rm { project, section } => {
                commands::section::run_rm(&app, &project, &section, &cli.format)
            }
        },
        Command::Export { project, output } => {
            commands::backup::run_export(&app, &project, output.as_deref())
        }
        Command::Import { file, expect_id } => {
            commands::backup::run_import(&app, &file, expect_id.as_deref(), &cli.format)
        }
        Command::Login { token } => commands::session::run_login(&mut app, &token, &cli.format).await,
        Command::Logout => commands::session::run_logout(&mut app),
        Command::Sync => commands::sync::run_sync(&app, &cli.format).await,
        Command::Status => commands::sync::run_status(&app, &cli.format),
        Command::Settings(cmd) => match cmd {
            SettingsCommand::Show => commands::settings::run_show(&app, &cli.format),
            SettingsCommand::Set { key, value } => commands::settings::run_set(&mut app, &key, &value),
        },
        Command::Serve { .. } => Ok(()),
    };

    // Always flush before exiting, even when the command failed
    let report = app.close().await;
    if report.pending > 0 {
        log::info!("{} change(s) still pending sync", report.pending);
    }

    result
}
