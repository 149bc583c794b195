use gdd_lib::storage::{Project, Section};
use gdd_lib::sync::{SyncState, SyncStatus};

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
}

pub fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

/// Render the section forest of a project, children indented under parents
pub fn render_section_tree(project: &Project, use_color: bool) -> String {
    let mut lines = Vec::new();
    for root in project.sorted_children(None) {
        render_section(project, root, 0, use_color, &mut lines);
    }
    lines.join("\n")
}

fn render_section(
    project: &Project,
    section: &Section,
    depth: usize,
    use_color: bool,
    lines: &mut Vec<String>,
) {
    let prefix = "  ".repeat(depth);
    let marker = match &section.color {
        Some(color) => format!(" {}", paint(&format!("[{}]", color), Color::DIM, use_color)),
        None => String::new(),
    };
    lines.push(format!(
        "{}- {}{} {}",
        prefix,
        paint(&section.title, Color::BOLD, use_color),
        marker,
        paint(&section.id, Color::DIM, use_color)
    ));

    let preview = first_line(&section.content, 72);
    if !preview.is_empty() {
        lines.push(format!("{}  {}", prefix, preview));
    }

    for child in project.sorted_children(Some(&section.id)) {
        render_section(project, child, depth + 1, use_color, lines);
    }
}

/// First non-blank line, cut to `max` characters
pub fn first_line(text: &str, max: usize) -> String {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

/// One-line status badge, e.g. "synced (0 pending)"
pub fn render_status(status: &SyncStatus, use_color: bool) -> String {
    let (label, color) = match status.sync_status {
        SyncState::Idle => ("idle", Color::DIM),
        SyncState::Syncing => ("syncing", Color::CYAN),
        SyncState::Synced => ("synced", Color::GREEN),
        SyncState::Error => ("error", Color::RED),
    };

    let mut line = format!(
        "{} ({} pending)",
        paint(label, color, use_color),
        status.pending_sync_count
    );
    if let Some(at) = status.last_synced_at {
        line.push_str(&format!(", last synced {}", at.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    if let Some(error) = &status.last_sync_error {
        line.push_str(&format!("\n{}", paint(error, Color::YELLOW, use_color)));
    }
    line
}
