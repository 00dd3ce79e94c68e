use std::io::{self, IsTerminal};

use crate::app::{OutboxEntryView, TaskView};
use crate::listing::TaskListFilter;
use crate::task_id::is_client_id;

pub fn print_task_list(tasks: &[TaskView], filter: &TaskListFilter) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Tasks"));
    if let Some(summary) = filter_summary(filter) {
        println!("{}", palette.dim(&format!("filters: {summary}")));
    }

    if tasks.is_empty() {
        println!("{}", palette.dim("no tasks matched"));
        return;
    }

    for task in tasks {
        println!("{}", format_task_row(task, &palette));
    }
    println!("{}", palette.dim(&format!("{} task(s)", tasks.len())));
}

pub fn print_task(task: &TaskView) {
    let palette = Palette::auto();
    println!("{}", format_task_row(task, &palette));
    if !task.description.is_empty() {
        println!("{}", task.description);
    }
    if let Some(created_at) = task.created_at.as_deref() {
        println!("{}", palette.dim(&format!("created {created_at}")));
    }
    println!("{}", palette.dim(&format!("updated {}", task.updated_at)));
}

pub fn print_outbox(entries: &[OutboxEntryView], last_sync_at: Option<&str>) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Outbox"));
    if let Some(at) = last_sync_at {
        println!("{}", palette.dim(&format!("last sync {at}")));
    }
    if entries.is_empty() {
        println!("{}", palette.dim("nothing pending; local and remote agree"));
        return;
    }
    for entry in entries {
        println!(
            "{} {} {} {}",
            palette.dim(&entry.ts),
            palette.kind(entry.kind.as_str()),
            palette.id(&entry.target),
            palette.dim(&entry.id)
        );
    }
    println!("{}", palette.dim(&format!("{} pending op(s)", entries.len())));
}

fn format_task_row(task: &TaskView, palette: &Palette) -> String {
    let mut line = format!(
        "{} {} {}",
        palette.id(&task.id),
        palette.status(&task.status),
        task.title
    );
    if is_client_id(&task.id) {
        line.push(' ');
        line.push_str(&palette.dim("(local)"));
    }
    if task.deleted {
        line.push(' ');
        line.push_str(&palette.dim("(deleting)"));
    }
    line
}

fn filter_summary(filter: &TaskListFilter) -> Option<String> {
    let mut parts = Vec::new();
    if filter.include_deleted {
        parts.push("all=true".to_string());
    }
    if let Some(status) = filter.status.as_deref().and_then(non_empty) {
        parts.push(format!("status={status}"));
    }
    if let Some(query) = filter.query.as_deref().and_then(non_empty) {
        parts.push(format!("query={query}"));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn non_empty(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn status(&self, status: &str) -> String {
        let upper = status.to_ascii_uppercase();
        self.paint(status_color_code(status), &format!("[{upper}]"))
    }

    fn kind(&self, kind: &str) -> String {
        self.paint("35", kind)
    }
}

fn status_color_code(status: &str) -> &'static str {
    match status.trim().to_ascii_lowercase().as_str() {
        "pending" => "36",
        "in_progress" => "33",
        "completed" => "32",
        _ => "37",
    }
}
