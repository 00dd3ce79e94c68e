use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, CommandFactory, Parser, Subcommand};

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "sat")]
#[command(bin_name = "sat")]
#[command(version)]
#[command(about = "An offline-first task tracker that reconciles with its server")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'd',
        long,
        env = "SATCHEL_DB_PATH",
        default_value = ".satchel/state.sqlite",
        help = "Path to the local SQLite store."
    )]
    pub db: String,

    #[arg(
        short = 'c',
        long,
        env = "SATCHEL_CONFIG_PATH",
        default_value = ".satchel/config.toml",
        help = "Path to the sync configuration file."
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

pub fn styled_command() -> clap::Command {
    Cli::command()
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Write the default config and initialize the local store.")]
    Init(InitArgs),
    #[command(about = "Create a task. Works offline; syncs when it can.")]
    Add(AddArgs),
    #[command(about = "Update task fields.")]
    Update(UpdateArgs),
    #[command(about = "Mark a task completed.")]
    Done(DoneArgs),
    #[command(about = "Delete a task.")]
    Rm(RmArgs),
    #[command(about = "List tasks with filtering.")]
    Ls(ListArgs),
    #[command(about = "Show one task by id.")]
    Show(ShowArgs),
    #[command(about = "Run one reconciliation pass against the server.")]
    Sync(SyncArgs),
    #[command(about = "Fetch the full task list from the server and replace the local store.")]
    Refresh(RefreshArgs),
    #[command(about = "List pending outbox operations.")]
    Outbox(OutboxArgs),
    #[command(about = "Watch connectivity and reconcile automatically.")]
    Watch(WatchArgs),
    #[command(about = "Generate or install shell completions.")]
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    #[arg(long, help = "Server base URL to write into the config.")]
    pub server: Option<String>,

    #[arg(long, help = "Overwrite an existing config file.")]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(help = "Task title.")]
    pub title: String,

    #[arg(short = 'D', long = "desc", help = "Optional description text.")]
    pub desc: Option<String>,

    #[arg(short = 's', long, help = "Initial status (defaults to pending).")]
    pub status: Option<String>,

    #[arg(long, help = "Queue only; skip the opportunistic sync.")]
    pub offline: bool,

    #[arg(long, help = "Print the created task as JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[arg(help = "Task id (server or local).")]
    pub id: String,

    #[arg(short = 't', long, help = "New title.")]
    pub title: Option<String>,

    #[arg(short = 'D', long = "desc", help = "New description.")]
    pub desc: Option<String>,

    #[arg(short = 's', long, help = "New status (pending, in_progress, completed).")]
    pub status: Option<String>,

    #[arg(long, help = "Queue only; skip the opportunistic sync.")]
    pub offline: bool,

    #[arg(long, help = "Print the updated task as JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DoneArgs {
    #[arg(help = "Task id (server or local).")]
    pub id: String,

    #[arg(long, help = "Queue only; skip the opportunistic sync.")]
    pub offline: bool,

    #[arg(long, help = "Print the updated task as JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RmArgs {
    #[arg(help = "Task id (server or local).")]
    pub id: String,

    #[arg(long, help = "Queue only; skip the opportunistic sync.")]
    pub offline: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(short = 's', long, help = "Only tasks with this status.")]
    pub status: Option<String>,

    #[arg(short = 'q', long, help = "Substring match on title and description.")]
    pub query: Option<String>,

    #[arg(short = 'a', long, help = "Include tombstoned tasks awaiting remote deletion.")]
    pub all: bool,

    #[arg(long, help = "Print tasks as JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(help = "Task id (server or local).")]
    pub id: String,

    #[arg(long, help = "Print the task as JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    #[arg(long, help = "Print the sync summary as JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RefreshArgs {
    #[arg(long, help = "Print the refreshed task list as JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct OutboxArgs {
    #[arg(long, help = "Print pending operations as JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[arg(long, help = "Stop after this many reconciliation passes (0 = forever).", default_value_t = 0)]
    pub max_passes: u64,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    #[arg(help = "Shell name (bash, zsh, fish). Auto-detected if omitted.")]
    pub shell: Option<String>,

    #[arg(
        short = 'i',
        long = "install",
        help = "Write completions to the canonical path for the shell."
    )]
    pub install: bool,
}
