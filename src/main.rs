mod app;
mod cli;
mod completions;
mod config;
mod db;
mod domain;
mod identity;
mod listing;
mod outbox;
mod remote;
mod sync;
mod task_id;
mod trigger;
mod ui;

use tracing::warn;

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("SATCHEL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(value: &impl serde::Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("json serialization should work")
    );
}

fn run() -> Result<(), app::AppError> {
    use app::UpdateTaskPatch;
    use clap::Parser;
    use cli::Commands;

    let cli = cli::Cli::parse();

    if let Commands::Init(args) = &cli.command {
        run_init(&cli, args)?;
        return Ok(());
    }
    if let Commands::Completions(args) = &cli.command {
        return run_completions(args);
    }

    let config = config::Config::load_or_default(&cli.config)?;
    let app = app::App::open(&cli.db)?;

    match cli.command {
        Commands::Add(args) => {
            let task = app.create_task(&args.title, args.desc.as_deref(), args.status.as_deref())?;
            if args.json {
                print_json(&task);
            } else {
                println!("added {} {}", task.id, task.title);
            }
            if !args.offline {
                opportunistic_sync(&app, &config);
            }
        }
        Commands::Update(args) => {
            let task = app.update_task(
                &args.id,
                UpdateTaskPatch {
                    title: args.title,
                    description: args.desc,
                    status: args.status,
                },
            )?;
            if args.json {
                print_json(&task);
            } else {
                println!("updated {} [{}] {}", task.id, task.status, task.title);
            }
            if !args.offline {
                opportunistic_sync(&app, &config);
            }
        }
        Commands::Done(args) => {
            let task = app.update_task(
                &args.id,
                UpdateTaskPatch {
                    status: Some("completed".to_string()),
                    ..UpdateTaskPatch::default()
                },
            )?;
            if args.json {
                print_json(&task);
            } else {
                println!("completed {} {}", task.id, task.title);
            }
            if !args.offline {
                opportunistic_sync(&app, &config);
            }
        }
        Commands::Rm(args) => {
            app.delete_task(&args.id)?;
            println!("deleted {}", args.id);
            if !args.offline {
                opportunistic_sync(&app, &config);
            }
        }
        Commands::Ls(args) => {
            let tasks = if args.all {
                app.snapshot_all()?
            } else {
                app.snapshot()?
            };
            let filter = listing::TaskListFilter {
                include_deleted: args.all,
                status: args.status,
                query: args.query,
            };
            let filtered = listing::apply_filters(tasks, &filter);
            if args.json {
                print_json(&filtered);
            } else {
                ui::print_task_list(&filtered, &filter);
            }
        }
        Commands::Show(args) => {
            let task = app
                .show_task(&args.id)?
                .ok_or_else(|| app::AppError::NotFound(args.id.clone()))?;
            if args.json {
                print_json(&task);
            } else {
                ui::print_task(&task);
            }
        }
        Commands::Sync(args) => {
            let remote = remote_store(&config);
            match app.reconcile(&remote)? {
                Some(summary) => {
                    if args.json {
                        print_json(&summary);
                    } else {
                        print_sync_summary(&summary);
                    }
                }
                None => println!("a sync pass is already in flight"),
            }
        }
        Commands::Refresh(args) => {
            let remote = remote_store(&config);
            let count = app.refresh_from(&remote)?;
            if args.json {
                print_json(&app.snapshot()?);
            } else {
                println!("refreshed {} task(s) from {}", count, config.server_url);
            }
        }
        Commands::Outbox(args) => {
            let entries = app.outbox()?;
            if args.json {
                print_json(&entries);
            } else {
                let last_sync_at = app.last_sync_at()?;
                ui::print_outbox(&entries, last_sync_at.as_deref());
            }
        }
        Commands::Watch(args) => run_watch(&app, &config, args.max_passes),
        Commands::Init(_) => unreachable!("init is handled before app initialization"),
        Commands::Completions(_) => {
            unreachable!("completions are handled before app initialization")
        }
    }

    Ok(())
}

fn run_init(cli: &cli::Cli, args: &cli::InitArgs) -> Result<(), app::AppError> {
    if cli.config.exists() && !args.force {
        return Err(app::AppError::InvalidArgument(format!(
            "config '{}' already exists; pass --force to overwrite",
            cli.config.display()
        )));
    }
    let mut config = config::Config::default();
    if let Some(server) = args.server.as_deref() {
        config.server_url = server.trim_end_matches('/').to_string();
    }
    config.save(&cli.config)?;
    app::App::open(&cli.db)?;
    println!("sat init completed ({})", cli.config.display());
    Ok(())
}

fn run_completions(args: &cli::CompletionsArgs) -> Result<(), app::AppError> {
    let shell = match args.shell.as_deref() {
        Some(raw) => completions::parse_shell(raw).ok_or_else(|| {
            app::AppError::InvalidArgument(format!("unsupported shell '{raw}'"))
        })?,
        None => completions::detect_current_shell().ok_or_else(|| {
            app::AppError::InvalidArgument(
                "could not detect shell; pass one explicitly".to_string(),
            )
        })?,
    };
    if args.install {
        let path = completions::install_completions(shell)?;
        println!("installed completions to {}", path.display());
    } else {
        completions::generate_completions(shell, &mut std::io::stdout());
    }
    Ok(())
}

fn remote_store(config: &config::Config) -> remote::HttpRemoteStore {
    remote::HttpRemoteStore::new(config.server_url.clone(), config.auth_token.clone())
}

/// Best-effort pass right after a local mutation. The mutation is already
/// durable; a dead network here just leaves the op queued for a later
/// trigger, so nothing from this path is allowed to fail the command.
fn opportunistic_sync(app: &app::App, config: &config::Config) {
    let remote = remote_store(config);
    match app.reconcile(&remote) {
        Ok(Some(summary)) => {
            if !summary.drained() {
                println!("{} op(s) pending sync", summary.remaining);
            }
        }
        Ok(None) => {}
        Err(err) => warn!(error = %err, "opportunistic sync pass failed"),
    }
}

fn run_watch(app: &app::App, config: &config::Config, max_passes: u64) {
    let remote = remote_store(config);
    let probe = remote::HttpConnectivityProbe::new(config.server_url.clone());
    let controller = trigger::TriggerController::new(
        probe,
        config.settle_delay(),
        config.sync_interval(),
        config.poll_interval(),
    );

    println!("watching {} (ctrl-c to stop)", config.server_url);
    let mut passes = 0u64;
    controller.run(|fired| {
        match app.reconcile(&remote) {
            Ok(Some(summary)) => {
                print!("sync ({}): ", fired.as_str());
                print_sync_summary(&summary);
                // With the outbox drained the server is authoritative;
                // refreshing now cannot clobber unsynced local edits.
                if summary.drained() {
                    match app.refresh_from(&remote) {
                        Ok(count) => println!("refreshed {count} task(s)"),
                        Err(err) => warn!(error = %err, "refresh after sync failed"),
                    }
                }
            }
            Ok(None) => {}
            Err(err) => eprintln!("sync error: {err}"),
        }
        passes += 1;
        max_passes == 0 || passes < max_passes
    });
}

fn print_sync_summary(summary: &sync::SyncSummary) {
    if summary.attempted == 0 {
        println!("nothing to sync");
        return;
    }
    println!(
        "{} op(s): {} ok, {} rejected, {} discarded, {} deferred, {} retried; {} remaining",
        summary.attempted,
        summary.succeeded,
        summary.rejected,
        summary.discarded,
        summary.deferred,
        summary.retried,
        summary.remaining
    );
}
