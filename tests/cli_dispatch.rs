use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use uuid::Uuid;

fn unique_workspace(prefix: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&path).expect("workspace should be creatable");
    path
}

fn run_sat(workspace: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sat"))
        .arg("--db")
        .arg(workspace.join("state.sqlite"))
        .arg("--config")
        .arg(workspace.join("config.toml"))
        .args(args)
        .env("SATCHEL_LOG", "error")
        .output()
        .expect("sat command should run")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "expected success but failed.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn assert_failure(output: &Output) {
    assert!(
        !output.status.success(),
        "expected failure but command succeeded.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn add_list_show_delete_work_offline() {
    let workspace = unique_workspace("satchel-cli-crud");

    let added = run_sat(
        &workspace,
        &["add", "Buy milk", "--desc", "2 liters", "--offline", "--json"],
    );
    assert_success(&added);
    let task = stdout_json(&added);
    let id = task["id"].as_str().expect("task should have an id").to_string();
    assert!(id.starts_with("c-"), "offline create should use a local id");
    assert_eq!(task["status"], "pending");

    let listed = run_sat(&workspace, &["ls", "--json"]);
    assert_success(&listed);
    let tasks = stdout_json(&listed);
    assert_eq!(tasks.as_array().map(Vec::len), Some(1));

    let shown = run_sat(&workspace, &["show", &id, "--json"]);
    assert_success(&shown);
    assert_eq!(stdout_json(&shown)["title"], "Buy milk");

    let done = run_sat(&workspace, &["done", &id, "--offline", "--json"]);
    assert_success(&done);
    assert_eq!(stdout_json(&done)["status"], "completed");

    let removed = run_sat(&workspace, &["rm", &id, "--offline"]);
    assert_success(&removed);

    // Tombstoned: gone from the default listing, visible with --all.
    let listed = run_sat(&workspace, &["ls", "--json"]);
    assert_success(&listed);
    assert_eq!(stdout_json(&listed).as_array().map(Vec::len), Some(0));
    let listed_all = run_sat(&workspace, &["ls", "--all", "--json"]);
    assert_success(&listed_all);
    assert_eq!(stdout_json(&listed_all).as_array().map(Vec::len), Some(1));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn mutations_accumulate_in_the_outbox() {
    let workspace = unique_workspace("satchel-cli-outbox");

    let added = run_sat(&workspace, &["add", "Buy milk", "--offline", "--json"]);
    assert_success(&added);
    let id = stdout_json(&added)["id"]
        .as_str()
        .expect("task should have an id")
        .to_string();
    assert_success(&run_sat(&workspace, &["done", &id, "--offline", "--json"]));

    let outbox = run_sat(&workspace, &["outbox", "--json"]);
    assert_success(&outbox);
    let entries = stdout_json(&outbox);
    let entries = entries.as_array().expect("outbox should be an array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["kind"], "create");
    assert_eq!(entries[1]["kind"], "update");
    assert_eq!(entries[1]["target"], id);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn sync_against_unreachable_server_keeps_ops_queued() {
    let workspace = unique_workspace("satchel-cli-deadsync");

    // Point the config at a port nothing listens on.
    std::fs::write(
        workspace.join("config.toml"),
        "server_url = \"http://127.0.0.1:9\"\n",
    )
    .expect("config should be writable");

    assert_success(&run_sat(
        &workspace,
        &["add", "Buy milk", "--offline", "--json"],
    ));

    let synced = run_sat(&workspace, &["sync", "--json"]);
    assert_success(&synced);
    let summary = stdout_json(&synced);
    assert_eq!(summary["attempted"], 1);
    assert_eq!(summary["retried"], 1);
    assert_eq!(summary["remaining"], 1);

    // The op is still there for the next pass.
    let outbox = run_sat(&workspace, &["outbox", "--json"]);
    assert_success(&outbox);
    assert_eq!(stdout_json(&outbox).as_array().map(Vec::len), Some(1));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn init_refuses_to_clobber_without_force() {
    let workspace = unique_workspace("satchel-cli-init");

    let first = run_sat(&workspace, &["init", "--server", "http://tasks.test/api"]);
    assert_success(&first);
    assert!(workspace.join("config.toml").exists());
    assert!(workspace.join("state.sqlite").exists());

    let second = run_sat(&workspace, &["init"]);
    assert_failure(&second);

    let forced = run_sat(&workspace, &["init", "--force"]);
    assert_success(&forced);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn rejects_unknown_status_values() {
    let workspace = unique_workspace("satchel-cli-badstatus");

    let output = run_sat(
        &workspace,
        &["add", "Buy milk", "--status", "archived", "--offline"],
    );
    assert_failure(&output);
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("invalid task status"),
        "stderr should explain the bad status"
    );

    let _ = std::fs::remove_dir_all(workspace);
}
