use std::time::Duration;

use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Result};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: [Migration; 1] = [Migration {
    version: 1,
    name: "baseline_offline_store_v1",
    sql: r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    created_at TEXT,
    updated_at TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS outbox (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    client_id TEXT,
    server_id TEXT,
    payload_json TEXT,
    ts TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS id_map (
    client_id TEXT PRIMARY KEY,
    server_id TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_task_updated_at ON task(updated_at);
CREATE INDEX IF NOT EXISTS idx_task_status ON task(status);
CREATE INDEX IF NOT EXISTS idx_outbox_ts ON outbox(ts);
CREATE INDEX IF NOT EXISTS idx_outbox_client_id ON outbox(client_id);
"#,
}];

pub fn open_connection(path: &str) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure_for_durability(&conn)?;
    apply_migrations(&mut conn)?;
    Ok(conn)
}

fn configure_for_durability(conn: &Connection) -> Result<()> {
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "NORMAL")?;
    conn.pragma_update(None::<DatabaseName>, "foreign_keys", "ON")?;
    conn.pragma_update(None::<DatabaseName>, "temp_store", "MEMORY")?;
    conn.pragma_update(None::<DatabaseName>, "busy_timeout", 5000i64)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#,
    )?;

    for migration in MIGRATIONS {
        let already_applied: Option<i64> = tx
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .optional()?;

        if already_applied.is_some() {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now_utc_rfc3339()],
        )?;
    }

    tx.execute(
        r#"
INSERT INTO meta (key, value)
VALUES ('schema_version', ?1)
ON CONFLICT(key) DO UPDATE SET value = excluded.value
"#,
        params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;

    tx.commit()
}

pub fn now_utc_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("RFC3339 formatting for UTC timestamp should never fail")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub created_at: Option<String>,
    pub updated_at: String,
    pub deleted: bool,
}

pub struct UpsertTask<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub status: &'a str,
    pub created_at: Option<&'a str>,
    pub updated_at: &'a str,
    pub deleted: bool,
}

pub fn upsert_task(conn: &Connection, args: &UpsertTask<'_>) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO task (
    id, title, description, status, created_at, updated_at, deleted
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT(id) DO UPDATE SET
    title = excluded.title,
    description = excluded.description,
    status = excluded.status,
    created_at = COALESCE(task.created_at, excluded.created_at),
    updated_at = excluded.updated_at,
    deleted = excluded.deleted
"#,
        params![
            args.id,
            args.title,
            args.description,
            args.status,
            args.created_at,
            args.updated_at,
            args.deleted
        ],
    )?;
    Ok(())
}

pub fn get_task(conn: &Connection, id: &str) -> Result<Option<TaskRow>> {
    conn.query_row(
        r#"
SELECT id, title, description, status, created_at, updated_at, deleted
FROM task
WHERE id = ?1
"#,
        params![id],
        row_to_task,
    )
    .optional()
}

pub fn list_tasks(conn: &Connection) -> Result<Vec<TaskRow>> {
    let mut stmt = conn.prepare(
        r#"
SELECT id, title, description, status, created_at, updated_at, deleted
FROM task
ORDER BY updated_at DESC, id ASC
"#,
    )?;

    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(row_to_task(row)?);
    }
    Ok(result)
}

pub fn delete_task(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM task WHERE id = ?1", params![id])?;
    Ok(())
}

/// Clears and repopulates the task table in one transaction, so a caller
/// never observes a half-replaced store.
pub fn replace_all_tasks(conn: &Connection, tasks: &[TaskRow]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM task", [])?;
    for task in tasks {
        upsert_task(
            &tx,
            &UpsertTask {
                id: &task.id,
                title: &task.title,
                description: &task.description,
                status: &task.status,
                created_at: task.created_at.as_deref(),
                updated_at: &task.updated_at,
                deleted: task.deleted,
            },
        )?;
    }
    tx.commit()
}

/// Moves the row under a temporary client id to its server id, preserving
/// every other field. The temp-keyed row must not survive the swap.
pub fn rekey_task(conn: &Connection, temp_id: &str, server_id: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    rekey_task_in(&tx, temp_id, server_id)?;
    tx.commit()
}

/// Body of [`rekey_task`] for callers that already hold a transaction.
pub fn rekey_task_in(conn: &Connection, temp_id: &str, server_id: &str) -> Result<()> {
    if let Some(task) = get_task(conn, temp_id)? {
        conn.execute("DELETE FROM task WHERE id = ?1", params![temp_id])?;
        upsert_task(
            conn,
            &UpsertTask {
                id: server_id,
                title: &task.title,
                description: &task.description,
                status: &task.status,
                created_at: task.created_at.as_deref(),
                updated_at: &task.updated_at,
                deleted: task.deleted,
            },
        )?;
    }
    Ok(())
}

pub fn task_exists(conn: &Connection, id: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row("SELECT id FROM task WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM meta WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO meta (key, value)
VALUES (?1, ?2)
ON CONFLICT(key) DO UPDATE SET value = excluded.value
"#,
        params![key, value],
    )?;
    Ok(())
}

fn row_to_task(row: &rusqlite::Row<'_>) -> Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        deleted: row.get::<_, i64>(6)? != 0,
    })
}
