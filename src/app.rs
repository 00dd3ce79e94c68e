use std::error::Error;
use std::fmt;
use std::str::FromStr;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ConfigError;
use crate::db::{self, now_utc_rfc3339, TaskRow, UpsertTask};
use crate::domain::status::{ParseTaskStatusError, TaskStatus};
use crate::domain::task::{TaskDraft, TaskPatch};
use crate::identity;
use crate::outbox::{self, OpKind, OutboxError, OutboxOp};
use crate::remote::{RemoteError, RemoteStore, RemoteTask};
use crate::sync::{SyncError, SyncGate, SyncService, SyncSummary};
use crate::task_id::{generate_client_id, is_client_id, new_op_id};

/// Facade over the offline store: every user-facing mutation writes the
/// record optimistically and queues the matching outbox intent in one
/// transaction, so neither can exist without the other.
pub struct App {
    conn: Connection,
    gate: SyncGate,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub created_at: Option<String>,
    pub updated_at: String,
    pub deleted: bool,
}

impl From<TaskRow> for TaskView {
    fn from(value: TaskRow) -> Self {
        Self {
            id: value.id,
            title: value.title,
            description: value.description,
            status: value.status,
            created_at: value.created_at,
            updated_at: value.updated_at,
            deleted: value.deleted,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutboxEntryView {
    pub id: String,
    pub kind: OpKind,
    pub target: String,
    pub ts: String,
}

impl From<&OutboxOp> for OutboxEntryView {
    fn from(op: &OutboxOp) -> Self {
        let target = op
            .server_id()
            .or(op.client_id())
            .unwrap_or("-")
            .to_string();
        Self {
            id: op.id().to_string(),
            kind: op.kind(),
            target,
            ts: op.ts().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

impl UpdateTaskPatch {
    fn has_changes(&self) -> bool {
        self.title.is_some() || self.description.is_some() || self.status.is_some()
    }
}

impl App {
    pub fn open(db_path: &str) -> Result<Self, AppError> {
        ensure_parent_dir(db_path)?;
        let conn = db::open_connection(db_path)?;
        let collapsed = outbox::collapse_duplicate_creates(&conn)?;
        if collapsed > 0 {
            info!(collapsed, "dropped duplicate queued creates at startup");
        }
        Ok(Self {
            conn,
            gate: SyncGate::new(),
        })
    }

    pub fn create_task(
        &self,
        title: &str,
        description: Option<&str>,
        status: Option<&str>,
    ) -> Result<TaskView, AppError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::InvalidArgument(
                "title cannot be empty".to_string(),
            ));
        }
        let status = match status {
            Some(raw) => TaskStatus::from_str(raw)?,
            None => TaskStatus::Pending,
        };
        let description = description.unwrap_or("").trim().to_string();

        let client_id =
            generate_client_id(|candidate| db::task_exists(&self.conn, candidate).unwrap_or(false));
        let now = now_utc_rfc3339();
        let draft = TaskDraft {
            title: title.to_string(),
            description: description.clone(),
            status,
        };

        let tx = self.conn.unchecked_transaction()?;
        db::upsert_task(
            &tx,
            &UpsertTask {
                id: &client_id,
                title,
                description: &description,
                status: status.as_str(),
                created_at: Some(&now),
                updated_at: &now,
                deleted: false,
            },
        )?;
        outbox::enqueue(
            &tx,
            &OutboxOp::Create {
                id: new_op_id(),
                client_id: client_id.clone(),
                payload: draft,
                ts: now.clone(),
            },
        )?;
        tx.commit()?;

        debug!(id = %client_id, "task created locally");
        let row = db::get_task(&self.conn, &client_id)?
            .ok_or_else(|| AppError::NotFound(client_id.clone()))?;
        Ok(TaskView::from(row))
    }

    pub fn update_task(&self, id: &str, patch: UpdateTaskPatch) -> Result<TaskView, AppError> {
        if !patch.has_changes() {
            return Err(AppError::InvalidArgument(
                "update requires at least one field change".to_string(),
            ));
        }

        let current =
            db::get_task(&self.conn, id)?.ok_or_else(|| AppError::NotFound(id.to_string()))?;

        let mut title = current.title.clone();
        let mut description = current.description.clone();
        let mut status = TaskStatus::from_str(&current.status)?;
        let mut queued = TaskPatch::default();

        if let Some(next_title_raw) = patch.title.as_deref() {
            let next_title = next_title_raw.trim();
            if next_title.is_empty() {
                return Err(AppError::InvalidArgument(
                    "title cannot be empty".to_string(),
                ));
            }
            if next_title != title {
                title = next_title.to_string();
                queued.title = Some(title.clone());
            }
        }

        if let Some(next_description_raw) = patch.description.as_deref() {
            let next_description = next_description_raw.trim();
            if next_description != description {
                description = next_description.to_string();
                queued.description = Some(description.clone());
            }
        }

        if let Some(next_status_raw) = patch.status.as_deref() {
            let next_status = TaskStatus::from_str(next_status_raw)?;
            if next_status != status {
                status = next_status;
                queued.status = Some(status);
            }
        }

        if !queued.has_changes() {
            return Ok(TaskView::from(current));
        }

        let now = now_utc_rfc3339();
        let (server_id, client_id) = self.identity_for(id)?;

        let tx = self.conn.unchecked_transaction()?;
        db::upsert_task(
            &tx,
            &UpsertTask {
                id,
                title: &title,
                description: &description,
                status: status.as_str(),
                created_at: current.created_at.as_deref(),
                updated_at: &now,
                deleted: current.deleted,
            },
        )?;
        outbox::enqueue(
            &tx,
            &OutboxOp::Update {
                id: new_op_id(),
                server_id,
                client_id,
                payload: queued,
                ts: now,
            },
        )?;
        tx.commit()?;

        let row =
            db::get_task(&self.conn, id)?.ok_or_else(|| AppError::NotFound(id.to_string()))?;
        Ok(TaskView::from(row))
    }

    /// Tombstones the record locally and queues the remote delete. The row
    /// disappears from `snapshot()` immediately; the engine removes it for
    /// good once the server confirms.
    pub fn delete_task(&self, id: &str) -> Result<(), AppError> {
        let current =
            db::get_task(&self.conn, id)?.ok_or_else(|| AppError::NotFound(id.to_string()))?;
        let now = now_utc_rfc3339();
        let (server_id, client_id) = self.identity_for(id)?;

        let tx = self.conn.unchecked_transaction()?;
        db::upsert_task(
            &tx,
            &UpsertTask {
                id,
                title: &current.title,
                description: &current.description,
                status: &current.status,
                created_at: current.created_at.as_deref(),
                updated_at: &now,
                deleted: true,
            },
        )?;
        outbox::enqueue(
            &tx,
            &OutboxOp::Delete {
                id: new_op_id(),
                server_id,
                client_id,
                ts: now,
            },
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Live records for rendering, newest activity first.
    pub fn snapshot(&self) -> Result<Vec<TaskView>, AppError> {
        Ok(db::list_tasks(&self.conn)?
            .into_iter()
            .filter(|row| !row.deleted)
            .map(TaskView::from)
            .collect())
    }

    /// Every resident record, tombstones included.
    pub fn snapshot_all(&self) -> Result<Vec<TaskView>, AppError> {
        Ok(db::list_tasks(&self.conn)?
            .into_iter()
            .map(TaskView::from)
            .collect())
    }

    pub fn show_task(&self, id: &str) -> Result<Option<TaskView>, AppError> {
        Ok(db::get_task(&self.conn, id)?.map(TaskView::from))
    }

    /// Replaces the whole store with server truth, atomically.
    pub fn full_refresh(&self, tasks: &[RemoteTask]) -> Result<usize, AppError> {
        let now = now_utc_rfc3339();
        let rows: Vec<TaskRow> = tasks
            .iter()
            .map(|task| TaskRow {
                id: task.id.clone(),
                title: task.title.clone(),
                description: task.description.clone(),
                status: task.status.as_str().to_string(),
                created_at: task.created_at.clone(),
                updated_at: task.created_at.clone().unwrap_or_else(|| now.clone()),
                deleted: false,
            })
            .collect();
        db::replace_all_tasks(&self.conn, &rows)?;
        db::set_meta(&self.conn, "last_refresh_at", &now)?;
        Ok(rows.len())
    }

    pub fn refresh_from(&self, remote: &dyn RemoteStore) -> Result<usize, AppError> {
        let tasks = remote.fetch_all()?;
        self.full_refresh(&tasks)
    }

    /// Runs one reconciliation pass. If one is already in flight the
    /// request is dropped and `None` comes back.
    pub fn reconcile(&self, remote: &dyn RemoteStore) -> Result<Option<SyncSummary>, AppError> {
        let Some(_in_flight) = self.gate.try_begin() else {
            debug!("reconcile request ignored; a pass is already in flight");
            return Ok(None);
        };
        let summary = SyncService::new(&self.conn, remote).reconcile()?;
        db::set_meta(&self.conn, "last_sync_at", &now_utc_rfc3339())?;
        Ok(Some(summary))
    }

    pub fn outbox(&self) -> Result<Vec<OutboxEntryView>, AppError> {
        Ok(outbox::list(&self.conn)?
            .iter()
            .map(OutboxEntryView::from)
            .collect())
    }

    pub fn last_sync_at(&self) -> Result<Option<String>, AppError> {
        Ok(db::get_meta(&self.conn, "last_sync_at")?)
    }

    /// Splits a record id into the (server_id, client_id) pair an outbox op
    /// carries. A temp-keyed record may already have a mapping if a create
    /// settled but the rekey was interrupted; pass it along when known.
    fn identity_for(&self, id: &str) -> Result<(Option<String>, Option<String>), AppError> {
        if is_client_id(id) {
            let server_id = identity::get_mapping(&self.conn, id)?;
            Ok((server_id, Some(id.to_string())))
        } else {
            Ok((Some(id.to_string()), None))
        }
    }
}

fn ensure_parent_dir(path: &str) -> Result<(), AppError> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    Db(rusqlite::Error),
    Outbox(OutboxError),
    Sync(SyncError),
    Remote(RemoteError),
    Config(ConfigError),
    ParseStatus(ParseTaskStatusError),
    InvalidArgument(String),
    NotFound(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "I/O error: {}", err),
            AppError::Db(err) => write!(f, "database error: {}", err),
            AppError::Outbox(err) => write!(f, "outbox error: {}", err),
            AppError::Sync(err) => write!(f, "sync error: {}", err),
            AppError::Remote(err) => write!(f, "remote error: {}", err),
            AppError::Config(err) => write!(f, "config error: {}", err),
            AppError::ParseStatus(err) => write!(f, "status parse error: {}", err),
            AppError::InvalidArgument(message) => write!(f, "{}", message),
            AppError::NotFound(id) => write!(f, "task '{}' not found in local store", id),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            AppError::Db(err) => Some(err),
            AppError::Outbox(err) => Some(err),
            AppError::Sync(err) => Some(err),
            AppError::Remote(err) => Some(err),
            AppError::Config(err) => Some(err),
            AppError::ParseStatus(err) => Some(err),
            AppError::InvalidArgument(_) => None,
            AppError::NotFound(_) => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::Io(value)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        AppError::Db(value)
    }
}

impl From<OutboxError> for AppError {
    fn from(value: OutboxError) -> Self {
        AppError::Outbox(value)
    }
}

impl From<SyncError> for AppError {
    fn from(value: SyncError) -> Self {
        AppError::Sync(value)
    }
}

impl From<RemoteError> for AppError {
    fn from(value: RemoteError) -> Self {
        AppError::Remote(value)
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value)
    }
}

impl From<ParseTaskStatusError> for AppError {
    fn from(value: ParseTaskStatusError) -> Self {
        AppError::ParseStatus(value)
    }
}

#[cfg(test)]
mod tests;
