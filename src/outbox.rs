use std::error::Error;
use std::fmt;

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::domain::task::{TaskDraft, TaskPatch};

/// One pending mutation intent. `id` is queue-unique and only used for
/// dedup and removal; `ts` orders intents for a single logical record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboxOp {
    Create {
        id: String,
        client_id: String,
        payload: TaskDraft,
        ts: String,
    },
    Update {
        id: String,
        server_id: Option<String>,
        client_id: Option<String>,
        payload: TaskPatch,
        ts: String,
    },
    Delete {
        id: String,
        server_id: Option<String>,
        client_id: Option<String>,
        ts: String,
    },
}

impl OutboxOp {
    pub fn id(&self) -> &str {
        match self {
            OutboxOp::Create { id, .. }
            | OutboxOp::Update { id, .. }
            | OutboxOp::Delete { id, .. } => id,
        }
    }

    pub fn ts(&self) -> &str {
        match self {
            OutboxOp::Create { ts, .. }
            | OutboxOp::Update { ts, .. }
            | OutboxOp::Delete { ts, .. } => ts,
        }
    }

    pub fn client_id(&self) -> Option<&str> {
        match self {
            OutboxOp::Create { client_id, .. } => Some(client_id),
            OutboxOp::Update { client_id, .. } | OutboxOp::Delete { client_id, .. } => {
                client_id.as_deref()
            }
        }
    }

    pub fn server_id(&self) -> Option<&str> {
        match self {
            OutboxOp::Create { .. } => None,
            OutboxOp::Update { server_id, .. } | OutboxOp::Delete { server_id, .. } => {
                server_id.as_deref()
            }
        }
    }

    pub fn kind(&self) -> OpKind {
        match self {
            OutboxOp::Create { .. } => OpKind::Create,
            OutboxOp::Update { .. } => OpKind::Update,
            OutboxOp::Delete { .. } => OpKind::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Create,
    Update,
    Delete,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Create => "create",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Appends one intent. The insert commits before this returns, so a crash
/// immediately after a user action cannot lose the intent.
pub fn enqueue(conn: &Connection, op: &OutboxOp) -> Result<(), OutboxError> {
    let (kind, client_id, server_id, payload_json) = match op {
        OutboxOp::Create {
            client_id, payload, ..
        } => (
            OpKind::Create,
            Some(client_id.as_str()),
            None,
            Some(serde_json::to_string(payload).map_err(OutboxError::payload(op.id()))?),
        ),
        OutboxOp::Update {
            server_id,
            client_id,
            payload,
            ..
        } => (
            OpKind::Update,
            client_id.as_deref(),
            server_id.as_deref(),
            Some(serde_json::to_string(payload).map_err(OutboxError::payload(op.id()))?),
        ),
        OutboxOp::Delete {
            server_id,
            client_id,
            ..
        } => (OpKind::Delete, client_id.as_deref(), server_id.as_deref(), None),
    };

    conn.execute(
        concat!(
            "INSERT INTO outbox (id, kind, client_id, server_id, payload_json, ts) ",
            "VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ),
        params![op.id(), kind.as_str(), client_id, server_id, payload_json, op.ts()],
    )?;
    Ok(())
}

/// All pending intents, oldest first. Ties on `ts` fall back to insertion
/// order via rowid.
pub fn list(conn: &Connection) -> Result<Vec<OutboxOp>, OutboxError> {
    let mut stmt = conn.prepare(
        r#"
SELECT id, kind, client_id, server_id, payload_json, ts
FROM outbox
ORDER BY ts ASC, rowid ASC
"#,
    )?;

    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let kind: String = row.get(1)?;
        let client_id: Option<String> = row.get(2)?;
        let server_id: Option<String> = row.get(3)?;
        let payload_json: Option<String> = row.get(4)?;
        let ts: String = row.get(5)?;
        result.push(decode_row(id, &kind, client_id, server_id, payload_json, ts)?);
    }
    Ok(result)
}

pub fn len(conn: &Connection) -> Result<u64, OutboxError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))?;
    Ok(count as u64)
}

/// Removes a settled batch in one transaction. Removing an id that is
/// already gone is a no-op, so an interrupted removal can be retried.
pub fn remove(conn: &Connection, ids: &[String]) -> Result<(), OutboxError> {
    if ids.is_empty() {
        return Ok(());
    }
    let tx = conn.unchecked_transaction()?;
    for id in ids {
        tx.execute("DELETE FROM outbox WHERE id = ?1", params![id])?;
    }
    tx.commit()?;
    Ok(())
}

/// Startup hygiene: at most one unresolved create may exist per client id.
/// Keeps the oldest create for each client id and drops the rest. Returns
/// how many duplicates were removed.
pub fn collapse_duplicate_creates(conn: &Connection) -> Result<u64, OutboxError> {
    let removed = conn.execute(
        r#"
DELETE FROM outbox
WHERE kind = 'create'
  AND rowid NOT IN (
    SELECT MIN(rowid) FROM outbox
    WHERE kind = 'create'
    GROUP BY client_id
  )
"#,
        [],
    )?;
    Ok(removed as u64)
}

fn decode_row(
    id: String,
    kind: &str,
    client_id: Option<String>,
    server_id: Option<String>,
    payload_json: Option<String>,
    ts: String,
) -> Result<OutboxOp, OutboxError> {
    match kind {
        "create" => {
            let client_id = client_id.ok_or_else(|| OutboxError::Corrupt {
                id: id.clone(),
                message: "create row is missing client_id".to_string(),
            })?;
            let raw = payload_json.ok_or_else(|| OutboxError::Corrupt {
                id: id.clone(),
                message: "create row is missing payload".to_string(),
            })?;
            let payload: TaskDraft =
                serde_json::from_str(&raw).map_err(OutboxError::payload(&id))?;
            Ok(OutboxOp::Create {
                id,
                client_id,
                payload,
                ts,
            })
        }
        "update" => {
            let raw = payload_json.ok_or_else(|| OutboxError::Corrupt {
                id: id.clone(),
                message: "update row is missing payload".to_string(),
            })?;
            let payload: TaskPatch =
                serde_json::from_str(&raw).map_err(OutboxError::payload(&id))?;
            Ok(OutboxOp::Update {
                id,
                server_id,
                client_id,
                payload,
                ts,
            })
        }
        "delete" => Ok(OutboxOp::Delete {
            id,
            server_id,
            client_id,
            ts,
        }),
        other => Err(OutboxError::Corrupt {
            id,
            message: format!("unknown op kind '{}'", other),
        }),
    }
}

#[derive(Debug)]
pub enum OutboxError {
    Db(rusqlite::Error),
    Payload {
        id: String,
        source: serde_json::Error,
    },
    Corrupt {
        id: String,
        message: String,
    },
}

impl OutboxError {
    fn payload(id: &str) -> impl FnOnce(serde_json::Error) -> OutboxError + '_ {
        move |source| OutboxError::Payload {
            id: id.to_string(),
            source,
        }
    }
}

impl fmt::Display for OutboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboxError::Db(err) => write!(f, "outbox database error: {}", err),
            OutboxError::Payload { id, source } => {
                write!(f, "outbox op '{}' payload error: {}", id, source)
            }
            OutboxError::Corrupt { id, message } => {
                write!(f, "outbox op '{}' is corrupt: {}", id, message)
            }
        }
    }
}

impl Error for OutboxError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OutboxError::Db(err) => Some(err),
            OutboxError::Payload { source, .. } => Some(source),
            OutboxError::Corrupt { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for OutboxError {
    fn from(value: rusqlite::Error) -> Self {
        OutboxError::Db(value)
    }
}
