use std::error::Error;
use std::fmt;
use std::time::Duration;

use serde_json::{json, Value};

use crate::domain::status::TaskStatus;
use crate::domain::task::{TaskDraft, TaskPatch};

/// What the reconciliation engine needs from the authoritative store. Only
/// outcome classes matter here; the transport behind the trait is a
/// collaborator, not part of the engine.
pub trait RemoteStore {
    fn create(&self, draft: &TaskDraft) -> Result<CreateReceipt, RemoteError>;
    fn update(&self, id: &str, patch: &TaskPatch) -> Result<(), RemoteError>;
    fn delete(&self, id: &str) -> Result<(), RemoteError>;
    fn fetch_all(&self) -> Result<Vec<RemoteTask>, RemoteError>;
}

/// Boolean "are we reachable" signal consumed by the trigger layer. The
/// engine itself never probes; reachability is asserted by its caller.
pub trait ConnectivitySignal {
    fn is_online(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateReceipt {
    /// Some servers acknowledge a create without echoing the new id. The
    /// engine decides what to do with that case; the transport just reports
    /// it honestly.
    pub server_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTask {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: Option<String>,
}

#[derive(Debug)]
pub enum RemoteError {
    /// 4xx-equivalent: the request is structurally invalid or conflicting
    /// and will never succeed as issued.
    Rejected { status: u16, message: String },
    /// 5xx-equivalent, unreachable, or timed out: retrying later may work.
    Unavailable {
        status: Option<u16>,
        message: String,
    },
}

impl RemoteError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, RemoteError::Rejected { .. })
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Rejected { status, message } => {
                write!(f, "remote rejected request ({}): {}", status, message)
            }
            RemoteError::Unavailable {
                status: Some(code),
                message,
            } => write!(f, "remote unavailable ({}): {}", code, message),
            RemoteError::Unavailable {
                status: None,
                message,
            } => write!(f, "remote unreachable: {}", message),
        }
    }
}

impl Error for RemoteError {}

/// HTTP implementation of the remote contract, speaking the task server's
/// REST surface (`/tasks`).
pub struct HttpRemoteStore {
    agent: ureq::Agent,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(10))
            .build();
        Self {
            agent,
            base_url: normalize_base_url(base_url.into()),
            auth_token,
        }
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let url = format!("{}{}", self.base_url, path);
        let req = self.agent.request(method, &url);
        match self.auth_token.as_deref() {
            Some(token) => req.set("Authorization", &format!("Bearer {}", token)),
            None => req,
        }
    }
}

impl RemoteStore for HttpRemoteStore {
    fn create(&self, draft: &TaskDraft) -> Result<CreateReceipt, RemoteError> {
        let body = json!({
            "title": draft.title,
            "description": draft.description,
            "status": draft.status.wire_str(),
        });
        let response = self
            .request("POST", "/tasks")
            .send_json(body)
            .map_err(classify_transport)?;
        let value: Value = response
            .into_json()
            .map_err(|err| RemoteError::Unavailable {
                status: None,
                message: format!("create response was not JSON: {}", err),
            })?;
        Ok(CreateReceipt {
            server_id: extract_server_id(&value),
        })
    }

    fn update(&self, id: &str, patch: &TaskPatch) -> Result<(), RemoteError> {
        let mut body = serde_json::Map::new();
        if let Some(title) = patch.title.as_deref() {
            body.insert("title".to_string(), Value::from(title));
        }
        if let Some(description) = patch.description.as_deref() {
            body.insert("description".to_string(), Value::from(description));
        }
        if let Some(status) = patch.status {
            body.insert("status".to_string(), Value::from(status.wire_str()));
        }
        self.request("PUT", &format!("/tasks/{}", id))
            .send_json(Value::Object(body))
            .map_err(classify_transport)?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.request("DELETE", &format!("/tasks/{}", id))
            .call()
            .map_err(classify_transport)?;
        Ok(())
    }

    fn fetch_all(&self) -> Result<Vec<RemoteTask>, RemoteError> {
        let response = self
            .request("GET", "/tasks")
            .call()
            .map_err(classify_transport)?;
        let value: Value = response
            .into_json()
            .map_err(|err| RemoteError::Unavailable {
                status: None,
                message: format!("task list response was not JSON: {}", err),
            })?;
        Ok(parse_task_list(&value))
    }
}

/// Simple reachability probe against the task server itself: any HTTP
/// response (even an error status) proves the network path is up.
pub struct HttpConnectivityProbe {
    agent: ureq::Agent,
    url: String,
}

impl HttpConnectivityProbe {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(3))
            .build();
        Self {
            agent,
            url: normalize_base_url(base_url.into()),
        }
    }
}

impl ConnectivitySignal for HttpConnectivityProbe {
    fn is_online(&self) -> bool {
        match self.agent.head(&self.url).call() {
            Ok(_) => true,
            Err(ureq::Error::Status(_, _)) => true,
            Err(_) => false,
        }
    }
}

fn normalize_base_url(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

fn classify_transport(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(code, response) => {
            let message = response.into_string().unwrap_or_default();
            if (400..500).contains(&code) {
                RemoteError::Rejected {
                    status: code,
                    message,
                }
            } else {
                RemoteError::Unavailable {
                    status: Some(code),
                    message,
                }
            }
        }
        other => RemoteError::Unavailable {
            status: None,
            message: other.to_string(),
        },
    }
}

/// The create endpoint answers in more than one historical shape:
/// `{task: {_id}}`, `{_id}`, or `{id}`. Probe them in that order.
fn extract_server_id(value: &Value) -> Option<String> {
    let candidates = [
        value.get("task").and_then(|task| task.get("_id")),
        value.get("task").and_then(|task| task.get("id")),
        value.get("_id"),
        value.get("id"),
    ];
    candidates.into_iter().flatten().find_map(id_as_string)
}

fn id_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The list endpoint wraps its array under `items`, `tasks`, `data`, or
/// returns it bare. Entries without a usable id are dropped.
fn parse_task_list(value: &Value) -> Vec<RemoteTask> {
    let items = ["items", "tasks", "data"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_array))
        .or_else(|| value.as_array());

    let Some(items) = items else {
        return Vec::new();
    };

    items.iter().filter_map(parse_remote_task).collect()
}

fn parse_remote_task(value: &Value) -> Option<RemoteTask> {
    let id = value
        .get("_id")
        .and_then(id_as_string)
        .or_else(|| value.get("id").and_then(id_as_string))?;
    let title = value
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("(untitled)")
        .to_string();
    let description = value
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let status = value
        .get("status")
        .and_then(Value::as_str)
        .map(TaskStatus::from_wire)
        .unwrap_or(TaskStatus::Pending);
    let created_at = value
        .get("createdAt")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(RemoteTask {
        id,
        title,
        description,
        status,
        created_at,
    })
}
