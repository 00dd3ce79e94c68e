use std::error::Error;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }

    /// The string the remote store speaks on the wire.
    pub fn wire_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pendiente",
            TaskStatus::InProgress => "En Progreso",
            TaskStatus::Completed => "Completada",
        }
    }

    /// Normalizes a server-supplied status. Unknown values fall back to
    /// `Pending` rather than failing the whole refresh.
    pub fn from_wire(value: &str) -> TaskStatus {
        TaskStatus::from_str(value).unwrap_or(TaskStatus::Pending)
    }

    #[allow(dead_code)]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ParseTaskStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase().replace('-', "_").replace(' ', "_");
        let status = match normalized.as_str() {
            "pending" | "pendiente" | "todo" | "open" => TaskStatus::Pending,
            "in_progress" | "en_progreso" | "doing" | "active" => TaskStatus::InProgress,
            "completed" | "completada" | "done" | "closed" => TaskStatus::Completed,
            _ => {
                return Err(ParseTaskStatusError {
                    value: value.to_string(),
                });
            }
        };

        Ok(status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTaskStatusError {
    value: String,
}

impl fmt::Display for ParseTaskStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid task status '{}': expected one of {}",
            self.value,
            TaskStatus::ALL
                .iter()
                .map(|status| status.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl Error for ParseTaskStatusError {}
