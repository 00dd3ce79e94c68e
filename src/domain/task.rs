use serde::{Deserialize, Serialize};

use super::status::TaskStatus;

/// Payload of a queued create: the full initial shape of the task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_status")]
    pub status: TaskStatus,
}

fn default_status() -> TaskStatus {
    TaskStatus::Pending
}

impl TaskDraft {
    #[allow(dead_code)]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Pending,
        }
    }
}

/// Payload of a queued update: only the fields the user touched.
/// Absent fields are left as the server last saw them (field-level
/// last-writer-wins).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    pub fn has_changes(&self) -> bool {
        self.title.is_some() || self.description.is_some() || self.status.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{TaskDraft, TaskPatch, TaskStatus};

    #[test]
    fn draft_defaults_to_pending() {
        let draft = TaskDraft::new("Buy milk");
        assert_eq!(draft.status, TaskStatus::Pending);
        assert!(draft.description.is_empty());
    }

    #[test]
    fn empty_patch_has_no_changes() {
        assert!(!TaskPatch::default().has_changes());
        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            ..TaskPatch::default()
        };
        assert!(patch.has_changes());
    }

    #[test]
    fn patch_serializes_only_present_fields() {
        let patch = TaskPatch {
            title: None,
            description: None,
            status: Some(TaskStatus::Completed),
        };
        let json = serde_json::to_string(&patch).expect("patch should serialize");
        assert_eq!(json, r#"{"status":"completed"}"#);
    }

    #[test]
    fn draft_deserializes_with_missing_optionals() {
        let draft: TaskDraft =
            serde_json::from_str(r#"{"title":"Buy milk"}"#).expect("draft should deserialize");
        assert_eq!(draft.title, "Buy milk");
        assert_eq!(draft.status, TaskStatus::Pending);
    }
}
