use std::str::FromStr;

use crate::app::TaskView;
use crate::domain::status::TaskStatus;

#[derive(Debug, Clone, Default)]
pub struct TaskListFilter {
    pub include_deleted: bool,
    pub status: Option<String>,
    pub query: Option<String>,
}

pub fn apply_filters(tasks: Vec<TaskView>, filter: &TaskListFilter) -> Vec<TaskView> {
    let status = filter
        .status
        .as_deref()
        .and_then(|raw| TaskStatus::from_str(raw).ok());
    let query = filter
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase);

    tasks
        .into_iter()
        .filter(|task| filter.include_deleted || !task.deleted)
        .filter(|task| match status {
            Some(wanted) => task.status == wanted.as_str(),
            None => true,
        })
        .filter(|task| match query.as_deref() {
            Some(q) => {
                task.title.to_lowercase().contains(q)
                    || task.description.to_lowercase().contains(q)
            }
            None => true,
        })
        .collect()
}
