use std::cell::RefCell;

use crate::domain::status::TaskStatus;
use crate::domain::task::{TaskDraft, TaskPatch};
use crate::remote::{CreateReceipt, RemoteError, RemoteStore, RemoteTask};

use super::{App, AppError, UpdateTaskPatch};

fn open_app() -> (App, String) {
    let path = std::env::temp_dir()
        .join(format!("satchel-app-{}", uuid::Uuid::now_v7()))
        .join("state.sqlite")
        .display()
        .to_string();
    let app = App::open(&path).expect("app should open");
    (app, path)
}

fn cleanup(path: &str) {
    let parent = std::path::Path::new(path)
        .parent()
        .expect("db path has a parent")
        .to_path_buf();
    let _ = std::fs::remove_dir_all(parent);
}

/// Logs calls; always succeeds, issuing sequential server ids.
#[derive(Default)]
struct RecordingRemote {
    calls: RefCell<Vec<String>>,
    next_id: RefCell<u32>,
}

impl RemoteStore for RecordingRemote {
    fn create(&self, draft: &TaskDraft) -> Result<CreateReceipt, RemoteError> {
        self.calls.borrow_mut().push(format!("create {}", draft.title));
        let mut next = self.next_id.borrow_mut();
        *next += 1;
        Ok(CreateReceipt {
            server_id: Some(format!("s{}", next)),
        })
    }

    fn update(&self, id: &str, _patch: &TaskPatch) -> Result<(), RemoteError> {
        self.calls.borrow_mut().push(format!("update {}", id));
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.calls.borrow_mut().push(format!("delete {}", id));
        Ok(())
    }

    fn fetch_all(&self) -> Result<Vec<RemoteTask>, RemoteError> {
        self.calls.borrow_mut().push("fetch_all".to_string());
        Ok(Vec::new())
    }
}

#[test]
fn create_is_optimistic_and_queued() {
    let (app, path) = open_app();

    let task = app
        .create_task("Buy milk", Some("2 liters"), None)
        .expect("create should succeed");
    assert!(task.id.starts_with("c-"));
    assert_eq!(task.status, "pending");
    assert_eq!(task.description, "2 liters");

    let snapshot = app.snapshot().expect("snapshot should succeed");
    assert_eq!(snapshot.len(), 1);
    assert_eq!(app.outbox().expect("outbox should list").len(), 1);

    cleanup(&path);
}

#[test]
fn create_rejects_blank_titles() {
    let (app, path) = open_app();

    let err = app
        .create_task("   ", None, None)
        .expect_err("blank title should fail");
    assert!(matches!(err, AppError::InvalidArgument(_)));
    assert_eq!(app.outbox().expect("outbox should list").len(), 0);

    cleanup(&path);
}

#[test]
fn update_applies_locally_and_queues_only_changed_fields() {
    let (app, path) = open_app();

    let task = app
        .create_task("Buy milk", None, None)
        .expect("create should succeed");
    let updated = app
        .update_task(
            &task.id,
            UpdateTaskPatch {
                status: Some("completed".to_string()),
                ..UpdateTaskPatch::default()
            },
        )
        .expect("update should succeed");
    assert_eq!(updated.status, "completed");

    let entries = app.outbox().expect("outbox should list");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].kind.as_str(), "update");
    assert_eq!(entries[1].target, task.id);

    cleanup(&path);
}

#[test]
fn update_accepts_wire_alias_statuses() {
    let (app, path) = open_app();

    let task = app
        .create_task("Buy milk", None, None)
        .expect("create should succeed");
    let updated = app
        .update_task(
            &task.id,
            UpdateTaskPatch {
                status: Some("Completada".to_string()),
                ..UpdateTaskPatch::default()
            },
        )
        .expect("alias status should parse");
    assert_eq!(updated.status, TaskStatus::Completed.as_str());

    cleanup(&path);
}

#[test]
fn no_op_update_queues_nothing() {
    let (app, path) = open_app();

    let task = app
        .create_task("Buy milk", None, None)
        .expect("create should succeed");
    let result = app
        .update_task(
            &task.id,
            UpdateTaskPatch {
                title: Some("Buy milk".to_string()),
                ..UpdateTaskPatch::default()
            },
        )
        .expect("no-op update should succeed");
    assert_eq!(result.title, "Buy milk");
    assert_eq!(app.outbox().expect("outbox should list").len(), 1);

    cleanup(&path);
}

#[test]
fn empty_update_is_rejected() {
    let (app, path) = open_app();

    let task = app
        .create_task("Buy milk", None, None)
        .expect("create should succeed");
    let err = app
        .update_task(&task.id, UpdateTaskPatch::default())
        .expect_err("empty patch should fail");
    assert!(matches!(err, AppError::InvalidArgument(_)));

    cleanup(&path);
}

#[test]
fn delete_tombstones_locally_and_queues() {
    let (app, path) = open_app();

    let task = app
        .create_task("Buy milk", None, None)
        .expect("create should succeed");
    app.delete_task(&task.id).expect("delete should succeed");

    assert!(app.snapshot().expect("snapshot should succeed").is_empty());
    let all = app.snapshot_all().expect("snapshot_all should succeed");
    assert_eq!(all.len(), 1);
    assert!(all[0].deleted);
    assert_eq!(app.outbox().expect("outbox should list").len(), 2);

    cleanup(&path);
}

#[test]
fn unknown_ids_surface_not_found() {
    let (app, path) = open_app();

    assert!(matches!(
        app.update_task(
            "c-missing",
            UpdateTaskPatch {
                title: Some("x".to_string()),
                ..UpdateTaskPatch::default()
            }
        ),
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        app.delete_task("c-missing"),
        Err(AppError::NotFound(_))
    ));

    cleanup(&path);
}

#[test]
fn offline_lifecycle_reconciles_to_server_state() {
    let (app, path) = open_app();
    let remote = RecordingRemote::default();

    let task = app
        .create_task("Buy milk", None, None)
        .expect("create should succeed");
    app.update_task(
        &task.id,
        UpdateTaskPatch {
            status: Some("completed".to_string()),
            ..UpdateTaskPatch::default()
        },
    )
    .expect("update should succeed");

    let summary = app
        .reconcile(&remote)
        .expect("reconcile should succeed")
        .expect("gate should admit the pass");
    assert_eq!(
        remote.calls.borrow().as_slice(),
        ["create Buy milk", "update s1"]
    );
    assert!(summary.drained());

    // The store now holds the record under its server identity.
    let snapshot = app.snapshot().expect("snapshot should succeed");
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, "s1");
    assert!(app.show_task(&task.id).expect("show should succeed").is_none());

    // Quiescence: a second pass does nothing.
    let summary = app
        .reconcile(&remote)
        .expect("second reconcile should succeed")
        .expect("gate should admit the pass");
    assert_eq!(summary.attempted, 0);
    assert_eq!(remote.calls.borrow().len(), 2);
    assert!(app.last_sync_at().expect("meta should read").is_some());

    cleanup(&path);
}

#[test]
fn full_refresh_replaces_local_contents() {
    let (app, path) = open_app();

    app.create_task("Stale local", None, None)
        .expect("create should succeed");
    let refreshed = app
        .full_refresh(&[RemoteTask {
            id: "s1".to_string(),
            title: "Server task".to_string(),
            description: String::new(),
            status: TaskStatus::InProgress,
            created_at: Some("2026-03-01T10:00:00Z".to_string()),
        }])
        .expect("refresh should succeed");
    assert_eq!(refreshed, 1);

    let snapshot = app.snapshot().expect("snapshot should succeed");
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, "s1");
    assert_eq!(snapshot[0].status, "in_progress");

    cleanup(&path);
}

/// Remote whose create re-enters `reconcile` on the same app; the gate must
/// drop the nested request instead of running passes concurrently.
struct ReentrantRemote<'a> {
    app: &'a App,
    inner: RecordingRemote,
    nested_result: RefCell<Option<bool>>,
}

impl RemoteStore for ReentrantRemote<'_> {
    fn create(&self, draft: &TaskDraft) -> Result<CreateReceipt, RemoteError> {
        let nested = self
            .app
            .reconcile(&self.inner)
            .expect("nested reconcile should not error");
        *self.nested_result.borrow_mut() = Some(nested.is_some());
        self.inner.create(draft)
    }

    fn update(&self, id: &str, patch: &TaskPatch) -> Result<(), RemoteError> {
        self.inner.update(id, patch)
    }

    fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.inner.delete(id)
    }

    fn fetch_all(&self) -> Result<Vec<RemoteTask>, RemoteError> {
        self.inner.fetch_all()
    }
}

#[test]
fn reconcile_request_while_in_flight_is_ignored() {
    let (app, path) = open_app();

    app.create_task("Buy milk", None, None)
        .expect("create should succeed");

    let remote = ReentrantRemote {
        app: &app,
        inner: RecordingRemote::default(),
        nested_result: RefCell::new(None),
    };
    let summary = app
        .reconcile(&remote)
        .expect("outer reconcile should succeed")
        .expect("outer pass should run");
    assert!(summary.drained());
    assert_eq!(
        *remote.nested_result.borrow(),
        Some(false),
        "nested pass must have been dropped by the gate"
    );

    cleanup(&path);
}
