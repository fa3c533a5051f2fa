use std::path::PathBuf;
use std::sync::Arc;

use time::macros::datetime;
use uuid::Uuid;

use super::{App, AppError, RemovedHabit};
use crate::clock::FixedClock;
use crate::config::Config;
use crate::domain::Priority;
use crate::ids::display_id;
use crate::store::StoreError;

struct Workspace {
    root: PathBuf,
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn open_app() -> (Workspace, App) {
    let root = std::env::temp_dir().join(format!("tend-app-test-{}", Uuid::now_v7()));
    let clock = Arc::new(FixedClock::new(datetime!(2026-03-10 09:00 UTC)));
    let app = App::open(root.join("data"), Config::default(), clock).expect("app should open");
    (Workspace { root }, app)
}

#[test]
fn short_ids_resolve_to_full_ids() {
    let (_ws, app) = open_app();
    let task = app
        .store()
        .add_task("Buy milk", "", Priority::None, None)
        .expect("task should be added");

    assert_eq!(
        app.resolve_task_id(&task.id).expect("full id should resolve"),
        task.id
    );
    assert_eq!(
        app.resolve_task_id(display_id(&task.id))
            .expect("short id should resolve"),
        task.id
    );

    let err = app
        .resolve_task_id("nope")
        .expect_err("unknown id should fail");
    assert!(matches!(err, AppError::Store(StoreError::NotFound { .. })));
    assert!(err.to_string().contains("task 'nope' not found"));
}

#[test]
fn removed_habit_round_trips_through_json() {
    let (_ws, app) = open_app();
    let habit = app
        .store()
        .add_habit("Stretch", "🧘")
        .expect("habit should be added");
    app.store()
        .set_habit_done_on_date(&habit.id, "2026-03-09", true)
        .expect("log should be added");

    let removed = app.remove_habit(&habit.id).expect("habit should be removed");
    assert_eq!(removed.logs.len(), 1);
    let json = serde_json::to_string(&removed).expect("removed habit should serialize");

    let parsed: RemovedHabit = serde_json::from_str(&json).expect("json should parse back");
    app.restore_habit(parsed).expect("habit should restore");
    let habits = app.store().load_habits().expect("habits should load").value;
    assert_eq!(habits.habits.len(), 1);
    assert!(habits.is_done_on(&habit.id, time::macros::date!(2026-03-09)));
}

#[test]
fn shutdown_without_sync_is_quiet() {
    let (_ws, app) = open_app();
    app.store()
        .add_task("Buy milk", "", Priority::None, None)
        .expect("task should be added");
    assert_eq!(app.sync().pending_count(), 0);
    app.shutdown();
}
