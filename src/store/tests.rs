use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use time::macros::{date, datetime};
use time::Duration;
use uuid::Uuid;

use super::{
    SaveListener, Store, StoreError, HABITS_FILE, MAX_REPORT_DAYS, TASKS_FILE, TIMER_FILE,
};
use crate::clock::FixedClock;
use crate::domain::{
    sort_tasks, Habit, HabitLog, ItemKind, Priority, SaveContext, SaveOp, Task, TimerStore,
};
use crate::storage::{backup_path, LoadOutcome};

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<(String, SaveContext)>>,
}

impl RecordingListener {
    fn events(&self) -> Vec<(String, SaveContext)> {
        self.events.lock().expect("listener lock").clone()
    }
}

impl SaveListener for RecordingListener {
    fn file_saved(&self, file_name: &str, context: &SaveContext) {
        self.events
            .lock()
            .expect("listener lock")
            .push((file_name.to_string(), context.clone()));
    }
}

struct Fixture {
    root: PathBuf,
    clock: Arc<FixedClock>,
    listener: Arc<RecordingListener>,
    store: Store,
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn fixture() -> Fixture {
    let root = std::env::temp_dir().join(format!("tend-store-test-{}", Uuid::now_v7()));
    let clock = Arc::new(FixedClock::new(datetime!(2026-03-10 09:00 +01:00)));
    let listener = Arc::new(RecordingListener::default());
    let mut store = Store::open(root.join("data"), clock.clone()).expect("store should open");
    store.set_listener(listener.clone());
    Fixture {
        root,
        clock,
        listener,
        store,
    }
}

#[test]
fn add_task_trims_persists_and_notifies() {
    let fx = fixture();
    let task = fx
        .store
        .add_task("  Review PR  ", " work ", Priority::Medium, Some(date!(2026-03-12)))
        .expect("task should be added");
    assert_eq!(task.text, "Review PR");
    assert_eq!(task.project, "work");
    assert!(!task.done);
    assert_eq!(task.completed_at, None);
    assert_eq!(task.created_at, datetime!(2026-03-10 09:00 +01:00));

    let loaded = fx.store.load_tasks().expect("tasks should load");
    assert_eq!(loaded.value.tasks, vec![task]);
    assert_eq!(
        fx.listener.events(),
        vec![(
            TASKS_FILE.to_string(),
            SaveContext::new(SaveOp::Add, ItemKind::Task, "Review PR")
        )]
    );
}

#[test]
fn add_task_rejects_blank_and_oversized_text_without_writing() {
    let fx = fixture();
    fx.store
        .add_task("keep", "", Priority::None, None)
        .expect("seed task should be added");
    let before = std::fs::read(fx.store.path(TASKS_FILE)).expect("tasks file should exist");

    let blank = fx
        .store
        .add_task("   ", "", Priority::High, None)
        .expect_err("blank text should fail");
    assert!(matches!(blank, StoreError::Validation(_)));
    let long = fx
        .store
        .add_task(&"x".repeat(201), "", Priority::High, None)
        .expect_err("oversized text should fail");
    assert!(matches!(long, StoreError::Validation(_)));
    assert!(long.to_string().contains("max 200"));
    let project = fx
        .store
        .add_task("ok", &"p".repeat(61), Priority::High, None)
        .expect_err("oversized project should fail");
    assert!(matches!(project, StoreError::Validation(_)));

    assert!(fx
        .store
        .add_task(&"x".repeat(200), "", Priority::None, None)
        .is_ok());
    let after_rejects = fx.listener.events().len();
    assert_eq!(after_rejects, 2);
    assert_ne!(
        std::fs::read(fx.store.path(TASKS_FILE)).expect("tasks file should exist"),
        before
    );
}

#[test]
fn complete_and_reopen_keep_completion_pairing() {
    let fx = fixture();
    let task = fx
        .store
        .add_task("Write report", "", Priority::None, None)
        .expect("task should be added");

    fx.clock.advance(Duration::minutes(30));
    let done = fx.store.complete_task(&task.id).expect("complete should work");
    assert!(done.done);
    assert_eq!(done.completed_at, Some(datetime!(2026-03-10 09:30 +01:00)));

    let reopened = fx
        .store
        .uncomplete_task(&task.id)
        .expect("reopen should work");
    assert!(!reopened.done);
    assert_eq!(reopened.completed_at, None);

    let ops: Vec<SaveOp> = fx
        .listener
        .events()
        .into_iter()
        .map(|(_, context)| context.op)
        .collect();
    assert_eq!(ops, vec![SaveOp::Add, SaveOp::Complete, SaveOp::Reopen]);

    for task in fx.store.load_tasks().expect("tasks should load").value.tasks {
        assert_eq!(task.done, task.completed_at.is_some());
    }
}

#[test]
fn unknown_ids_are_not_found_errors() {
    let fx = fixture();
    let err = fx.store.complete_task("missing").expect_err("should fail");
    assert!(matches!(err, StoreError::NotFound { .. }));
    assert_eq!(err.to_string(), "task 'missing' not found");
    assert!(fx.store.delete_task("missing").is_err());
    assert!(fx.store.delete_habit("missing").is_err());
    let err = fx
        .store
        .set_habit_done_on_date("missing", "2026-03-10", true)
        .expect_err("unknown habit should fail");
    assert!(matches!(
        err,
        StoreError::NotFound {
            kind: ItemKind::Habit,
            ..
        }
    ));
    assert!(fx.listener.events().is_empty());
}

#[test]
fn delete_then_restore_round_trips_task() {
    let fx = fixture();
    let task = fx
        .store
        .add_task("Pay rent", "home", Priority::High, Some(date!(2026-04-01)))
        .expect("task should be added");
    let removed = fx.store.delete_task(&task.id).expect("delete should work");
    assert!(fx.store.load_tasks().expect("load").value.tasks.is_empty());

    let restored = fx.store.restore_task(removed).expect("restore should work");
    assert_eq!(restored, task);
    let duplicate = fx
        .store
        .restore_task(task.clone())
        .expect_err("duplicate restore should fail");
    assert!(matches!(duplicate, StoreError::Validation(_)));

    let mut blank = task;
    blank.id = "  ".to_string();
    assert!(fx.store.restore_task(blank).is_err());
}

#[test]
fn restore_task_normalizes_completion_timestamp() {
    let fx = fixture();
    let restored = fx
        .store
        .restore_task(Task {
            id: "legacy-1".to_string(),
            text: "Imported".to_string(),
            project: String::new(),
            priority: Priority::Low,
            due_date: None,
            done: true,
            created_at: datetime!(2026-01-01 08:00 UTC),
            completed_at: None,
        })
        .expect("restore should work");
    assert_eq!(restored.completed_at, Some(fx.store.now()));

    let reopened = fx
        .store
        .restore_task(Task {
            id: "legacy-2".to_string(),
            text: "Imported".to_string(),
            project: String::new(),
            priority: Priority::Low,
            due_date: None,
            done: false,
            created_at: datetime!(2026-01-01 08:00 UTC),
            completed_at: Some(datetime!(2026-01-02 08:00 UTC)),
        })
        .expect("restore should work");
    assert_eq!(reopened.completed_at, None);
}

#[test]
fn completed_task_sorts_between_pending_high_and_pending_low() {
    let fx = fixture();
    let milk = fx
        .store
        .add_task("Buy milk", "", Priority::High, None)
        .expect("task should be added");
    fx.store.complete_task(&milk.id).expect("complete should work");
    let urgent = fx
        .store
        .add_task("File taxes", "", Priority::High, Some(date!(2026-03-09)))
        .expect("task should be added");
    let low = fx
        .store
        .add_task("Water plants", "", Priority::Low, None)
        .expect("task should be added");

    let reloaded = Store::open(fx.store.data_dir(), fx.clock.clone()).expect("store should reopen");
    let mut tasks = reloaded.load_tasks().expect("tasks should load").value.tasks;
    let milk_after = tasks
        .iter()
        .find(|task| task.id == milk.id)
        .expect("milk should persist");
    assert!(milk_after.done);
    assert!(milk_after.completed_at.is_some());

    sort_tasks(&mut tasks);
    let order: Vec<&str> = tasks.iter().map(|task| task.id.as_str()).collect();
    assert_eq!(
        order,
        vec![urgent.id.as_str(), low.id.as_str(), milk.id.as_str()]
    );
}

#[test]
fn set_habit_done_twice_keeps_one_log_and_dedupes_existing() {
    let fx = fixture();
    let habit = fx.store.add_habit("Exercise", "🏃").expect("habit should be added");
    fx.store
        .set_habit_done_on_date(&habit.id, "2026-03-08", true)
        .expect("first mark should work");
    fx.store
        .set_habit_done_on_date(&habit.id, "2026-03-08", true)
        .expect("second mark should work");
    let logs = fx.store.load_habits().expect("load").value.logs;
    assert_eq!(logs, vec![HabitLog::new(&habit.id, date!(2026-03-08))]);

    let mut raw = fx.store.load_habits().expect("load").value;
    raw.logs.push(HabitLog::new(&habit.id, date!(2026-03-08)));
    crate::storage::write_json_atomic(&fx.store.path(HABITS_FILE), &raw).expect("seed dupes");
    fx.store
        .set_habit_done_on_date(&habit.id, "2026-03-08", true)
        .expect("mark should work");
    assert_eq!(fx.store.load_habits().expect("load").value.logs.len(), 1);

    fx.store
        .set_habit_done_on_date(&habit.id, "2026-03-08", false)
        .expect("unmark should work");
    assert!(fx.store.load_habits().expect("load").value.logs.is_empty());

    let bad = fx
        .store
        .set_habit_done_on_date(&habit.id, "2026-13-01", true)
        .expect_err("bad date should fail");
    assert!(matches!(bad, StoreError::Validation(_)));
}

#[test]
fn toggle_today_flips_state_and_reports_it() {
    let fx = fixture();
    let habit = fx.store.add_habit("Read", "📚").expect("habit should be added");
    assert!(fx.store.toggle_habit_today(&habit.id).expect("toggle on"));
    let habits = fx.store.load_habits().expect("load").value;
    assert!(habits.is_done_on(&habit.id, date!(2026-03-10)));
    assert_eq!(
        fx.store.habit_week(&habits, &habit.id),
        [false, false, false, false, false, false, true]
    );
    assert!(!fx.store.toggle_habit_today(&habit.id).expect("toggle off"));
    assert!(fx.store.load_habits().expect("load").value.logs.is_empty());
}

#[test]
fn streak_ignores_unmarked_today() {
    let fx = fixture();
    let habit = fx.store.add_habit("Meditate", "🧘").expect("habit should be added");
    for day in ["2026-03-07", "2026-03-08", "2026-03-09"] {
        fx.store
            .set_habit_done_on_date(&habit.id, day, true)
            .expect("mark should work");
    }
    let habits = fx.store.load_habits().expect("load").value;
    assert_eq!(fx.store.habit_streak(&habits, &habit.id), 3);
}

#[test]
fn add_habit_validates_name_and_icon() {
    let fx = fixture();
    assert!(fx.store.add_habit("", "x").is_err());
    assert!(fx.store.add_habit("Walk", "").is_err());
    assert!(fx.store.add_habit(&"n".repeat(61), "x").is_err());
    assert!(fx.store.add_habit("Walk", &"i".repeat(13)).is_err());
    assert!(fx
        .store
        .add_habit_with_schedule("Gym", "💪", crate::domain::Frequency::Custom, &[7])
        .is_err());
    let gym = fx
        .store
        .add_habit_with_schedule("Gym", "💪", crate::domain::Frequency::Custom, &[5, 1, 1])
        .expect("custom habit should be added");
    assert_eq!(gym.custom_days, vec![1, 5]);
}

#[test]
fn delete_habit_removes_logs_and_restore_merges_without_duplicates() {
    let fx = fixture();
    let habit = fx.store.add_habit("Stretch", "🤸").expect("habit should be added");
    let other = fx.store.add_habit("Journal", "📓").expect("habit should be added");
    fx.store
        .set_habit_done_on_date(&habit.id, "2026-03-09", true)
        .expect("mark should work");
    fx.store
        .set_habit_done_on_date(&other.id, "2026-03-09", true)
        .expect("mark should work");

    let logs_before: Vec<HabitLog> = fx
        .store
        .load_habits()
        .expect("load")
        .value
        .logs
        .into_iter()
        .filter(|log| log.habit_id == habit.id)
        .collect();
    let removed = fx.store.delete_habit(&habit.id).expect("delete should work");
    let after_delete = fx.store.load_habits().expect("load").value;
    assert!(!after_delete.contains(&habit.id));
    assert!(after_delete.logs.iter().all(|log| log.habit_id == other.id));

    let mut logs = logs_before.clone();
    logs.extend(logs_before.clone());
    logs.push(HabitLog::new(&other.id, date!(2026-03-01)));
    let restored = fx
        .store
        .restore_habit(removed.clone(), logs)
        .expect("restore should work");
    assert_eq!(restored, removed);
    let habits = fx.store.load_habits().expect("load").value;
    let restored_logs: Vec<&HabitLog> = habits
        .logs
        .iter()
        .filter(|log| log.habit_id == habit.id)
        .collect();
    assert_eq!(restored_logs.len(), 1);
    assert_eq!(habits.logs.len(), 2);

    assert!(fx.store.restore_habit(removed, Vec::new()).is_err());
    let last = fx.listener.events().pop().expect("events recorded");
    assert_eq!(last.1.op, SaveOp::Restore);
}

#[test]
fn restore_habit_backfills_missing_creation_time() {
    let fx = fixture();
    let habit: Habit =
        serde_json::from_str(r#"{"id":"h-old","name":"Walk","icon":"🚶"}"#).expect("habit json");
    let restored = fx
        .store
        .restore_habit(habit, Vec::new())
        .expect("restore should work");
    assert_eq!(restored.created_at, fx.store.now());
}

#[test]
fn starting_second_timer_closes_first_at_switch_instant() {
    let fx = fixture();
    fx.store.start_timer("A").expect("start A");
    fx.clock.advance(Duration::minutes(25));
    let switch_at = fx.store.now();
    let current = fx.store.start_timer("B").expect("start B");

    let timer = fx.store.load_timer().expect("load").value;
    assert_eq!(timer.entries.len(), 1);
    assert_eq!(timer.entries[0].project, "A");
    assert_eq!(timer.entries[0].ended_at, switch_at);
    assert_eq!(timer.current, Some(current.clone()));
    assert_eq!(current.started_at, switch_at);
    assert_eq!(fx.store.today_total(&timer), Duration::minutes(25));
}

#[test]
fn stop_without_running_timer_is_a_quiet_no_op() {
    let fx = fixture();
    assert_eq!(fx.store.stop_timer().expect("stop should not fail"), None);
    assert!(fx.listener.events().is_empty());

    fx.store.start_timer("  focus  ").expect("start");
    fx.clock.advance(Duration::hours(2));
    let entry = fx
        .store
        .stop_timer()
        .expect("stop")
        .expect("entry should be closed");
    assert_eq!(entry.project, "focus");
    assert_eq!(entry.duration(), Duration::hours(2));
    let timer = fx.store.load_timer().expect("load").value;
    assert!(timer.current.is_none());
    assert!(fx.store.start_timer("   ").is_err());
}

#[test]
fn totals_split_entries_at_midnight() {
    let fx = fixture();
    fx.clock.set(datetime!(2026-03-09 23:00 +01:00));
    fx.store.start_timer("late").expect("start");
    fx.clock.set(datetime!(2026-03-10 01:00 +01:00));
    fx.store.stop_timer().expect("stop");

    let timer = fx.store.load_timer().expect("load").value;
    fx.clock.set(datetime!(2026-03-10 12:00 +01:00));
    assert_eq!(fx.store.today_total(&timer), Duration::hours(1));
    fx.clock.set(datetime!(2026-03-09 12:00 +01:00));
    assert_eq!(fx.store.today_total(&timer), Duration::hours(1));

    fx.clock.set(datetime!(2026-03-10 12:00 +01:00));
    assert_eq!(
        fx.store.project_totals(&timer, 1).expect("window should be valid"),
        vec![("late".to_string(), Duration::hours(1))]
    );
    assert_eq!(
        fx.store.project_totals(&timer, 2).expect("window should be valid"),
        vec![("late".to_string(), Duration::hours(2))]
    );
    assert_eq!(
        fx.store.daily_breakdown(&timer, 2).expect("window should be valid"),
        vec![
            (date!(2026-03-09), Duration::hours(1)),
            (date!(2026-03-10), Duration::hours(1)),
        ]
    );
}

#[test]
fn report_windows_outside_the_supported_range_are_rejected() {
    let fx = fixture();
    let timer = fx.store.load_timer().expect("load").value;

    for days in [0, MAX_REPORT_DAYS + 1, 5_000_000, u32::MAX] {
        let err = fx
            .store
            .daily_breakdown(&timer, days)
            .expect_err("oversized window should be rejected");
        assert!(matches!(err, StoreError::Validation(_)), "unexpected error for {days}: {err}");
        let err = fx
            .store
            .project_totals(&timer, days)
            .expect_err("oversized window should be rejected");
        assert!(matches!(err, StoreError::Validation(_)), "unexpected error for {days}: {err}");
    }

    let full = fx
        .store
        .daily_breakdown(&timer, MAX_REPORT_DAYS)
        .expect("largest window should be accepted");
    assert_eq!(full.len(), MAX_REPORT_DAYS as usize);
}

#[test]
fn corrupt_tasks_file_recovers_from_backup_on_next_mutation() {
    let fx = fixture();
    let first = fx
        .store
        .add_task("first", "", Priority::None, None)
        .expect("task should be added");
    fx.store
        .add_task("second", "", Priority::None, None)
        .expect("task should be added");
    assert!(backup_path(&fx.store.path(TASKS_FILE)).exists());

    std::fs::write(fx.store.path(TASKS_FILE), b"{\"tasks\": [").expect("corrupt write");
    let loaded = fx.store.load_tasks().expect("load should recover");
    assert!(matches!(loaded.outcome, LoadOutcome::Recovered { .. }));
    assert_eq!(loaded.value.tasks, vec![first]);

    fx.store
        .add_task("third", "", Priority::None, None)
        .expect("mutation after recovery should work");
    assert_eq!(fx.store.load_tasks().expect("load").value.tasks.len(), 2);
}

#[test]
fn containers_round_trip_through_disk() {
    let fx = fixture();
    fx.store
        .add_task("Plan trip", "travel", Priority::Medium, Some(date!(2026-05-01)))
        .expect("task");
    let habit = fx.store.add_habit("Water", "💧").expect("habit");
    fx.store.toggle_habit_today(&habit.id).expect("toggle");
    fx.store.start_timer("admin").expect("start");

    let tasks = fx.store.load_tasks().expect("tasks").value;
    let habits = fx.store.load_habits().expect("habits").value;
    let timer: TimerStore = fx.store.load_timer().expect("timer").value;

    crate::storage::write_json_atomic(&fx.store.path(TASKS_FILE), &tasks).expect("write");
    crate::storage::write_json_atomic(&fx.store.path(HABITS_FILE), &habits).expect("write");
    crate::storage::write_json_atomic(&fx.store.path(TIMER_FILE), &timer).expect("write");

    assert_eq!(fx.store.load_tasks().expect("tasks").value, tasks);
    assert_eq!(fx.store.load_habits().expect("habits").value, habits);
    assert_eq!(fx.store.load_timer().expect("timer").value, timer);
}
