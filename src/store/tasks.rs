use time::Date;

use crate::domain::{ItemKind, Priority, SaveContext, SaveOp, Task, TaskStore};
use crate::ids::generate_id;
use crate::storage::Loaded;

use super::{optional_text, required_text, Store, StoreError, PROJECT_MAX, TASKS_FILE, TASK_TEXT_MAX};

impl Store {
    pub fn load_tasks(&self) -> Result<Loaded<TaskStore>, StoreError> {
        self.load(TASKS_FILE)
    }

    pub fn add_task(
        &self,
        text: &str,
        project: &str,
        priority: Priority,
        due_date: Option<Date>,
    ) -> Result<Task, StoreError> {
        let text = required_text("task text", text, TASK_TEXT_MAX)?;
        let project = optional_text("project", project, PROJECT_MAX)?;

        let mut store = self.load_tasks()?.value;
        let now = self.now();
        let task = Task {
            id: generate_id(now, |candidate| store.contains(candidate)),
            text,
            project,
            priority,
            due_date,
            done: false,
            created_at: now,
            completed_at: None,
        };
        store.tasks.push(task.clone());
        self.persist(
            TASKS_FILE,
            &store,
            SaveContext::new(SaveOp::Add, ItemKind::Task, &task.text),
        )?;
        Ok(task)
    }

    /// Puts back a task removed earlier (undo), keeping its id and timestamps.
    pub fn restore_task(&self, task: Task) -> Result<Task, StoreError> {
        let mut task = task;
        task.id = task.id.trim().to_string();
        if task.id.is_empty() {
            return Err(StoreError::Validation("task id cannot be empty".to_string()));
        }
        task.text = required_text("task text", &task.text, TASK_TEXT_MAX)?;
        task.project = optional_text("project", &task.project, PROJECT_MAX)?;
        task.normalize_completion(self.now());

        let mut store = self.load_tasks()?.value;
        if store.contains(&task.id) {
            return Err(StoreError::Validation(format!(
                "task '{}' already exists",
                task.id
            )));
        }
        store.tasks.push(task.clone());
        self.persist(
            TASKS_FILE,
            &store,
            SaveContext::new(SaveOp::Restore, ItemKind::Task, &task.text),
        )?;
        Ok(task)
    }

    pub fn complete_task(&self, id: &str) -> Result<Task, StoreError> {
        self.set_task_done(id, true)
    }

    pub fn uncomplete_task(&self, id: &str) -> Result<Task, StoreError> {
        self.set_task_done(id, false)
    }

    fn set_task_done(&self, id: &str, done: bool) -> Result<Task, StoreError> {
        let mut store = self.load_tasks()?.value;
        let now = self.now();
        let task = store
            .find_mut(id)
            .ok_or_else(|| StoreError::not_found(ItemKind::Task, id))?;
        task.done = done;
        task.completed_at = done.then_some(now);
        let updated = task.clone();

        let op = if done { SaveOp::Complete } else { SaveOp::Reopen };
        self.persist(
            TASKS_FILE,
            &store,
            SaveContext::new(op, ItemKind::Task, &updated.text),
        )?;
        Ok(updated)
    }

    pub fn delete_task(&self, id: &str) -> Result<Task, StoreError> {
        let mut store = self.load_tasks()?.value;
        let index = store
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| StoreError::not_found(ItemKind::Task, id))?;
        let removed = store.tasks.remove(index);
        self.persist(
            TASKS_FILE,
            &store,
            SaveContext::new(SaveOp::Delete, ItemKind::Task, &removed.text),
        )?;
        Ok(removed)
    }
}
