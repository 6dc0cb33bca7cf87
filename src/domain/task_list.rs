use crate::domain::models::{normalize_text, Task, MAX_TASK_ID};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct TaskList {
    tasks: Vec<Task>,
    next_id: u64,
}

impl Default for TaskList {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 1,
        }
    }
}

impl TaskList {
    /// Builds a list from stored parts. The id counter is raised past every stored id so
    /// a stale counter can never hand out a duplicate. Ids above [`MAX_TASK_ID`] are kept
    /// but never move the counter, since it stops before reaching them.
    pub fn from_parts(tasks: Vec<Task>, next_id: u64) -> Self {
        let floor = highest_id(&tasks).map_or(1, |id| id + 1);
        Self {
            tasks,
            next_id: next_id.max(floor),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn ids_exhausted(&self) -> bool {
        self.next_id > MAX_TASK_ID
    }

    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Adds a task under the next counter id. Returns `None` for blank text or once the
    /// counter has passed [`MAX_TASK_ID`].
    pub fn add(&mut self, text: &str, now: DateTime<Utc>) -> Option<Task> {
        let text = normalize_text(text)?;
        if self.ids_exhausted() {
            return None;
        }
        let task = Task::new(self.next_id, &text, now);
        self.next_id += 1;
        self.tasks.push(task.clone());
        Some(task)
    }

    pub fn toggle(&mut self, id: u64, now: DateTime<Utc>) -> Option<Task> {
        let task = self.tasks.iter_mut().find(|task| task.id == id)?;
        let completed = !task.completed;
        task.set_completed(completed, now);
        Some(task.clone())
    }

    pub fn edit(&mut self, id: u64, text: &str, now: DateTime<Utc>) -> Option<Task> {
        let text = normalize_text(text)?;
        let task = self.tasks.iter_mut().find(|task| task.id == id)?;
        task.text = text;
        task.updated_at = Some(now);
        Some(task.clone())
    }

    pub fn delete(&mut self, id: u64) -> Option<Task> {
        let index = self.tasks.iter().position(|task| task.id == id)?;
        Some(self.tasks.remove(index))
    }

    pub fn clear_completed(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|task| !task.completed);
        before - self.tasks.len()
    }

    pub fn clear_all(&mut self) -> usize {
        let removed = self.tasks.len();
        self.tasks.clear();
        removed
    }

    /// Marks the first incomplete task in display order as done.
    pub fn complete_next(&mut self, now: DateTime<Utc>) -> Option<Task> {
        let id = self
            .display_order()
            .into_iter()
            .find(|task| !task.completed)
            .map(|task| task.id)?;
        let task = self.tasks.iter_mut().find(|task| task.id == id)?;
        task.set_completed(true, now);
        Some(task.clone())
    }

    /// Adopts a list handed back by the server.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        if let Some(id) = highest_id(&tasks) {
            self.next_id = self.next_id.max(id + 1);
        }
        self.tasks = tasks;
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|task| task.completed).count()
    }

    /// Incomplete tasks first, each group oldest first.
    pub fn display_order(&self) -> Vec<&Task> {
        let mut ordered: Vec<&Task> = self.tasks.iter().collect();
        ordered.sort_by(|left, right| {
            left.completed
                .cmp(&right.completed)
                .then_with(|| left.created_at.cmp(&right.created_at))
        });
        ordered
    }
}

/// Highest id the counter could itself have produced.
fn highest_id(tasks: &[Task]) -> Option<u64> {
    tasks
        .iter()
        .map(|task| task.id)
        .filter(|id| *id <= MAX_TASK_ID)
        .max()
}
