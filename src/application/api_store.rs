use crate::domain::models::{normalize_text, Task, MAX_TASK_ID};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_CYCLE_ROUNDS: u32 = 1;
pub const DEFAULT_CYCLE_DURATION: u32 = 25;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTaskInput {
    pub text: Option<String>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub text: Option<String>,
    pub completed: Option<bool>,
}

/// A task as submitted for bulk replace. Ids are optional and every other field is
/// kept as sent. Ids must be whole numbers and timestamps RFC 3339 strings; anything
/// else rejects the whole submission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingTask {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Overwritten by the server stamp.
    #[serde(default)]
    pub synced_at: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCycleInput {
    pub date: Option<String>,
    pub rounds: Option<u32>,
    pub duration: Option<u32>,
    pub tasks_completed: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleRecord {
    pub id: u64,
    pub date: String,
    pub rounds: u32,
    pub duration: u32,
    pub tasks_completed: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_cycles: usize,
    pub total_rounds: u64,
    pub total_tasks: usize,
    pub total_minutes: u64,
    pub total_hours: String,
    pub active_tasks: usize,
    pub completed_tasks: usize,
}

/// Process-local state behind the REST API. Nothing survives a restart.
#[derive(Debug, Clone)]
pub struct ApiStore {
    tasks: Vec<Task>,
    cycles: Vec<CycleRecord>,
    next_task_id: u64,
}

impl Default for ApiStore {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            cycles: Vec::new(),
            next_task_id: 1,
        }
    }
}

fn task_not_found() -> InfraError {
    InfraError::NotFound("Task not found".to_string())
}

fn id_out_of_range(id: u64) -> InfraError {
    InfraError::Validation(format!("Task id {id} is out of range (max {MAX_TASK_ID})"))
}

impl ApiStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn cycles(&self) -> &[CycleRecord] {
        &self.cycles
    }

    pub fn create_task(&mut self, input: NewTaskInput, now: DateTime<Utc>) -> Result<Task, InfraError> {
        let text = input
            .text
            .as_deref()
            .and_then(normalize_text)
            .ok_or_else(|| InfraError::Validation("Text is required".to_string()))?;

        if self.next_task_id > MAX_TASK_ID {
            return Err(id_out_of_range(self.next_task_id));
        }
        let mut task = Task::new(self.next_task_id, &text, now);
        task.completed = input.completed.unwrap_or(false);
        self.next_task_id += 1;
        self.tasks.push(task.clone());
        Ok(task)
    }

    pub fn update_task(&mut self, id: u64, patch: TaskPatch, now: DateTime<Utc>) -> Result<Task, InfraError> {
        let text = match patch.text.as_deref() {
            Some(raw) => Some(
                normalize_text(raw)
                    .ok_or_else(|| InfraError::Validation("Text must not be empty".to_string()))?,
            ),
            None => None,
        };
        let task = self
            .tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(task_not_found)?;

        if let Some(text) = text {
            task.text = text;
        }
        if let Some(completed) = patch.completed {
            task.completed = completed;
        }
        task.updated_at = Some(now);
        Ok(task.clone())
    }

    pub fn delete_task(&mut self, id: u64) -> Result<Task, InfraError> {
        let index = self
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(task_not_found)?;
        Ok(self.tasks.remove(index))
    }

    /// Replaces every stored task with the submitted list. Tasks without an id get
    /// `counter + position`. An empty submission leaves the counter where it was. A
    /// submission with any id above [`MAX_TASK_ID`] is rejected and nothing changes.
    pub fn sync_tasks(
        &mut self,
        incoming: Vec<IncomingTask>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, InfraError> {
        let base = self.next_task_id;
        let mut tasks = Vec::with_capacity(incoming.len());
        for (index, task) in incoming.into_iter().enumerate() {
            let id = match task.id.filter(|id| *id > 0) {
                Some(id) => id,
                None => u64::try_from(index)
                    .ok()
                    .and_then(|offset| base.checked_add(offset))
                    .unwrap_or(u64::MAX),
            };
            if id > MAX_TASK_ID {
                return Err(id_out_of_range(id));
            }
            tasks.push(Task {
                id,
                text: task.text,
                completed: task.completed,
                created_at: task.created_at,
                updated_at: task.updated_at,
                completed_at: task.completed_at,
                synced_at: Some(now),
                extra: task.extra,
            });
        }

        if let Some(highest) = tasks.iter().map(|task| task.id).max() {
            self.next_task_id = highest + 1;
        }
        self.tasks = tasks;
        Ok(self.tasks.clone())
    }

    pub fn record_cycle(&mut self, input: NewCycleInput, now: DateTime<Utc>) -> Result<CycleRecord, InfraError> {
        let date = input
            .date
            .filter(|date| !date.is_empty())
            .ok_or_else(|| InfraError::Validation("date is required".to_string()))?;

        let cycle = CycleRecord {
            id: self.cycles.len() as u64 + 1,
            date,
            rounds: input.rounds.filter(|value| *value > 0).unwrap_or(DEFAULT_CYCLE_ROUNDS),
            duration: input
                .duration
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_CYCLE_DURATION),
            tasks_completed: input.tasks_completed.unwrap_or(0),
            timestamp: now,
        };
        self.cycles.push(cycle.clone());
        Ok(cycle)
    }

    pub fn stats(&self) -> Stats {
        let total_rounds: u64 = self.cycles.iter().map(|cycle| u64::from(cycle.rounds)).sum();
        let total_minutes: u64 = self.cycles.iter().map(|cycle| u64::from(cycle.duration)).sum();
        let completed_tasks = self.tasks.iter().filter(|task| task.completed).count();

        Stats {
            total_cycles: self.cycles.len(),
            total_rounds,
            total_tasks: completed_tasks,
            total_minutes,
            total_hours: format!("{:.1}", total_minutes as f64 / 60.0),
            active_tasks: self.tasks.len() - completed_tasks,
            completed_tasks,
        }
    }
}
