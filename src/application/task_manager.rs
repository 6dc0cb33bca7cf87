use crate::application::ports::{ConfirmationPrompt, Presenter};
use crate::application::view::TaskView;
use crate::domain::models::Task;
use crate::domain::task_list::TaskList;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{load_json, save_json, KeyValueStore, NEXT_ID_KEY, TASKS_KEY};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub const CONFIRM_DELETE: &str = "Delete this task?";
pub const CONFIRM_CLEAR_COMPLETED: &str = "Clear all completed tasks?";
pub const CONFIRM_CLEAR_ALL: &str = "Clear all tasks? This cannot be undone.";

pub struct TaskManager<S>
where
    S: KeyValueStore,
{
    list: Mutex<TaskList>,
    store: Arc<S>,
    presenter: Option<Arc<dyn Presenter>>,
    now_provider: NowProvider,
}

impl<S> TaskManager<S>
where
    S: KeyValueStore,
{
    /// Loads tasks and the id counter from the store. Unreadable records start an empty
    /// list rather than failing the client.
    pub fn load(store: Arc<S>) -> Self {
        let tasks = load_json::<Vec<Task>, _>(store.as_ref(), TASKS_KEY).unwrap_or_else(|error| {
            warn!(error = %error, "stored tasks unreadable; starting with an empty list");
            None
        });
        let next_id = load_json::<u64, _>(store.as_ref(), NEXT_ID_KEY).unwrap_or_else(|error| {
            warn!(error = %error, "stored task id counter unreadable");
            None
        });

        Self {
            list: Mutex::new(TaskList::from_parts(
                tasks.unwrap_or_default(),
                next_id.unwrap_or(1),
            )),
            store,
            presenter: None,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn add(&self, text: &str) -> Result<Option<Task>, InfraError> {
        let now = (self.now_provider)();
        let mut exhausted = false;
        let added = self.mutate(|list| {
            exhausted = list.ids_exhausted();
            list.add(text, now)
        })?;
        if exhausted {
            warn!("task id counter exhausted; task not added");
        }
        Ok(added)
    }

    pub fn toggle(&self, id: u64) -> Result<Option<Task>, InfraError> {
        let now = (self.now_provider)();
        self.mutate(|list| list.toggle(id, now))
    }

    pub fn edit(&self, id: u64, text: &str) -> Result<Option<Task>, InfraError> {
        let now = (self.now_provider)();
        self.mutate(|list| list.edit(id, text, now))
    }

    pub fn delete(&self, id: u64, prompt: &dyn ConfirmationPrompt) -> Result<Option<Task>, InfraError> {
        if self.lock_list()?.get(id).is_none() || !prompt.confirm(CONFIRM_DELETE) {
            return Ok(None);
        }
        self.mutate(|list| list.delete(id))
    }

    pub fn clear_completed(&self, prompt: &dyn ConfirmationPrompt) -> Result<usize, InfraError> {
        if self.lock_list()?.completed_count() == 0 || !prompt.confirm(CONFIRM_CLEAR_COMPLETED) {
            return Ok(0);
        }
        let removed = self.mutate(|list| Some(list.clear_completed()))?;
        Ok(removed.unwrap_or(0))
    }

    pub fn clear_all(&self, prompt: &dyn ConfirmationPrompt) -> Result<usize, InfraError> {
        if self.lock_list()?.tasks().is_empty() || !prompt.confirm(CONFIRM_CLEAR_ALL) {
            return Ok(0);
        }
        let removed = self.mutate(|list| Some(list.clear_all()))?;
        Ok(removed.unwrap_or(0))
    }

    /// Completes the first incomplete task in display order, used when a break begins.
    pub fn complete_next(&self) -> Result<Option<Task>, InfraError> {
        let now = (self.now_provider)();
        let completed = self.mutate(|list| list.complete_next(now))?;
        if let Some(task) = &completed {
            info!(task_id = task.id, "auto-completed task on break");
        }
        Ok(completed)
    }

    /// Replaces the whole list with the server's copy.
    pub fn adopt(&self, tasks: Vec<Task>) -> Result<(), InfraError> {
        self.mutate(|list| {
            list.replace_all(tasks);
            Some(())
        })?;
        Ok(())
    }

    pub fn snapshot(&self) -> Result<Vec<Task>, InfraError> {
        Ok(self.lock_list()?.tasks().to_vec())
    }

    pub fn display_order(&self) -> Result<Vec<Task>, InfraError> {
        Ok(self
            .lock_list()?
            .display_order()
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn completed_count(&self) -> Result<usize, InfraError> {
        Ok(self.lock_list()?.completed_count())
    }

    pub fn render(&self) -> Result<(), InfraError> {
        let Some(presenter) = &self.presenter else {
            return Ok(());
        };
        let views: Vec<TaskView> = self
            .lock_list()?
            .display_order()
            .into_iter()
            .map(TaskView::from)
            .collect();
        presenter.render_tasks(&views);
        Ok(())
    }

    fn lock_list(&self) -> Result<MutexGuard<'_, TaskList>, InfraError> {
        self.list
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("task list lock poisoned: {error}")))
    }

    /// Applies a change and, when it did something, checkpoints and re-renders.
    fn mutate<T>(&self, change: impl FnOnce(&mut TaskList) -> Option<T>) -> Result<Option<T>, InfraError> {
        let (result, tasks, next_id) = {
            let mut list = self.lock_list()?;
            let result = change(&mut list);
            (result, list.tasks().to_vec(), list.next_id())
        };
        if result.is_some() {
            self.persist(&tasks, next_id);
            self.render()?;
        }
        Ok(result)
    }

    fn persist(&self, tasks: &[Task], next_id: u64) {
        if let Err(error) = save_json(self.store.as_ref(), TASKS_KEY, tasks) {
            warn!(error = %error, "failed to persist tasks");
        }
        if let Err(error) = save_json(self.store.as_ref(), NEXT_ID_KEY, &next_id) {
            warn!(error = %error, "failed to persist task id counter");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::FixedPrompt;
    use crate::domain::models::MAX_TASK_ID;
    use crate::infrastructure::storage::InMemoryKeyValueStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fixed_now() -> NowProvider {
        Arc::new(|| {
            DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
                .expect("valid datetime")
                .with_timezone(&Utc)
        })
    }

    fn manager(store: &Arc<InMemoryKeyValueStore>) -> TaskManager<InMemoryKeyValueStore> {
        TaskManager::load(Arc::clone(store)).with_now_provider(fixed_now())
    }

    #[derive(Default)]
    struct CountingPrompt {
        asked: AtomicUsize,
        answer: bool,
    }

    impl ConfirmationPrompt for CountingPrompt {
        fn confirm(&self, _message: &str) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, InfraError> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), InfraError> {
            Err(InfraError::InvalidConfig("quota exceeded".to_string()))
        }

        fn remove(&self, _key: &str) -> Result<(), InfraError> {
            Ok(())
        }
    }

    #[test]
    fn mutations_are_persisted_and_reloaded() {
        let store = Arc::new(InMemoryKeyValueStore::default());
        let tasks = manager(&store);
        let first = tasks.add("Write report").expect("add").expect("created");
        tasks.add("Review PR").expect("add");
        tasks.toggle(first.id).expect("toggle");

        let reloaded = manager(&store);
        let snapshot = reloaded.snapshot().expect("snapshot");
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot[0].completed);

        let third = reloaded.add("Plan sprint").expect("add").expect("created");
        assert_eq!(third.id, 3);
    }

    #[test]
    fn blank_text_is_not_stored() {
        let store = Arc::new(InMemoryKeyValueStore::default());
        let tasks = manager(&store);
        assert!(tasks.add("   ").expect("add").is_none());
        assert_eq!(store.get(TASKS_KEY).expect("get"), None);
    }

    #[test]
    fn delete_requires_confirmation() {
        let store = Arc::new(InMemoryKeyValueStore::default());
        let tasks = manager(&store);
        let task = tasks.add("Keep me").expect("add").expect("created");

        let declined = CountingPrompt::default();
        assert!(tasks.delete(task.id, &declined).expect("delete").is_none());
        assert_eq!(declined.asked.load(Ordering::SeqCst), 1);
        assert_eq!(tasks.snapshot().expect("snapshot").len(), 1);

        let removed = tasks.delete(task.id, &FixedPrompt(true)).expect("delete");
        assert_eq!(removed.map(|task| task.text), Some("Keep me".to_string()));
        assert!(tasks.snapshot().expect("snapshot").is_empty());
    }

    #[test]
    fn missing_id_never_prompts() {
        let store = Arc::new(InMemoryKeyValueStore::default());
        let tasks = manager(&store);
        let prompt = CountingPrompt {
            answer: true,
            ..CountingPrompt::default()
        };
        assert!(tasks.delete(99, &prompt).expect("delete").is_none());
        assert_eq!(tasks.clear_completed(&prompt).expect("clear"), 0);
        assert_eq!(tasks.clear_all(&prompt).expect("clear"), 0);
        assert_eq!(prompt.asked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn bulk_clears_are_gated() {
        let store = Arc::new(InMemoryKeyValueStore::default());
        let tasks = manager(&store);
        let done = tasks.add("done").expect("add").expect("created");
        tasks.add("open").expect("add");
        tasks.toggle(done.id).expect("toggle");

        assert_eq!(tasks.clear_completed(&FixedPrompt(false)).expect("clear"), 0);
        assert_eq!(tasks.clear_completed(&FixedPrompt(true)).expect("clear"), 1);
        assert_eq!(tasks.clear_all(&FixedPrompt(true)).expect("clear"), 1);
        assert!(manager(&store).snapshot().expect("snapshot").is_empty());
    }

    #[test]
    fn adopt_replaces_list_and_keeps_counter_ahead() {
        let store = Arc::new(InMemoryKeyValueStore::default());
        let tasks = manager(&store);
        tasks.add("local").expect("add");

        let remote: Vec<Task> = serde_json::from_str(
            r#"[{"id":40,"text":"remote","completed":false,"syncedAt":"2026-03-02T09:00:00Z"}]"#,
        )
        .expect("parse remote tasks");
        tasks.adopt(remote.clone()).expect("adopt");

        assert_eq!(tasks.snapshot().expect("snapshot"), remote);
        let next = tasks.add("after").expect("add").expect("created");
        assert_eq!(next.id, 41);
    }

    #[test]
    fn adopting_the_last_id_stops_adds_but_keeps_the_list_usable() {
        let store = Arc::new(InMemoryKeyValueStore::default());
        let tasks = manager(&store);
        tasks
            .adopt(vec![Task::new(MAX_TASK_ID, "last", fixed_now()())])
            .expect("adopt");

        assert!(tasks.add("one more").expect("add").is_none());
        let toggled = tasks.toggle(MAX_TASK_ID).expect("toggle").expect("toggled");
        assert!(toggled.completed);
        assert_eq!(tasks.snapshot().expect("snapshot").len(), 1);
    }

    #[test]
    fn persistence_failure_keeps_memory_authoritative() {
        let tasks = TaskManager::load(Arc::new(FailingStore)).with_now_provider(fixed_now());
        let task = tasks.add("still here").expect("add").expect("created");
        assert_eq!(tasks.snapshot().expect("snapshot"), vec![task]);
    }

    #[test]
    fn corrupt_storage_starts_empty() {
        let store = Arc::new(InMemoryKeyValueStore::default());
        store.set(TASKS_KEY, "not json").expect("set");
        let tasks = manager(&store);
        assert!(tasks.snapshot().expect("snapshot").is_empty());
    }
}
