use crate::application::cycle_log::CycleLog;
use crate::application::ports::{
    CheckpointSink, LogNotifier, NoopPresenter, Presenter, SessionNotifier, TickHandle,
    TickScheduler,
};
use crate::application::task_manager::{NowProvider, TaskManager};
use crate::application::view::{notification_for, TimerView};
use crate::domain::models::{Settings, SettingsExport, SettingsPatch, StoredTimerState, TimerState};
use crate::domain::timer::{PomodoroTimer, SessionTransition, TickOutcome};
use crate::infrastructure::checkpoint::InlineCheckpointWriter;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{
    load_json, save_json, KeyValueStore, TIMER_SETTINGS_KEY, TIMER_STATE_KEY,
};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

struct ControllerState {
    timer: PomodoroTimer,
    ticker: Option<Box<dyn TickHandle>>,
}

impl ControllerState {
    fn stop_ticking(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }
}

/// Drives a [`PomodoroTimer`] from a tick source and carries out the side effects of
/// each transition.
pub struct TimerController<S, K>
where
    S: KeyValueStore + 'static,
    K: TickScheduler,
{
    state: Mutex<ControllerState>,
    store: Arc<S>,
    scheduler: Arc<K>,
    cycles: Arc<CycleLog<S>>,
    tasks: Option<Arc<TaskManager<S>>>,
    checkpoints: Arc<dyn CheckpointSink>,
    notifier: Arc<dyn SessionNotifier>,
    presenter: Arc<dyn Presenter>,
    now_provider: NowProvider,
}

pub fn load_settings<S>(store: &S) -> Settings
where
    S: KeyValueStore + ?Sized,
{
    match load_json::<Settings, _>(store, TIMER_SETTINGS_KEY) {
        Ok(saved) => saved.unwrap_or_default().validated(),
        Err(error) => {
            warn!(error = %error, "stored settings unreadable; using defaults");
            Settings::default()
        }
    }
}

fn load_timer<S>(store: &S, settings: Settings) -> PomodoroTimer
where
    S: KeyValueStore + ?Sized,
{
    match load_json::<StoredTimerState, _>(store, TIMER_STATE_KEY) {
        Ok(Some(saved)) => PomodoroTimer::restore(settings, saved),
        Ok(None) => PomodoroTimer::new(settings),
        Err(error) => {
            warn!(error = %error, "stored timer state unreadable; starting fresh");
            PomodoroTimer::new(settings)
        }
    }
}

impl<S, K> TimerController<S, K>
where
    S: KeyValueStore + 'static,
    K: TickScheduler + 'static,
{
    pub fn load(store: Arc<S>, scheduler: Arc<K>, cycles: Arc<CycleLog<S>>) -> Self {
        let settings = load_settings(store.as_ref());
        let timer = load_timer(store.as_ref(), settings);
        Self {
            state: Mutex::new(ControllerState {
                timer,
                ticker: None,
            }),
            checkpoints: Arc::new(InlineCheckpointWriter::new(Arc::clone(&store))),
            store,
            scheduler,
            cycles,
            tasks: None,
            notifier: Arc::new(LogNotifier),
            presenter: Arc::new(NoopPresenter),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_task_manager(mut self, tasks: Arc<TaskManager<S>>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn with_checkpoint_sink(mut self, checkpoints: Arc<dyn CheckpointSink>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn SessionNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn timer_state(&self) -> Result<TimerState, InfraError> {
        Ok(self.lock_state()?.timer.state().clone())
    }

    pub fn settings(&self) -> Result<Settings, InfraError> {
        Ok(self.lock_state()?.timer.settings().clone())
    }

    pub fn view(&self) -> Result<TimerView, InfraError> {
        let state = self.lock_state()?;
        Ok(TimerView::from_state(state.timer.state(), state.timer.settings()))
    }

    /// Starts ticking. A second call while running schedules nothing.
    pub fn start(self: &Arc<Self>) -> Result<(), InfraError> {
        {
            let mut state = self.lock_state()?;
            if !state.timer.start() {
                return Ok(());
            }
            let controller = Arc::downgrade(self);
            state.ticker = Some(self.scheduler.schedule_every(
                TICK_INTERVAL,
                Box::new(move || {
                    if let Some(controller) = controller.upgrade() {
                        if let Err(error) = controller.tick() {
                            warn!(error = %error, "timer tick failed");
                        }
                    }
                }),
            ));
        }
        info!("timer started");
        self.render()
    }

    pub fn pause(&self) -> Result<(), InfraError> {
        let snapshot = {
            let mut state = self.lock_state()?;
            if !state.timer.pause() {
                return Ok(());
            }
            state.stop_ticking();
            state.timer.state().clone()
        };
        info!("timer paused");
        self.checkpoint(snapshot);
        self.render()
    }

    pub fn reset(&self) -> Result<(), InfraError> {
        let snapshot = {
            let mut state = self.lock_state()?;
            state.stop_ticking();
            state.timer.reset();
            state.timer.state().clone()
        };
        info!("timer reset");
        self.checkpoint(snapshot);
        self.render()
    }

    pub fn tick(&self) -> Result<(), InfraError> {
        let now = (self.now_provider)();
        let (outcome, snapshot) = {
            let mut state = self.lock_state()?;
            let outcome = state.timer.tick(now);
            if matches!(outcome, TickOutcome::Completed(_)) {
                state.stop_ticking();
            }
            (outcome, state.timer.state().clone())
        };

        match outcome {
            TickOutcome::Idle => Ok(()),
            TickOutcome::Counted { checkpoint_due } => {
                if checkpoint_due {
                    self.checkpoint(snapshot);
                }
                self.render()
            }
            TickOutcome::Completed(transition) => self.finish_session(transition, snapshot),
        }
    }

    /// Ends the current session immediately, as if its clock had run out.
    pub fn complete_session(&self) -> Result<SessionTransition, InfraError> {
        let now = (self.now_provider)();
        let (transition, snapshot) = {
            let mut state = self.lock_state()?;
            state.stop_ticking();
            let transition = state.timer.complete_session(now);
            (transition, state.timer.state().clone())
        };
        self.finish_session(transition.clone(), snapshot)?;
        Ok(transition)
    }

    /// Merges the patch into the current settings, validates, applies and persists them.
    pub fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings, InfraError> {
        self.change_settings(|settings| {
            settings.merge(patch);
            true
        })
    }

    /// Applies a named preset. Unknown names change nothing and return `None`.
    pub fn apply_preset(&self, name: &str) -> Result<Option<Settings>, InfraError> {
        let mut applied = false;
        let settings = self.change_settings(|settings| {
            applied = settings.apply_preset(name);
            applied
        })?;
        Ok(applied.then_some(settings))
    }

    pub fn update_setting(&self, key: &str, value: serde_json::Value) -> Result<bool, InfraError> {
        let mut changed = false;
        let mut failure = None;
        self.change_settings(|settings| {
            match settings.update_field(key, value) {
                Ok(updated) => changed = updated,
                Err(message) => failure = Some(message),
            }
            changed
        })?;
        match failure {
            Some(message) => Err(InfraError::Validation(message)),
            None => Ok(changed),
        }
    }

    pub fn reset_settings(&self) -> Result<Settings, InfraError> {
        self.change_settings(|settings| {
            settings.reset_to_defaults();
            true
        })
    }

    pub fn export_settings(&self) -> Result<SettingsExport, InfraError> {
        let now = (self.now_provider)();
        Ok(self.settings()?.export(now))
    }

    pub fn import_settings(&self, data: &serde_json::Value) -> Result<Settings, InfraError> {
        let mut failure = None;
        let settings = self.change_settings(|settings| match settings.import(data) {
            Ok(()) => true,
            Err(message) => {
                failure = Some(message);
                false
            }
        })?;
        match failure {
            Some(message) => Err(InfraError::Validation(message)),
            None => Ok(settings),
        }
    }

    fn change_settings(
        &self,
        change: impl FnOnce(&mut Settings) -> bool,
    ) -> Result<Settings, InfraError> {
        let (settings, snapshot) = {
            let mut state = self.lock_state()?;
            let mut settings = state.timer.settings().clone();
            if !change(&mut settings) {
                return Ok(state.timer.settings().clone());
            }
            settings.validate();
            state.timer.apply_settings(settings.clone());
            (settings, state.timer.state().clone())
        };
        if let Err(error) = save_json(self.store.as_ref(), TIMER_SETTINGS_KEY, &settings) {
            warn!(error = %error, "failed to persist settings");
        }
        info!(
            focus = settings.focus_duration,
            rounds = settings.rounds,
            "settings updated"
        );
        self.checkpoint(snapshot);
        self.render()?;
        Ok(settings)
    }

    fn finish_session(
        &self,
        transition: SessionTransition,
        snapshot: TimerState,
    ) -> Result<(), InfraError> {
        let settings = self.settings()?;
        info!(
            finished = transition.finished.label(),
            next = transition.next.label(),
            round = snapshot.current_round,
            "session completed"
        );

        let (title, message) = notification_for(&transition);
        self.notifier.notify(title, message);
        if settings.sound_alert {
            self.notifier.play_sound();
        }

        if let Some(tasks) = &self.tasks {
            if settings.auto_check && transition.entered_break() {
                if let Err(error) = tasks.complete_next() {
                    warn!(error = %error, "auto-check failed");
                }
            }
        }

        if let Some(mut cycle) = transition.cycle {
            if let Some(tasks) = &self.tasks {
                cycle.tasks_completed = tasks
                    .completed_count()
                    .ok()
                    .and_then(|count| u32::try_from(count).ok());
            }
            self.cycles.record(cycle);
        }

        self.checkpoint(snapshot);
        self.render()
    }

    fn checkpoint(&self, snapshot: TimerState) {
        self.checkpoints.submit(snapshot);
    }

    pub fn render(&self) -> Result<(), InfraError> {
        let view = self.view()?;
        self.presenter.render_timer(&view);
        Ok(())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ControllerState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("timer lock poisoned: {error}")))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::ports::TickCallback;
    use crate::domain::models::TimerMode;
    use crate::infrastructure::storage::InMemoryKeyValueStore;
    use chrono::DateTime;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Collects scheduled callbacks and fires them on demand.
    #[derive(Default)]
    pub(crate) struct FakeScheduler {
        callbacks: Mutex<Vec<(Arc<AtomicBool>, Arc<TickCallback>)>>,
        scheduled: AtomicUsize,
    }

    impl FakeScheduler {
        pub(crate) fn active(&self) -> usize {
            self.callbacks
                .lock()
                .expect("lock callbacks")
                .iter()
                .filter(|(cancelled, _)| !cancelled.load(Ordering::SeqCst))
                .count()
        }

        pub(crate) fn fire(&self, times: usize) {
            for _ in 0..times {
                let active: Vec<Arc<TickCallback>> = self
                    .callbacks
                    .lock()
                    .expect("lock callbacks")
                    .iter()
                    .filter(|(cancelled, _)| !cancelled.load(Ordering::SeqCst))
                    .map(|(_, callback)| Arc::clone(callback))
                    .collect();
                for callback in active {
                    callback();
                }
            }
        }
    }

    struct FakeHandle {
        cancelled: Arc<AtomicBool>,
    }

    impl TickHandle for FakeHandle {
        fn cancel(self: Box<Self>) {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    impl TickScheduler for FakeScheduler {
        fn schedule_every(&self, _period: Duration, callback: TickCallback) -> Box<dyn TickHandle> {
            let cancelled = Arc::new(AtomicBool::new(false));
            self.scheduled.fetch_add(1, Ordering::SeqCst);
            self.callbacks
                .lock()
                .expect("lock callbacks")
                .push((Arc::clone(&cancelled), Arc::new(callback)));
            Box::new(FakeHandle { cancelled })
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub(crate) notifications: Mutex<Vec<(String, String)>>,
        pub(crate) sounds: AtomicUsize,
    }

    impl SessionNotifier for RecordingNotifier {
        fn notify(&self, title: &str, message: &str) {
            self.notifications
                .lock()
                .expect("lock notifications")
                .push((title.to_string(), message.to_string()));
        }

        fn play_sound(&self) {
            self.sounds.fetch_add(1, Ordering::SeqCst);
        }
    }

    type Controller = TimerController<InMemoryKeyValueStore, FakeScheduler>;

    struct Harness {
        store: Arc<InMemoryKeyValueStore>,
        scheduler: Arc<FakeScheduler>,
        notifier: Arc<RecordingNotifier>,
        tasks: Arc<TaskManager<InMemoryKeyValueStore>>,
        cycles: Arc<CycleLog<InMemoryKeyValueStore>>,
        controller: Arc<Controller>,
    }

    fn fixed_now() -> NowProvider {
        Arc::new(|| {
            DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
                .expect("valid datetime")
                .with_timezone(&Utc)
        })
    }

    impl Harness {
        fn new() -> Self {
            Self::with_store(Arc::new(InMemoryKeyValueStore::default()))
        }

        fn with_store(store: Arc<InMemoryKeyValueStore>) -> Self {
            let scheduler = Arc::new(FakeScheduler::default());
            let notifier = Arc::new(RecordingNotifier::default());
            let tasks = Arc::new(TaskManager::load(Arc::clone(&store)).with_now_provider(fixed_now()));
            let cycles = Arc::new(CycleLog::new(Arc::clone(&store)));
            let controller = Arc::new(
                TimerController::load(Arc::clone(&store), Arc::clone(&scheduler), Arc::clone(&cycles))
                    .with_task_manager(Arc::clone(&tasks))
                    .with_notifier(notifier.clone())
                    .with_now_provider(fixed_now()),
            );
            Self {
                store,
                scheduler,
                notifier,
                tasks,
                cycles,
                controller,
            }
        }

        fn stored_state(&self) -> Option<StoredTimerState> {
            load_json(self.store.as_ref(), TIMER_STATE_KEY).expect("load timer state")
        }
    }

    #[test]
    fn start_twice_schedules_one_tick_source() {
        let harness = Harness::new();
        harness.controller.start().expect("start");
        harness.controller.start().expect("start again");

        assert_eq!(harness.scheduler.scheduled.load(Ordering::SeqCst), 1);
        assert_eq!(harness.scheduler.active(), 1);
        assert!(harness.controller.timer_state().expect("state").is_running);
    }

    #[test]
    fn ticks_count_down_and_pause_checkpoints() {
        let harness = Harness::new();
        harness.controller.start().expect("start");
        harness.scheduler.fire(3);

        assert_eq!(harness.controller.timer_state().expect("state").time_left, 1497);
        assert!(harness.stored_state().is_none());

        harness.controller.pause().expect("pause");
        assert_eq!(harness.scheduler.active(), 0);
        let stored = harness.stored_state().expect("checkpoint written");
        assert_eq!(stored.time_left, Some(1497));
        assert_eq!(stored.is_running, Some(false));

        harness.scheduler.fire(5);
        assert_eq!(harness.controller.timer_state().expect("state").time_left, 1497);
    }

    #[test]
    fn whole_minutes_are_checkpointed_while_running() {
        let harness = Harness::new();
        harness.controller.start().expect("start");
        harness.scheduler.fire(60);

        let stored = harness.stored_state().expect("minute checkpoint");
        assert_eq!(stored.time_left, Some(1440));
        assert_eq!(stored.is_running, Some(true));
    }

    #[test]
    fn clock_running_out_completes_and_stops_ticking() {
        let harness = Harness::new();
        harness
            .controller
            .update_settings(&SettingsPatch {
                focus_duration: Some(5),
                sound_alert: Some(true),
                ..SettingsPatch::default()
            })
            .expect("update settings");
        harness.controller.start().expect("start");
        harness.scheduler.fire(301);

        let state = harness.controller.timer_state().expect("state");
        assert_eq!(state.mode, TimerMode::ShortBreak);
        assert_eq!(state.current_round, 2);
        assert!(!state.is_running);
        assert_eq!(harness.scheduler.active(), 0);
        assert_eq!(harness.notifier.sounds.load(Ordering::SeqCst), 1);
        assert_eq!(
            harness.notifier.notifications.lock().expect("lock")[0].0,
            "Focus complete!"
        );
    }

    #[test]
    fn four_rounds_produce_one_cycle_and_a_long_break() {
        let harness = Harness::new();
        for round in 1..=4 {
            let transition = harness.controller.complete_session().expect("complete focus");
            if round < 4 {
                assert_eq!(transition.next, TimerMode::ShortBreak);
                harness.controller.complete_session().expect("complete break");
            }
        }

        let state = harness.controller.timer_state().expect("state");
        assert_eq!(state.mode, TimerMode::LongBreak);
        assert_eq!(state.current_round, 1);
        assert_eq!(state.time_left, 15 * 60);

        let cycles = harness.cycles.list().expect("cycles");
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].rounds, 4);
        assert_eq!(cycles[0].duration, 25);
        assert_eq!(cycles[0].tasks_completed, Some(0));
        assert_eq!(
            harness.stored_state().and_then(|stored| stored.mode),
            Some(TimerMode::LongBreak)
        );
    }

    #[test]
    fn auto_check_completes_a_task_when_a_break_begins() {
        let harness = Harness::new();
        harness
            .controller
            .update_settings(&SettingsPatch {
                auto_check: Some(true),
                ..SettingsPatch::default()
            })
            .expect("enable auto check");
        harness.tasks.add("first").expect("add");
        harness.tasks.add("second").expect("add");

        harness.controller.complete_session().expect("focus to break");
        assert_eq!(harness.tasks.completed_count().expect("count"), 1);

        harness.controller.complete_session().expect("break to focus");
        assert_eq!(harness.tasks.completed_count().expect("count"), 1);
    }

    #[test]
    fn auto_check_off_leaves_tasks_alone() {
        let harness = Harness::new();
        harness.tasks.add("first").expect("add");
        harness.controller.complete_session().expect("focus to break");
        assert_eq!(harness.tasks.completed_count().expect("count"), 0);
        assert_eq!(harness.notifier.sounds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn settings_update_recomputes_paused_clock_and_persists() {
        let harness = Harness::new();
        let settings = harness
            .controller
            .update_settings(&SettingsPatch {
                focus_duration: Some(2),
                short_break_duration: Some(10),
                long_break_duration: Some(3),
                ..SettingsPatch::default()
            })
            .expect("update");

        assert_eq!(settings.focus_duration, 5);
        assert_eq!(settings.long_break_duration, 15);
        assert_eq!(harness.controller.timer_state().expect("state").time_left, 300);

        let stored: Settings = load_json(harness.store.as_ref(), TIMER_SETTINGS_KEY)
            .expect("load")
            .expect("persisted");
        assert_eq!(stored, settings);
    }

    #[test]
    fn settings_update_while_running_keeps_the_clock() {
        let harness = Harness::new();
        harness.controller.start().expect("start");
        harness.scheduler.fire(10);
        harness
            .controller
            .apply_preset("long")
            .expect("preset")
            .expect("known preset");

        assert_eq!(harness.controller.timer_state().expect("state").time_left, 1490);
        assert_eq!(harness.controller.settings().expect("settings").focus_duration, 45);
    }

    #[test]
    fn unknown_preset_is_ignored() {
        let harness = Harness::new();
        assert!(harness.controller.apply_preset("marathon").expect("preset").is_none());
        assert_eq!(harness.controller.settings().expect("settings"), Settings::default());
        assert!(load_json::<Settings, _>(harness.store.as_ref(), TIMER_SETTINGS_KEY)
            .expect("load")
            .is_none());
    }

    #[test]
    fn import_rejects_payload_without_settings() {
        let harness = Harness::new();
        let result = harness.controller.import_settings(&serde_json::json!({ "version": "1.0" }));
        assert!(matches!(result, Err(InfraError::Validation(_))));

        let exported = serde_json::to_value(harness.controller.export_settings().expect("export"))
            .expect("serialize");
        harness
            .controller
            .update_setting("rounds", serde_json::json!(6))
            .expect("update rounds");
        harness.controller.import_settings(&exported).expect("import");
        assert_eq!(harness.controller.settings().expect("settings").rounds, 4);

        harness
            .controller
            .update_setting("rounds", serde_json::json!(6))
            .expect("update rounds");
        assert_eq!(harness.controller.reset_settings().expect("reset"), Settings::default());
    }

    #[test]
    fn reload_restores_paused_state_and_settings() {
        let store = Arc::new(InMemoryKeyValueStore::default());
        {
            let harness = Harness::with_store(Arc::clone(&store));
            harness.controller.apply_preset("short").expect("preset");
            harness.controller.start().expect("start");
            harness.scheduler.fire(120);
        }

        let reloaded = Harness::with_store(store);
        let state = reloaded.controller.timer_state().expect("state");
        assert!(!state.is_running);
        assert_eq!(state.time_left, 15 * 60 - 120);
        assert_eq!(reloaded.controller.settings().expect("settings").rounds, 6);
    }

    #[test]
    fn dropped_controller_stops_receiving_ticks() {
        let harness = Harness::new();
        harness.controller.start().expect("start");
        let Harness {
            scheduler,
            controller,
            ..
        } = harness;
        drop(controller);
        scheduler.fire(3);
        assert_eq!(scheduler.active(), 1);
    }

    // Feature: timer controller, Property 5: reset always leaves a paused focus session with no tick source.
    proptest! {
        #[test]
        fn reset_after_any_history_is_clean(ticks in 0usize..200, completions in 0usize..6) {
            let harness = Harness::new();
            harness.controller.start().expect("start");
            harness.scheduler.fire(ticks);
            for _ in 0..completions {
                harness.controller.complete_session().expect("complete");
            }
            harness.controller.reset().expect("reset");

            let state = harness.controller.timer_state().expect("state");
            prop_assert_eq!(state, TimerState::fresh(&Settings::default()));
            prop_assert_eq!(harness.scheduler.active(), 0);
        }
    }
}
