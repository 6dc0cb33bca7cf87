use crate::application::task_sync::SyncStatus;
use crate::application::view::{TaskView, TimerView};
use crate::domain::models::TimerState;
use std::time::Duration;
use tracing::info;

pub type TickCallback = Box<dyn Fn() + Send + Sync>;

/// Repeating one-shot-per-period callback source driving the timer.
pub trait TickScheduler: Send + Sync {
    fn schedule_every(&self, period: Duration, callback: TickCallback) -> Box<dyn TickHandle>;
}

pub trait TickHandle: Send {
    fn cancel(self: Box<Self>);
}

/// Destination for timer checkpoints. `submit` is called from the tick path and must
/// not wait on storage.
pub trait CheckpointSink: Send + Sync {
    fn submit(&self, snapshot: TimerState);
}

/// Rendering surface. Only the timer view is mandatory.
pub trait Presenter: Send + Sync {
    fn render_timer(&self, view: &TimerView);

    fn render_tasks(&self, _tasks: &[TaskView]) {}

    fn render_sync_status(&self, _status: SyncStatus) {}
}

pub trait SessionNotifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);

    fn play_sound(&self);
}

pub trait ConfirmationPrompt: Send + Sync {
    fn confirm(&self, message: &str) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPresenter;

impl Presenter for NoopPresenter {
    fn render_timer(&self, _view: &TimerView) {}
}

/// Headless notifier that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl SessionNotifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        info!(title, message, "session notification");
    }

    fn play_sound(&self) {
        info!("session sound alert");
    }
}

/// Prompt that answers every question the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompt(pub bool);

impl ConfirmationPrompt for FixedPrompt {
    fn confirm(&self, _message: &str) -> bool {
        self.0
    }
}
