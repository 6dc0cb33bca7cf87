use crate::application::ports::Presenter;
use crate::application::task_manager::TaskManager;
use crate::infrastructure::storage::KeyValueStore;
use crate::infrastructure::sync_client::TaskSyncClient;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced { count: usize },
    Offline,
    /// Another sync was still waiting for the server.
    Skipped,
}

/// Pushes the whole local list to the server and adopts whatever comes back.
pub struct TaskSyncService<C, S>
where
    C: TaskSyncClient,
    S: KeyValueStore,
{
    client: Arc<C>,
    tasks: Arc<TaskManager<S>>,
    presenter: Option<Arc<dyn Presenter>>,
    in_flight: AtomicBool,
    status: Mutex<SyncStatus>,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<C, S> TaskSyncService<C, S>
where
    C: TaskSyncClient,
    S: KeyValueStore,
{
    pub fn new(client: Arc<C>, tasks: Arc<TaskManager<S>>) -> Self {
        Self {
            client,
            tasks,
            presenter: None,
            in_flight: AtomicBool::new(false),
            status: Mutex::new(SyncStatus::Idle),
        }
    }

    pub fn with_presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn status(&self) -> SyncStatus {
        self.status
            .lock()
            .map(|status| *status)
            .unwrap_or(SyncStatus::Offline)
    }

    /// Never fails: any error leaves the local list untouched and reports offline.
    pub async fn sync(&self) -> SyncOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return SyncOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.in_flight);
        self.set_status(SyncStatus::Syncing);

        let snapshot = match self.tasks.snapshot() {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(error = %error, "could not read local tasks for sync");
                self.set_status(SyncStatus::Offline);
                return SyncOutcome::Offline;
            }
        };

        let response = match self.client.sync_tasks(&snapshot).await {
            Ok(response) if response.ok => response,
            Ok(_) => {
                warn!("sync rejected by server; keeping local tasks");
                self.set_status(SyncStatus::Offline);
                return SyncOutcome::Offline;
            }
            Err(error) => {
                warn!(error = %error, "sync failed; keeping local tasks");
                self.set_status(SyncStatus::Offline);
                return SyncOutcome::Offline;
            }
        };

        let count = response.synced;
        if let Err(error) = self.tasks.adopt(response.tasks) {
            warn!(error = %error, "failed to adopt synced tasks");
            self.set_status(SyncStatus::Offline);
            return SyncOutcome::Offline;
        }
        info!(synced = count, "tasks synced");
        self.set_status(SyncStatus::Online);
        SyncOutcome::Synced { count }
    }

    fn set_status(&self, next: SyncStatus) {
        if let Ok(mut status) = self.status.lock() {
            *status = next;
        }
        if let Some(presenter) = &self.presenter {
            presenter.render_sync_status(next);
        }
    }
}
