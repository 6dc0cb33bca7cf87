use crate::application::cycle_log::CycleLog;
use crate::application::ports::{
    CheckpointSink, ConfirmationPrompt, LogNotifier, NoopPresenter, Presenter, SessionNotifier,
    TickScheduler,
};
use crate::application::task_manager::TaskManager;
use crate::application::task_sync::{SyncOutcome, TaskSyncService};
use crate::application::timer_controller::TimerController;
use crate::domain::models::SettingsPatch;
use crate::infrastructure::checkpoint::{BackgroundCheckpointWriter, InlineCheckpointWriter};
use crate::infrastructure::config::{ensure_default_config, load_app_config, AppConfig};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{initialize_database, SqliteKeyValueStore};
use crate::infrastructure::sync_client::ReqwestTaskSyncClient;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub database_path: PathBuf,
    pub config: AppConfig,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let database_path = state_dir.join("pomotask.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;

    ensure_default_config(&config_dir)?;
    let config = load_app_config(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        database_path,
        config,
    })
}

/// Commands a presentation layer can send into the client core.
#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    Start,
    Pause,
    Reset,
    UpdateSettings(SettingsPatch),
    ApplyPreset(String),
    AddTask(String),
    ToggleTask(u64),
    EditTask { id: u64, text: String },
    DeleteTask(u64),
    ClearCompleted,
    ClearAll,
    Sync,
}

pub struct ClientPorts {
    pub presenter: Arc<dyn Presenter>,
    pub notifier: Arc<dyn SessionNotifier>,
    pub prompt: Arc<dyn ConfirmationPrompt>,
}

impl ClientPorts {
    pub fn headless(prompt: Arc<dyn ConfirmationPrompt>) -> Self {
        Self {
            presenter: Arc::new(NoopPresenter),
            notifier: Arc::new(LogNotifier),
            prompt,
        }
    }
}

type Store = SqliteKeyValueStore;

/// One client surface (web or extension) wired over its own storage scope.
pub struct ClientApp<K>
where
    K: TickScheduler + 'static,
{
    pub timer: Arc<TimerController<Store, K>>,
    pub tasks: Arc<TaskManager<Store>>,
    pub cycles: Arc<CycleLog<Store>>,
    pub sync: Option<TaskSyncService<ReqwestTaskSyncClient, Store>>,
    prompt: Arc<dyn ConfirmationPrompt>,
    sync_on_load: bool,
}

impl<K> ClientApp<K>
where
    K: TickScheduler + 'static,
{
    pub fn open(workspace_root: &Path, scheduler: Arc<K>, ports: ClientPorts) -> Result<Self, InfraError> {
        let workspace = bootstrap_workspace(workspace_root)?;
        let store = Arc::new(SqliteKeyValueStore::new(
            &workspace.database_path,
            workspace.config.storage_scope.clone(),
        ));

        let client = match workspace.config.api_url.as_deref() {
            Some(api_url) => Some(Arc::new(ReqwestTaskSyncClient::new(api_url)?)),
            None => None,
        };

        let tasks = Arc::new(TaskManager::load(Arc::clone(&store)).with_presenter(Arc::clone(&ports.presenter)));
        let mut cycles = CycleLog::new(Arc::clone(&store));
        if let Some(client) = &client {
            cycles = cycles.with_reporter(client.clone());
        }
        let cycles = Arc::new(cycles);

        let checkpoints: Arc<dyn CheckpointSink> =
            match BackgroundCheckpointWriter::current(Arc::clone(&store)) {
                Ok(writer) => Arc::new(writer),
                Err(error) => {
                    info!(error = %error, "writing timer checkpoints inline");
                    Arc::new(InlineCheckpointWriter::new(Arc::clone(&store)))
                }
            };

        let timer = Arc::new(
            TimerController::load(Arc::clone(&store), scheduler, Arc::clone(&cycles))
                .with_task_manager(Arc::clone(&tasks))
                .with_checkpoint_sink(checkpoints)
                .with_notifier(ports.notifier)
                .with_presenter(Arc::clone(&ports.presenter)),
        );

        let sync = client.map(|client| {
            TaskSyncService::new(client, Arc::clone(&tasks)).with_presenter(Arc::clone(&ports.presenter))
        });

        info!(
            scope = store.scope(),
            sync_enabled = sync.is_some(),
            "client opened"
        );
        Ok(Self {
            timer,
            tasks,
            cycles,
            sync,
            prompt: ports.prompt,
            sync_on_load: workspace.config.sync_on_load,
        })
    }

    /// Renders the initial state and runs the load-time sync when it is enabled.
    pub async fn initialize(&self) -> Result<Option<SyncOutcome>, InfraError> {
        self.timer.render()?;
        self.tasks.render()?;
        if !self.sync_on_load {
            return Ok(None);
        }
        Ok(match &self.sync {
            Some(sync) => Some(sync.sync().await),
            None => None,
        })
    }

    pub async fn dispatch(&self, action: UserAction) -> Result<(), InfraError> {
        match action {
            UserAction::Start => self.timer.start()?,
            UserAction::Pause => self.timer.pause()?,
            UserAction::Reset => self.timer.reset()?,
            UserAction::UpdateSettings(patch) => {
                self.timer.update_settings(&patch)?;
            }
            UserAction::ApplyPreset(name) => {
                if self.timer.apply_preset(&name)?.is_none() {
                    warn!(preset = %name, "unknown preset ignored");
                }
            }
            UserAction::AddTask(text) => {
                self.tasks.add(&text)?;
            }
            UserAction::ToggleTask(id) => {
                self.tasks.toggle(id)?;
            }
            UserAction::EditTask { id, text } => {
                self.tasks.edit(id, &text)?;
            }
            UserAction::DeleteTask(id) => {
                self.tasks.delete(id, self.prompt.as_ref())?;
            }
            UserAction::ClearCompleted => {
                self.tasks.clear_completed(self.prompt.as_ref())?;
            }
            UserAction::ClearAll => {
                self.tasks.clear_all(self.prompt.as_ref())?;
            }
            UserAction::Sync => {
                if let Some(sync) = &self.sync {
                    sync.sync().await;
                }
            }
        }
        Ok(())
    }
}
