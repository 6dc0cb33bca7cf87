use crate::domain::models::CompletedCycle;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{load_json, save_json, KeyValueStore, COMPLETED_CYCLES_KEY};
use crate::infrastructure::sync_client::TaskSyncClient;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Where an unparseable cycle log is moved before a fresh one is started.
pub const UNREADABLE_CYCLES_KEY: &str = "completedCycles.unreadable";

/// Append-only local log of finished cycles, optionally mirrored to the API.
pub struct CycleLog<S>
where
    S: KeyValueStore,
{
    store: Arc<S>,
    reporter: Option<Arc<dyn TaskSyncClient>>,
}

impl<S> CycleLog<S>
where
    S: KeyValueStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            reporter: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn TaskSyncClient>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn list(&self) -> Result<Vec<CompletedCycle>, InfraError> {
        Ok(load_json(self.store.as_ref(), COMPLETED_CYCLES_KEY)?.unwrap_or_default())
    }

    pub fn record(&self, cycle: CompletedCycle) {
        if let Err(error) = self.append(&cycle) {
            warn!(error = %error, "failed to persist completed cycle");
        }
        info!(rounds = cycle.rounds, duration = cycle.duration, "cycle completed");

        let Some(reporter) = &self.reporter else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            debug!("no async runtime; completed cycle kept locally only");
            return;
        };
        let reporter = Arc::clone(reporter);
        runtime.spawn(async move {
            if let Err(error) = reporter.report_cycle(&cycle).await {
                warn!(error = %error, "failed to report completed cycle");
            }
        });
    }

    fn append(&self, cycle: &CompletedCycle) -> Result<(), InfraError> {
        let mut cycles = match self.list() {
            Ok(cycles) => cycles,
            Err(InfraError::Json(error)) => {
                warn!(error = %error, "stored cycle log unreadable; starting a new one");
                if let Some(raw) = self.store.get(COMPLETED_CYCLES_KEY)? {
                    self.store.set(UNREADABLE_CYCLES_KEY, &raw)?;
                }
                Vec::new()
            }
            Err(error) => return Err(error),
        };
        cycles.push(cycle.clone());
        save_json(self.store.as_ref(), COMPLETED_CYCLES_KEY, &cycles)
    }
}
