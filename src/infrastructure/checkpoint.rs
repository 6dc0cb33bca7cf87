use crate::application::ports::CheckpointSink;
use crate::domain::models::TimerState;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{save_json, KeyValueStore, TIMER_STATE_KEY};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::warn;

/// Writes each snapshot before returning. For callers without a runtime.
pub struct InlineCheckpointWriter<S>
where
    S: KeyValueStore,
{
    store: Arc<S>,
}

impl<S> InlineCheckpointWriter<S>
where
    S: KeyValueStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S> CheckpointSink for InlineCheckpointWriter<S>
where
    S: KeyValueStore,
{
    fn submit(&self, snapshot: TimerState) {
        write_snapshot(self.store.as_ref(), &snapshot);
    }
}

/// Queues snapshots for a writer task on the runtime. Only the newest queued snapshot is
/// written when several pile up behind a slow store.
#[derive(Debug, Clone)]
pub struct BackgroundCheckpointWriter {
    sender: UnboundedSender<TimerState>,
}

impl BackgroundCheckpointWriter {
    pub fn new<S>(store: Arc<S>, runtime: &Handle) -> Self
    where
        S: KeyValueStore + 'static,
    {
        let (sender, receiver) = unbounded_channel();
        runtime.spawn(run_writer(store, receiver));
        Self { sender }
    }

    pub fn current<S>(store: Arc<S>) -> Result<Self, InfraError>
    where
        S: KeyValueStore + 'static,
    {
        let runtime = Handle::try_current().map_err(|error| {
            InfraError::InvalidConfig(format!("checkpoint writer needs a tokio runtime: {error}"))
        })?;
        Ok(Self::new(store, &runtime))
    }
}

impl CheckpointSink for BackgroundCheckpointWriter {
    fn submit(&self, snapshot: TimerState) {
        if self.sender.send(snapshot).is_err() {
            warn!("checkpoint writer stopped; timer snapshot dropped");
        }
    }
}

async fn run_writer<S>(store: Arc<S>, mut receiver: UnboundedReceiver<TimerState>)
where
    S: KeyValueStore + 'static,
{
    while let Some(mut snapshot) = receiver.recv().await {
        while let Ok(newer) = receiver.try_recv() {
            snapshot = newer;
        }
        let store = Arc::clone(&store);
        let written =
            tokio::task::spawn_blocking(move || write_snapshot(store.as_ref(), &snapshot)).await;
        if let Err(error) = written {
            warn!(error = %error, "checkpoint write task failed");
        }
    }
}

fn write_snapshot<S>(store: &S, snapshot: &TimerState)
where
    S: KeyValueStore + ?Sized,
{
    if let Err(error) = save_json(store, TIMER_STATE_KEY, snapshot) {
        warn!(error = %error, "failed to checkpoint timer state");
    }
}
