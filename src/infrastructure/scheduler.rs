use crate::application::ports::{TickCallback, TickHandle, TickScheduler};
use crate::infrastructure::error::InfraError;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct TokioTickScheduler {
    runtime: Handle,
}

impl TokioTickScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    pub fn current() -> Result<Self, InfraError> {
        let runtime = Handle::try_current().map_err(|error| {
            InfraError::InvalidConfig(format!("tick scheduler needs a tokio runtime: {error}"))
        })?;
        Ok(Self::new(runtime))
    }
}

impl TickScheduler for TokioTickScheduler {
    fn schedule_every(&self, period: Duration, callback: TickCallback) -> Box<dyn TickHandle> {
        let task = self.runtime.spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                callback();
            }
        });
        Box::new(TokioTickHandle { task })
    }
}

struct TokioTickHandle {
    task: JoinHandle<()>,
}

impl TickHandle for TokioTickHandle {
    fn cancel(self: Box<Self>) {
        self.task.abort();
    }
}

impl Drop for TokioTickHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_callback(counter: &Arc<AtomicUsize>) -> TickCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_per_period_until_cancelled() {
        let scheduler = TokioTickScheduler::current().expect("runtime available");
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = scheduler.schedule_every(Duration::from_secs(1), counting_callback(&counter));
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_ticks() {
        let scheduler = TokioTickScheduler::current().expect("runtime available");
        let counter = Arc::new(AtomicUsize::new(0));

        drop(scheduler.schedule_every(Duration::from_secs(1), counting_callback(&counter)));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn current_without_runtime_is_an_error() {
        assert!(matches!(
            TokioTickScheduler::current(),
            Err(InfraError::InvalidConfig(_))
        ));
    }
}
