use crate::config::{FailurePolicy, PipelineConfig};
use crate::error::LoaderError;
use crate::ingest::channel::{Received, WorkReceiver};
use crate::ingest::reporter::Reporter;
use crate::models::WorkItem;
use crate::sink::RecordSink;
use std::sync::Arc;
use std::time::Duration;

/// Per-worker knobs, copied into every worker of a pool.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub failure_policy: FailurePolicy,
    /// Never zero; the `From<&PipelineConfig>` conversion clamps it.
    pub progress_every: u64,
    /// Pause after each successful write. It throttles this worker only and
    /// is not backpressure from the sink; failed writes are not followed by it.
    pub inter_write_delay: Duration,
}

impl From<&PipelineConfig> for WorkerSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            failure_policy: config.failure_policy,
            progress_every: config.progress_every.max(1),
            inter_write_delay: config.inter_write_delay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Writing,
    Paused,
    Terminated,
}

impl WorkerState {
    /// Whether a worker may move from `self` to `next`.
    pub fn can_transition(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Idle, Writing) | (Idle, Terminated) | (Writing, Idle) | (Writing, Paused) | (Paused, Idle)
        )
    }
}

pub struct Worker<S: RecordSink> {
    id: usize,
    receiver: WorkReceiver,
    sink: Arc<S>,
    reporter: Arc<dyn Reporter>,
    settings: WorkerSettings,
    state: WorkerState,
    completed: u64,
}

impl<S: RecordSink> Worker<S> {
    pub fn new(
        id: usize,
        receiver: WorkReceiver,
        sink: Arc<S>,
        reporter: Arc<dyn Reporter>,
        settings: WorkerSettings,
    ) -> Self {
        debug_assert!(settings.progress_every > 0, "progress cadence of zero");
        Self {
            id,
            receiver,
            sink,
            reporter,
            settings,
            state: WorkerState::Idle,
            completed: 0,
        }
    }

    /// Take records until the channel is exhausted.
    ///
    /// In strict mode the first failed write ends the worker with an error;
    /// in resilient mode failures are reported and the record is dropped.
    pub async fn run(mut self) -> Result<(), LoaderError> {
        log::debug!("worker {} started", self.id);

        loop {
            let record = match self.receiver.recv().await {
                Received::Record(record) => record,
                Received::Exhausted => break,
            };

            self.transition(WorkerState::Writing);
            let item = WorkItem::new(record, self.id);

            if let Err(err) = self.sink.execute(&item).await {
                match self.settings.failure_policy {
                    FailurePolicy::Resilient => {
                        self.reporter.write_failed(self.id, &item.record, &err);
                        self.transition(WorkerState::Idle);
                        continue;
                    }
                    FailurePolicy::Strict => {
                        log::error!("worker {}: fatal write failure on {}", self.id, item.record.id);
                        return Err(LoaderError::Write {
                            worker_id: self.id,
                            record_id: item.record.id,
                            source: err,
                        });
                    }
                }
            }

            self.completed += 1;
            if self.completed % self.settings.progress_every == 0 {
                self.reporter.progress(self.id, self.completed);
            }

            self.transition(WorkerState::Paused);
            if !self.settings.inter_write_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_write_delay).await;
            }
            self.transition(WorkerState::Idle);
        }

        self.transition(WorkerState::Terminated);
        log::debug!("worker {} finished after {} rows", self.id, self.completed);
        Ok(())
    }

    fn transition(&mut self, next: WorkerState) {
        debug_assert!(
            self.state.can_transition(next),
            "worker {}: invalid transition {:?} -> {:?}",
            self.id,
            self.state,
            next
        );
        log::trace!("worker {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }
}
