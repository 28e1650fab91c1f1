use crate::error::LoaderError;
use crate::ingest::channel::WorkReceiver;
use crate::ingest::reporter::Reporter;
use crate::ingest::worker::{Worker, WorkerSettings};
use crate::sink::RecordSink;
use std::sync::Arc;
use tokio::task::JoinSet;

/// A fixed set of workers draining one work channel into one sink.
pub struct WorkerPool<S: RecordSink> {
    worker_count: usize,
    sink: Arc<S>,
    reporter: Arc<dyn Reporter>,
    settings: WorkerSettings,
}

impl<S: RecordSink> WorkerPool<S> {
    pub fn new(
        worker_count: usize,
        sink: Arc<S>,
        reporter: Arc<dyn Reporter>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            worker_count,
            sink,
            reporter,
            settings,
        }
    }

    /// Spawn workers `0..worker_count` and wait until every one has
    /// terminated.
    ///
    /// A worker error (a strict-mode write failure or a panic) aborts all
    /// other workers where they stand and is returned at once.
    pub async fn run(&self, receiver: WorkReceiver) -> Result<(), LoaderError> {
        let mut workers = JoinSet::new();
        for id in 0..self.worker_count {
            let worker = Worker::new(
                id,
                receiver.clone(),
                Arc::clone(&self.sink),
                Arc::clone(&self.reporter),
                self.settings,
            );
            workers.spawn(worker.run());
        }
        // Only the workers hold the channel from here on.
        drop(receiver);

        log::info!(
            "started {} workers ({} mode)",
            self.worker_count,
            self.settings.failure_policy
        );

        while let Some(joined) = workers.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) => Err(LoaderError::Task(err)),
            };
            if let Err(err) = outcome {
                log::error!(
                    "aborting {} remaining workers: {}",
                    workers.len(),
                    err
                );
                workers.abort_all();
                return Err(err);
            }
        }

        log::info!("all {} workers drained", self.worker_count);
        Ok(())
    }
}
