//! Bulk loading pipeline.
//!
//! A single [`RecordSource`] parses the input on a blocking thread and hands
//! records one at a time through a rendezvous [`work_channel`] to a
//! [`WorkerPool`] of concurrent writers:
//!
//! ```text
//! RecordSource --send--> work channel --recv--> Worker 0..N --execute--> RecordSink
//! ```
//!
//! The source closes the channel when it runs out of rows (or stops on a
//! fatal parse error); each worker exits when it sees the channel exhausted,
//! and the pool returns once every worker has exited.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use chess_loader::config::PipelineConfig;
//! use chess_loader::ingest::{Pipeline, RecordSource};
//! use chess_loader::sink::PgSink;
//!
//! let config = PipelineConfig::default();
//! let source = RecordSource::open("games.csv", (&config).into())?;
//! let pipeline = Pipeline::new(config, Arc::new(PgSink::new(pool)));
//! let produced = pipeline.run(source).await?;
//! ```

pub mod channel;
pub mod pool;
pub mod reporter;
pub mod source;
pub mod worker;

pub use channel::{Received, WorkReceiver, WorkSender, work_channel};
pub use pool::WorkerPool;
pub use reporter::{LogReporter, MemoryReporter, Reporter};
pub use source::{RecordSource, SourceOptions};
pub use worker::{Worker, WorkerSettings, WorkerState};

use crate::config::PipelineConfig;
use crate::error::LoaderError;
use crate::sink::RecordSink;
use std::io::Read;
use std::sync::Arc;

/// Wires a source, the work channel and a worker pool together.
pub struct Pipeline<S: RecordSink> {
    config: PipelineConfig,
    sink: Arc<S>,
    reporter: Arc<dyn Reporter>,
}

impl<S: RecordSink> Pipeline<S> {
    pub fn new(config: PipelineConfig, sink: Arc<S>) -> Self {
        Self {
            config,
            sink,
            reporter: Arc::new(LogReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the load to completion and return how many records the source
    /// handed out.
    ///
    /// A strict-mode write failure is returned as soon as it happens, with the
    /// remaining workers aborted. A fatal parse error is returned after the
    /// workers have finished the records sent before it.
    pub async fn run<R>(&self, source: RecordSource<R>) -> Result<usize, LoaderError>
    where
        R: Read + Send + 'static,
    {
        self.config.validate()?;

        let (sender, receiver) = work_channel();
        let producer = tokio::task::spawn_blocking(move || source.produce(sender));

        let pool = WorkerPool::new(
            self.config.worker_count,
            Arc::clone(&self.sink),
            Arc::clone(&self.reporter),
            WorkerSettings::from(&self.config),
        );
        pool.run(receiver).await?;

        let produced = producer.await??;
        Ok(produced)
    }
}
