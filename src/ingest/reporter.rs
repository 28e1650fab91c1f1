//! Where workers send their observations.

use crate::error::SinkError;
use crate::models::Record;
use parking_lot::Mutex;
use std::fmt;

/// Injected diagnostic sink shared by all workers.
pub trait Reporter: Send + Sync {
    /// Called every `progress_every` completed writes with the worker's own
    /// running count.
    fn progress(&self, worker_id: usize, completed: u64);

    /// Called once per failed write in resilient mode.
    fn write_failed(&self, worker_id: usize, record: &Record, error: &SinkError);
}

/// Reporter backed by the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn progress(&self, worker_id: usize, completed: u64) {
        log::info!("{}", Event::Progress { worker_id, completed });
    }

    fn write_failed(&self, worker_id: usize, record: &Record, error: &SinkError) {
        log::error!("worker {}: record {}: {}", worker_id, record.id, error);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Progress {
        worker_id: usize,
        completed: u64,
    },
    WriteFailed {
        worker_id: usize,
        record_id: String,
        message: String,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Progress {
                worker_id,
                completed,
            } => write!(f, "worker {worker_id} has inserted {completed} rows"),
            Event::WriteFailed {
                worker_id,
                record_id,
                message,
            } => write!(f, "worker {worker_id}: record {record_id}: {message}"),
        }
    }
}

/// Keeps every observation in memory so callers can assert on them.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<Event>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Progress events rendered the way `LogReporter` prints them.
    pub fn progress_lines(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, Event::Progress { .. }))
            .map(ToString::to_string)
            .collect()
    }

    pub fn failures(&self) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, Event::WriteFailed { .. }))
            .cloned()
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn progress(&self, worker_id: usize, completed: u64) {
        self.events.lock().push(Event::Progress {
            worker_id,
            completed,
        });
    }

    fn write_failed(&self, worker_id: usize, record: &Record, error: &SinkError) {
        self.events.lock().push(Event::WriteFailed {
            worker_id,
            record_id: record.id.clone(),
            message: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_line_format() {
        let reporter = MemoryReporter::new();
        reporter.progress(0, 10);
        reporter.progress(7, 20);
        assert_eq!(
            reporter.progress_lines(),
            vec![
                "worker 0 has inserted 10 rows".to_string(),
                "worker 7 has inserted 20 rows".to_string(),
            ]
        );
        assert!(reporter.failures().is_empty());
    }

    #[test]
    fn test_failures_are_kept_apart_from_progress() {
        let reporter = MemoryReporter::new();
        let record = Record::from_fields(["g1", "TRUE", "1", "2", "3"]).expect("record");
        reporter.write_failed(2, &record, &SinkError::Rejected("bad turns".into()));
        reporter.progress(2, 10);

        assert_eq!(
            reporter.failures(),
            vec![Event::WriteFailed {
                worker_id: 2,
                record_id: "g1".into(),
                message: "write rejected: bad turns".into(),
            }]
        );
        assert_eq!(reporter.events().len(), 2);
    }
}
