//! Reads records out of a comma-delimited file.
//!
//! The first row is always discarded as a header. Its width fixes the width
//! every later row must have, and must be at least [`RECORD_ARITY`]. Rows are
//! read as raw bytes so the header width is known even when the header is not
//! valid UTF-8. A data row of any other width, or one that does not decode, is
//! malformed and is either skipped or ends production, depending on
//! [`ParsePolicy`].

use crate::config::{ParsePolicy, PipelineConfig, SourceMode};
use crate::error::SourceError;
use crate::ingest::channel::WorkSender;
use crate::models::{RECORD_ARITY, Record};
use csv::{ByteRecord, ByteRecordsIntoIter, ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct SourceOptions {
    pub mode: SourceMode,
    pub parse_policy: ParsePolicy,
    pub max_records: Option<usize>,
}

impl From<&PipelineConfig> for SourceOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            mode: config.source_mode,
            parse_policy: config.parse_policy,
            max_records: config.max_records,
        }
    }
}

pub struct RecordSource<R: Read> {
    reader: csv::Reader<R>,
    options: SourceOptions,
}

impl RecordSource<File> {
    /// Open `path` for reading. Fails before anything else starts if the
    /// file is missing or unreadable.
    pub fn open(path: impl AsRef<Path>, options: SourceOptions) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("reading records from {}", path.display());
        Ok(Self::from_reader(file, options))
    }
}

impl<R: Read> RecordSource<R> {
    pub fn from_reader(reader: R, options: SourceOptions) -> Self {
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        Self { reader, options }
    }

    /// Lazy sequence of records, header already dropped and the cap applied.
    pub fn records(self) -> Records<R> {
        Records {
            rows: self.reader.into_byte_records(),
            policy: self.options.parse_policy,
            remaining: self.options.max_records,
            header_width: None,
            row: 0,
            done: false,
        }
    }

    /// Feed every record into the work channel, then close it.
    ///
    /// The sender is consumed, so the channel is closed on every return path,
    /// including a fatal parse error. Returns the number of records handed
    /// to workers.
    pub fn produce(self, sender: WorkSender) -> Result<usize, SourceError> {
        let mode = self.options.mode;
        let result = match mode {
            SourceMode::Stream => send_all(self.records(), &sender),
            SourceMode::Buffer => {
                let buffered = self.records().collect::<Result<Vec<_>, _>>();
                match buffered {
                    Ok(records) => {
                        log::debug!("buffered {} records before distribution", records.len());
                        send_all(records.into_iter().map(Ok), &sender)
                    }
                    Err(err) => Err(err),
                }
            }
        };
        sender.close();

        match &result {
            Ok(sent) => log::info!("source finished: {} records produced ({} mode)", sent, mode),
            Err(err) => log::error!("source stopped: {}", err),
        }
        result
    }
}

fn send_all<I>(records: I, sender: &WorkSender) -> Result<usize, SourceError>
where
    I: IntoIterator<Item = Result<Record, SourceError>>,
{
    let mut sent = 0;
    for record in records {
        if sender.send_blocking(record?).is_err() {
            log::warn!("no workers left to receive; stopping after {} records", sent);
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

pub struct Records<R: Read> {
    rows: ByteRecordsIntoIter<R>,
    policy: ParsePolicy,
    remaining: Option<usize>,
    header_width: Option<usize>,
    row: u64,
    done: bool,
}

fn parse_row(row: ByteRecord, header_width: usize) -> Result<Record, String> {
    if row.len() != header_width {
        return Err(format!(
            "expected {} fields, found {}",
            header_width,
            row.len()
        ));
    }
    let row = StringRecord::from_byte_record(row).map_err(|err| err.to_string())?;
    Record::from_fields(row.iter())
        .ok_or_else(|| format!("expected at least {} fields, found {}", RECORD_ARITY, row.len()))
}

impl<R: Read> Iterator for Records<R> {
    type Item = Result<Record, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }

        for row in self.rows.by_ref() {
            self.row += 1;

            let Some(header_width) = self.header_width else {
                // Header; one the reader cannot split still counts as the discarded row.
                self.header_width = Some(row.map(|header| header.len()).unwrap_or(0));
                continue;
            };

            let parsed = row
                .map_err(|err| err.to_string())
                .and_then(|row| parse_row(row, header_width));

            match parsed {
                Ok(record) => {
                    if let Some(remaining) = self.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    return Some(Ok(record));
                }
                Err(reason) => match self.policy {
                    ParsePolicy::Skip => {
                        log::debug!("skipping malformed row {}: {}", self.row, reason);
                    }
                    ParsePolicy::Fatal => {
                        self.done = true;
                        return Some(Err(SourceError::Parse {
                            row: self.row,
                            reason,
                        }));
                    }
                },
            }
        }

        self.done = true;
        None
    }
}
