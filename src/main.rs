use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;

use chess_loader::config::{FailurePolicy, ParsePolicy, PipelineConfig, SourceMode};
use chess_loader::db;
use chess_loader::error::LoaderError;
use chess_loader::ingest::{Pipeline, RecordSource};
use chess_loader::sink::PgSink;

#[derive(Parser, Debug)]
#[command(
    name = "chess-loader",
    about = "Bulk-load chess game rows from a CSV file into Postgres"
)]
struct Args {
    /// CSV file to load; the first line is treated as a header.
    #[arg(long, env = "LOADER_INPUT", default_value = "games.csv")]
    input: PathBuf,

    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Number of concurrent writers.
    #[arg(long, env = "LOADER_WORKERS")]
    workers: Option<usize>,

    /// Stop after this many records.
    #[arg(long, env = "LOADER_MAX_RECORDS")]
    max_records: Option<usize>,

    /// Pause after each successful write, in milliseconds.
    #[arg(long, env = "LOADER_DELAY_MS")]
    delay_ms: Option<u64>,

    /// Log progress every N writes per worker.
    #[arg(long, env = "LOADER_PROGRESS_EVERY")]
    progress_every: Option<u64>,

    /// `resilient` logs failed writes and moves on; `strict` aborts the load.
    #[arg(long, env = "LOADER_FAILURE_POLICY")]
    failure_policy: Option<FailurePolicy>,

    /// `skip` drops malformed rows; `fatal` stops reading at the first one.
    #[arg(long, env = "LOADER_PARSE_POLICY")]
    parse_policy: Option<ParsePolicy>,

    /// `stream` sends rows as they are parsed; `buffer` reads the whole file first.
    #[arg(long, env = "LOADER_SOURCE_MODE")]
    source_mode: Option<SourceMode>,

    /// Connection pool size (defaults to the worker count).
    #[arg(long, env = "LOADER_MAX_CONNECTIONS")]
    max_connections: Option<u32>,

    /// Create the chess table before loading if it does not exist.
    #[arg(long)]
    init_schema: bool,
}

impl Args {
    /// Defaults overlaid with whatever was given on the command line or in
    /// the `LOADER_*` variables; clap has already rejected unparseable values.
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        if let Some(workers) = self.workers {
            config.worker_count = workers;
        }
        if self.max_records.is_some() {
            config.max_records = self.max_records;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.inter_write_delay = Duration::from_millis(delay_ms);
        }
        if let Some(progress_every) = self.progress_every {
            config.progress_every = progress_every;
        }
        if let Some(policy) = self.failure_policy {
            config.failure_policy = policy;
        }
        if let Some(policy) = self.parse_policy {
            config.parse_policy = policy;
        }
        if let Some(mode) = self.source_mode {
            config.source_mode = mode;
        }
        config
    }
}

async fn run(args: Args) -> Result<usize, LoaderError> {
    let config = args.pipeline_config();
    config.validate()?;
    log::info!(
        "loading {} with {} workers ({} writes, {} source)",
        args.input.display(),
        config.worker_count,
        config.failure_policy,
        config.source_mode
    );

    let source = RecordSource::open(&args.input, (&config).into())?;

    let max_connections = args
        .max_connections
        .unwrap_or_else(|| db::default_max_connections(config.worker_count));
    let pool = db::connect(&args.database_url, max_connections).await?;

    if args.init_schema {
        db::ensure_schema(&pool)
            .await
            .map_err(LoaderError::SinkConnect)?;
    }

    let pipeline = Pipeline::new(config, Arc::new(PgSink::new(pool.clone())));
    // On failure the process exits without waiting for the pool to wind down.
    let produced = pipeline.run(source).await?;

    pool.close().await;
    Ok(produced)
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info,sqlx=warn")).init();

    let args = Args::parse();

    match run(args).await {
        Ok(produced) => {
            log::info!("load complete: {} records handed to workers", produced);
        }
        Err(err) => {
            log::error!("{}", err);
            process::exit(1);
        }
    }
}
