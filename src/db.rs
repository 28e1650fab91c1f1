use crate::error::LoaderError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Upper bound on pooled connections regardless of worker count.
pub const MAX_POOL_CONNECTIONS: u32 = 100;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

pub const CREATE_CHESS_TABLE_SQL: &str = r#"CREATE TABLE IF NOT EXISTS chess (
    id TEXT NOT NULL,
    rated BOOLEAN,
    created_at DOUBLE PRECISION,
    last_move_at DOUBLE PRECISION,
    turns INTEGER,
    worker_num INTEGER NOT NULL
)"#;

/// Pool size used when none is configured: one connection per worker, capped.
pub fn default_max_connections(worker_count: usize) -> u32 {
    u32::try_from(worker_count)
        .unwrap_or(MAX_POOL_CONNECTIONS)
        .clamp(1, MAX_POOL_CONNECTIONS)
}

/// Open the connection pool the sink writes through.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, LoaderError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await
        .map_err(LoaderError::SinkConnect)?;

    log::info!("connected to database ({} max connections)", max_connections);
    Ok(pool)
}

/// Create the target table if it does not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_CHESS_TABLE_SQL).execute(pool).await?;
    log::debug!("chess table ready");
    Ok(())
}
