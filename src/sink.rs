//! Write targets for the worker pool.

use crate::error::SinkError;
use crate::models::WorkItem;
use sqlx::PgPool;
use std::future::Future;

/// The one capability workers need from the store.
///
/// Implementations must be callable from many workers at once; any pooling or
/// locking is the sink's own business.
pub trait RecordSink: Send + Sync + 'static {
    fn execute(&self, item: &WorkItem) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Inserts one row per record into the `chess` table.
///
/// Fields arrive as text and are cast to their column types by Postgres.
pub const INSERT_GAME_SQL: &str = r#"INSERT INTO chess (id, rated, created_at, last_move_at, turns, worker_num)
VALUES ($1, $2::text::boolean, $3::text::double precision, $4::text::double precision, $5::text::integer, $6)"#;

#[derive(Clone)]
pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl RecordSink for PgSink {
    async fn execute(&self, item: &WorkItem) -> Result<(), SinkError> {
        let record = &item.record;
        let worker_num = i32::try_from(item.worker_id)
            .map_err(|_| SinkError::Rejected(format!("worker id {} out of range", item.worker_id)))?;

        sqlx::query(INSERT_GAME_SQL)
            .bind(&record.id)
            .bind(&record.rated)
            .bind(&record.created_at)
            .bind(&record.last_move_at)
            .bind(&record.turns)
            .bind(worker_num)
            .execute(&self.pool)
            .await?;

        log::trace!("worker {} inserted game {}", item.worker_id, record.id);
        Ok(())
    }
}
