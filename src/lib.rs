pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod sink;

pub mod test_support {
    use crate::error::SinkError;
    use crate::models::WorkItem;
    use crate::sink::RecordSink;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub use database::{TestDatabase, TestDatabaseError};

    /// In-memory sink that records every successful write and can be told to
    /// reject specific record ids.
    #[derive(Debug, Default)]
    pub struct MemorySink {
        items: Mutex<Vec<WorkItem>>,
        attempts: AtomicUsize,
        reject: HashSet<String>,
    }

    impl MemorySink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Reject writes for any of the given record ids.
        pub fn failing_on<I, T>(ids: I) -> Self
        where
            I: IntoIterator<Item = T>,
            T: Into<String>,
        {
            Self {
                reject: ids.into_iter().map(Into::into).collect(),
                ..Self::default()
            }
        }

        /// Successful writes, in completion order.
        pub fn items(&self) -> Vec<WorkItem> {
            self.items.lock().clone()
        }

        /// Every call to `execute`, successful or not.
        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl RecordSink for MemorySink {
        async fn execute(&self, item: &WorkItem) -> Result<(), SinkError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.reject.contains(&item.record.id) {
                return Err(SinkError::Rejected(format!(
                    "record {} refused",
                    item.record.id
                )));
            }
            self.items.lock().push(item.clone());
            Ok(())
        }
    }

    pub mod database {
        use crate::db;
        use log::LevelFilter;
        use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use sqlx::{ConnectOptions, Connection, PgPool};
        use std::str::FromStr;
        use testcontainers::{ImageExt, runners::AsyncRunner};
        use testcontainers_modules::postgres::Postgres;
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError,
        };
        use thiserror::Error;
        use uuid::Uuid;

        const POSTGRES_TAG: &str = "16-alpine";

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Throwaway database with the chess table in place.
        pub struct TestDatabase {
            pool: PgPool,
            admin_options: PgConnectOptions,
            database_name: String,
            container: Option<ContainerAsync<Postgres>>,
        }

        impl TestDatabase {
            /// Use the server named by `TEST_DATABASE_URL` when set, otherwise
            /// launch a disposable Postgres container.
            pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
                match std::env::var("TEST_DATABASE_URL") {
                    Ok(url) => Self::on_server(&url).await,
                    Err(_) => Self::new().await,
                }
            }

            /// Provision a fresh database inside a new Postgres container.
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let container = Postgres::default().with_tag(POSTGRES_TAG).start().await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let admin_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                let mut database = Self::on_server(&admin_url).await?;
                database.container = Some(container);
                Ok(database)
            }

            /// Provision a fresh database on an existing server.
            pub async fn on_server(base_url: &str) -> Result<Self, TestDatabaseError> {
                let admin_options =
                    PgConnectOptions::from_str(base_url)?.log_statements(LevelFilter::Off);
                let database_name = format!("loader_test_{}", Uuid::new_v4().simple());

                let mut admin = admin_options.connect().await?;
                sqlx::query(&format!(
                    "CREATE DATABASE \"{}\" TEMPLATE template0",
                    database_name
                ))
                .execute(&mut admin)
                .await?;
                admin.close().await?;

                let pool = PgPoolOptions::new()
                    .max_connections(8)
                    .connect_with(admin_options.clone().database(&database_name))
                    .await?;
                db::ensure_schema(&pool).await?;

                Ok(Self {
                    pool,
                    admin_options,
                    database_name,
                    container: None,
                })
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool.clone()
            }

            /// Close the pool, drop the database and stop the container if
            /// this helper started one.
            pub async fn close(self) -> Result<(), TestDatabaseError> {
                self.pool.close().await;

                let mut admin = self.admin_options.connect().await?;
                sqlx::query(&format!(
                    "DROP DATABASE IF EXISTS \"{}\"",
                    self.database_name
                ))
                .execute(&mut admin)
                .await?;
                admin.close().await?;

                if let Some(container) = self.container {
                    drop(container);
                }
                Ok(())
            }
        }
    }
}
