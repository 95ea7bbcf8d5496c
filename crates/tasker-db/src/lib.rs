//! # tasker-db
//!
//! PostgreSQL persistence layer for the tasker job queue.
//!
//! This crate provides:
//! - Connection pool management
//! - The [`PgJobStore`] implementation of [`tasker_core::JobStore`]
//! - Embedded SQL migrations for the job table
//!
//! ## Example
//!
//! ```rust,ignore
//! use tasker_db::Database;
//! use tasker_core::{JobStore, NewJob};
//! use chrono::Utc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/tasker").await?;
//!     db.migrate().await?;
//!
//!     let id = db
//!         .jobs
//!         .insert(NewJob::new("log", r#"{"name":"x"}"#, Utc::now()))
//!         .await?;
//!     println!("Queued job: {}", id);
//!     Ok(())
//! }
//! ```

pub mod jobs;
pub mod pool;

// Re-export core types
pub use tasker_core::*;

pub use jobs::PgJobStore;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};

/// Database facade holding the connection pool and the job store.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Job store for queue persistence.
    pub jobs: PgJobStore,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            jobs: PgJobStore::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Migration failed: {e}")))?;
        Ok(())
    }
}
