use crate::common::error::{PipelineError, Result};
use libsql::{Builder, Connection, Database};
use std::env;
use tracing::info;

pub struct DatabaseManager {
    db: Database,
}

impl DatabaseManager {
    /// Create a new database manager from `LIBSQL_URL`.
    ///
    /// An `http(s)`/`libsql` URL connects to a remote instance and requires
    /// `LIBSQL_AUTH_TOKEN`; anything else is treated as a local file path.
    pub async fn new() -> Result<Self> {
        let url = env::var("LIBSQL_URL").map_err(|_| PipelineError::Database {
            message: "LIBSQL_URL environment variable not set".to_string(),
        })?;

        let db = if url.starts_with("http://")
            || url.starts_with("https://")
            || url.starts_with("libsql://")
        {
            let auth_token =
                env::var("LIBSQL_AUTH_TOKEN").map_err(|_| PipelineError::Database {
                    message: "LIBSQL_AUTH_TOKEN environment variable not set".to_string(),
                })?;

            info!("Connecting to remote database at {}", url);
            Builder::new_remote(url, auth_token)
                .build()
                .await
                .map_err(|e| PipelineError::Database {
                    message: format!("Failed to connect to database: {e}"),
                })?
        } else {
            info!("Opening local database at {}", url);
            Builder::new_local(&url)
                .build()
                .await
                .map_err(|e| PipelineError::Database {
                    message: format!("Failed to open local database: {e}"),
                })?
        };

        Ok(Self { db })
    }

    /// Get a connection to the database
    pub async fn get_connection(&self) -> Result<Connection> {
        self.db.connect().map_err(|e| PipelineError::Database {
            message: format!("Failed to get database connection: {e}"),
        })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");

        let conn = self.get_connection().await?;

        // Apply base schema
        let migration_sql_001 = include_str!("../migrations/001_create_schema.sql");
        conn.execute_batch(migration_sql_001)
            .await
            .map_err(|e| PipelineError::Database {
                message: format!("Failed to run base migration: {e}"),
            })?;

        // Apply indexes and PRAGMAs
        let migration_sql_002 = include_str!("../migrations/002_indexes_and_pragmas.sql");
        conn.execute_batch(migration_sql_002)
            .await
            .map_err(|e| PipelineError::Database {
                message: format!("Failed to run index migration: {e}"),
            })?;

        info!("Database migrations completed successfully");
        Ok(())
    }
}
