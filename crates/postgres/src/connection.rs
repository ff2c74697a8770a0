//! Connection settings for the partwise PostgreSQL backend.

use partwise_core::{PartitionError, PartitionResult};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Configuration for the database connection.
///
/// A single connection is used so session state such as `search_path` stays
/// the same for every catalog query and statement of a command.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection acquire timeout in seconds
    pub acquire_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 1,
            acquire_timeout_secs: 30,
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration for `url` with default pool settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Open the connection pool.
    pub async fn connect(&self) -> PartitionResult<PgPool> {
        if self.url.is_empty() {
            return Err(PartitionError::usage(
                "Set PARTWISE_URL or pass --url",
            ));
        }

        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .connect(&self.url)
            .await
            .map_err(|e| PartitionError::catalog(format!("Failed to connect: {}", e)))
    }
}
