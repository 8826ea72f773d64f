use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

#[derive(Clone)]
pub struct HarvestDb {
    pool: SqlitePool,
}

impl HarvestDb {
    /// Create a new database connection
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // A :memory: database exists per connection; keep a single
        // connection so every handle sees the same ledger.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> Result<()> {
        let schema = include_str!("../../../schema.sql");

        // Execute schema (split by statement since sqlx doesn't support multiple statements)
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
        }

        Ok(())
    }

    /// Get the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_db_creation() {
        let db = HarvestDb::new("sqlite::memory:").await.unwrap();
        assert!(db.pool().acquire().await.is_ok());
    }
}
