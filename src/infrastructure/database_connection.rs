// Database connection and pool management
// This module handles SQLite database connections using sqlx

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    /// Opens the pool and verifies a connection can be made
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let (options, max_connections) = Self::prepare(database_url, max_connections)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to {database_url}"))?;
        Ok(Self { pool })
    }

    /// Builds the pool without connecting; failures surface on first use
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self> {
        let (options, max_connections) = Self::prepare(database_url, max_connections)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy_with(options);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the `products` table and its indexes
    pub async fn migrate(&self) -> Result<()> {
        let create_products_sql = r#"
            CREATE TABLE IF NOT EXISTS products (
                url TEXT PRIMARY KEY NOT NULL,
                title TEXT NOT NULL,
                platform TEXT NOT NULL,
                original_price REAL NOT NULL DEFAULT 0,
                discounted_price REAL NOT NULL DEFAULT 0,
                discount_percentage REAL NOT NULL DEFAULT 0,
                seller TEXT NOT NULL,
                seller_id INTEGER,
                installments INTEGER NOT NULL DEFAULT 0,
                interest_free_months INTEGER NOT NULL DEFAULT 0,
                free_shipping INTEGER,
                condition TEXT NOT NULL,
                available_quantity INTEGER NOT NULL DEFAULT 0,
                thumbnail_url TEXT NOT NULL,
                category_id TEXT NOT NULL,
                item_id TEXT,
                units_sold INTEGER NOT NULL DEFAULT 0,
                units_sold_source TEXT,
                extracted_at DATETIME NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_products_title ON products (title);
            CREATE INDEX IF NOT EXISTS idx_products_updated_at ON products (updated_at);
        "#;

        sqlx::query(create_products_sql)
            .execute(&self.pool)
            .await
            .context("Failed to create products table")?;
        sqlx::raw_sql(create_indexes_sql)
            .execute(&self.pool)
            .await
            .context("Failed to create product indexes")?;

        Ok(())
    }

    fn prepare(database_url: &str, max_connections: u32) -> Result<(SqliteConnectOptions, u32)> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database url: {database_url}"))?;

        // Every in-memory connection is its own database
        if is_memory_url(database_url) {
            return Ok((options, 1));
        }

        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        Ok((options, max_connections.max(1)))
    }
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}
