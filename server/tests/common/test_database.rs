use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions, Executor};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::info;

use server::config::DbSettings;
use server::db;

/// Manages test database creation and cleanup
pub struct TestDatabase {
    /// Name of the test database
    pub name: String,
    /// Settings pointing at the test database
    pub settings: DbSettings,
    /// Pool connected to the test database
    pub pool: PgPool,
    /// Connection to the maintenance database for cleanup
    admin_pool: PgPool,
}

// Global counter for unique database names
static DB_COUNTER: AtomicU32 = AtomicU32::new(0);

impl TestDatabase {
    /// Create a new, migrated test database with a unique name.
    ///
    /// `DATABASE_URL` must point at a database the test user may create
    /// other databases from, usually `postgres`.
    pub async fn new(test_name: &str) -> Result<Self> {
        let counter = DB_COUNTER.fetch_add(1, Ordering::SeqCst);
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_millis() as u64;
        let name = format!("demonlist_test_{}_{}", timestamp, counter);

        info!("Creating test database: {} for test: {}", name, test_name);

        let admin_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let admin_pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&admin_url)
            .await
            .context("Failed to connect to postgres database")?;

        let create_query = format!("CREATE DATABASE \"{}\"", name);
        admin_pool
            .execute(create_query.as_str())
            .await
            .context("Failed to create test database")?;

        let settings = DbSettings {
            name: name.clone(),
            ..DbSettings::from_url(&admin_url)?
        };

        db::run_migrations(&settings).await?;
        let pool = db::connect(&settings, 10).await?;

        Ok(Self {
            name,
            settings,
            pool,
            admin_pool,
        })
    }

    /// Drop the test database
    pub async fn cleanup(self) -> Result<()> {
        info!("Cleaning up test database: {}", self.name);

        self.pool.close().await;

        let drop_query = format!("DROP DATABASE \"{}\" WITH (FORCE)", self.name);
        self.admin_pool
            .execute(drop_query.as_str())
            .await
            .context("Failed to drop test database")?;

        self.admin_pool.close().await;

        Ok(())
    }
}
