use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

const MIGRATIONS: &[&str] = &[include_str!("../migrations/postgres/001_initial.sql")];

#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    /// Connects, retrying until the database accepts connections or the
    /// configured attempts run out.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let connect_options = PgConnectOptions::from_str(&config.database_url)?;
        let attempts = config.db_wait_attempts.max(1);

        tracing::info!("Waiting for database...");
        let mut attempt = 1;
        loop {
            let result = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .min_connections(1)
                .acquire_timeout(Duration::from_secs(30))
                .idle_timeout(Duration::from_secs(600))
                .max_lifetime(Duration::from_secs(3600))
                .connect_with(connect_options.clone())
                .await;

            match result {
                Ok(pool) => {
                    tracing::info!("Database available!");
                    return Ok(Database { pool });
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        "Database unavailable, waiting {}s: {}",
                        config.db_wait_interval_secs,
                        e
                    );
                    tokio::time::sleep(config.db_wait_interval()).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(anyhow::anyhow!(
                        "database unavailable after {} attempts: {}",
                        attempts,
                        e
                    ));
                }
            }
        }
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        for (idx, migration_sql) in MIGRATIONS.iter().enumerate() {
            tracing::info!("Running migration {}", idx + 1);

            // Split SQL by semicolons and execute each statement separately
            for statement in migration_sql.split(';') {
                let trimmed = statement.trim();
                if trimmed.is_empty() || trimmed.lines().all(|l| l.trim().starts_with("--")) {
                    continue;
                }
                if let Err(e) = sqlx::query(trimmed).execute(&self.pool).await {
                    if e.to_string().contains("already exists") {
                        tracing::debug!("Skipping existing object in migration {}: {}", idx + 1, e);
                    } else {
                        return Err(anyhow::anyhow!(
                            "migration {} failed on `{}`: {}",
                            idx + 1,
                            trimmed,
                            e
                        ));
                    }
                }
            }
        }

        tracing::info!("All migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
