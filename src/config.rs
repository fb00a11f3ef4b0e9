use serde::Deserialize;
use std::time::Duration;

/// Runtime configuration, read from the process environment (and `.env`).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_wait_attempts: u32,
    pub db_wait_interval_secs: u64,
    pub secret_key: String,
    pub jwt_expires_in: String,
    pub media_root: String,
    pub media_url: String,
    pub max_upload_bytes: usize,
    pub cors_allow_origin: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(config::Environment::default().try_parsing(true))
    }

    /// Builds the configuration from defaults overlaid with `source`.
    pub fn from_source<S>(source: S) -> anyhow::Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config: Config = config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8000)?
            .set_default("db_max_connections", 10)?
            .set_default("db_wait_attempts", 30)?
            .set_default("db_wait_interval_secs", 1)?
            .set_default("jwt_expires_in", "7d")?
            .set_default("media_root", "./media")?
            .set_default("media_url", "/media")?
            .set_default("max_upload_bytes", 10 * 1024 * 1024)?
            .set_default("cors_allow_origin", "*")?
            .add_source(source)
            .build()?
            .try_deserialize()?;

        if config.secret_key.trim().is_empty() {
            anyhow::bail!("SECRET_KEY must not be empty");
        }

        Ok(config)
    }

    pub fn db_wait_interval(&self) -> Duration {
        Duration::from_secs(self.db_wait_interval_secs)
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory:")
    }
}
