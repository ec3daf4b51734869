pub mod fill;
pub mod inspect;

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::PgPool;

use tablefill_core::config::{read_config, TablefillConfig, DEFAULT_SCHEMA};
use tablefill_core::schema::postgres::connect;

/// Load `tablefill.toml` from the working directory, or defaults when absent.
pub fn load_config() -> Result<TablefillConfig> {
    let config = read_config(Path::new("."))?;
    Ok(config.unwrap_or_default())
}

/// Schema flag, then `[database] schema`, then `public`.
pub fn resolve_schema(flag: Option<&str>, config: &TablefillConfig) -> String {
    flag.map(str::to_string)
        .or_else(|| config.database.schema.clone())
        .unwrap_or_else(|| DEFAULT_SCHEMA.to_string())
}

/// Open the connection pool from the `--db` URL or the config file, sized
/// for `max_in_flight` concurrent loads.
pub async fn open_pool(
    db: Option<&str>,
    config: &TablefillConfig,
    max_in_flight: usize,
) -> Result<PgPool> {
    connect(&config.database, db, max_in_flight)
        .await
        .context("Failed to connect to PostgreSQL")
}
