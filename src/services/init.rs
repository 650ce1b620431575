//! Initialization helpers for the application:
//! - database connection + migrations
//! - calendar client registry

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::calendar::client::CalendarClient;
use crate::calendar::EventCalendar;
use crate::config::Config;

/// Redact potentially sensitive information from a database URL before logging.
pub fn redact_db_url(db_url: &str) -> String {
    if let Ok(url) = url::Url::parse(db_url) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else {
        if let Some(at_pos) = db_url.find('@') {
            let without_creds = &db_url[at_pos + 1..];
            return format!("(redacted){}", without_creds);
        }
        "(redacted)".to_string()
    }
}

/// Initialize SQLite database connection and run migrations.
///
/// Creates the parent directory for the database file (if applicable),
/// opens a connection pool using `create_if_missing(true)` and runs migrations.
/// Foreign keys are enabled so deleting a show cascades to its events.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    let db_file_path = Path::new(db_path);

    if let Some(parent) = db_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
        }
    }

    let connect_options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Build the calendar registry: name -> client, populated once at startup and
/// never mutated afterwards.
pub fn build_calendars(
    config: &Config,
) -> Result<HashMap<String, Arc<dyn EventCalendar>>> {
    let mut calendars: HashMap<String, Arc<dyn EventCalendar>> = HashMap::new();
    let client = CalendarClient::new(&config.calendar)?;
    tracing::info!(
        "Registered calendar '{}' at {}:{}",
        config.calendar.name,
        config.calendar.host,
        config.calendar.port
    );
    calendars.insert(config.calendar.name.clone(), Arc::new(client));
    Ok(calendars)
}
