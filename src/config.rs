use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub calendar: CalendarConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Connection settings for the CalDAV server that stores event timing.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Name of the calendar collection holding the events.
    pub name: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/radioplan.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            calendar: CalendarConfig {
                host: env::var("CALENDAR_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: env::var("CALENDAR_PORT")
                    .unwrap_or_else(|_| "5232".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("CALENDAR_PORT".to_string()))?,
                user: env::var("CALENDAR_USER").unwrap_or_else(|_| "user".to_string()),
                password: env::var("CALENDAR_PASSWORD").unwrap_or_else(|_| "password".to_string()),
                name: env::var("CALENDAR_NAME").unwrap_or_else(|_| "events".to_string()),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            database: DatabaseConfig {
                url: "sqlite://data/radioplan.db".to_string(),
                max_connections: 5,
            },
            calendar: CalendarConfig {
                host: "localhost".to_string(),
                port: 5232,
                user: "user".to_string(),
                password: "password".to_string(),
                name: "events".to_string(),
            },
        }
    }
}
