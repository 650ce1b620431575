use std::collections::HashMap;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod calendar;
mod config;
mod datetime;
mod db;
mod error;
mod routes;
mod services;

use calendar::EventCalendar;
use config::Config;
use error::{AppError, AppResult};
use services::init;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    /// Calendar registry keyed by collection name; built once at startup and
    /// read-only afterwards.
    pub calendars: HashMap<String, Arc<dyn EventCalendar>>,
}

impl AppState {
    pub fn calendar(&self) -> AppResult<&dyn EventCalendar> {
        self.calendars
            .get(&self.config.calendar.name)
            .map(|c| c.as_ref())
            .ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "calendar '{}' is not registered",
                    self.config.calendar.name
                ))
            })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "radioplan=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting radio schedule service");

    let pool = init::init_db(&config).await?;
    let calendars = init::build_calendars(&config)?;

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        calendars,
    });

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/shows", routes::shows::router())
        .nest("/events", routes::events::router())
        .nest("/timetable", routes::timetable::router())
        .nest("/ics", routes::ics::router())
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to bind SIGTERM");
        tokio::select! {
            _ = ctrl_c => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("Failed to bind Ctrl+C");
    }

    tracing::info!("Shutdown signal received");
}
