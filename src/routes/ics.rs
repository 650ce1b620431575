use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    response::Response,
    routing::get,
    Router,
};

use crate::error::{AppError, AppResult};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(export_calendar))
}

/// Streams the calendar's canonical ICS representation as an attachment.
async fn export_calendar(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let calendar = state.calendar()?;
    let stream = calendar.ics_stream().await.map_err(|e| AppError::Sync {
        op: "retrieve",
        source: e,
    })?;

    Response::builder()
        .header(http::header::CONTENT_TYPE, "text/calendar; charset=utf-8")
        .header(
            http::header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.ics\"", calendar.name()),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))
}
