use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::datetime::ZonedDateTime;
use crate::error::{AppError, AppResult};
use crate::services::timetable::{TimetableEntry, TimetableProjector};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_timetable))
}

#[derive(Debug, Deserialize)]
pub struct TimetableQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

async fn list_timetable(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimetableQuery>,
) -> AppResult<Json<Vec<TimetableEntry>>> {
    let from = parse_bound(query.from.as_deref(), "from")?;
    let to = parse_bound(query.to.as_deref(), "to")?;
    let entries = TimetableProjector::list(&state.db, state.calendar()?, from, to).await?;
    Ok(Json(entries))
}

fn parse_bound(text: Option<&str>, name: &str) -> AppResult<Option<ZonedDateTime>> {
    text.map(|t| {
        t.parse::<ZonedDateTime>()
            .map_err(|e| AppError::Validation(format!("invalid '{name}': {e}")))
    })
    .transpose()
}
