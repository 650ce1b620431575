use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::models::Show;
use crate::db::repository::ShowRepository;
use crate::error::{AppError, AppResult};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_shows).post(create_show))
        .route(
            "/:id",
            get(get_show)
                .put(update_show)
                .patch(update_show)
                .delete(delete_show),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreateShowRequest {
    /// Externally assignable; generated when absent.
    pub id: Option<Uuid>,
    pub label: String,
    pub title: String,
    pub description: Option<String>,
}

/// Absent fields keep their current value, so the same body shape serves
/// both PUT and PATCH.
#[derive(Debug, Deserialize)]
pub struct UpdateShowRequest {
    pub label: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

async fn list_shows(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Show>>> {
    let shows = ShowRepository::list_all(&state.db).await?;
    Ok(Json(shows))
}

async fn create_show(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateShowRequest>,
) -> AppResult<(StatusCode, Json<Show>)> {
    let show = ShowRepository::create(
        &state.db,
        request.id,
        &request.label,
        &request.title,
        request.description.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(show)))
}

async fn get_show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Show>> {
    let show = ShowRepository::find_by_id(&state.db, &id.to_string())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("show {id}")))?;
    Ok(Json(show))
}

async fn update_show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateShowRequest>,
) -> AppResult<Json<Show>> {
    let existing = ShowRepository::find_by_id(&state.db, &id.to_string())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("show {id}")))?;

    let label = request.label.unwrap_or(existing.label);
    let title = request.title.unwrap_or(existing.title);
    let description = request.description.or(existing.description);

    let show = ShowRepository::update(
        &state.db,
        &id.to_string(),
        &label,
        &title,
        description.as_deref(),
    )
    .await?;
    Ok(Json(show))
}

async fn delete_show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    ShowRepository::delete(&state.db, &id.to_string()).await?;
    Ok(StatusCode::NO_CONTENT)
}
