use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::{EventPatch, Rules};
use crate::datetime::ZonedDateTime;
use crate::db::models::{EventType, Show};
use crate::db::repository::event::EventFilter;
use crate::error::AppResult;
use crate::services::sync::{
    EventChanges, EventParams, EventSyncService, NewEvent, SyncedEvent,
};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_events).post(create_event))
        .route(
            "/:id",
            get(get_event)
                .put(update_event)
                .patch(update_event)
                .delete(delete_event),
        )
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EventParamsBody {
    pub start: ZonedDateTime,
    pub end: ZonedDateTime,
    pub rules: Option<Rules>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub id: Option<Uuid>,
    pub show: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub params: Option<EventParamsBody>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEventParamsBody {
    pub start: Option<ZonedDateTime>,
    pub end: Option<ZonedDateTime>,
    pub rules: Option<Rules>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEventRequest {
    pub show: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<EventType>,
    pub params: Option<UpdateEventParamsBody>,
}

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    pub show: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<EventType>,
}

#[derive(Debug, Serialize)]
pub struct EventParamsResponse {
    pub start: ZonedDateTime,
    pub end: ZonedDateTime,
    pub rules: Option<Rules>,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: String,
    pub show: Show,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub params: EventParamsResponse,
}

impl From<SyncedEvent> for EventResponse {
    fn from((event, show, params): SyncedEvent) -> Self {
        EventResponse {
            id: event.id,
            show,
            event_type: event.event_type,
            params: EventParamsResponse {
                start: params.start,
                end: params.end,
                rules: params.rules,
            },
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListEventsQuery>,
) -> AppResult<Json<Vec<EventResponse>>> {
    let filter = EventFilter {
        show_id: query.show,
        event_type: query.event_type,
    };
    let events = EventSyncService::list_events(&state.db, state.calendar()?, &filter).await?;
    Ok(Json(events.into_iter().map(EventResponse::from).collect()))
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<EventResponse>)> {
    let new = NewEvent {
        id: request.id,
        show_id: request.show,
        event_type: request.event_type,
        params: request.params.map(|p| EventParams {
            start: p.start,
            end: p.end,
            rules: p.rules,
        }),
    };
    let created = EventSyncService::create_event(&state.db, state.calendar()?, new).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<EventResponse>> {
    let event = EventSyncService::get_event(&state.db, state.calendar()?, id).await?;
    Ok(Json(event.into()))
}

async fn update_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateEventRequest>,
) -> AppResult<Json<EventResponse>> {
    let changes = EventChanges {
        show_id: request.show,
        event_type: request.event_type,
        params: request.params.map(|p| EventPatch {
            start: p.start,
            end: p.end,
            rules: p.rules,
        }),
    };
    let updated = EventSyncService::update_event(&state.db, state.calendar()?, id, changes).await?;
    Ok(Json(updated.into()))
}

async fn delete_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    EventSyncService::delete_event(&state.db, state.calendar()?, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
