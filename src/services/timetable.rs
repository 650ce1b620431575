//! Projects expanded calendar occurrences onto relational show/event metadata.

use std::collections::HashMap;

use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::calendar::{EventCalendar, Rules};
use crate::datetime::{self, ZonedDateTime};
use crate::db::models::{EventType, Show};
use crate::db::repository::EventRepository;
use crate::error::{AppError, AppResult};

/// One occurrence joined with its relational metadata, ordered as the
/// calendar returned it.
#[derive(Debug, Clone, Serialize)]
pub struct TimetableEntry {
    pub id: Uuid,
    pub show: Show,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub start: ZonedDateTime,
    pub end: ZonedDateTime,
    pub rules: Option<Rules>,
}

pub struct TimetableProjector;

impl TimetableProjector {
    /// Both bounds default to the current instant when omitted.
    pub async fn list(
        pool: &SqlitePool,
        calendar: &dyn EventCalendar,
        from: Option<ZonedDateTime>,
        to: Option<ZonedDateTime>,
    ) -> AppResult<Vec<TimetableEntry>> {
        let from = from.unwrap_or_else(datetime::utcnow);
        let to = to.unwrap_or_else(datetime::utcnow);

        let occurrences = calendar
            .search(&from, &to, true)
            .await
            .map_err(|e| AppError::Sync {
                op: "retrieve",
                source: e,
            })?;

        // One relational round-trip for all uids present in the window.
        let mut ids: Vec<String> = occurrences
            .iter()
            .map(|o| o.uid.to_string())
            .collect();
        ids.sort();
        ids.dedup();
        let rows = EventRepository::find_with_shows_by_ids(pool, &ids).await?;
        let by_id: HashMap<String, _> = rows
            .into_iter()
            .map(|(event, show)| (event.id.clone(), (event, show)))
            .collect();

        let mut entries = Vec::with_capacity(occurrences.len());
        for occurrence in occurrences {
            let Some((event, show)) = by_id.get(&occurrence.uid.to_string()) else {
                // Calendar resource without a relational row; known data
                // inconsistency, not worth failing the whole listing.
                tracing::debug!(
                    "Dropping occurrence {} with no matching event row",
                    occurrence.uid
                );
                continue;
            };
            entries.push(TimetableEntry {
                id: occurrence.uid,
                show: show.clone(),
                event_type: event.event_type,
                start: occurrence.start,
                end: occurrence.end,
                rules: occurrence.rules,
            });
        }
        Ok(entries)
    }
}
