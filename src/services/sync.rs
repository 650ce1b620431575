//! Keeps the relational event rows and their calendar counterparts in step.
//!
//! Every mutation touches both stores. There is no shared transaction, so the
//! relational transaction is held open across the calendar call and only
//! committed once the calendar side has succeeded; a calendar failure rolls
//! the relational side back. The one gap left is a relational commit failing
//! *after* a successful calendar write, which is handled by compensating
//! calendar actions (best effort, logged when they fail too).

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::calendar::{CalendarEvent, EventCalendar, EventPatch, Rules};
use crate::datetime::ZonedDateTime;
use crate::db::models::{Event, EventType, Show};
use crate::db::repository::event::EventFilter;
use crate::db::repository::{EventRepository, ShowRepository};
use crate::error::{AppError, AppResult};

/// Timing payload of a create request.
#[derive(Debug, Clone)]
pub struct EventParams {
    pub start: ZonedDateTime,
    pub end: ZonedDateTime,
    pub rules: Option<Rules>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    /// Externally assignable; generated when absent.
    pub id: Option<Uuid>,
    pub show_id: String,
    pub event_type: EventType,
    pub params: Option<EventParams>,
}

/// Partial update; `None` fields are left untouched on both stores.
#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub show_id: Option<String>,
    pub event_type: Option<EventType>,
    pub params: Option<EventPatch>,
}

/// A fully joined event: relational row, its show, and its calendar timing.
pub type SyncedEvent = (Event, Show, CalendarEvent);

pub struct EventSyncService;

impl EventSyncService {
    pub async fn create_event(
        pool: &SqlitePool,
        calendar: &dyn EventCalendar,
        new: NewEvent,
    ) -> AppResult<SyncedEvent> {
        let params = new
            .params
            .ok_or_else(|| AppError::Validation("params are required".to_string()))?;
        let show = ShowRepository::find_by_id(pool, &new.show_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!("show {} does not exist", new.show_id))
            })?;

        let uid = new.id.unwrap_or_else(Uuid::new_v4);

        let mut tx = pool.begin().await.map_err(AppError::Database)?;
        let event = EventRepository::insert(&mut *tx, uid, &show.id, new.event_type).await?;

        let stored = match calendar
            .add(CalendarEvent {
                uid,
                start: params.start,
                end: params.end,
                rules: params.rules,
            })
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                tx.rollback().await.ok();
                return Err(AppError::Sync {
                    op: "create",
                    source: e,
                });
            }
        };

        if let Err(e) = tx.commit().await {
            // The calendar write already happened; undo it so the stores agree.
            if let Err(comp) = calendar.delete(uid).await {
                tracing::error!(
                    "Compensation failed, calendar keeps orphan event {}: {:?}",
                    uid,
                    comp
                );
            }
            return Err(AppError::Database(e));
        }

        Ok((event, show, stored))
    }

    pub async fn get_event(
        pool: &SqlitePool,
        calendar: &dyn EventCalendar,
        id: Uuid,
    ) -> AppResult<SyncedEvent> {
        let event = EventRepository::find_by_id(pool, &id.to_string())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
        let show = ShowRepository::find_by_id(pool, &event.show_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("show {}", event.show_id)))?;
        let params = calendar.get(id).await.map_err(|e| AppError::Sync {
            op: "retrieve",
            source: e,
        })?;
        Ok((event, show, params))
    }

    pub async fn list_events(
        pool: &SqlitePool,
        calendar: &dyn EventCalendar,
        filter: &EventFilter,
    ) -> AppResult<Vec<SyncedEvent>> {
        let events = EventRepository::list(pool, filter).await?;

        let mut out = Vec::with_capacity(events.len());
        for event in events {
            let show = ShowRepository::find_by_id(pool, &event.show_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("show {}", event.show_id)))?;
            let uid = parse_uid(&event.id)?;
            let params = calendar.get(uid).await.map_err(|e| AppError::Sync {
                op: "retrieve",
                source: e,
            })?;
            out.push((event, show, params));
        }
        Ok(out)
    }

    pub async fn update_event(
        pool: &SqlitePool,
        calendar: &dyn EventCalendar,
        id: Uuid,
        changes: EventChanges,
    ) -> AppResult<SyncedEvent> {
        let existing = EventRepository::find_by_id(pool, &id.to_string())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event {id}")))?;

        // Snapshot current calendar timing up front; needed both as the
        // unchanged result and as the compensation target below.
        let snapshot = calendar.get(id).await.map_err(|e| AppError::Sync {
            op: "retrieve",
            source: e,
        })?;

        let show_id = changes.show_id.unwrap_or(existing.show_id);
        let show = ShowRepository::find_by_id(pool, &show_id)
            .await?
            .ok_or_else(|| AppError::Validation(format!("show {show_id} does not exist")))?;
        let event_type = changes.event_type.unwrap_or(existing.event_type);

        let mut tx = pool.begin().await.map_err(AppError::Database)?;
        let event =
            EventRepository::update(&mut *tx, &id.to_string(), &show.id, event_type).await?;

        let calendar_written = changes.params.is_some();
        let params = match changes.params {
            Some(patch) => match calendar.update(id, patch).await {
                Ok(params) => params,
                Err(e) => {
                    tx.rollback().await.ok();
                    return Err(AppError::Sync {
                        op: "update",
                        source: e,
                    });
                }
            },
            None => snapshot.clone(),
        };

        if let Err(e) = tx.commit().await {
            if calendar_written {
                let restore = EventPatch {
                    start: Some(snapshot.start),
                    end: Some(snapshot.end),
                    rules: snapshot.rules.clone(),
                };
                if let Err(comp) = calendar.update(id, restore).await {
                    tracing::error!(
                        "Compensation failed, calendar event {} keeps updated params: {:?}",
                        id,
                        comp
                    );
                }
            }
            return Err(AppError::Database(e));
        }

        Ok((event, show, params))
    }

    pub async fn delete_event(
        pool: &SqlitePool,
        calendar: &dyn EventCalendar,
        id: Uuid,
    ) -> AppResult<()> {
        EventRepository::find_by_id(pool, &id.to_string())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event {id}")))?;

        let snapshot = calendar.get(id).await.map_err(|e| AppError::Sync {
            op: "retrieve",
            source: e,
        })?;

        let mut tx = pool.begin().await.map_err(AppError::Database)?;
        EventRepository::delete(&mut *tx, &id.to_string()).await?;

        if let Err(e) = calendar.delete(id).await {
            tx.rollback().await.ok();
            return Err(AppError::Sync {
                op: "delete",
                source: e,
            });
        }

        if let Err(e) = tx.commit().await {
            if let Err(comp) = calendar.add(snapshot).await {
                tracing::error!(
                    "Compensation failed, event {} lost from calendar: {:?}",
                    id,
                    comp
                );
            }
            return Err(AppError::Database(e));
        }

        Ok(())
    }
}

pub(crate) fn parse_uid(id: &str) -> AppResult<Uuid> {
    id.parse::<Uuid>()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("non-uuid event id {id}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::testing::InMemoryCalendar;
    use crate::datetime::ZonedDateTime;
    use serde_json::json;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
    use sqlx::{ConnectOptions, SqliteConnection};
    use std::path::{Path, PathBuf};

    async fn test_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    // Commit-failure setup: a file-backed database in rollback-journal mode
    // with a zero busy timeout. A second connection holding a read lock makes
    // the pool's COMMIT fail with SQLITE_BUSY while earlier statements in the
    // transaction still succeed.

    fn contended_db_path() -> PathBuf {
        std::env::temp_dir().join(format!("radioplan-sync-{}.db", Uuid::new_v4()))
    }

    fn contended_options(path: &Path) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Truncate)
            .busy_timeout(std::time::Duration::ZERO)
    }

    async fn contended_pool(path: &Path) -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(contended_options(path))
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    async fn hold_read_lock(path: &Path) -> SqliteConnection {
        let mut conn = contended_options(path).connect().await.unwrap();
        sqlx::query("BEGIN").execute(&mut conn).await.unwrap();
        sqlx::query("SELECT count(*) FROM shows")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        conn
    }

    async fn seed_show(pool: &SqlitePool) -> Show {
        ShowRepository::create(pool, None, "morning", "Morning Show", Some("early slot"))
            .await
            .unwrap()
    }

    fn params(start: &str, end: &str) -> EventParams {
        EventParams {
            start: start.parse().unwrap(),
            end: end.parse().unwrap(),
            rules: None,
        }
    }

    #[tokio::test]
    async fn create_writes_both_stores() {
        let pool = test_pool().await;
        let show = seed_show(&pool).await;
        let calendar = InMemoryCalendar::new();

        let (event, joined_show, stored) = EventSyncService::create_event(
            &pool,
            &calendar,
            NewEvent {
                id: None,
                show_id: show.id.clone(),
                event_type: EventType::Live,
                params: Some(params("2024-01-01T10:00:00", "2024-01-01T11:00:00")),
            },
        )
        .await
        .unwrap();

        assert_eq!(joined_show.id, show.id);
        assert_eq!(event.event_type, EventType::Live);
        assert!(calendar.contains(stored.uid));
        let row = EventRepository::find_by_id(&pool, &event.id).await.unwrap();
        assert!(row.is_some());
    }

    #[tokio::test]
    async fn create_without_params_is_rejected_before_any_write() {
        let pool = test_pool().await;
        let show = seed_show(&pool).await;
        let calendar = InMemoryCalendar::new();

        let err = EventSyncService::create_event(
            &pool,
            &calendar,
            NewEvent {
                id: None,
                show_id: show.id.clone(),
                event_type: EventType::Live,
                params: None,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        let rows = EventRepository::list(&pool, &EventFilter::default())
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert!(calendar.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_rolls_back_row_when_calendar_add_fails() {
        let pool = test_pool().await;
        let show = seed_show(&pool).await;
        let calendar = InMemoryCalendar::failing_add();

        let err = EventSyncService::create_event(
            &pool,
            &calendar,
            NewEvent {
                id: None,
                show_id: show.id.clone(),
                event_type: EventType::Replay,
                params: Some(params("2024-01-01T10:00:00", "2024-01-01T11:00:00")),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Sync { op: "create", .. }));
        let rows = EventRepository::list(&pool, &EventFilter::default())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn create_with_unknown_show_is_rejected() {
        let pool = test_pool().await;
        let calendar = InMemoryCalendar::new();

        let err = EventSyncService::create_event(
            &pool,
            &calendar,
            NewEvent {
                id: None,
                show_id: Uuid::new_v4().to_string(),
                event_type: EventType::Live,
                params: Some(params("2024-01-01T10:00:00", "2024-01-01T11:00:00")),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn update_patches_calendar_and_row() {
        let pool = test_pool().await;
        let show = seed_show(&pool).await;
        let other = ShowRepository::create(&pool, None, "evening", "Evening Show", None)
            .await
            .unwrap();
        let calendar = InMemoryCalendar::new();

        let (event, _, _) = EventSyncService::create_event(
            &pool,
            &calendar,
            NewEvent {
                id: None,
                show_id: show.id.clone(),
                event_type: EventType::Live,
                params: Some(params("2024-01-01T10:00:00", "2024-01-01T11:00:00")),
            },
        )
        .await
        .unwrap();
        let uid = parse_uid(&event.id).unwrap();

        let new_start: ZonedDateTime = "2024-02-01T20:00:00 Europe/Warsaw".parse().unwrap();
        let (updated, joined_show, stored) = EventSyncService::update_event(
            &pool,
            &calendar,
            uid,
            EventChanges {
                show_id: Some(other.id.clone()),
                event_type: Some(EventType::Replay),
                params: Some(EventPatch {
                    start: Some(new_start),
                    ..Default::default()
                }),
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.show_id, other.id);
        assert_eq!(joined_show.id, other.id);
        assert_eq!(updated.event_type, EventType::Replay);
        assert_eq!(stored.start, new_start);
        assert_eq!(calendar.get(uid).await.unwrap().start, new_start);
    }

    #[tokio::test]
    async fn update_rolls_back_row_when_calendar_update_fails() {
        let pool = test_pool().await;
        let show = seed_show(&pool).await;
        let calendar = InMemoryCalendar::new();

        let (event, _, original) = EventSyncService::create_event(
            &pool,
            &calendar,
            NewEvent {
                id: None,
                show_id: show.id.clone(),
                event_type: EventType::Live,
                params: Some(params("2024-01-01T10:00:00", "2024-01-01T11:00:00")),
            },
        )
        .await
        .unwrap();
        let uid = parse_uid(&event.id).unwrap();

        // New calendar with the same stored event but failing updates.
        let failing = InMemoryCalendar {
            fail_update: true,
            ..InMemoryCalendar::with_events(vec![original])
        };

        let err = EventSyncService::update_event(
            &pool,
            &failing,
            uid,
            EventChanges {
                event_type: Some(EventType::Replay),
                params: Some(EventPatch {
                    start: Some("2024-02-01T20:00:00".parse().unwrap()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Sync { op: "update", .. }));
        let row = EventRepository::find_by_id(&pool, &event.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.event_type, EventType::Live);
    }

    #[tokio::test]
    async fn delete_removes_both_stores() {
        let pool = test_pool().await;
        let show = seed_show(&pool).await;
        let calendar = InMemoryCalendar::new();

        let (event, _, _) = EventSyncService::create_event(
            &pool,
            &calendar,
            NewEvent {
                id: None,
                show_id: show.id.clone(),
                event_type: EventType::Live,
                params: Some(params("2024-01-01T10:00:00", "2024-01-01T11:00:00")),
            },
        )
        .await
        .unwrap();
        let uid = parse_uid(&event.id).unwrap();

        EventSyncService::delete_event(&pool, &calendar, uid)
            .await
            .unwrap();

        assert!(!calendar.contains(uid));
        assert!(EventRepository::find_by_id(&pool, &event.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_rolls_back_row_when_calendar_delete_fails() {
        let pool = test_pool().await;
        let show = seed_show(&pool).await;
        let calendar = InMemoryCalendar::new();

        let (event, _, original) = EventSyncService::create_event(
            &pool,
            &calendar,
            NewEvent {
                id: None,
                show_id: show.id.clone(),
                event_type: EventType::Live,
                params: Some(params("2024-01-01T10:00:00", "2024-01-01T11:00:00")),
            },
        )
        .await
        .unwrap();
        let uid = parse_uid(&event.id).unwrap();

        let failing = InMemoryCalendar {
            fail_delete: true,
            ..InMemoryCalendar::with_events(vec![original])
        };

        let err = EventSyncService::delete_event(&pool, &failing, uid)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Sync { op: "delete", .. }));
        assert!(EventRepository::find_by_id(&pool, &event.id)
            .await
            .unwrap()
            .is_some());
        assert!(failing.contains(uid));
    }

    #[tokio::test]
    async fn list_joins_show_and_calendar_params() {
        let pool = test_pool().await;
        let show = seed_show(&pool).await;
        let calendar = InMemoryCalendar::new();

        for i in 0..3 {
            EventSyncService::create_event(
                &pool,
                &calendar,
                NewEvent {
                    id: None,
                    show_id: show.id.clone(),
                    event_type: if i == 0 {
                        EventType::Replay
                    } else {
                        EventType::Live
                    },
                    params: Some(EventParams {
                        start: format!("2024-01-0{}T10:00:00", i + 1).parse().unwrap(),
                        end: format!("2024-01-0{}T11:00:00", i + 1).parse().unwrap(),
                        rules: Some(
                            json!({"freq": "DAILY", "count": 2})
                                .as_object()
                                .unwrap()
                                .clone(),
                        ),
                    }),
                },
            )
            .await
            .unwrap();
        }

        let all = EventSyncService::list_events(&pool, &calendar, &EventFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let live_only = EventSyncService::list_events(
            &pool,
            &calendar,
            &EventFilter {
                event_type: Some(EventType::Live),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(live_only.len(), 2);
        assert!(live_only
            .iter()
            .all(|(e, s, p)| e.event_type == EventType::Live
                && s.id == show.id
                && p.rules.is_some()));
    }

    #[tokio::test]
    async fn create_compensates_calendar_when_commit_fails() {
        let path = contended_db_path();
        let pool = contended_pool(&path).await;
        let show = seed_show(&pool).await;
        let calendar = InMemoryCalendar::new();

        let reader = hold_read_lock(&path).await;

        let uid = Uuid::new_v4();
        let err = EventSyncService::create_event(
            &pool,
            &calendar,
            NewEvent {
                id: Some(uid),
                show_id: show.id.clone(),
                event_type: EventType::Live,
                params: Some(params("2024-01-01T10:00:00", "2024-01-01T11:00:00")),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Database(_)));
        // The calendar add preceded the failed commit; the orphan is gone.
        assert!(!calendar.contains(uid));

        drop(reader);
        pool.close().await;
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn update_restores_calendar_snapshot_when_commit_fails() {
        let path = contended_db_path();
        let pool = contended_pool(&path).await;
        let show = seed_show(&pool).await;
        let calendar = InMemoryCalendar::new();

        let original_start: ZonedDateTime = "2024-01-01T10:00:00".parse().unwrap();
        let (event, _, _) = EventSyncService::create_event(
            &pool,
            &calendar,
            NewEvent {
                id: None,
                show_id: show.id.clone(),
                event_type: EventType::Live,
                params: Some(params("2024-01-01T10:00:00", "2024-01-01T11:00:00")),
            },
        )
        .await
        .unwrap();
        let uid = parse_uid(&event.id).unwrap();

        let reader = hold_read_lock(&path).await;

        let err = EventSyncService::update_event(
            &pool,
            &calendar,
            uid,
            EventChanges {
                params: Some(EventPatch {
                    start: Some("2024-02-01T20:00:00".parse().unwrap()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Database(_)));
        // The patch went through before the failed commit and was undone.
        assert_eq!(calendar.get(uid).await.unwrap().start, original_start);

        drop(reader);
        pool.close().await;
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn delete_readds_calendar_event_when_commit_fails() {
        let path = contended_db_path();
        let pool = contended_pool(&path).await;
        let show = seed_show(&pool).await;
        let calendar = InMemoryCalendar::new();

        let original_start: ZonedDateTime = "2024-01-01T10:00:00".parse().unwrap();
        let (event, _, _) = EventSyncService::create_event(
            &pool,
            &calendar,
            NewEvent {
                id: None,
                show_id: show.id.clone(),
                event_type: EventType::Live,
                params: Some(params("2024-01-01T10:00:00", "2024-01-01T11:00:00")),
            },
        )
        .await
        .unwrap();
        let uid = parse_uid(&event.id).unwrap();

        let reader = hold_read_lock(&path).await;

        let err = EventSyncService::delete_event(&pool, &calendar, uid)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Database(_)));
        // The calendar delete preceded the failed commit; the snapshot is back.
        assert!(calendar.contains(uid));
        assert_eq!(calendar.get(uid).await.unwrap().start, original_start);

        drop(reader);
        pool.close().await;
        std::fs::remove_file(&path).ok();
    }
}
