use sqlx::{QueryBuilder, Row, Sqlite};
use uuid::Uuid;

use crate::db::models::{Event, EventType, Show};
use crate::error::{AppError, AppResult};

pub struct EventRepository;

/// Row filters for [`EventRepository::list`].
#[derive(Debug, Default, Clone)]
pub struct EventFilter {
    pub show_id: Option<String>,
    pub event_type: Option<EventType>,
}

impl EventRepository {
    /// Executor-generic so inserts can run inside a transaction whose commit
    /// is deferred until the calendar write succeeds.
    pub async fn insert<'e, E>(
        executor: E,
        id: Uuid,
        show_id: &str,
        event_type: EventType,
    ) -> AppResult<Event>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        let id = id.to_string();
        sqlx::query(
            r#"
            INSERT INTO events (id, show_id, type)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(show_id)
        .bind(event_type.as_str())
        .execute(executor)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                AppError::Conflict(format!("an event with id {id} already exists"))
            }
            _ => AppError::Database(e),
        })?;

        Ok(Event {
            id,
            show_id: show_id.to_string(),
            event_type,
        })
    }

    pub async fn find_by_id<'e, E>(executor: E, id: &str) -> AppResult<Option<Event>>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        let row = sqlx::query(
            r#"
            SELECT id, show_id, type
            FROM events
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::Database)?;

        row.map(event_from_row).transpose()
    }

    pub async fn update<'e, E>(
        executor: E,
        id: &str,
        show_id: &str,
        event_type: EventType,
    ) -> AppResult<Event>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET show_id = ?, type = ?
            WHERE id = ?
            "#,
        )
        .bind(show_id)
        .bind(event_type.as_str())
        .bind(id)
        .execute(executor)
        .await
        .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("event {id}")));
        }

        Ok(Event {
            id: id.to_string(),
            show_id: show_id.to_string(),
            event_type,
        })
    }

    pub async fn delete<'e, E>(executor: E, id: &str) -> AppResult<()>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(executor)
            .await
            .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("event {id}")));
        }
        Ok(())
    }

    pub async fn list<'e, E>(executor: E, filter: &EventFilter) -> AppResult<Vec<Event>>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT id, show_id, type FROM events WHERE 1 = 1");
        if let Some(show_id) = &filter.show_id {
            query.push(" AND show_id = ").push_bind(show_id);
        }
        if let Some(event_type) = filter.event_type {
            query.push(" AND type = ").push_bind(event_type.as_str());
        }
        query.push(" ORDER BY id");

        let rows = query
            .build()
            .fetch_all(executor)
            .await
            .map_err(AppError::Database)?;

        rows.into_iter().map(event_from_row).collect()
    }

    /// Bulk lookup used by the timetable: events joined with their shows,
    /// keyed by the calendar uids found in a range query.
    pub async fn find_with_shows_by_ids<'e, E>(
        executor: E,
        ids: &[String],
    ) -> AppResult<Vec<(Event, Show)>>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT
                e.id, e.show_id, e.type,
                s.label, s.title, s.description
            FROM events e
            JOIN shows s ON s.id = e.show_id
            WHERE e.id IN (
            "#,
        );
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        query.push(")");

        let rows = query
            .build()
            .fetch_all(executor)
            .await
            .map_err(AppError::Database)?;

        rows.into_iter()
            .map(|r| {
                let show = Show {
                    id: r.get("show_id"),
                    label: r.get("label"),
                    title: r.get("title"),
                    description: r.get("description"),
                };
                let event = event_from_row(r)?;
                Ok((event, show))
            })
            .collect()
    }
}

fn event_from_row(r: sqlx::sqlite::SqliteRow) -> AppResult<Event> {
    let raw_type: String = r.get("type");
    let event_type = raw_type
        .parse::<EventType>()
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    Ok(Event {
        id: r.get("id"),
        show_id: r.get("show_id"),
        event_type,
    })
}
