use sqlx::Row;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::Show;
use crate::error::{AppError, AppResult};

pub struct ShowRepository;

impl ShowRepository {
    pub async fn create(
        pool: &SqlitePool,
        id: Option<Uuid>,
        label: &str,
        title: &str,
        description: Option<&str>,
    ) -> AppResult<Show> {
        let id = id.unwrap_or_else(Uuid::new_v4).to_string();

        sqlx::query(
            r#"
            INSERT INTO shows (id, label, title, description)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(label)
        .bind(title)
        .bind(description)
        .execute(pool)
        .await
        .map_err(|e| constraint_error(e, label))?;

        Ok(Show {
            id,
            label: label.to_string(),
            title: title.to_string(),
            description: description.map(str::to_string),
        })
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Show>> {
        let row = sqlx::query(
            r#"
            SELECT id, label, title, description
            FROM shows
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.map(|r| Show {
            id: r.get("id"),
            label: r.get("label"),
            title: r.get("title"),
            description: r.get("description"),
        }))
    }

    pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<Show>> {
        let rows = sqlx::query(
            r#"
            SELECT id, label, title, description
            FROM shows
            ORDER BY label
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows
            .into_iter()
            .map(|r| Show {
                id: r.get("id"),
                label: r.get("label"),
                title: r.get("title"),
                description: r.get("description"),
            })
            .collect())
    }

    pub async fn update(
        pool: &SqlitePool,
        id: &str,
        label: &str,
        title: &str,
        description: Option<&str>,
    ) -> AppResult<Show> {
        let result = sqlx::query(
            r#"
            UPDATE shows
            SET label = ?, title = ?, description = ?
            WHERE id = ?
            "#,
        )
        .bind(label)
        .bind(title)
        .bind(description)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| constraint_error(e, label))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("show {id}")));
        }

        Ok(Show {
            id: id.to_string(),
            label: label.to_string(),
            title: title.to_string(),
            description: description.map(str::to_string),
        })
    }

    pub async fn delete(pool: &SqlitePool, id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM shows WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("show {id}")));
        }
        Ok(())
    }
}

fn constraint_error(e: sqlx::Error, label: &str) -> AppError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("a show with label '{label}' already exists"))
        }
        _ => AppError::Database(e),
    }
}
