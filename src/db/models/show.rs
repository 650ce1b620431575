use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A radio show. Events reference a show; the show itself carries no timing.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Show {
    pub id: String,
    /// Unique, human-readable identifier used by editors.
    pub label: String,
    pub title: String,
    pub description: Option<String>,
}
