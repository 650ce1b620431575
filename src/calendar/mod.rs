//! Calendar backend integration: a CalDAV client addressing one named
//! calendar, the ICS/RRULE codecs, and recurrence expansion.
//!
//! Every event's timing lives here as a single VEVENT resource keyed by the
//! relational event's UUID; the relational side never stores start/end/rules.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::datetime::ZonedDateTime;

pub mod client;
pub mod codec;
pub mod expand;
pub mod rules;

#[cfg(test)]
pub mod testing;

pub use client::CalendarClient;
pub use rules::Rules;

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("can't add event: {0}")]
    Add(String),

    #[error("can't retrieve event: {0}")]
    Retrieve(String),

    #[error("can't update event: {0}")]
    Update(String),

    #[error("can't delete event: {0}")]
    Delete(String),

    #[error("invalid event data: {0}")]
    InvalidData(String),

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// One VEVENT resource as seen by the rest of the application. Also the shape
/// of a single expanded occurrence (an occurrence keeps its master's uid and
/// rules but carries concrete instance timing).
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub uid: Uuid,
    pub start: ZonedDateTime,
    pub end: ZonedDateTime,
    pub rules: Option<Rules>,
}

/// Partial update of a VEVENT; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub start: Option<ZonedDateTime>,
    pub end: Option<ZonedDateTime>,
    pub rules: Option<Rules>,
}

/// The seam between the sync/timetable services and the calendar backend.
#[async_trait]
pub trait EventCalendar: Send + Sync {
    /// Name of the calendar collection, used for the ICS export filename.
    fn name(&self) -> &str;

    async fn add(&self, event: CalendarEvent) -> Result<CalendarEvent, CalendarError>;

    async fn get(&self, uid: Uuid) -> Result<CalendarEvent, CalendarError>;

    async fn update(&self, uid: Uuid, patch: EventPatch) -> Result<CalendarEvent, CalendarError>;

    async fn delete(&self, uid: Uuid) -> Result<(), CalendarError>;

    /// Range query. With `expand` the result is one entry per occurrence,
    /// otherwise one entry per raw resource.
    async fn search(
        &self,
        from: &ZonedDateTime,
        to: &ZonedDateTime,
        expand: bool,
    ) -> Result<Vec<CalendarEvent>, CalendarError>;

    /// One pass over the calendar's canonical ICS representation, chunked.
    /// Chunks are raw bytes whose boundaries may fall inside a UTF-8
    /// sequence; decoding is up to whoever consumes the whole stream.
    async fn ics_stream(
        &self,
    ) -> Result<BoxStream<'static, Result<Bytes, CalendarError>>, CalendarError>;
}

impl CalendarEvent {
    pub fn apply(&mut self, patch: EventPatch) {
        if let Some(start) = patch.start {
            self.start = start;
        }
        if let Some(end) = patch.end {
            self.end = end;
        }
        if let Some(rules) = patch.rules {
            self.rules = Some(rules);
        }
    }
}
