//! In-memory calendar backend for tests: stores events in a map and can be
//! told to fail individual operations to exercise rollback paths.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use uuid::Uuid;

use super::{expand, CalendarError, CalendarEvent, EventCalendar, EventPatch};
use crate::datetime::ZonedDateTime;

#[derive(Default)]
pub struct InMemoryCalendar {
    pub events: Mutex<HashMap<Uuid, CalendarEvent>>,
    pub fail_add: bool,
    pub fail_update: bool,
    pub fail_delete: bool,
    /// When set, `ics_stream` replays exactly these chunks instead of
    /// encoding the stored events.
    pub feed_chunks: Mutex<Option<Vec<Bytes>>>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_add() -> Self {
        Self {
            fail_add: true,
            ..Self::default()
        }
    }

    pub fn failing_update() -> Self {
        Self {
            fail_update: true,
            ..Self::default()
        }
    }

    pub fn failing_delete() -> Self {
        Self {
            fail_delete: true,
            ..Self::default()
        }
    }

    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        let calendar = Self::default();
        {
            let mut map = calendar.events.lock().unwrap();
            for event in events {
                map.insert(event.uid, event);
            }
        }
        calendar
    }

    pub fn contains(&self, uid: Uuid) -> bool {
        self.events.lock().unwrap().contains_key(&uid)
    }
}

#[async_trait]
impl EventCalendar for InMemoryCalendar {
    fn name(&self) -> &str {
        "events"
    }

    async fn add(&self, event: CalendarEvent) -> Result<CalendarEvent, CalendarError> {
        if self.fail_add {
            return Err(CalendarError::Add("backend down".to_string()));
        }
        self.events.lock().unwrap().insert(event.uid, event.clone());
        Ok(event)
    }

    async fn get(&self, uid: Uuid) -> Result<CalendarEvent, CalendarError> {
        self.events
            .lock()
            .unwrap()
            .get(&uid)
            .cloned()
            .ok_or_else(|| CalendarError::Retrieve(format!("no event with uid {uid}")))
    }

    async fn update(&self, uid: Uuid, patch: EventPatch) -> Result<CalendarEvent, CalendarError> {
        let mut events = self.events.lock().unwrap();
        let event = events
            .get_mut(&uid)
            .ok_or_else(|| CalendarError::Retrieve(format!("no event with uid {uid}")))?;
        if self.fail_update {
            return Err(CalendarError::Update("backend down".to_string()));
        }
        event.apply(patch);
        Ok(event.clone())
    }

    async fn delete(&self, uid: Uuid) -> Result<(), CalendarError> {
        let mut events = self.events.lock().unwrap();
        if !events.contains_key(&uid) {
            return Err(CalendarError::Retrieve(format!("no event with uid {uid}")));
        }
        if self.fail_delete {
            return Err(CalendarError::Delete("backend down".to_string()));
        }
        events.remove(&uid);
        Ok(())
    }

    async fn search(
        &self,
        from: &ZonedDateTime,
        to: &ZonedDateTime,
        expand: bool,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let mut events: Vec<CalendarEvent> =
            self.events.lock().unwrap().values().cloned().collect();
        events.sort_by_key(|e| e.uid);
        if expand {
            expand::expand(events, from, to)
        } else {
            Ok(events)
        }
    }

    async fn ics_stream(
        &self,
    ) -> Result<BoxStream<'static, Result<Bytes, CalendarError>>, CalendarError> {
        if let Some(canned) = self.feed_chunks.lock().unwrap().clone() {
            return Ok(futures::stream::iter(canned.into_iter().map(Ok)).boxed());
        }

        let mut chunks = vec![Ok(Bytes::from_static(b"BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"))];
        for event in self.events.lock().unwrap().values() {
            chunks.push(super::codec::encode(event).map(Bytes::from));
        }
        chunks.push(Ok(Bytes::from_static(b"END:VCALENDAR\r\n")));
        Ok(futures::stream::iter(chunks).boxed())
    }
}
