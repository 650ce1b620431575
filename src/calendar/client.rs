//! CalDAV client for a single named calendar collection.
//!
//! Calendar objects are addressed as `{base}/{uid}.ics` (resource-per-event),
//! range queries go through a REPORT calendar-query, and the full collection
//! URL doubles as the canonical ICS feed for export.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{Method, StatusCode};
use url::Url;
use uuid::Uuid;

use async_trait::async_trait;

use super::{codec, expand, CalendarError, CalendarEvent, EventCalendar, EventPatch};
use crate::config::CalendarConfig;
use crate::datetime::ZonedDateTime;

#[derive(Debug, Clone)]
pub struct CalendarClient {
    http: reqwest::Client,
    base: Url,
    user: String,
    password: String,
    name: String,
}

impl CalendarClient {
    pub fn new(config: &CalendarConfig) -> Result<Self, CalendarError> {
        let base = Url::parse(&format!(
            "http://{}:{}/{}/{}/",
            config.host, config.port, config.user, config.name
        ))
        .map_err(|e| CalendarError::InvalidData(format!("bad calendar url: {e}")))?;

        Ok(Self {
            http: reqwest::Client::new(),
            base,
            user: config.user.clone(),
            password: config.password.clone(),
            name: config.name.clone(),
        })
    }

    fn object_url(&self, uid: Uuid) -> Result<Url, CalendarError> {
        self.base
            .join(&format!("{uid}.ics"))
            .map_err(|e| CalendarError::InvalidData(format!("bad object url: {e}")))
    }

    async fn fetch_object(&self, uid: Uuid) -> Result<String, CalendarError> {
        let response = self
            .http
            .get(self.object_url(uid)?)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(|e| CalendarError::Retrieve(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CalendarError::Retrieve(format!("no event with uid {uid}")));
        }
        let response = response
            .error_for_status()
            .map_err(|e| CalendarError::Retrieve(e.to_string()))?;
        response
            .text()
            .await
            .map_err(|e| CalendarError::Retrieve(e.to_string()))
    }

    async fn put_object(&self, url: Url, ics: String) -> Result<(), reqwest::Error> {
        self.http
            .put(url)
            .basic_auth(&self.user, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, "text/calendar; charset=utf-8")
            .body(ics)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl EventCalendar for CalendarClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, event: CalendarEvent) -> Result<CalendarEvent, CalendarError> {
        let url = self.object_url(event.uid)?;
        let ics = codec::encode(&event)?;
        self.put_object(url, ics)
            .await
            .map_err(|e| CalendarError::Add(e.to_string()))?;
        Ok(event)
    }

    async fn get(&self, uid: Uuid) -> Result<CalendarEvent, CalendarError> {
        let ics = self.fetch_object(uid).await?;
        codec::decode(&ics)
    }

    async fn update(&self, uid: Uuid, patch: EventPatch) -> Result<CalendarEvent, CalendarError> {
        let mut event = self.get(uid).await?;
        event.apply(patch);
        let url = self.object_url(uid)?;
        let ics = codec::encode(&event)?;
        self.put_object(url, ics)
            .await
            .map_err(|e| CalendarError::Update(e.to_string()))?;
        Ok(event)
    }

    async fn delete(&self, uid: Uuid) -> Result<(), CalendarError> {
        // Fetch first so a missing resource surfaces as a retrieve failure.
        self.fetch_object(uid).await?;
        self.http
            .delete(self.object_url(uid)?)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(|e| CalendarError::Delete(e.to_string()))?
            .error_for_status()
            .map_err(|e| CalendarError::Delete(e.to_string()))?;
        Ok(())
    }

    async fn search(
        &self,
        from: &ZonedDateTime,
        to: &ZonedDateTime,
        expand: bool,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let report = Method::from_bytes(b"REPORT")
            .map_err(|e| CalendarError::Retrieve(e.to_string()))?;
        let body = time_range_query(from, to);

        let content = self
            .http
            .request(report, self.base.clone())
            .basic_auth(&self.user, Some(&self.password))
            .header("Depth", "1")
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| CalendarError::Retrieve(e.to_string()))?
            .error_for_status()
            .map_err(|e| CalendarError::Retrieve(e.to_string()))?
            .text()
            .await
            .map_err(|e| CalendarError::Retrieve(e.to_string()))?;

        let root = xmltree::Element::parse(content.as_bytes())
            .map_err(|e| CalendarError::Retrieve(e.to_string()))?;

        let mut events = Vec::new();
        for response in root.children.iter().filter_map(|c| c.as_element()) {
            if let Some(data) = calendar_data(response) {
                events.push(codec::decode(&data)?);
            }
        }

        if expand {
            expand::expand(events, from, to)
        } else {
            Ok(events)
        }
    }

    async fn ics_stream(
        &self,
    ) -> Result<BoxStream<'static, Result<Bytes, CalendarError>>, CalendarError> {
        let response = self
            .http
            .get(self.base.clone())
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(|e| CalendarError::Retrieve(e.to_string()))?
            .error_for_status()
            .map_err(|e| CalendarError::Retrieve(e.to_string()))?;

        // Chunk boundaries are arbitrary, so bytes are passed through
        // untouched rather than decoded per chunk.
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| CalendarError::Retrieve(e.to_string())));
        Ok(stream.boxed())
    }
}

fn calendar_data(response: &xmltree::Element) -> Option<String> {
    response
        .get_child("propstat")
        .and_then(|e| e.get_child("prop"))
        .and_then(|e| e.get_child("calendar-data"))
        .and_then(xmltree::Element::get_text)
        .map(|text| text.to_string())
}

fn time_range_query(from: &ZonedDateTime, to: &ZonedDateTime) -> String {
    format!(
        r#"<c:calendar-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <d:getetag />
    <c:calendar-data />
  </d:prop>
  <c:filter>
    <c:comp-filter name="VCALENDAR">
      <c:comp-filter name="VEVENT">
        <c:time-range start="{}" end="{}" />
      </c:comp-filter>
    </c:comp-filter>
  </c:filter>
</c:calendar-query>"#,
        format_utc(from),
        format_utc(to)
    )
}

fn format_utc(dt: &ZonedDateTime) -> String {
    dt.0.with_timezone(&chrono::Utc)
        .format("%Y%m%dT%H%M%SZ")
        .to_string()
}
