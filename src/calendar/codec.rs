//! ICS encoding and decoding of single-VEVENT calendar objects.
//!
//! DTSTART/DTEND are written as local datetimes with a TZID parameter whose
//! value is the chrono-tz zone name, and read back by resolving TZID against
//! the IANA database (absent TZID means UTC).

use chrono::TimeZone as _;
use chrono_tz::Tz;
use icalendar::parser;
use icalendar::{Calendar, CalendarDateTime, Component as _, DatePerhapsTime, EventLike as _, Property};
use uuid::Uuid;

use super::{rules, CalendarError, CalendarEvent};
use crate::datetime::ZonedDateTime;

const ICAL_DATETIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Zone identifier to put on the wire for a chrono-tz zone. Kept as a named
/// adapter because this string doubles as the VTIMEZONE key on the server.
pub fn encodable_zone(tz: &Tz) -> &'static str {
    tz.name()
}

/// Build the ICS text for a calendar object holding exactly one VEVENT.
pub fn encode(event: &CalendarEvent) -> Result<String, CalendarError> {
    let mut vevent = icalendar::Event::new();
    vevent.uid(&event.uid.to_string());
    append_datetime(&mut vevent, "DTSTART", &event.start);
    append_datetime(&mut vevent, "DTEND", &event.end);
    if let Some(rules) = &event.rules {
        vevent.add_property("RRULE", rules::to_rrule(rules)?);
    }

    let mut calendar = Calendar::new();
    calendar.push(vevent.done());
    Ok(calendar.done().to_string())
}

fn append_datetime(vevent: &mut icalendar::Event, name: &str, dt: &ZonedDateTime) {
    let mut prop = Property::new(name, dt.0.naive_local().format(ICAL_DATETIME_FORMAT).to_string());
    prop.add_parameter("TZID", encodable_zone(&dt.zone()));
    vevent.append_property(prop);
}

/// Decode ICS text into the first VEVENT it contains.
pub fn decode(ics: &str) -> Result<CalendarEvent, CalendarError> {
    let unfolded = parser::unfold(ics);
    let calendar = parser::read_calendar(&unfolded)
        .map_err(|e| CalendarError::InvalidData(e.to_string()))?;
    let vevent = calendar
        .components
        .iter()
        .find(|c| c.name == "VEVENT")
        .ok_or_else(|| CalendarError::InvalidData("no VEVENT component".to_string()))?;

    let uid = vevent
        .find_prop("UID")
        .ok_or_else(|| CalendarError::InvalidData("missing UID".to_string()))?
        .val
        .as_ref()
        .parse::<Uuid>()
        .map_err(|e| CalendarError::InvalidData(format!("bad UID: {e}")))?;

    let start = decode_datetime(vevent, "DTSTART")?;
    let end = decode_datetime(vevent, "DTEND")?;
    let rules = vevent
        .find_prop("RRULE")
        .map(|p| rules::from_rrule(p.val.as_ref()));

    Ok(CalendarEvent {
        uid,
        start,
        end,
        rules,
    })
}

fn decode_datetime(
    vevent: &parser::Component<'_>,
    name: &str,
) -> Result<ZonedDateTime, CalendarError> {
    let prop = vevent
        .find_prop(name)
        .ok_or_else(|| CalendarError::InvalidData(format!("missing {name}")))?;
    let parsed = DatePerhapsTime::try_from(prop)
        .map_err(|_| CalendarError::InvalidData(format!("unparsable {name}")))?;

    match parsed {
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => {
            Ok(ZonedDateTime(dt.with_timezone(&chrono_tz::Etc::UTC)))
        }
        // No TZID parameter means UTC.
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => chrono_tz::Etc::UTC
            .from_local_datetime(&naive)
            .earliest()
            .map(ZonedDateTime)
            .ok_or_else(|| CalendarError::InvalidData(format!("invalid {name}"))),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            let tz: Tz = tzid
                .parse()
                .map_err(|_| CalendarError::InvalidTimezone(tzid.clone()))?;
            tz.from_local_datetime(&date_time)
                .earliest()
                .map(ZonedDateTime)
                .ok_or_else(|| CalendarError::InvalidData(format!("invalid {name}")))
        }
        DatePerhapsTime::Date(_) => Err(CalendarError::InvalidData(format!(
            "{name} is an all-day date, expected a datetime"
        ))),
    }
}
