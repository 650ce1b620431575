//! Materializes recurring calendar events into concrete occurrences.

use rrule::RRuleSet;

use super::{codec, rules, CalendarError, CalendarEvent};
use crate::datetime::ZonedDateTime;

/// Hard cap on instances generated per resource, guarding unbounded rules.
const EXPANSION_LIMIT: u16 = 1000;

const RRULE_DATETIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Expand every event into the occurrences whose `[start, end]` intersects
/// `[from, to]`. Non-recurring events yield at most one instance. Occurrences
/// belonging to one resource stay contiguous, in rule order.
pub fn expand(
    events: Vec<CalendarEvent>,
    from: &ZonedDateTime,
    to: &ZonedDateTime,
) -> Result<Vec<CalendarEvent>, CalendarError> {
    let mut out = Vec::new();
    for event in events {
        match &event.rules {
            None => {
                if event.start.0 <= to.0 && event.end.0 >= from.0 {
                    out.push(event);
                }
            }
            Some(event_rules) => {
                let duration = event.end.0 - event.start.0;
                let tz = event.start.zone();
                let set_text = format!(
                    "DTSTART;TZID={}:{}\nRRULE:{}",
                    codec::encodable_zone(&tz),
                    event.start.0.naive_local().format(RRULE_DATETIME_FORMAT),
                    rules::to_rrule(event_rules)?
                );
                let set = set_text
                    .parse::<RRuleSet>()
                    .map_err(|e| CalendarError::InvalidData(e.to_string()))?;

                // Widen the window backwards by the event duration so
                // instances straddling `from` are generated, then filter on
                // actual overlap below. The extra second compensates for
                // `after`/`before` being exclusive bounds.
                let one_second = chrono::Duration::seconds(1);
                let window_start =
                    (from.0 - duration - one_second).with_timezone(&rrule::Tz::Tz(tz));
                let window_end = (to.0 + one_second).with_timezone(&rrule::Tz::Tz(tz));
                let result = set.after(window_start).before(window_end).all(EXPANSION_LIMIT);

                for instance in result.dates {
                    let start = instance.with_timezone(&tz);
                    let end = start + duration;
                    if end < from.0 || start > to.0 {
                        continue;
                    }
                    out.push(CalendarEvent {
                        uid: event.uid,
                        start: ZonedDateTime(start),
                        end: ZonedDateTime(end),
                        rules: Some(event_rules.clone()),
                    });
                }
            }
        }
    }
    Ok(out)
}
