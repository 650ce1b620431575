use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A scheduled happening of a show. Timing (start, end, recurrence) lives in
/// the calendar under the same UUID; the relational side only keeps the link
/// to the show and the broadcast type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub show_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Live,
    Replay,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Live => "live",
            EventType::Replay => "replay",
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(EventType::Live),
            "replay" => Ok(EventType::Replay),
            other => Err(format!("unknown event type '{other}'")),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
