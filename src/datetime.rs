//! Timezone-qualified datetime text convention used across the REST surface:
//! `"2000-01-01T20:00:00 Europe/Warsaw"` — a naive ISO-8601 local datetime
//! followed by an optional IANA zone name (defaults to `Etc/UTC`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone as _, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("datetime must be naive, pass the timezone name after a space")]
    OffsetNotAllowed,

    #[error("invalid datetime: {0}")]
    InvalidDateTime(String),

    #[error("unknown timezone: {0}")]
    UnknownZone(String),
}

/// A datetime carrying a named IANA zone. The wrapper exists so request and
/// response bodies serialize with the textual convention instead of RFC 3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZonedDateTime(pub DateTime<Tz>);

impl ZonedDateTime {
    pub fn zone(&self) -> Tz {
        self.0.timezone()
    }
}

pub fn utcnow() -> ZonedDateTime {
    ZonedDateTime(Utc::now().with_timezone(&chrono_tz::Etc::UTC))
}

pub fn parse(text: &str) -> Result<ZonedDateTime, FormatError> {
    let mut parts = text.splitn(2, ' ');
    let iso = parts.next().unwrap_or_default();
    let zone = parts.next();

    // An offset-bearing ISO portion parses as RFC 3339; reject it before
    // attempting the naive parse.
    if DateTime::parse_from_rfc3339(iso).is_ok() {
        return Err(FormatError::OffsetNotAllowed);
    }

    let naive = NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|_| FormatError::InvalidDateTime(iso.to_string()))?;

    let tz: Tz = match zone {
        Some(name) => name
            .parse()
            .map_err(|_| FormatError::UnknownZone(name.to_string()))?,
        None => chrono_tz::Etc::UTC,
    };

    tz.from_local_datetime(&naive)
        .earliest()
        .map(ZonedDateTime)
        .ok_or_else(|| FormatError::InvalidDateTime(iso.to_string()))
}

pub fn format(dt: &ZonedDateTime) -> String {
    format!(
        "{} {}",
        dt.0.format("%Y-%m-%dT%H:%M:%S"),
        dt.0.timezone().name()
    )
}

impl FromStr for ZonedDateTime {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl fmt::Display for ZonedDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format(self))
    }
}

impl Serialize for ZonedDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ZonedDateTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
