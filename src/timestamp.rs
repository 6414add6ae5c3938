use chrono::{DateTime, FixedOffset, Local, Offset, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Zone used to render `@timestamp` when the event does not carry its own offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeZonePolicy {
    #[default]
    Utc,
    Local,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown timezone policy `{0}` (expected `utc` or `local`)")]
pub struct ParseTimeZoneError(pub String);

impl FromStr for TimeZonePolicy {
    type Err = ParseTimeZoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utc" | "z" => Ok(TimeZonePolicy::Utc),
            "local" => Ok(TimeZonePolicy::Local),
            _ => Err(ParseTimeZoneError(s.to_string())),
        }
    }
}

/// Render an instant as ISO-8601 with millisecond precision.
///
/// Finer precision is truncated. A zero offset is written as `Z`, any
/// other offset as `+hh:mm` / `-hh:mm`.
pub fn format_timestamp(
    timestamp: &DateTime<Utc>,
    event_offset: Option<FixedOffset>,
    policy: TimeZonePolicy,
) -> String {
    let offset = match (event_offset, policy) {
        (Some(offset), _) => offset,
        (None, TimeZonePolicy::Utc) => return timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        (None, TimeZonePolicy::Local) => Local.offset_from_utc_datetime(&timestamp.naive_utc()).fix(),
    };
    timestamp
        .with_timezone(&offset)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Instant from milliseconds since the Unix epoch. Out-of-range input clamps to the epoch.
pub fn from_epoch_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

/// Instant from nanoseconds since the Unix epoch.
pub fn from_epoch_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}
