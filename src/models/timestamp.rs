use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};

/// Render a timestamp in the fixed-width form stored in the database.
///
/// Every value written by this crate has the same width and zone, so text
/// comparison in SQL (`fetched_at > ?`) orders the same way as time does.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse the timestamp shapes found in the store and in state files.
///
/// Values without an offset are taken as UTC. Sub-microsecond precision is
/// dropped.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    // RFC3339 (e.g., "2026-01-11T12:34:56.123456Z")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(truncate_to_micros(dt.with_timezone(&Utc)));
    }
    // ISO without offset (e.g., "2026-01-11T12:34:56.123456")
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(truncate_to_micros(naive.and_utc()));
    }
    // SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(truncate_to_micros(naive.and_utc()));
    }
    None
}

pub fn truncate_to_micros(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_micros(dt.timestamp_micros()).unwrap_or(dt)
}

/// Serde helper for optional timestamps that may lack an offset.
pub fn deserialize_optional<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {s}"))),
    }
}
