use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

pub const HOUR_SECS: i64 = 3600;
pub const DAY_SECS: i64 = 86_400;

pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Floor an epoch-second instant to the start of its UTC hour.
pub fn floor_hour(ts: i64) -> i64 {
    ts - ts.rem_euclid(HOUR_SECS)
}

/// Floor an epoch-second instant to the start of its UTC calendar day.
pub fn floor_day(ts: i64) -> i64 {
    ts - ts.rem_euclid(DAY_SECS)
}

/// Parse an RFC 3339 instant, or a bare `YYYY-MM-DDTHH:MM:SS` treated as
/// UTC, into epoch seconds.
pub fn parse_instant(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive).timestamp());
    }
    None
}

pub fn format_instant(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.to_rfc3339(),
        None => ts.to_string(),
    }
}
