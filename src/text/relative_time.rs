// src/text/relative_time.rs
//! "7 hours ago" / "4d" -> absolute timestamps.

use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;

static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:reposted\s+)?(\d+)\s*(minutes?|mins?|m|hours?|hrs?|h|days?|d|weeks?|wks?|w)\b(?:\s+ago)?",
    )
    .expect("valid relative time pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Minute,
    Hour,
    Day,
    Week,
}

impl Unit {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "m" | "min" | "mins" | "minute" | "minutes" => Some(Unit::Minute),
            "h" | "hr" | "hrs" | "hour" | "hours" => Some(Unit::Hour),
            "d" | "day" | "days" => Some(Unit::Day),
            "w" | "wk" | "wks" | "week" | "weeks" => Some(Unit::Week),
            _ => None,
        }
    }

    fn delta(self, amount: i64) -> Option<TimeDelta> {
        match self {
            Unit::Minute => TimeDelta::try_minutes(amount),
            Unit::Hour => TimeDelta::try_hours(amount),
            Unit::Day => TimeDelta::try_days(amount),
            Unit::Week => TimeDelta::try_weeks(amount),
        }
    }
}

/// Age encoded in a relative time string, or `None` when it is not one.
pub fn parse_age(text: &str) -> Option<TimeDelta> {
    let caps = RELATIVE_RE.captures(text)?;
    let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = Unit::parse(caps.get(2)?.as_str())?;
    unit.delta(amount)
}

/// `now` minus the age encoded in `text`. Returns `None` on anything that is
/// not `<int><unit>[ ago]`.
pub fn relative_to_absolute(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(parse_age(text)?)
}

/// Whether a listing's "posted" text falls inside `window`. Unparseable text
/// is treated as not recent.
pub fn posted_within(text: &str, window: TimeDelta, now: DateTime<Utc>) -> bool {
    parse_age(text).is_some_and(|age| age <= window)
}
