//! Reset-time grammar
//!
//! Rate-limit messages report when quota comes back as a time of day, e.g.
//! `"7pm (America/Los_Angeles)"`. Accepted forms:
//!
//! - `"7pm"`, `"11AM"` → hour and meridiem
//! - `"3:30pm"` → with minutes
//! - `"12am (America/Los_Angeles)"` → resolved in the named IANA zone
//!
//! Without a zone, or with one that is not recognized, the reference
//! instant's own zone is used. The result is always on the reference date
//! in the resolution zone; a time already behind the reference is not
//! rolled forward to tomorrow.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};

static RESET_TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").expect("reset-time pattern is valid")
});

/// Parse a reset time string into an absolute instant on the reference date.
pub fn parse_reset_time<R: TimeZone>(
    resets_at: &str,
    reference: &DateTime<R>,
) -> Result<DateTime<FixedOffset>> {
    let (time_part, zone) = split_zone(resets_at.trim());
    let time = parse_time_of_day(time_part)?;

    match zone {
        Some(tz) => {
            let local = reference.with_timezone(&tz);
            resolve(&tz, local.date_naive(), time, resets_at)
        }
        None => resolve(&reference.timezone(), reference.date_naive(), time, resets_at),
    }
}

/// Split off a parenthesized zone suffix. Unknown zone names are dropped.
fn split_zone(input: &str) -> (&str, Option<Tz>) {
    let Some(open) = input.find('(') else {
        return (input, None);
    };
    let Some(close) = input.find(')').filter(|close| *close > open) else {
        return (input, None);
    };

    let name = input[open + 1..close].trim();
    let zone = match name.parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(_) => {
            debug!(zone = name, "unrecognized reset-time zone, using reference zone");
            None
        }
    };
    (input[..open].trim(), zone)
}

fn parse_time_of_day(input: &str) -> Result<NaiveTime> {
    let caps = RESET_TIME_PATTERN
        .captures(input)
        .ok_or_else(|| Error::Parse(format!("{input:?} does not match <hour>[:<minute>]<am|pm>")))?;

    let mut hour: u32 = caps[1]
        .parse()
        .map_err(|e| Error::Parse(format!("hour in {input:?}: {e}")))?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|e| Error::Parse(format!("minute in {input:?}: {e}")))?,
        None => 0,
    };

    let pm = caps[3].eq_ignore_ascii_case("pm");
    if pm && hour != 12 {
        hour += 12;
    } else if !pm && hour == 12 {
        hour = 0;
    }

    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| Error::Parse(format!("{input:?} is not a valid time of day")))
}

/// Pin `time` to `date` in `tz`.
///
/// Ambiguous local times (clocks going back) take the earlier instant. Times
/// inside a forward gap are shifted past it.
fn resolve<Z: TimeZone>(
    tz: &Z,
    date: NaiveDate,
    time: NaiveTime,
    original: &str,
) -> Result<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::new(date, time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.fixed_offset())
        .ok_or_else(|| Error::Parse(format!("{original:?} does not exist on {date}")))
}
