use crate::err::{CarveError, Result};

use jiff::Timestamp;
use jiff::civil::{Date, DateTime, Time};
use jiff::tz::TimeZone;

/// Optional inclusive bounds on event creation time. Unset bounds do not constrain anything.
///
/// A window whose start lies after its stop is valid and matches nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<Timestamp>,
    pub stop: Option<Timestamp>,
}

impl TimeWindow {
    pub fn new(start: Option<Timestamp>, stop: Option<Timestamp>) -> Self {
        TimeWindow { start, stop }
    }

    pub fn unbounded() -> Self {
        TimeWindow::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.stop.is_none()
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        if let Some(start) = self.start {
            if t < start {
                return false;
            }
        }

        if let Some(stop) = self.stop {
            if t > stop {
                return false;
            }
        }

        true
    }
}

/// Parses a user supplied bound.
///
/// Accepts RFC 3339 timestamps (`2017-01-02T10:00:00Z`, `2017-01-02T12:00:00+02:00`),
/// and civil `YYYY-MM-DD[(T| )HH:MM[:SS[.fff]]]` values, which are taken as UTC.
pub fn parse_datetime(input: &str) -> Result<Timestamp> {
    let input = input.trim();
    let invalid = || CarveError::InvalidDateTime {
        input: input.to_owned(),
    };

    if let Ok(ts) = input.parse::<Timestamp>() {
        return Ok(ts);
    }

    let civil = match input.parse::<DateTime>() {
        Ok(dt) => dt,
        Err(_) => input
            .parse::<Date>()
            .map_err(|_| invalid())?
            .to_datetime(Time::midnight()),
    };

    civil
        .to_zoned(TimeZone::UTC)
        .map(|zoned| zoned.timestamp())
        .map_err(|_| invalid())
}

/// Parses the `SystemTime` attribute of a rendered record.
pub fn parse_system_time(value: &str) -> Option<Timestamp> {
    match value.parse::<Timestamp>() {
        Ok(ts) => Some(ts),
        // Some producers drop the trailing `Z`.
        Err(_) => value
            .parse::<DateTime>()
            .ok()?
            .to_zoned(TimeZone::UTC)
            .ok()
            .map(|zoned| zoned.timestamp()),
    }
}
