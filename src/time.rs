//! Time ranges and UTC → TAI conversion
//!
//! JSOC addresses records in International Atomic Time. User input is taken
//! as UTC and shifted by the TAI−UTC offset from the leap-second table below.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use std::fmt;

/// TAI−UTC in seconds, effective from 00:00 UTC on the given date
const LEAP_SECONDS: &[(i32, u32, i64)] = &[
    (1972, 1, 10),
    (1972, 7, 11),
    (1973, 1, 12),
    (1974, 1, 13),
    (1975, 1, 14),
    (1976, 1, 15),
    (1977, 1, 16),
    (1978, 1, 17),
    (1979, 1, 18),
    (1980, 1, 19),
    (1981, 7, 20),
    (1982, 7, 21),
    (1983, 7, 22),
    (1985, 7, 23),
    (1988, 1, 24),
    (1990, 1, 25),
    (1991, 1, 26),
    (1992, 7, 27),
    (1993, 7, 28),
    (1994, 7, 29),
    (1996, 1, 30),
    (1997, 7, 31),
    (1999, 1, 32),
    (2006, 1, 33),
    (2009, 1, 34),
    (2012, 7, 35),
    (2015, 7, 36),
    (2017, 1, 37),
];

/// Offset used for instants before the leap-second era
const PRE_1972_OFFSET: i64 = 10;

/// Accepted formats for naive time strings, tried in order
const TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y.%m.%d_%H:%M:%S",
];

/// Accepted formats for date-only strings (midnight is implied)
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

/// Time scale a [`TimeRange`] is expressed in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeScale {
    /// Coordinated Universal Time
    Utc,
    /// International Atomic Time
    Tai,
}

impl fmt::Display for TimeScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeScale::Utc => write!(f, "UTC"),
            TimeScale::Tai => write!(f, "TAI"),
        }
    }
}

/// TAI−UTC offset in seconds for a UTC instant
pub fn tai_minus_utc(utc: NaiveDateTime) -> i64 {
    let mut offset = PRE_1972_OFFSET;
    for &(year, month, seconds) in LEAP_SECONDS {
        let Some(effective) = NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        else {
            continue;
        };
        if utc < effective {
            break;
        }
        offset = seconds;
    }
    offset
}

/// Convert a UTC instant to TAI
pub fn utc_to_tai(utc: NaiveDateTime) -> NaiveDateTime {
    utc + Duration::seconds(tai_minus_utc(utc))
}

/// Format a TAI instant the way JSOC dataset strings expect it
pub fn format_tai(tai: NaiveDateTime) -> String {
    tai.format("%Y.%m.%d_%H:%M:%S_TAI").to_string()
}

/// Parse a UTC time string
///
/// Accepts RFC 3339 (any offset, normalized to UTC), ISO-like forms with `T`
/// or a space, slash-separated dates, JSOC's own `YYYY.MM.DD_HH:MM:SS` and
/// bare dates.
///
/// ```
/// use jsoc_dl::time::parse_time;
///
/// let t = parse_time("2010-01-01T00:30").unwrap();
/// assert_eq!(t.to_string(), "2010-01-01 00:30:00");
/// ```
pub fn parse_time(input: &str) -> Result<NaiveDateTime> {
    let trimmed = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_utc());
    }

    let without_zone = trimmed
        .strip_suffix('Z')
        .or_else(|| trimmed.strip_suffix("_UTC"))
        .unwrap_or(trimmed);

    for format in TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(without_zone, format) {
            return Ok(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(without_zone, format)
            && let Some(dt) = date.and_hms_opt(0, 0, 0)
        {
            return Ok(dt);
        }
    }

    Err(Error::InvalidTime(input.to_string()))
}

/// Closed time interval `[start, end]` in a fixed time scale
///
/// Always satisfies `start <= end`. Splitting produces two fresh ranges that
/// meet at the midpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
    scale: TimeScale,
}

impl TimeRange {
    /// Create a UTC time range
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        Self::with_scale(start, end, TimeScale::Utc)
    }

    /// Create a time range in an explicit time scale
    pub fn with_scale(start: NaiveDateTime, end: NaiveDateTime, scale: TimeScale) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidTimeRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end, scale })
    }

    /// Parse a UTC time range from two time strings
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_time(start)?, parse_time(end)?)
    }

    /// Start of the range
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// End of the range
    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Time scale of both endpoints
    pub fn scale(&self) -> TimeScale {
        self.scale
    }

    /// Length of the range
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Midpoint of the range
    pub fn center(&self) -> NaiveDateTime {
        self.start + self.duration() / 2
    }

    /// Split at the midpoint into two independent halves
    pub fn split(&self) -> (TimeRange, TimeRange) {
        let center = self.center();
        (
            TimeRange {
                start: self.start,
                end: center,
                scale: self.scale,
            },
            TimeRange {
                start: center,
                end: self.end,
                scale: self.scale,
            },
        )
    }

    /// The same interval expressed in TAI
    ///
    /// Ranges already in TAI are returned unchanged.
    pub fn to_tai(&self) -> TimeRange {
        match self.scale {
            TimeScale::Tai => *self,
            TimeScale::Utc => TimeRange {
                start: utc_to_tai(self.start),
                end: utc_to_tai(self.end),
                scale: TimeScale::Tai,
            },
        }
    }

    /// `start-end` in JSOC's record-time notation
    pub fn to_jsoc_interval(&self) -> String {
        let tai = self.to_tai();
        format!("{}-{}", format_tai(tai.start), format_tai(tai.end))
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.start, self.end, self.scale)
    }
}
