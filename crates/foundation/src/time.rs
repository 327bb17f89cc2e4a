//! Calendar date keys and the animation date range.
//!
//! A [`DateKey`] is the compact `YYYYMMDD` form used throughout the viewer
//! state. Two textual renderings hang off it:
//! - display form `MM/DD/YYYY` (header, date controls)
//! - query form `YYYY-MM-DD` (the `date` attribute of time-series tiles)

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};

/// A validated calendar day packed as the integer `YYYYMMDD`.
///
/// The packing keeps `Ord` consistent with calendar order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(u32);

/// First day of the animated period.
pub const RANGE_START: DateKey = DateKey(2016_08_01);
/// Last day of the animated period (inclusive).
pub const RANGE_END: DateKey = DateKey(2016_10_01);
/// Date used whenever an initial timestamp cannot be parsed.
pub const FALLBACK_DATE: DateKey = RANGE_START;

impl DateKey {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).and_then(Self::from_naive)
    }

    pub fn from_naive(date: NaiveDate) -> Option<Self> {
        let year = u32::try_from(date.year()).ok().filter(|y| *y <= 9999)?;
        Some(Self(year * 10_000 + date.month() * 100 + date.day()))
    }

    pub fn to_naive(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year(), self.month(), self.day())
    }

    pub fn year(self) -> i32 {
        (self.0 / 10_000) as i32
    }

    pub fn month(self) -> u32 {
        (self.0 / 100) % 100
    }

    pub fn day(self) -> u32 {
        self.0 % 100
    }

    /// Parses the compact key. Anything but exactly eight digits naming a
    /// real calendar day is rejected.
    pub fn parse(key: &str) -> Option<Self> {
        if key.len() != 8 || !key.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year = key[0..4].parse().ok()?;
        let month = key[4..6].parse().ok()?;
        let day = key[6..8].parse().ok()?;
        Self::from_ymd(year, month, day)
    }

    /// Parses the hyphenated query form `YYYY-MM-DD`.
    pub fn parse_query(text: &str) -> Option<Self> {
        let mut parts = text.split('-');
        let (year, month, day) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || year.len() != 4 || month.len() != 2 || day.len() != 2 {
            return None;
        }
        Self::from_ymd(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
    }

    /// Accepts either the compact key or the query form.
    pub fn parse_any(text: &str) -> Option<Self> {
        let text = text.trim();
        Self::parse(text).or_else(|| Self::parse_query(text))
    }

    /// `MM/DD/YYYY`
    pub fn display_label(self) -> String {
        format!("{:02}/{:02}/{:04}", self.month(), self.day(), self.year())
    }

    /// `YYYY-MM-DD`
    pub fn query_string(self) -> String {
        format!("{:04}-{:02}-{:02}", self.year(), self.month(), self.day())
    }

    pub fn next_day(self) -> Option<Self> {
        self.to_naive()
            .and_then(|d| d.succ_opt())
            .and_then(Self::from_naive)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}

impl Serialize for DateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// `"20160825"` -> `"08/25/2016"`; `None` unless the input is a valid key.
pub fn format_for_display(key: &str) -> Option<String> {
    DateKey::parse(key).map(DateKey::display_label)
}

/// `"20160825"` or `"2016-08-25"` -> `"2016-08-25"`.
pub fn format_for_query(input: &str) -> Option<String> {
    DateKey::parse_any(input).map(DateKey::query_string)
}

/// Parses an initial timestamp such as `"08-25-2016 00:00"` (month first) or
/// an already compact key. Falls back to [`FALLBACK_DATE`] on any failure.
pub fn parse_initial(timestamp: &str) -> DateKey {
    let text = timestamp.trim();
    if let Some(key) = DateKey::parse(text) {
        return key;
    }
    let date_part = text.split_whitespace().next().unwrap_or_default();
    let parts: Vec<&str> = date_part.split('-').collect();
    match parts.as_slice() {
        [month, day, year] if year.len() == 4 => month_first(month, day, year),
        _ => None,
    }
    .unwrap_or(FALLBACK_DATE)
}

fn month_first(month: &str, day: &str, year: &str) -> Option<DateKey> {
    DateKey::from_ymd(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Inclusive calendar range the animation cycles through.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AnimationRange {
    pub start: DateKey,
    pub end: DateKey,
}

impl Default for AnimationRange {
    fn default() -> Self {
        Self {
            start: RANGE_START,
            end: RANGE_END,
        }
    }
}

impl AnimationRange {
    pub fn contains(&self, key: DateKey) -> bool {
        self.start <= key && key <= self.end
    }

    /// Advances one calendar day. Past `end` the range restarts at `start`.
    pub fn step(&self, key: DateKey) -> DateKey {
        match key.next_day() {
            Some(next) if next <= self.end => next,
            _ => self.start,
        }
    }

    /// Number of days in the cycle (inclusive of both ends).
    pub fn len_days(&self) -> i64 {
        match (self.start.to_naive(), self.end.to_naive()) {
            (Some(s), Some(e)) => (e - s).num_days() + 1,
            _ => 0,
        }
    }
}
