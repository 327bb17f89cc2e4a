//! Option lists and change rules for the year/month/day date selector.
//!
//! The selector offers the fire season only: August, September and the
//! first of October, for 2016 through 2020.

use std::ops::RangeInclusive;

use foundation::time::DateKey;
use serde::Serialize;

pub const YEARS: RangeInclusive<i32> = 2016..=2020;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct MonthOption {
    pub month: u32,
    pub label: &'static str,
}

pub const MONTHS: [MonthOption; 3] = [
    MonthOption { month: 8, label: "August" },
    MonthOption { month: 9, label: "September" },
    MonthOption { month: 10, label: "October" },
];

/// Days selectable in `month`.
pub fn day_options(month: u32) -> RangeInclusive<u32> {
    match month {
        10 => 1..=1,
        9 => 1..=30,
        _ => 1..=31,
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PickerChange {
    Year(i32),
    Month(u32),
    Day(u32),
}

/// Applies one selector change to `current`.
///
/// Switching months pulls the day into the new month's options. Returns
/// `None` when the change names a year, month or day the selector does not
/// offer.
pub fn apply_change(current: DateKey, change: PickerChange) -> Option<DateKey> {
    let (mut year, mut month, mut day) = (current.year(), current.month(), current.day());
    match change {
        PickerChange::Year(y) => {
            if !YEARS.contains(&y) {
                return None;
            }
            year = y;
        }
        PickerChange::Month(m) => {
            if !MONTHS.iter().any(|o| o.month == m) {
                return None;
            }
            month = m;
            day = day.min(*day_options(m).end());
        }
        PickerChange::Day(d) => {
            if !day_options(month).contains(&d) {
                return None;
            }
            day = d;
        }
    }
    DateKey::from_ymd(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> DateKey {
        DateKey::parse(s).unwrap()
    }

    #[test]
    fn month_switch_clamps_day() {
        assert_eq!(
            apply_change(key("20160815"), PickerChange::Month(10)),
            Some(key("20161001"))
        );
        assert_eq!(
            apply_change(key("20160831"), PickerChange::Month(9)),
            Some(key("20160930"))
        );
        assert_eq!(
            apply_change(key("20160912"), PickerChange::Month(8)),
            Some(key("20160812"))
        );
    }

    #[test]
    fn rejects_options_not_offered() {
        assert_eq!(apply_change(key("20161001"), PickerChange::Day(2)), None);
        assert_eq!(apply_change(key("20160801"), PickerChange::Month(7)), None);
        assert_eq!(apply_change(key("20160801"), PickerChange::Year(2021)), None);
    }

    #[test]
    fn year_and_day_changes() {
        assert_eq!(
            apply_change(key("20160825"), PickerChange::Year(2018)),
            Some(key("20180825"))
        );
        assert_eq!(
            apply_change(key("20160825"), PickerChange::Day(3)),
            Some(key("20160803"))
        );
        assert_eq!(day_options(9).count(), 30);
    }
}
