//! Calendar mapping for the contribution-style grid.
//!
//! Rows are Github-style weekdays (Sunday = 0) and columns are a custom week
//! index anchored to January 1st of each year.  Unlike ISO weeks, the last
//! days of December stay in the last column of their own year instead of
//! being folded into week 1 of the next one.

use std::collections::BTreeMap;

use chrono::naive::NaiveDateDaysIterator;
use chrono::{Datelike, NaiveDate};

use crate::error::{Result, RunboxError};

const MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Github style weekday: 0 = Sunday, 1 = Monday … 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}

/// Week index within the date's own year.
///
/// Week 0 is the (possibly partial) week containing January 1st and a new
/// week starts on every Sunday.  A year spans 53 columns, or 54 for a leap
/// year starting on a Saturday.
pub fn week_of_year(date: NaiveDate) -> u32 {
    let jan_1 = date.with_ordinal(1).unwrap_or(date);
    (date.ordinal() + weekday_index(jan_1) - 1) / 7
}

/// Inclusive range of calendar dates.
///
/// Iterating borrows the range, so it can be walked any number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    pub fn first(&self) -> NaiveDate {
        self.from
    }

    pub fn last(&self) -> NaiveDate {
        self.to
    }

    /// Number of dates in the range (always at least 1).
    pub fn num_days(&self) -> usize {
        (self.to - self.from).num_days() as usize + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    pub fn iter(&self) -> std::iter::Take<NaiveDateDaysIterator> {
        self.from.iter_days().take(self.num_days())
    }
}

impl IntoIterator for &DateRange {
    type Item = NaiveDate;
    type IntoIter = std::iter::Take<NaiveDateDaysIterator>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Every date from `from` to `to`, both included.
pub fn date_range(from: NaiveDate, to: NaiveDate) -> Result<DateRange> {
    if to < from {
        return Err(RunboxError::invalid_range(from, to));
    }
    Ok(DateRange { from, to })
}

/// January 1st through December 31st of `year`.
pub fn year_range(year: i32) -> Result<DateRange> {
    let bounds = NaiveDate::from_ymd_opt(year, 1, 1).zip(NaiveDate::from_ymd_opt(year, 12, 31));
    match bounds {
        Some((from, to)) => date_range(from, to),
        None => Err(RunboxError::InvalidRange {
            from: format!("{year}-01-01"),
            to: format!("{year}-12-31"),
        }),
    }
}

/// X-axis tick: a month label placed on a week column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthTick {
    pub week: u32,
    pub label: &'static str,
}

/// One tick per month, on the first week that month owns.
///
/// A week is owned by the month contributing most of its days, so a week
/// straddling the turn of a month is labelled with at most one of them.
pub fn month_ticks(year: i32) -> Result<Vec<MonthTick>> {
    let mut days_per_week: BTreeMap<u32, [u32; 12]> = BTreeMap::new();
    for date in &year_range(year)? {
        days_per_week.entry(week_of_year(date)).or_insert([0; 12])[date.month0() as usize] += 1;
    }

    let mut labelled = [false; 12];
    let mut ticks = Vec::with_capacity(12);
    for (week, counts) in days_per_week {
        let owner = counts
            .iter()
            .enumerate()
            .max_by_key(|&(_, days)| *days)
            .map(|(month, _)| month)
            .unwrap_or(0);
        if !labelled[owner] {
            labelled[owner] = true;
            ticks.push(MonthTick {
                week,
                label: MONTH_ABBR[owner],
            });
        }
    }
    Ok(ticks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekday_index() {
        // 27 July 2025 is a Sunday
        let start = ymd(2025, 7, 27);
        let got: Vec<u32> = start.iter_days().take(7).map(weekday_index).collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_week_of_year() {
        assert_eq!(week_of_year(ymd(2025, 1, 1)), 0);
        assert_eq!(week_of_year(ymd(2025, 1, 4)), 0);
        assert_eq!(week_of_year(ymd(2025, 1, 5)), 1);
        // not folded into week 1 of 2026
        assert_eq!(week_of_year(ymd(2025, 12, 31)), 52);
        // 2026 starts on a Thursday, first Sunday opens week 1
        assert_eq!(week_of_year(ymd(2026, 1, 1)), 0);
        assert_eq!(week_of_year(ymd(2026, 1, 4)), 1);
    }

    #[test]
    fn test_week_of_year_sunday_start() {
        // 2023 starts on a Sunday
        assert_eq!(weekday_index(ymd(2023, 1, 1)), 0);
        assert_eq!(week_of_year(ymd(2023, 1, 7)), 0);
        assert_eq!(week_of_year(ymd(2023, 1, 8)), 1);
        assert_eq!(week_of_year(ymd(2023, 12, 31)), 52);
        // first Sunday of 2024 is computed against 2024's own January 1st
        assert_eq!(week_of_year(ymd(2024, 1, 7)), 1);
    }

    #[test]
    fn test_week_of_year_54_columns() {
        // leap year starting on a Saturday
        assert_eq!(weekday_index(ymd(2028, 1, 1)), 6);
        assert_eq!(week_of_year(ymd(2028, 1, 2)), 1);
        assert_eq!(week_of_year(ymd(2028, 12, 31)), 53);
    }

    #[test]
    fn test_date_range() {
        let range = date_range(ymd(2025, 1, 1), ymd(2025, 1, 3)).unwrap();
        let dates: Vec<NaiveDate> = range.iter().collect();
        assert_eq!(dates, vec![ymd(2025, 1, 1), ymd(2025, 1, 2), ymd(2025, 1, 3)]);
        assert_eq!(range.num_days(), 3);

        // walking it again yields the same sequence
        let again: Vec<NaiveDate> = (&range).into_iter().collect();
        assert_eq!(again, dates);
    }

    #[test]
    fn test_date_range_single_day() {
        let range = date_range(ymd(2025, 5, 5), ymd(2025, 5, 5)).unwrap();
        assert_eq!(range.iter().count(), 1);
        assert!(range.contains(ymd(2025, 5, 5)));
    }

    #[test]
    fn test_date_range_reversed_fails() {
        let err = date_range(ymd(2025, 1, 3), ymd(2025, 1, 1)).unwrap_err();
        assert!(matches!(err, RunboxError::InvalidRange { .. }));
    }

    #[test]
    fn test_year_range() {
        assert_eq!(year_range(2025).unwrap().num_days(), 365);
        assert_eq!(year_range(2024).unwrap().num_days(), 366);
        assert_eq!(year_range(2024).unwrap().last(), ymd(2024, 12, 31));
        assert!(year_range(i32::MAX).is_err());
    }

    #[test]
    fn test_month_ticks() {
        let ticks = month_ticks(2025).unwrap();
        let weeks: Vec<u32> = ticks.iter().map(|t| t.week).collect();
        let labels: Vec<&str> = ticks.iter().map(|t| t.label).collect();
        assert_eq!(weeks, vec![0, 5, 9, 13, 18, 22, 26, 31, 35, 39, 44, 48]);
        assert_eq!(labels, MONTH_ABBR.to_vec());
    }
}
