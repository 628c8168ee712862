//! Date windows for plain (non-cohort) reports.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Inclusive calendar range. Serializes as `{"startDate": "YYYY-MM-DD", ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateRange {
    /// `None` when `start > end`.
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Option<Self> {
        (start_date <= end_date).then_some(Self {
            start_date,
            end_date,
        })
    }

    /// Number of calendar days covered, both endpoints included.
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

/// Ranges to query for a report keyed on `default_dimension`.
///
/// `date` looks back `lookback_days` from `today`; `yearMonth` covers the
/// current month to date and ignores the lookback. Any other dimension gets
/// no range at all, which the API answers with an empty report. A lookback
/// reaching past the earliest representable date starts at that date.
pub fn calculate_date_range(
    default_dimension: &str,
    lookback_days: i64,
    today: NaiveDate,
) -> Vec<DateRange> {
    match default_dimension {
        "date" => {
            let start = Duration::try_days(lookback_days.max(0))
                .and_then(|back| today.checked_sub_signed(back))
                .unwrap_or(NaiveDate::MIN);
            DateRange::new(start, today).into_iter().collect()
        }
        "yearMonth" => {
            let first = today.with_day(1).unwrap_or(today);
            DateRange::new(first, today).into_iter().collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_lookback_is_inclusive() {
        let today = day(2024, 3, 15);
        let ranges = calculate_date_range("date", 30, today);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].end_date, today);
        assert_eq!(ranges[0].start_date, day(2024, 2, 14));
        assert_eq!(ranges[0].days(), 31);
    }

    #[test]
    fn test_year_month_ignores_lookback() {
        let today = day(2024, 3, 15);
        for lookback in [0, 7, 365] {
            let ranges = calculate_date_range("yearMonth", lookback, today);
            assert_eq!(ranges, vec![DateRange::new(day(2024, 3, 1), today).unwrap()]);
        }
    }

    #[test]
    fn test_year_month_on_first_of_month() {
        let today = day(2024, 3, 1);
        let ranges = calculate_date_range("yearMonth", 30, today);
        assert_eq!(ranges[0].days(), 1);
    }

    #[test]
    fn test_unknown_dimension_yields_no_ranges() {
        assert!(calculate_date_range("platform", 30, day(2024, 3, 15)).is_empty());
    }

    #[test]
    fn test_negative_lookback_clamped_to_today() {
        let today = day(2024, 3, 15);
        let ranges = calculate_date_range("date", -5, today);
        assert_eq!(ranges[0].start_date, today);
    }

    #[test]
    fn test_huge_lookback_saturates_at_earliest_date() {
        let today = day(2024, 3, 15);
        for lookback in [1_000_000_000, i64::MAX] {
            let ranges = calculate_date_range("date", lookback, today);
            assert_eq!(ranges, vec![DateRange::new(NaiveDate::MIN, today).unwrap()]);
        }
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        assert!(DateRange::new(day(2024, 3, 2), day(2024, 3, 1)).is_none());
    }

    #[test]
    fn test_wire_shape() {
        let range = DateRange::new(day(2024, 8, 1), day(2024, 8, 27)).unwrap();
        assert_eq!(
            serde_json::to_value(range).unwrap(),
            serde_json::json!({"startDate": "2024-08-01", "endDate": "2024-08-27"})
        );
    }
}
