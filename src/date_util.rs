use chrono::{Months, NaiveDate, NaiveDateTime};

/// Storage and chart format for a calendar day.
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Years whose day keys are four digits wide, so keys sort like dates.
pub const MIN_YEAR: i32 = 1;
pub const MAX_YEAR: i32 = 9999;

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Shift a date back by whole calendar years.
///
/// Month arithmetic in chrono clamps to the last valid day, so Feb 29
/// lands on Feb 28 in a non-leap target year.
pub fn years_before(d: NaiveDate, years: u32) -> Option<NaiveDate> {
    d.checked_sub_months(Months::new(years.checked_mul(12)?))
}

/// Number of calendar days in `[start, end]`, counting both ends.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

/// Every calendar day from `start` through `end`, inclusive.
pub fn each_day(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

pub fn day_key(d: NaiveDate) -> String {
    d.format(DAY_KEY_FORMAT).to_string()
}

/// Parse a calendar day. Accepts `YYYY-MM-DD` and full timestamps, of
/// which only the date part is kept.
pub fn parse_day(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, DAY_KEY_FORMAT) {
        return Some(d);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(last_day_of_month(2025, 1), Some(ymd(2025, 1, 31)));
        assert_eq!(last_day_of_month(2025, 2), Some(ymd(2025, 2, 28)));
        assert_eq!(last_day_of_month(2024, 2), Some(ymd(2024, 2, 29))); // Leap year
        assert_eq!(last_day_of_month(2025, 12), Some(ymd(2025, 12, 31)));
        assert_eq!(last_day_of_month(2025, 13), None);
    }

    #[test]
    fn test_day_keys_sort_like_dates_within_supported_years() {
        let days = [
            ymd(MIN_YEAR, 1, 1),
            ymd(999, 12, 31),
            ymd(1000, 1, 1),
            ymd(2024, 2, 29),
            ymd(MAX_YEAR, 12, 31),
        ];
        for pair in days.windows(2) {
            assert!(day_key(pair[0]) < day_key(pair[1]), "{pair:?}");
        }
        assert_eq!(day_key(ymd(1, 1, 1)), "0001-01-01");
    }

    #[test]
    fn test_years_before() {
        assert_eq!(years_before(ymd(2025, 3, 15), 1), Some(ymd(2024, 3, 15)));
        assert_eq!(years_before(ymd(2024, 2, 29), 1), Some(ymd(2023, 2, 28)));
        assert_eq!(years_before(ymd(2025, 2, 28), 1), Some(ymd(2024, 2, 28)));
        assert_eq!(years_before(ymd(2024, 12, 31), 1), Some(ymd(2023, 12, 31)));
    }

    #[test]
    fn test_days_inclusive() {
        assert_eq!(days_inclusive(ymd(2024, 1, 1), ymd(2024, 1, 1)), 1);
        assert_eq!(days_inclusive(ymd(2024, 1, 1), ymd(2024, 1, 31)), 31);
        assert_eq!(days_inclusive(ymd(2024, 2, 1), ymd(2024, 2, 29)), 29);
    }

    #[test]
    fn test_each_day() {
        let days: Vec<_> = each_day(ymd(2023, 12, 30), ymd(2024, 1, 2)).collect();
        assert_eq!(
            days,
            vec![
                ymd(2023, 12, 30),
                ymd(2023, 12, 31),
                ymd(2024, 1, 1),
                ymd(2024, 1, 2)
            ]
        );
        assert_eq!(each_day(ymd(2024, 1, 2), ymd(2024, 1, 1)).count(), 0);
    }

    #[test]
    fn test_parse_day() {
        assert_eq!(parse_day("2024-01-05"), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_day(" 2024-01-05 "), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_day("2024-01-05T13:45:00"), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_day("2024-01-05 13:45:00.250"), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_day("2024-01-05T13:45:00+02:00"), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_day("2024-13-05"), None);
        assert_eq!(parse_day("yesterday"), None);
    }
}
