// API module - HTTP endpoints

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};

pub mod auth;
pub mod billing;
pub mod check_ins;
pub mod cron;
pub mod dashboard;
pub mod gyms;
pub mod health;
pub mod members;
pub mod middleware;
pub mod payments;
pub mod plans;
pub mod products;
pub mod staff;

/// Start of `date` in UTC
pub(crate) fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// `[start, end)` covering one calendar day
pub(crate) fn day_range(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    (start_of_day(date), start_of_day(date + Duration::days(1)))
}

/// `[start, end)` covering the calendar month containing `date`
pub(crate) fn month_range(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let first = date - Duration::days(i64::from(date.day0()));
    let next = first
        .checked_add_months(Months::new(1))
        .unwrap_or(first + Duration::days(31));
    (start_of_day(first), start_of_day(next))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_range() {
        let date = NaiveDate::from_ymd_opt(2025, 2, 28).unwrap();
        let (start, end) = day_range(date);
        assert_eq!(start.to_rfc3339(), "2025-02-28T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-03-01T00:00:00+00:00");
    }

    #[test]
    fn test_month_range_wraps_year() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 17).unwrap();
        let (start, end) = month_range(date);
        assert_eq!(start.to_rfc3339(), "2025-12-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    }
}
