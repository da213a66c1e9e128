// lib/src/period.rs

//! Canonical billing-month arithmetic.
//!
//! CMS billing periods follow US calendar months, so boundaries are computed
//! in a fixed US-Eastern reference offset rather than UTC. The offset is
//! standard time year-round; the DST hour never moves an instant far enough
//! to change its billing month.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;

use models::period::BillingPeriod;

/// US Eastern standard offset (UTC-5).
static BILLING_ZONE: Lazy<FixedOffset> =
    Lazy::new(|| FixedOffset::west_opt(5 * 3600).expect("static offset is in range"));

/// Monotonic month index of `instant` in the billing zone.
pub fn month_index_at(instant: DateTime<Utc>) -> i32 {
    let local = instant.with_timezone(&*BILLING_ZONE);
    BillingPeriod::from_year_month(local.year(), local.month()).month_index()
}

/// Month index of the wall clock right now.
pub fn current_month_index() -> i32 {
    month_index_at(Utc::now())
}

/// First instant of the calendar month containing `instant`, in UTC.
pub fn start_of_month_at(instant: DateTime<Utc>) -> DateTime<Utc> {
    let local = instant.with_timezone(&*BILLING_ZONE);
    BILLING_ZONE
        .with_ymd_and_hms(local.year(), local.month(), 1, 0, 0, 0)
        .single()
        .expect("first of month is unambiguous in a fixed offset")
        .with_timezone(&Utc)
}

/// First instant of the current calendar month, in UTC.
pub fn start_of_current_month() -> DateTime<Utc> {
    start_of_month_at(Utc::now())
}

/// 1-based day of month of `instant` in the billing zone.
pub fn day_of_month_at(instant: DateTime<Utc>) -> u32 {
    instant.with_timezone(&*BILLING_ZONE).day()
}

/// The calendar day `instant` falls on in the billing zone. Distinct-day
/// telemetry density is counted over these.
pub fn calendar_day_at(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&*BILLING_ZONE).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn month_index_matches_period_arithmetic() {
        assert_eq!(month_index_at(utc(2025, 6, 20, 15, 0)), 306);
        assert_eq!(month_index_at(utc(2000, 1, 15, 12, 0)), 1);
    }

    #[test]
    fn utc_instants_near_midnight_fall_in_the_prior_eastern_month() {
        // 03:00 UTC on March 1st is still February 28th, 22:00 Eastern.
        let index = month_index_at(utc(2025, 3, 1, 3, 0));
        assert_eq!(index, month_index_at(utc(2025, 2, 15, 12, 0)));
        // By 06:00 UTC the Eastern calendar has rolled over.
        assert_eq!(month_index_at(utc(2025, 3, 1, 6, 0)), index + 1);
    }

    #[test]
    fn start_of_month_is_eastern_midnight() {
        let start = start_of_month_at(utc(2025, 6, 20, 15, 0));
        assert_eq!(start, utc(2025, 6, 1, 5, 0));
        // An instant before Eastern midnight on the 1st belongs to May.
        assert_eq!(start_of_month_at(utc(2025, 6, 1, 2, 0)), utc(2025, 5, 1, 5, 0));
    }

    #[test]
    fn day_of_month_uses_the_billing_zone() {
        assert_eq!(day_of_month_at(utc(2025, 6, 16, 12, 0)), 16);
        // 02:00 UTC on the 16th is still the 15th Eastern.
        assert_eq!(day_of_month_at(utc(2025, 6, 16, 2, 0)), 15);
    }

    #[test]
    fn calendar_day_groups_readings_by_eastern_date() {
        let late_night = utc(2025, 6, 3, 3, 0); // June 2nd, 22:00 Eastern
        let next_morning = utc(2025, 6, 3, 14, 0);
        assert_ne!(calendar_day_at(late_night), calendar_day_at(next_morning));
    }
}
