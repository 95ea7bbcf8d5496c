//! Scheduling policy for delayed and future jobs.
//!
//! Producers specify either an absolute timestamp or a relative delay.
//! The month and year components of a delay use **calendar arithmetic**
//! (`chrono::Months`), not fixed durations: adding one month to Jan 31
//! lands on Feb 28/29. This is deliberate policy, matching what
//! producers expect from "next month", and it means delays spanning
//! months are not a fixed number of seconds.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

/// When a job should become eligible for dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum Schedule {
    /// Eligible immediately.
    #[default]
    Now,
    /// Eligible at an absolute timestamp.
    At(DateTime<Utc>),
    /// Eligible after a relative delay from enqueue time.
    In(Delay),
}

impl Schedule {
    /// Resolve to an absolute `scheduled_at` timestamp.
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Schedule::Now => now,
            Schedule::At(at) => *at,
            Schedule::In(delay) => delay.after(now),
        }
    }
}

/// A composite relative delay.
///
/// All components default to zero and combine additively. Calendar
/// components (years, months) are applied before the fixed-duration
/// components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delay {
    pub millis: i64,
    pub seconds: i64,
    pub minutes: i64,
    pub hours: i64,
    pub days: i64,
    pub months: u32,
    pub years: u32,
}

impl Delay {
    /// Zero delay.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn millis(mut self, n: i64) -> Self {
        self.millis = n;
        self
    }

    pub fn seconds(mut self, n: i64) -> Self {
        self.seconds = n;
        self
    }

    pub fn minutes(mut self, n: i64) -> Self {
        self.minutes = n;
        self
    }

    pub fn hours(mut self, n: i64) -> Self {
        self.hours = n;
        self
    }

    pub fn days(mut self, n: i64) -> Self {
        self.days = n;
        self
    }

    pub fn months(mut self, n: u32) -> Self {
        self.months = n;
        self
    }

    pub fn years(mut self, n: u32) -> Self {
        self.years = n;
        self
    }

    /// Apply this delay to `now`.
    ///
    /// Years fold into months (calendar arithmetic, day-of-month
    /// clamped at short month ends), then the fixed-duration parts are
    /// added. Dates out of chrono's representable range saturate to
    /// the calendar-shifted time.
    pub fn after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let total_months = self.years.saturating_mul(12).saturating_add(self.months);
        let shifted = if total_months > 0 {
            now.checked_add_months(Months::new(total_months)).unwrap_or(now)
        } else {
            now
        };

        let fixed = Duration::milliseconds(self.millis)
            + Duration::seconds(self.seconds)
            + Duration::minutes(self.minutes)
            + Duration::hours(self.hours)
            + Duration::days(self.days);

        shifted.checked_add_signed(fixed).unwrap_or(shifted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_schedule_now() {
        let now = Utc::now();
        assert_eq!(Schedule::Now.resolve(now), now);
        assert_eq!(Schedule::default().resolve(now), now);
    }

    #[test]
    fn test_schedule_at() {
        let now = Utc::now();
        let when = now + Duration::hours(3);
        assert_eq!(Schedule::At(when).resolve(now), when);
    }

    #[test]
    fn test_delay_fixed_components() {
        let now = at(2026, 3, 10, 12, 0, 0);
        let delay = Delay::none().minutes(5);
        assert_eq!(delay.after(now), at(2026, 3, 10, 12, 5, 0));

        let delay = Delay::none().hours(1).seconds(30).millis(500);
        assert_eq!(
            delay.after(now),
            at(2026, 3, 10, 13, 0, 30) + Duration::milliseconds(500)
        );
    }

    #[test]
    fn test_delay_days() {
        let now = at(2026, 3, 30, 8, 0, 0);
        assert_eq!(Delay::none().days(3).after(now), at(2026, 4, 2, 8, 0, 0));
    }

    #[test]
    fn test_delay_month_calendar_arithmetic() {
        // Same day-of-month next month, not a fixed 30 days.
        let now = at(2026, 2, 15, 9, 30, 0);
        assert_eq!(
            Delay::none().months(1).after(now),
            at(2026, 3, 15, 9, 30, 0)
        );
    }

    #[test]
    fn test_delay_month_end_clamps() {
        // Jan 31 + 1 month clamps to Feb 28 (2026 is not a leap year).
        let now = at(2026, 1, 31, 0, 0, 0);
        assert_eq!(
            Delay::none().months(1).after(now),
            at(2026, 2, 28, 0, 0, 0)
        );
    }

    #[test]
    fn test_delay_years_fold_into_months() {
        let now = at(2026, 6, 1, 0, 0, 0);
        assert_eq!(
            Delay::none().years(2).months(3).after(now),
            at(2028, 9, 1, 0, 0, 0)
        );
    }

    #[test]
    fn test_delay_calendar_then_fixed() {
        // Months apply first, then the duration parts.
        let now = at(2026, 1, 31, 12, 0, 0);
        assert_eq!(
            Delay::none().months(1).days(1).after(now),
            at(2026, 3, 1, 12, 0, 0)
        );
    }

    #[test]
    fn test_delay_zero_is_identity() {
        let now = Utc::now();
        assert_eq!(Delay::none().after(now), now);
    }

    #[test]
    fn test_schedule_in_resolves_via_delay() {
        let now = at(2026, 5, 1, 0, 0, 0);
        let schedule = Schedule::In(Delay::none().minutes(5));
        assert_eq!(schedule.resolve(now), at(2026, 5, 1, 0, 5, 0));
    }

    #[test]
    fn test_delay_serde_defaults() {
        // Partial JSON fills unspecified components with zero.
        let delay: Delay = serde_json::from_str(r#"{"minutes":5}"#).unwrap();
        assert_eq!(delay, Delay::none().minutes(5));
    }
}
