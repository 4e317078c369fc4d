//! Recurrence rules and occurrence arithmetic.
//!
//! Two rule families exist:
//!
//! - [`RecurrenceRule::Every`]: occurrences at `anchor + k * period` for any
//!   integer `k`.
//! - [`RecurrenceRule::Calendar`]: wall-clock patterns (day of month, nth
//!   weekday, end of month, ...) evaluated at a fixed UTC offset so that the
//!   result never depends on the machine running the replay.
//!
//! A [`Recurrence`] pairs a rule with the length of the window that opens at
//! each occurrence.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const SECOND_MS: i64 = 1_000;
pub const MINUTE_MS: i64 = 60 * SECOND_MS;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;
pub const WEEK_MS: i64 = 7 * DAY_MS;

/// How far a calendar search walks in either direction before giving up.
const CALENDAR_SEARCH_DAYS: u64 = 366 * 6;

/// Java-style day-of-week numbering used on the wire: Sunday = 1 .. Saturday = 7.
pub const MONDAY: u32 = 2;

/// Calendar pattern families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalendarPattern {
    /// A fixed day of every month (clamped to the month's last day).
    DayOfMonth,
    /// Every week on a weekday.
    DayOfWeek,
    /// The nth weekday of every month; `nth >= 5` means the last one.
    NthWeekdayOfMonth,
    /// The last day of every month.
    EndOfMonth,
    /// A day of month, every third month counted from an anchor month.
    Quarterly,
    /// A day of a fixed month, once a year.
    Annual,
}

/// Error returned when parsing an unknown calendar pattern name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "unknown recurrence pattern '{raw}': expected one of DAY_OF_MONTH, DAY_OF_WEEK, \
     NTH_WEEKDAY_OF_MONTH, END_OF_MONTH, QUARTERLY, ANNUAL"
)]
pub struct UnknownPattern {
    pub raw: String,
}

impl CalendarPattern {
    pub const ALL: [Self; 6] = [
        Self::DayOfMonth,
        Self::DayOfWeek,
        Self::NthWeekdayOfMonth,
        Self::EndOfMonth,
        Self::Quarterly,
        Self::Annual,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DayOfMonth => "DAY_OF_MONTH",
            Self::DayOfWeek => "DAY_OF_WEEK",
            Self::NthWeekdayOfMonth => "NTH_WEEKDAY_OF_MONTH",
            Self::EndOfMonth => "END_OF_MONTH",
            Self::Quarterly => "QUARTERLY",
            Self::Annual => "ANNUAL",
        }
    }

    /// Compact list indicator (`R:M`, `R:W`, ...).
    #[must_use]
    pub const fn indicator(self) -> &'static str {
        match self {
            Self::DayOfMonth => "R:M",
            Self::DayOfWeek => "R:W",
            Self::NthWeekdayOfMonth => "R:N",
            Self::EndOfMonth => "R:EOM",
            Self::Quarterly => "R:Q",
            Self::Annual => "R:Y",
        }
    }
}

impl fmt::Display for CalendarPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalendarPattern {
    type Err = UnknownPattern;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| UnknownPattern { raw: s.to_string() })
    }
}

/// A wall-clock recurrence pattern.
///
/// Optional fields follow the pattern's needs; absent values fall back the
/// way the mobile app does (`day_of_week` defaults to Monday, `nth_week` to
/// 1, a missing `day_of_month` matches every day).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRule {
    pub pattern: CalendarPattern,
    pub hour: u32,
    pub minute: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    /// Sunday = 1 .. Saturday = 7.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth_week: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month_of_year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarter_anchor_month: Option<u32>,
    /// Offset of the wall clock the pattern is written against.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl CalendarRule {
    #[must_use]
    pub const fn new(pattern: CalendarPattern, hour: u32, minute: u32) -> Self {
        Self {
            pattern,
            hour,
            minute,
            day_of_month: None,
            day_of_week: None,
            nth_week: None,
            month_of_year: None,
            quarter_anchor_month: None,
            utc_offset_minutes: 0,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.hour > 23 || self.minute > 59 {
            return Err(format!(
                "time of day {:02}:{:02} is out of range",
                self.hour, self.minute
            ));
        }
        if self.day_of_month.is_some_and(|d| !(1..=31).contains(&d)) {
            return Err("day_of_month must be within 1..=31".to_string());
        }
        if self.day_of_week.is_some_and(|d| !(1..=7).contains(&d)) {
            return Err("day_of_week must be within 1..=7 (Sunday = 1)".to_string());
        }
        if self.nth_week.is_some_and(|n| !(1..=5).contains(&n)) {
            return Err("nth_week must be within 1..=5 (5 = last)".to_string());
        }
        for (name, month) in [
            ("month_of_year", self.month_of_year),
            ("quarter_anchor_month", self.quarter_anchor_month),
        ] {
            if month.is_some_and(|m| !(1..=12).contains(&m)) {
                return Err(format!("{name} must be within 1..=12"));
            }
        }
        if self.utc_offset_minutes.abs() > 18 * 60 {
            return Err("utc_offset_minutes must be within +/-18h".to_string());
        }
        Ok(())
    }

    fn offset_ms(&self) -> i64 {
        i64::from(self.utc_offset_minutes) * MINUTE_MS
    }

    fn local_date(&self, ts_ms: i64) -> Option<NaiveDate> {
        let local = ts_ms.checked_add(self.offset_ms())?;
        DateTime::from_timestamp_millis(local).map(|dt| dt.date_naive())
    }

    fn occurrence_on(&self, date: NaiveDate) -> Option<i64> {
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0)?;
        let local = NaiveDateTime::new(date, time).and_utc().timestamp_millis();
        local.checked_sub(self.offset_ms())
    }

    /// Whether `date` (in the rule's wall clock) carries an occurrence.
    #[must_use]
    pub fn matches(&self, date: NaiveDate) -> bool {
        let day = date.day();
        let last = days_in_month(date.year(), date.month());
        let target_day = |wanted: Option<u32>| wanted.map_or(day, |d| d.min(last));
        let weekday = self.day_of_week.unwrap_or(MONDAY);

        match self.pattern {
            CalendarPattern::DayOfMonth => day == target_day(self.day_of_month),
            CalendarPattern::DayOfWeek => date.weekday().number_from_sunday() == weekday,
            CalendarPattern::NthWeekdayOfMonth => {
                nth_weekday_of_month(date.year(), date.month(), weekday, self.nth_week.unwrap_or(1))
                    == Some(day)
            }
            CalendarPattern::EndOfMonth => day == last,
            CalendarPattern::Quarterly => {
                let anchor = self.quarter_anchor_month.unwrap_or(1).clamp(1, 12);
                let delta = (date.month() + 12 - anchor) % 12;
                delta % 3 == 0 && day == target_day(self.day_of_month)
            }
            CalendarPattern::Annual => {
                let month = self.month_of_year.map_or(date.month(), |m| m.clamp(1, 12));
                date.month() == month && day == target_day(self.day_of_month)
            }
        }
    }

    fn at_or_after(&self, ts_ms: i64) -> Option<i64> {
        let start = self.local_date(ts_ms)?;
        // The occurrence on the previous local day can still land after
        // `ts_ms` when the offset is negative, so start one day early.
        let first = start.checked_sub_days(Days::new(1))?;
        (0..=CALENDAR_SEARCH_DAYS + 1)
            .filter_map(|offset| first.checked_add_days(Days::new(offset)))
            .filter(|date| self.matches(*date))
            .filter_map(|date| self.occurrence_on(date))
            .find(|occurrence| *occurrence >= ts_ms)
    }

    fn at_or_before(&self, ts_ms: i64) -> Option<i64> {
        let start = self.local_date(ts_ms)?;
        let first = start.checked_add_days(Days::new(1))?;
        (0..=CALENDAR_SEARCH_DAYS + 1)
            .filter_map(|offset| first.checked_sub_days(Days::new(offset)))
            .filter(|date| self.matches(*date))
            .filter_map(|date| self.occurrence_on(date))
            .find(|occurrence| *occurrence <= ts_ms)
    }
}

/// Day of month of the `nth` `weekday` (Sunday = 1) in a month; `nth >= 5`
/// selects the last such weekday.
fn nth_weekday_of_month(year: i32, month: u32, weekday: u32, nth: u32) -> Option<u32> {
    let last = days_in_month(year, month);
    let mut matching = (1..=last).filter(|day| {
        NaiveDate::from_ymd_opt(year, month, *day)
            .is_some_and(|d| d.weekday().number_from_sunday() == weekday)
    });
    if nth >= 5 {
        matching.last()
    } else {
        matching.nth(usize::try_from(nth.saturating_sub(1)).ok()?)
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day())
}

/// The rule half of a [`Recurrence`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurrenceRule {
    /// Occurrences at `anchor_ms + k * period_ms`.
    Every { period_ms: i64, anchor_ms: i64 },
    /// Wall-clock calendar pattern.
    Calendar(CalendarRule),
}

/// A recurrence rule plus the length of the window each occurrence opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub rule: RecurrenceRule,
    pub window_ms: i64,
}

impl Recurrence {
    /// Interval recurrence; the window defaults to the whole period.
    #[must_use]
    pub const fn every(period_ms: i64, anchor_ms: i64, window_ms: i64) -> Self {
        Self {
            rule: RecurrenceRule::Every {
                period_ms,
                anchor_ms,
            },
            window_ms,
        }
    }

    /// Calendar recurrence with a one-day window.
    #[must_use]
    pub const fn calendar(rule: CalendarRule) -> Self {
        Self {
            rule: RecurrenceRule::Calendar(rule),
            window_ms: DAY_MS,
        }
    }

    /// Check that the rule can produce occurrences.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the rule is unusable.
    pub fn validate(&self) -> Result<(), String> {
        if self.window_ms <= 0 {
            return Err(format!("window must be positive, got {}ms", self.window_ms));
        }
        match &self.rule {
            RecurrenceRule::Every { period_ms, .. } if *period_ms <= 0 => {
                Err(format!("period must be positive, got {period_ms}ms"))
            }
            RecurrenceRule::Every { period_ms, .. } if self.window_ms > *period_ms => Err(format!(
                "window ({}ms) must not exceed the period ({period_ms}ms)",
                self.window_ms
            )),
            RecurrenceRule::Every { .. } => Ok(()),
            RecurrenceRule::Calendar(rule) => rule.validate(),
        }
    }

    /// The latest occurrence `<= ts_ms`.
    #[must_use]
    pub fn occurrence_at_or_before(&self, ts_ms: i64) -> Option<i64> {
        match &self.rule {
            RecurrenceRule::Every {
                period_ms,
                anchor_ms,
            } => {
                if *period_ms <= 0 {
                    return None;
                }
                let steps = ts_ms.checked_sub(*anchor_ms)?.div_euclid(*period_ms);
                anchor_ms.checked_add(steps.checked_mul(*period_ms)?)
            }
            RecurrenceRule::Calendar(rule) => rule.at_or_before(ts_ms),
        }
    }

    /// The earliest occurrence `>= ts_ms`.
    #[must_use]
    pub fn next_occurrence_at_or_after(&self, ts_ms: i64) -> Option<i64> {
        match &self.rule {
            RecurrenceRule::Every { period_ms, .. } => {
                let at_or_before = self.occurrence_at_or_before(ts_ms)?;
                if at_or_before == ts_ms {
                    Some(ts_ms)
                } else {
                    at_or_before.checked_add(*period_ms)
                }
            }
            RecurrenceRule::Calendar(rule) => rule.at_or_after(ts_ms),
        }
    }

    /// The earliest occurrence strictly after `ts_ms`.
    #[must_use]
    pub fn next_occurrence_after(&self, ts_ms: i64) -> Option<i64> {
        self.next_occurrence_at_or_after(ts_ms.checked_add(1)?)
    }

    /// The latest occurrence strictly before `ts_ms`.
    #[must_use]
    pub fn previous_occurrence_before(&self, ts_ms: i64) -> Option<i64> {
        self.occurrence_at_or_before(ts_ms.checked_sub(1)?)
    }

    /// The window `[start, end)` containing `ts_ms`, if one is open.
    #[must_use]
    pub fn active_window(&self, ts_ms: i64) -> Option<(i64, i64)> {
        let start = self.occurrence_at_or_before(ts_ms)?;
        let end = start.checked_add(self.window_ms)?;
        (ts_ms < end).then_some((start, end))
    }

    /// Fill in defaults that depend on the owning nag.
    ///
    /// Quarterly rules without an anchor month count quarters from the month
    /// the nag was created in.
    #[must_use]
    pub fn normalized(mut self, created_at_ms: i64) -> Self {
        if let RecurrenceRule::Calendar(rule) = &mut self.rule
            && rule.pattern == CalendarPattern::Quarterly
            && rule.quarter_anchor_month.is_none()
        {
            rule.quarter_anchor_month = rule.local_date(created_at_ms).map(|d| d.month());
        }
        self
    }

    /// Compact list indicator; interval rules show `R:I`.
    #[must_use]
    pub const fn indicator(&self) -> &'static str {
        match &self.rule {
            RecurrenceRule::Every { .. } => "R:I",
            RecurrenceRule::Calendar(rule) => rule.pattern.indicator(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn utc_ms(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0)
            .single()
            .expect("valid date")
            .timestamp_millis()
    }

    #[test]
    fn interval_occurrences_follow_the_anchor() {
        let rec = Recurrence::every(10, 0, 5);
        assert_eq!(rec.occurrence_at_or_before(12), Some(10));
        assert_eq!(rec.occurrence_at_or_before(10), Some(10));
        assert_eq!(rec.occurrence_at_or_before(-3), Some(-10));
        assert_eq!(rec.next_occurrence_after(12), Some(20));
        assert_eq!(rec.next_occurrence_after(20), Some(30));
        assert_eq!(rec.next_occurrence_at_or_after(20), Some(20));
        assert_eq!(rec.previous_occurrence_before(20), Some(10));
    }

    #[test]
    fn interval_active_window_closes() {
        let rec = Recurrence::every(10, 0, 5);
        assert_eq!(rec.active_window(12), Some((10, 15)));
        assert_eq!(rec.active_window(16), None);
    }

    #[test]
    fn validation_rejects_degenerate_rules() {
        assert!(Recurrence::every(0, 0, 1).validate().is_err());
        assert!(Recurrence::every(10, 0, 0).validate().is_err());
        assert!(Recurrence::every(10, 0, 11).validate().is_err());
        assert!(Recurrence::every(10, 0, 10).validate().is_ok());

        let mut rule = CalendarRule::new(CalendarPattern::DayOfMonth, 24, 0);
        assert!(Recurrence::calendar(rule.clone()).validate().is_err());
        rule.hour = 9;
        rule.day_of_week = Some(8);
        assert!(Recurrence::calendar(rule).validate().is_err());
    }

    #[test]
    fn day_of_month_clamps_to_short_months() {
        let mut rule = CalendarRule::new(CalendarPattern::DayOfMonth, 9, 30);
        rule.day_of_month = Some(31);
        let rec = Recurrence::calendar(rule);
        let after = utc_ms(2025, 2, 1, 0, 0);
        assert_eq!(rec.next_occurrence_at_or_after(after), Some(utc_ms(2025, 2, 28, 9, 30)));
        assert_eq!(
            rec.next_occurrence_after(utc_ms(2025, 2, 28, 9, 30)),
            Some(utc_ms(2025, 3, 31, 9, 30))
        );
    }

    #[test]
    fn nth_weekday_and_last_weekday() {
        // Second Tuesday (Tuesday = 3).
        let mut rule = CalendarRule::new(CalendarPattern::NthWeekdayOfMonth, 8, 0);
        rule.day_of_week = Some(3);
        rule.nth_week = Some(2);
        let rec = Recurrence::calendar(rule.clone());
        assert_eq!(
            rec.next_occurrence_at_or_after(utc_ms(2025, 6, 1, 0, 0)),
            Some(utc_ms(2025, 6, 10, 8, 0))
        );

        rule.nth_week = Some(5);
        let last = Recurrence::calendar(rule);
        assert_eq!(
            last.next_occurrence_at_or_after(utc_ms(2025, 6, 1, 0, 0)),
            Some(utc_ms(2025, 6, 24, 8, 0))
        );
    }

    #[test]
    fn weekly_defaults_to_monday() {
        let rec = Recurrence::calendar(CalendarRule::new(CalendarPattern::DayOfWeek, 7, 0));
        // 2025-06-04 is a Wednesday.
        assert_eq!(
            rec.next_occurrence_at_or_after(utc_ms(2025, 6, 4, 12, 0)),
            Some(utc_ms(2025, 6, 9, 7, 0))
        );
        assert_eq!(
            rec.occurrence_at_or_before(utc_ms(2025, 6, 4, 12, 0)),
            Some(utc_ms(2025, 6, 2, 7, 0))
        );
    }

    #[test]
    fn end_of_month_and_annual() {
        let eom = Recurrence::calendar(CalendarRule::new(CalendarPattern::EndOfMonth, 18, 0));
        assert_eq!(
            eom.next_occurrence_at_or_after(utc_ms(2024, 2, 3, 0, 0)),
            Some(utc_ms(2024, 2, 29, 18, 0))
        );

        let mut annual = CalendarRule::new(CalendarPattern::Annual, 10, 0);
        annual.month_of_year = Some(4);
        annual.day_of_month = Some(15);
        let rec = Recurrence::calendar(annual);
        assert_eq!(
            rec.next_occurrence_after(utc_ms(2025, 4, 15, 10, 0)),
            Some(utc_ms(2026, 4, 15, 10, 0))
        );
    }

    #[test]
    fn quarterly_anchor_defaults_to_creation_month() {
        let mut rule = CalendarRule::new(CalendarPattern::Quarterly, 9, 0);
        rule.day_of_month = Some(1);
        let rec = Recurrence::calendar(rule).normalized(utc_ms(2025, 2, 10, 0, 0));
        assert_eq!(
            rec.next_occurrence_at_or_after(utc_ms(2025, 3, 1, 0, 0)),
            Some(utc_ms(2025, 5, 1, 9, 0))
        );
    }

    #[test]
    fn calendar_respects_the_utc_offset() {
        // 09:00 at UTC-05:00 is 14:00 UTC.
        let mut rule = CalendarRule::new(CalendarPattern::DayOfMonth, 9, 0);
        rule.day_of_month = Some(10);
        rule.utc_offset_minutes = -300;
        let rec = Recurrence::calendar(rule);
        assert_eq!(
            rec.next_occurrence_at_or_after(utc_ms(2025, 6, 1, 0, 0)),
            Some(utc_ms(2025, 6, 10, 14, 0))
        );
    }

    #[test]
    fn pattern_names_parse_leniently() {
        assert_eq!("end-of-month".parse(), Ok(CalendarPattern::EndOfMonth));
        assert_eq!("ANNUAL".parse(), Ok(CalendarPattern::Annual));
        assert!("FORTNIGHTLY".parse::<CalendarPattern>().is_err());
    }
}
