//! Hourly time axis and calendar helpers for the scan.
//!
//! Every hourly slice is stamped with the *end* of the hour it was
//! accumulated over. The axis is half-open: `start` is the first slice,
//! `end` is the first timestamp past the series.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CommonError, CommonResult};

/// Whole hours since the Unix epoch.
pub fn hour_index(t: DateTime<Utc>) -> i64 {
    t.timestamp().div_euclid(3600)
}

/// Parse an ISO 8601 timestamp or date (UTC assumed when no offset is given).
pub fn parse_timestamp(s: &str) -> CommonResult<DateTime<Utc>> {
    // Full datetime with timezone
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    // Date only
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    Err(CommonError::InvalidTime(s.to_string()))
}

/// A calendar month, the unit of catalog output and checkpointing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// The month containing `t`.
    pub fn of(t: DateTime<Utc>) -> Self {
        Self {
            year: t.year(),
            month: t.month(),
        }
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }

    /// Midnight UTC on the first day of the month.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0).single()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

/// Deterministic hourly stepping over a half-open date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeAxis {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeAxis {
    /// Build an axis; both bounds must sit on whole hours and `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> CommonResult<Self> {
        let invalid = |message: &str| CommonError::InvalidRange {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
            message: message.to_string(),
        };

        if start >= end {
            return Err(invalid("start must be before end"));
        }
        if !on_whole_hour(start) || !on_whole_hour(end) {
            return Err(invalid("bounds must fall on whole hours"));
        }

        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Number of hourly steps on the axis.
    pub fn len(&self) -> usize {
        (hour_index(self.end) - hour_index(self.start)) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The final hourly timestamp on the axis.
    pub fn last(&self) -> DateTime<Utc> {
        self.end - Duration::hours(1)
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }

    /// Iterate every hourly timestamp in order.
    pub fn iter(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        (0..self.len()).map(move |i| self.start + Duration::hours(i as i64))
    }

    /// The remainder of the axis starting at `t`.
    pub fn resume_from(&self, t: DateTime<Utc>) -> CommonResult<Self> {
        if !self.contains(t) {
            return Err(CommonError::InvalidRange {
                start: t.to_rfc3339(),
                end: self.end.to_rfc3339(),
                message: format!("resume point is outside {} .. {}", self.start, self.end),
            });
        }
        Self::new(t, self.end)
    }

    /// True when the step after `t` opens a new calendar month.
    pub fn is_last_hour_of_month(t: DateTime<Utc>) -> bool {
        let next = t + Duration::hours(1);
        next.day() == 1 && next.hour() == 0
    }
}

fn on_whole_hour(t: DateTime<Utc>) -> bool {
    t.minute() == 0 && t.second() == 0 && t.nanosecond() == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert_eq!(parse_timestamp("2019-01-01T06:00:00Z").unwrap(), ts(2019, 1, 1, 6));
        assert_eq!(parse_timestamp("2019-01-01T06:00:00").unwrap(), ts(2019, 1, 1, 6));
        assert_eq!(parse_timestamp("2019-01-01").unwrap(), ts(2019, 1, 1, 0));
        assert!(parse_timestamp("January").is_err());
    }

    #[test]
    fn test_axis_len_and_iter() {
        let axis = TimeAxis::new(ts(1980, 5, 1, 0), ts(1980, 5, 2, 0)).unwrap();
        assert_eq!(axis.len(), 24);
        let hours: Vec<_> = axis.iter().collect();
        assert_eq!(hours[0], ts(1980, 5, 1, 0));
        assert_eq!(hours[23], ts(1980, 5, 1, 23));
        assert_eq!(axis.last(), ts(1980, 5, 1, 23));
    }

    #[test]
    fn test_axis_rejects_bad_ranges() {
        assert!(TimeAxis::new(ts(1980, 5, 2, 0), ts(1980, 5, 1, 0)).is_err());
        let off_hour = ts(1980, 5, 1, 0) + Duration::minutes(30);
        assert!(TimeAxis::new(off_hour, ts(1980, 5, 2, 0)).is_err());
    }

    #[test]
    fn test_last_hour_of_month() {
        assert!(TimeAxis::is_last_hour_of_month(ts(2000, 2, 29, 23)));
        assert!(!TimeAxis::is_last_hour_of_month(ts(2000, 2, 28, 23)));
        assert!(TimeAxis::is_last_hour_of_month(ts(2018, 12, 31, 23)));
    }

    #[test]
    fn test_resume_from() {
        let axis = TimeAxis::new(ts(2000, 1, 1, 0), ts(2000, 3, 1, 0)).unwrap();
        let rest = axis.resume_from(ts(2000, 2, 1, 0)).unwrap();
        assert_eq!(rest.len(), 29 * 24);
        assert!(axis.resume_from(ts(2000, 3, 1, 0)).is_err());
    }

    #[test]
    fn test_year_month() {
        let ym = YearMonth::of(ts(2018, 12, 31, 23));
        assert_eq!(ym.to_string(), "201812");
        assert_eq!(ym.next(), YearMonth::new(2019, 1));
        assert_eq!(ym.next().start().unwrap(), ts(2019, 1, 1, 0));
        assert!(YearMonth::new(2018, 12) < YearMonth::new(2019, 1));
    }

    #[test]
    fn test_hour_index_is_monotonic() {
        let a = ts(1900, 1, 1, 0);
        let b = ts(1900, 1, 1, 1);
        assert_eq!(hour_index(b) - hour_index(a), 1);
    }
}
