//! Date/time reconstruction for device reports.
//!
//! Tracker hardware reports time in several incomplete shapes: a full
//! GMT date+time, a local date paired with a GMT time-of-day, or a GMT
//! time-of-day alone. The reconciliation heuristic recovers the UTC day
//! in the ambiguous cases: when the two times-of-day differ by more
//! than twelve hours a day rollover is assumed, in the direction of
//! whichever time-of-day is larger.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};

use crate::error::DecodeError;

/// Half a day, the rollover threshold.
const HALF_DAY_SECS: i64 = 43_200;

/// Parse a `YYYY/MM/DD` date field.
pub fn parse_ymd_slash(s: &str) -> Result<NaiveDate, DecodeError> {
    let mut parts = s.splitn(3, '/');
    let year = next_num(&mut parts, "date.year", s)?;
    let month = next_num(&mut parts, "date.month", s)?;
    let day = next_num(&mut parts, "date.day", s)?;
    NaiveDate::from_ymd_opt(year as i32, month, day).ok_or_else(|| invalid(s))
}

/// Parse an `hh:mm:ss` time-of-day field.
pub fn parse_hms_colon(s: &str) -> Result<NaiveTime, DecodeError> {
    let mut parts = s.splitn(3, ':');
    let hour = next_num(&mut parts, "time.hour", s)?;
    let minute = next_num(&mut parts, "time.minute", s)?;
    let second = next_num(&mut parts, "time.second", s)?;
    NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(|| invalid(s))
}

/// Parse a packed `YYMMDD` date field. Two-digit years map into 2000+.
pub fn parse_yymmdd(s: &str) -> Result<NaiveDate, DecodeError> {
    if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(s));
    }
    let year = 2000 + num(&s[0..2], s)? as i32;
    let month = num(&s[2..4], s)?;
    let day = num(&s[4..6], s)?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| invalid(s))
}

/// Parse a packed `hhmmss` time-of-day field.
pub fn parse_hhmmss(s: &str) -> Result<NaiveTime, DecodeError> {
    if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(s));
    }
    let hour = num(&s[0..2], s)?;
    let minute = num(&s[2..4], s)?;
    let second = num(&s[4..6], s)?;
    NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(|| invalid(s))
}

/// Build a UTC timestamp from explicit GMT date and time components.
pub fn utc_from_ymd_hms(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Result<i64, DecodeError> {
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| invalid(&format!("{year:04}-{month:02}-{day:02}")))?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)
        .ok_or_else(|| invalid(&format!("{hour:02}:{minute:02}:{second:02}")))?;
    Ok(date.and_time(time).and_utc().timestamp())
}

/// Reconcile an ambiguous local date against a GMT time-of-day.
///
/// The device reports the date in its (unknown) local zone but the
/// time-of-day in GMT. If the two times-of-day differ by more than
/// twelve hours the GMT day is the local day shifted by one, in the
/// direction of the larger time-of-day.
pub fn reconcile_day(
    local_date: NaiveDate,
    local_tod: NaiveTime,
    gmt_tod: NaiveTime,
) -> i64 {
    let local_secs = i64::from(local_tod.num_seconds_from_midnight());
    let gmt_secs = i64::from(gmt_tod.num_seconds_from_midnight());

    let gmt_date = match local_secs - gmt_secs {
        d if d > HALF_DAY_SECS => local_date + Duration::days(1),
        d if d < -HALF_DAY_SECS => local_date - Duration::days(1),
        _ => local_date,
    };

    gmt_date.and_time(gmt_tod).and_utc().timestamp()
}

/// Infer the UTC day for a report carrying only a GMT time-of-day.
///
/// The current UTC day stands in for the local date; the same rollover
/// heuristic as [`reconcile_day`] applies.
pub fn utc_day_for_time_of_day(now: DateTime<Utc>, gmt_tod: NaiveTime) -> i64 {
    reconcile_day(now.date_naive(), now.time(), gmt_tod)
}

fn next_num<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    _field: &'static str,
    whole: &str,
) -> Result<u32, DecodeError> {
    parts.next().ok_or_else(|| invalid(whole))?.parse().map_err(|_| invalid(whole))
}

fn num(s: &str, whole: &str) -> Result<u32, DecodeError> {
    s.parse().map_err(|_| invalid(whole))
}

fn invalid(s: &str) -> DecodeError {
    DecodeError::InvalidTimestamp(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_same_day_when_offsets_are_small() {
        // Local 10:00, GMT 08:00 (device two hours east of Greenwich).
        let ts = reconcile_day(date(2024, 3, 10), time(10, 0, 0), time(8, 0, 0));
        let expected = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();
        assert_eq!(ts, expected.timestamp());
    }

    #[test]
    fn test_rollover_forward() {
        // Local 23:58 on the 10th, GMT 00:02: GMT day is the 11th.
        let ts = reconcile_day(date(2024, 3, 10), time(23, 58, 0), time(0, 2, 0));
        let expected = Utc.with_ymd_and_hms(2024, 3, 11, 0, 2, 0).unwrap();
        assert_eq!(ts, expected.timestamp());
    }

    #[test]
    fn test_rollover_backward() {
        // Local 00:02 on the 10th, GMT 23:58: GMT day is still the 9th.
        let ts = reconcile_day(date(2024, 3, 10), time(0, 2, 0), time(23, 58, 0));
        let expected = Utc.with_ymd_and_hms(2024, 3, 9, 23, 58, 0).unwrap();
        assert_eq!(ts, expected.timestamp());
    }

    #[test]
    fn test_time_of_day_only_uses_current_utc_day() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
        let ts = utc_day_for_time_of_day(now, time(12, 29, 10));
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 12, 29, 10).unwrap();
        assert_eq!(ts, expected.timestamp());
    }

    #[test]
    fn test_time_of_day_only_rolls_back_across_midnight() {
        // Shortly after UTC midnight a report stamped 23:58 is from
        // the previous day.
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 0, 5, 0).unwrap();
        let ts = utc_day_for_time_of_day(now, time(23, 58, 0));
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 23, 58, 0).unwrap();
        assert_eq!(ts, expected.timestamp());
    }

    #[test]
    fn test_field_parsers() {
        assert_eq!(parse_ymd_slash("2006/09/05").unwrap(), date(2006, 9, 5));
        assert_eq!(parse_hms_colon("07:47:26").unwrap(), time(7, 47, 26));
        assert_eq!(parse_yymmdd("060905").unwrap(), date(2006, 9, 5));
        assert_eq!(parse_hhmmss("074726").unwrap(), time(7, 47, 26));
        assert!(parse_yymmdd("061332").is_err());
        assert!(parse_hms_colon("7:47").is_err());
    }
}
