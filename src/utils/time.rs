//! Calendar-date ranges as unix seconds.

use chrono::{Duration, NaiveDate, Utc};

use crate::error::{Error, Result};

/// Date format accepted from callers.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive unix-second range covering `start_date` through `end_date`.
///
/// Both dates are `YYYY-MM-DD` in UTC; the range ends one second before
/// midnight following `end_date`.
pub fn date_range(start_date: &str, end_date: &str) -> Result<(i64, i64)> {
    let start = parse_date(start_date)?;
    let end = parse_date(end_date)?;
    if start > end {
        return Err(Error::invalid(format!(
            "start_date {} is after end_date {}",
            start_date, end_date
        )));
    }

    let start_ts = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
    let end_ts = (end + Duration::days(1))
        .and_time(chrono::NaiveTime::MIN)
        .and_utc()
        .timestamp()
        - 1;
    Ok((start_ts, end_ts))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| {
        Error::invalid(format!("invalid date '{}', expected YYYY-MM-DD", raw))
    })
}

/// Current time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
