// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! Date and timestamp helpers shared by the query builder, the warehouse
//! connector, the result serializer and the PCDM transformer.
//!
//! Timestamps travel through the crate as microseconds since the Unix epoch,
//! which is what Arrow's `Timestamp(Microsecond, _)` columns hold.

use crate::error::{Result, SensorError};
use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc,
};

/// Which end of a query range a date string describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// A bare date starts at `00:00:00`.
    Start,
    /// A bare date ends at `23:59:59`.
    End,
}

/// Parses a query date.
///
/// Accepted forms are `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS[.f]` and
/// `YYYY-MM-DDTHH:MM:SS[.f]±HH:MM` (or `Z`). Values without an offset are
/// taken as UTC.
pub fn parse_query_date(value: &str, boundary: Boundary) -> Result<DateTime<FixedOffset>> {
    let value = value.trim();
    let utc = utc_offset()?;

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let time = match boundary {
            Boundary::Start => NaiveTime::from_hms_opt(0, 0, 0),
            Boundary::End => NaiveTime::from_hms_opt(23, 59, 59),
        }
        .ok_or_else(|| SensorError::Internal("invalid boundary time".to_string()))?;
        return localize(&utc, date.and_time(time), value);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(dt);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return localize(&utc, naive, value);
    }

    Err(SensorError::InvalidParameters(format!(
        "Unable to parse date '{}'. Expected YYYY-MM-DD, YYYY-MM-DDTHH:MM:SS or \
         YYYY-MM-DDTHH:MM:SS+zz:zz",
        value
    )))
}

/// Renders a query date the way it is embedded in SQL, e.g.
/// `2011-01-01T00:00:00+00:00`. Fractional seconds are kept only when present.
pub fn render_query_date(date: &DateTime<FixedOffset>) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Returns the `+HHMM` form of the offset carried by `date`.
pub fn offset_hhmm(date: &DateTime<FixedOffset>) -> String {
    date.format("%z").to_string()
}

/// Parses a timestamp string into microseconds since the epoch. Sub-microsecond
/// digits are truncated.
pub fn parse_timestamp_micros(value: &str) -> Result<i64> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(to_micros(&dt.naive_utc()));
    }
    for format in &[
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%d %H:%M:%S%.f%z",
        "%Y-%m-%d %H:%M:%S%.f %z",
    ] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Ok(to_micros(&dt.naive_utc()));
        }
    }
    for format in &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(to_micros(&naive));
        }
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")?;
    let midnight = NaiveTime::from_hms_opt(0, 0, 0)
        .ok_or_else(|| SensorError::Internal("invalid midnight".to_string()))?;
    Ok(to_micros(&date.and_time(midnight)))
}

/// Formats microseconds since the epoch as ISO-8601 with six fractional
/// digits. `utc` appends a `Z` designator.
pub fn format_micros(micros: i64, utc: bool) -> Option<String> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    let naive = NaiveDateTime::from_timestamp_opt(secs, nanos)?;
    let text = naive.format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
    Some(if utc { text + "Z" } else { text })
}

/// Returns the current time in microseconds since the epoch.
pub fn now_micros() -> i64 {
    to_micros(&Utc::now().naive_utc())
}

fn to_micros(naive: &NaiveDateTime) -> i64 {
    naive.timestamp() * 1_000_000 + i64::from(naive.timestamp_subsec_micros())
}

fn utc_offset() -> Result<FixedOffset> {
    FixedOffset::east_opt(0).ok_or_else(|| SensorError::Internal("invalid UTC offset".to_string()))
}

fn localize(
    offset: &FixedOffset,
    naive: NaiveDateTime,
    value: &str,
) -> Result<DateTime<FixedOffset>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| SensorError::InvalidParameters(format!("Ambiguous date '{}'", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_dates_cover_the_whole_day() -> Result<()> {
        let start = parse_query_date("2011-01-01", Boundary::Start)?;
        let end = parse_query_date("2011-01-01", Boundary::End)?;
        assert_eq!("2011-01-01T00:00:00+00:00", render_query_date(&start));
        assert_eq!("2011-01-01T23:59:59+00:00", render_query_date(&end));
        assert_eq!("+0000", offset_hhmm(&start));
        Ok(())
    }

    #[test]
    fn datetimes_keep_their_offset() -> Result<()> {
        let start = parse_query_date("2023-03-10T08:30:00+02:00", Boundary::Start)?;
        assert_eq!("2023-03-10T08:30:00+02:00", render_query_date(&start));
        assert_eq!("+0200", offset_hhmm(&start));

        let naive = parse_query_date("2023-03-10T13:00:00.25", Boundary::End)?;
        assert_eq!("2023-03-10T13:00:00.250+00:00", render_query_date(&naive));

        let zulu = parse_query_date("2023-03-10T13:00:00Z", Boundary::End)?;
        assert_eq!("2023-03-10T13:00:00+00:00", render_query_date(&zulu));
        Ok(())
    }

    #[test]
    fn garbage_dates_are_rejected() {
        let err = parse_query_date("10/03/2023", Boundary::Start).unwrap_err();
        assert!(matches!(err, SensorError::InvalidParameters(_)));
    }

    #[test]
    fn timestamps_truncate_to_micros() -> Result<()> {
        let micros = parse_timestamp_micros("2024-05-13T13:05:19.7278555Z")?;
        assert_eq!(1_715_605_519_727_855, micros);
        assert_eq!(
            Some("2024-05-13T13:05:19.727855".to_string()),
            format_micros(micros, false)
        );
        assert_eq!(
            Some("1969-12-31T23:59:59.999999Z".to_string()),
            format_micros(-1, true)
        );
        assert_eq!(0, parse_timestamp_micros("1970-01-01 00:00:00")?);
        assert_eq!(0, parse_timestamp_micros("1970-01-01")?);
        Ok(())
    }
}
