//! Date/time input and display at a fixed UTC offset.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, SecondsFormat, TimeZone};

/// Accepted local formats, tried in order.
const FORMATS: [&str; 4] = ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "invalid date/time '{raw}': use YYYY-MM-DD HH:MM, YYYY-MM-DD, MM/DD/YYYY HH:MM, RFC 3339 or epoch milliseconds"
)]
pub struct TimeParseError {
    pub raw: String,
}

/// The machine's current UTC offset in minutes.
#[must_use]
pub fn local_offset_minutes() -> i32 {
    Local::now().offset().fix().local_minus_utc() / 60
}

fn offset(offset_minutes: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(offset_minutes.checked_mul(60)?)
}

/// Parse user input into epoch milliseconds.
///
/// RFC 3339 strings carry their own offset; local formats are read at
/// `offset_minutes`. A bare date means midnight. A bare integer is taken as
/// epoch milliseconds.
///
/// # Errors
///
/// Returns [`TimeParseError`] when no format matches.
pub fn parse_datetime(text: &str, offset_minutes: i32) -> Result<i64, TimeParseError> {
    let raw = text.trim();
    let err = || TimeParseError {
        raw: text.to_string(),
    };
    if let Ok(millis) = raw.parse::<i64>() {
        return Ok(millis);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.timestamp_millis());
    }

    let tz = offset(offset_minutes).ok_or_else(err)?;
    let naive = FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(err)?;
    tz.from_local_datetime(&naive)
        .single()
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(err)
}

/// `YYYY-MM-DD HH:MM` at `offset_minutes`.
#[must_use]
pub fn format_local(ts_ms: i64, offset_minutes: i32) -> String {
    let Some(tz) = offset(offset_minutes) else {
        return ts_ms.to_string();
    };
    DateTime::from_timestamp_millis(ts_ms).map_or_else(
        || ts_ms.to_string(),
        |dt| dt.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string(),
    )
}

/// RFC 3339 in UTC with millisecond precision, as backend timestamp
/// columns expect.
#[must_use]
pub fn format_rfc3339_ms(ts_ms: i64) -> Option<String> {
    DateTime::from_timestamp_millis(ts_ms).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Parse the `created_at` column of a backend row.
#[must_use]
pub fn parse_rfc3339_ms(text: &str) -> Option<i64> {
    let clean = text.trim();
    DateTime::parse_from_rfc3339(clean)
        .ok()
        .or_else(|| {
            // PostgREST sometimes emits "2024-05-01 10:00:00+00"
            DateTime::parse_from_str(clean, "%Y-%m-%d %H:%M:%S%.f%#z").ok()
        })
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JUNE_10_0900_UTC: i64 = 1_749_546_000_000;

    #[test]
    fn local_formats_use_the_offset() {
        assert_eq!(parse_datetime("2025-06-10 09:00", 0), Ok(JUNE_10_0900_UTC));
        assert_eq!(
            parse_datetime("2025-06-10 04:00", -300),
            Ok(JUNE_10_0900_UTC)
        );
        assert_eq!(parse_datetime("06/10/2025 09:00", 0), Ok(JUNE_10_0900_UTC));
        assert_eq!(
            parse_datetime("2025-06-10", 0),
            Ok(JUNE_10_0900_UTC - 9 * 3_600_000)
        );
    }

    #[test]
    fn rfc3339_and_epoch_ignore_the_offset() {
        assert_eq!(
            parse_datetime("2025-06-10T11:00:00+02:00", -300),
            Ok(JUNE_10_0900_UTC)
        );
        assert_eq!(parse_datetime("1749546000000", 120), Ok(JUNE_10_0900_UTC));
        assert!(parse_datetime("next tuesday", 0).is_err());
    }

    #[test]
    fn format_round_trips_minutes() {
        assert_eq!(format_local(JUNE_10_0900_UTC, 60), "2025-06-10 10:00");
    }

    #[test]
    fn backend_timestamps_parse() {
        assert_eq!(
            parse_rfc3339_ms("2025-06-10T09:00:00.000Z"),
            Some(JUNE_10_0900_UTC)
        );
        assert_eq!(
            parse_rfc3339_ms("2025-06-10 09:00:00+00"),
            Some(JUNE_10_0900_UTC)
        );
        let written = format_rfc3339_ms(JUNE_10_0900_UTC).expect("in range");
        assert_eq!(written, "2025-06-10T09:00:00.000Z");
        assert_eq!(parse_rfc3339_ms(&written), Some(JUNE_10_0900_UTC));
    }
}
