//! Human duration strings: `90m`, `1.5d`, `2w`, bare numbers are days.

use crate::model::{DAY_MS, HOUR_MS, MINUTE_MS, SECOND_MS, WEEK_MS};

const YEAR_MS: i64 = 365 * DAY_MS;

/// Units in match order; `ms` must be tried before `s` and `m`.
const UNITS: [(&str, i64); 7] = [
    ("ms", 1),
    ("s", SECOND_MS),
    ("m", MINUTE_MS),
    ("h", HOUR_MS),
    ("d", DAY_MS),
    ("w", WEEK_MS),
    ("y", YEAR_MS),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration '{raw}': use a number with an optional unit (ms, s, m, h, d, w, y)")]
pub struct DurationParseError {
    pub raw: String,
}

/// Parse a duration such as `30m`, `2h`, `1.5d` or `3` (days).
///
/// # Errors
///
/// Returns [`DurationParseError`] for empty, negative, non-finite or
/// otherwise unparseable input.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn parse_duration_ms(text: &str) -> Result<i64, DurationParseError> {
    let err = || DurationParseError {
        raw: text.to_string(),
    };
    let clean = text.trim().to_ascii_lowercase();
    if clean.is_empty() {
        return Err(err());
    }

    let (number, scale) = UNITS
        .iter()
        .find_map(|(unit, scale)| clean.strip_suffix(unit).map(|n| (n.trim(), *scale)))
        .unwrap_or((clean.as_str(), DAY_MS));

    let amount: f64 = number.parse().map_err(|_| err())?;
    let millis = (amount * scale as f64).trunc();
    if !millis.is_finite() || millis < 0.0 || millis > i64::MAX as f64 {
        return Err(err());
    }
    Ok(millis as i64)
}

/// Largest whole unit: `3w`, `2d`, `5h`, `12m`, `9s`, `250ms`.
/// Negative input renders as `0ms`.
#[must_use]
pub fn format_compact(duration_ms: i64) -> String {
    let millis = duration_ms.max(0);
    for (unit, scale) in [
        ("w", WEEK_MS),
        ("d", DAY_MS),
        ("h", HOUR_MS),
        ("m", MINUTE_MS),
        ("s", SECOND_MS),
    ] {
        if millis >= scale {
            return format!("{}{unit}", millis / scale);
        }
    }
    format!("{millis}ms")
}
