//! Timestamps
//!
//! Time values are seconds relative to 1977.01.01_00:00:00_TAI on a uniform
//! scale. Accepted text forms:
//!
//! ```text
//! 2010.05.01_12:30:00.5_TAI     calendar form, optional clock and zone
//! 2010-05-01T12:30:00Z          ISO form
//! JD_2455317.5 / MJD_55317      Julian day forms
//! UNIX_EPOCH, SOHO_EPOCH, ...   epoch keywords
//! 1.0e9                         internal seconds
//! ```
//!
//! When a keyword's unit is an interval designator (`s`, `min`, `h`, `d`, ...)
//! the text is read as a numeric interval instead.

use super::{ValueError, ValueResult};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// The missing time, equal to JD_0
pub const MISSING_TIME: f64 = -211_087_684_800.0;

/// Julian day of the internal epoch (1977.01.01_00:00:00)
pub const JD_EPOCH: f64 = 2_443_144.5;

/// Offset between Julian and modified Julian day numbers
pub const MJD_OFFSET: f64 = 2_400_000.5;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Epoch keywords, resolved once on first use
static EPOCHS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("MISSING", MISSING_TIME),
        ("JD_0", MISSING_TIME),
        ("MJD_0", (MJD_OFFSET - JD_EPOCH) * SECONDS_PER_DAY),
        ("UNIX_EPOCH", -220_924_800.0),
        ("SOHO_EPOCH", -599_616_000.0),
        ("TAI_EPOCH", -599_616_000.0),
        ("DRMS_EPOCH", 0.0),
        ("EPOCH", 0.0),
    ])
});

/// Zone designators, as offsets of the zone clock from TAI in seconds
static ZONES: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("TAI", 0.0),
        ("UTC", 0.0),
        ("UT", 0.0),
        ("Z", 0.0),
        ("TT", 32.184),
        ("TDT", 32.184),
    ])
});

static CALENDAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(-?\d{1,4})\.(\d{1,2})\.(\d{1,2})(?:_(\d{1,2}):(\d{1,2})(?::(\d{1,2}(?:\.\d*)?))?)?(?:_([A-Za-z]+))?$",
    )
    .expect("calendar regex is valid")
});

static ISO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})(?:[T ](\d{2}):(\d{2})(?::(\d{2}(?:\.\d*)?))?)?(Z|[+-]00:?00)?$",
    )
    .expect("iso regex is valid")
});

static JULIAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(M?JD)_(-?\d+(?:\.\d*)?)$").expect("julian regex is valid")
});

fn bad(text: &str) -> ValueError {
    ValueError::BadString {
        target: "time",
        text: text.to_string(),
    }
}

fn epoch_date() -> NaiveDate {
    NaiveDate::default()
        .with_year(1977)
        .and_then(|d| d.with_ordinal(1))
        .unwrap_or_default()
}

/// Look up an epoch keyword (case-insensitive)
pub fn epoch(name: &str) -> Option<f64> {
    EPOCHS.get(name.trim().to_uppercase().as_str()).copied()
}

/// Seconds in one unit of an interval designator, if `unit` is one
pub fn interval_seconds(unit: &str) -> Option<f64> {
    match unit.trim().to_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => Some(1.0),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(60.0),
        "h" | "hr" | "hour" | "hours" => Some(3_600.0),
        "d" | "day" | "days" => Some(SECONDS_PER_DAY),
        "w" | "wk" | "week" | "weeks" => Some(7.0 * SECONDS_PER_DAY),
        _ => None,
    }
}

/// Check whether a time value is the missing sentinel
pub fn is_missing(t: f64) -> bool {
    t.is_nan() || t == MISSING_TIME
}

/// Parse a time string into internal seconds
pub fn parse_time(text: &str) -> ValueResult<f64> {
    let s = text.trim();
    if s.is_empty() {
        return Err(bad(text));
    }

    if let Some(t) = epoch(s) {
        return Ok(t);
    }

    if let Some(caps) = JULIAN_RE.captures(s) {
        let day: f64 = caps[2].parse().map_err(|_| bad(text))?;
        let jd = if caps[1].eq_ignore_ascii_case("mjd") {
            day + MJD_OFFSET
        } else {
            day
        };
        return Ok((jd - JD_EPOCH) * SECONDS_PER_DAY);
    }

    if let Some(caps) = CALENDAR_RE.captures(s) {
        let zone = caps.get(7).map(|m| m.as_str()).unwrap_or("TAI");
        return calendar_seconds(
            text,
            &caps[1],
            &caps[2],
            &caps[3],
            caps.get(4).map(|m| m.as_str()),
            caps.get(5).map(|m| m.as_str()),
            caps.get(6).map(|m| m.as_str()),
            zone,
        );
    }

    if let Some(caps) = ISO_RE.captures(s) {
        return calendar_seconds(
            text,
            &caps[1],
            &caps[2],
            &caps[3],
            caps.get(4).map(|m| m.as_str()),
            caps.get(5).map(|m| m.as_str()),
            caps.get(6).map(|m| m.as_str()),
            "UTC",
        );
    }

    match s.parse::<f64>() {
        Ok(t) if t.is_finite() => Ok(t),
        Ok(t) if t.is_nan() => Ok(MISSING_TIME),
        _ => Err(bad(text)),
    }
}

/// Parse a time string for a keyword carrying `unit`
///
/// Interval designators make the text a numeric interval (seconds); any other
/// unit (a zone, `ISO`, or none) means an absolute time.
pub fn parse_time_with_unit(text: &str, unit: Option<&str>) -> ValueResult<f64> {
    let Some(factor) = unit.and_then(interval_seconds) else {
        return parse_time(text);
    };

    let s = text.trim();
    if let Ok(n) = s.parse::<f64>() {
        return Ok(n * factor);
    }

    // A number followed by its own designator, e.g. "1.5d"
    let split = s
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| bad(text))?;
    let (number, suffix) = s.split_at(split);
    let n: f64 = number.trim().parse().map_err(|_| bad(text))?;
    let own = interval_seconds(suffix).ok_or_else(|| bad(text))?;
    Ok(n * own)
}

#[allow(clippy::too_many_arguments)]
fn calendar_seconds(
    text: &str,
    year: &str,
    month: &str,
    day: &str,
    hour: Option<&str>,
    minute: Option<&str>,
    second: Option<&str>,
    zone: &str,
) -> ValueResult<f64> {
    let year: i32 = year.parse().map_err(|_| bad(text))?;
    let month: u32 = month.parse().map_err(|_| bad(text))?;
    let day: u32 = day.parse().map_err(|_| bad(text))?;
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| bad(text))?;

    let hour: f64 = hour.map(str::parse::<f64>).transpose().map_err(|_| bad(text))?.unwrap_or(0.0);
    let minute: f64 = minute.map(str::parse::<f64>).transpose().map_err(|_| bad(text))?.unwrap_or(0.0);
    let second: f64 = second.map(str::parse::<f64>).transpose().map_err(|_| bad(text))?.unwrap_or(0.0);
    if hour >= 24.0 || minute >= 60.0 || second >= 61.0 {
        return Err(bad(text));
    }

    let offset = ZONES
        .get(zone.to_uppercase().as_str())
        .copied()
        .ok_or_else(|| bad(text))?;

    let days = date.signed_duration_since(epoch_date()).num_days() as f64;
    Ok(days * SECONDS_PER_DAY + hour * 3_600.0 + minute * 60.0 + second - offset)
}

/// Round `t` to `precision` decimal places of a second
fn round_to(t: f64, precision: usize) -> f64 {
    let scale = 10f64.powi(precision.min(9) as i32);
    (t * scale).round() / scale
}

/// Split zone-clock seconds into a calendar date-time
fn to_naive(t: f64) -> Option<NaiveDateTime> {
    let days = (t / SECONDS_PER_DAY).floor();
    let rem = t - days * SECONDS_PER_DAY;
    let whole = rem.floor();
    let nanos = ((rem - whole) * 1e9).round().min(999_999_999.0) as u32;
    let date = epoch_date().checked_add_signed(Duration::days(days as i64))?;
    date.and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::seconds(whole as i64))?
        .with_nanosecond(nanos)
}

/// Format a time in the calendar form, e.g. `2010.05.01_12:30:00.500_TAI`
pub fn format_time(t: f64, zone: &str, precision: usize) -> String {
    if is_missing(t) || !t.is_finite() {
        return "JD_0".to_string();
    }

    let offset = ZONES.get(zone.to_uppercase().as_str()).copied();
    let (zone, offset) = match offset {
        Some(o) => (zone.to_uppercase(), o),
        None => ("TAI".to_string(), 0.0),
    };

    let t = round_to(t + offset, precision);
    let Some(dt) = to_naive(t) else {
        return format!("JD_{}", t / SECONDS_PER_DAY + JD_EPOCH);
    };

    let seconds = dt.second() as f64 + dt.nanosecond() as f64 / 1e9;
    let seconds = if precision == 0 {
        format!("{:02}", dt.second())
    } else {
        format!("{:0width$.prec$}", seconds, width = precision + 3, prec = precision)
    };

    format!(
        "{:04}.{:02}.{:02}_{:02}:{:02}:{}_{}",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        seconds,
        zone
    )
}

/// Format a time in ISO form without a trailing zone marker
///
/// chrono appends `Z` (or `+00:00`) for UTC; the wire form carries no zone.
pub fn format_time_iso(t: f64, precision: usize) -> String {
    if is_missing(t) || !t.is_finite() {
        return "JD_0".to_string();
    }

    let Some(dt) = to_naive(round_to(t, precision)) else {
        return format!("JD_{}", t / SECONDS_PER_DAY + JD_EPOCH);
    };

    let format = match precision {
        0 => SecondsFormat::Secs,
        1..=3 => SecondsFormat::Millis,
        4..=6 => SecondsFormat::Micros,
        _ => SecondsFormat::Nanos,
    };

    let text = dt.and_utc().to_rfc3339_opts(format, true);
    strip_zone_marker(&text).to_string()
}

/// Remove a trailing `Z`, `+00:00` or `UTC` marker
pub fn strip_zone_marker(text: &str) -> &str {
    let trimmed = text.trim_end();
    for marker in ["+00:00", "Z", " UTC", "UTC"] {
        if let Some(stripped) = trimmed.strip_suffix(marker) {
            return stripped.trim_end();
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seconds_between(later: (i32, u32, u32)) -> f64 {
        let d = NaiveDate::from_ymd_opt(later.0, later.1, later.2).unwrap();
        d.signed_duration_since(NaiveDate::from_ymd_opt(1977, 1, 1).unwrap())
            .num_days() as f64
            * SECONDS_PER_DAY
    }

    #[test]
    fn test_epoch_registry_matches_calendar() {
        assert_eq!(epoch("unix_epoch"), Some(seconds_between((1970, 1, 1))));
        assert_eq!(epoch("SOHO_EPOCH"), Some(seconds_between((1958, 1, 1))));
        assert_eq!(epoch("MJD_0"), Some(seconds_between((1858, 11, 17))));
        assert_eq!(epoch("DRMS_EPOCH"), Some(0.0));
        assert_eq!(epoch("nonsense"), None);
    }

    #[test]
    fn test_parse_calendar_forms() {
        assert_eq!(parse_time("1977.01.01_00:00:00_TAI").unwrap(), 0.0);
        assert_eq!(parse_time("1977.01.01").unwrap(), 0.0);
        assert_eq!(parse_time("1977.01.02_TAI").unwrap(), 86_400.0);
        assert_eq!(parse_time("1977.01.01_01:30").unwrap(), 5_400.0);
        assert_eq!(parse_time("1977.01.01_00:00:01.5_TAI").unwrap(), 1.5);
        assert!((parse_time("1977.01.01_00:00:32.184_TT").unwrap()).abs() < 1e-9);
    }

    #[test]
    fn test_parse_iso_and_julian() {
        assert_eq!(parse_time("1977-01-01T00:01:00Z").unwrap(), 60.0);
        assert_eq!(parse_time("1977-01-01").unwrap(), 0.0);
        assert_eq!(parse_time("JD_2443144.5").unwrap(), 0.0);
        assert_eq!(parse_time("JD_0").unwrap(), MISSING_TIME);
        assert_eq!(parse_time("jd_0.0").unwrap(), MISSING_TIME);
        assert_eq!(parse_time("MJD_43144").unwrap(), 0.0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_time("").is_err());
        assert!(parse_time("yesterday").is_err());
        assert!(parse_time("2010.13.01").is_err());
        assert!(parse_time("2010.01.01_25:00").is_err());
        assert!(parse_time("2010.01.01_00:00:00_MARS").is_err());
    }

    #[test]
    fn test_interval_units() {
        assert_eq!(parse_time_with_unit("30", Some("mins")).unwrap(), 1_800.0);
        assert_eq!(parse_time_with_unit("1.5d", Some("secs")).unwrap(), 129_600.0);
        assert_eq!(parse_time_with_unit("2", Some("h")).unwrap(), 7_200.0);
        assert!(parse_time_with_unit("soon", Some("s")).is_err());

        // Non-interval units fall back to absolute parsing
        assert_eq!(parse_time_with_unit("1977.01.01_TAI", Some("TAI")).unwrap(), 0.0);
        assert_eq!(parse_time_with_unit("1977.01.01", Some("ISO")).unwrap(), 0.0);
    }

    #[test]
    fn test_format_calendar() {
        assert_eq!(format_time(0.0, "TAI", 0), "1977.01.01_00:00:00_TAI");
        assert_eq!(format_time(90_061.25, "TAI", 2), "1977.01.02_01:01:01.25_TAI");
        assert_eq!(format_time(MISSING_TIME, "TAI", 0), "JD_0");
        assert_eq!(format_time(-1.0, "TAI", 0), "1976.12.31_23:59:59_TAI");
    }

    #[test]
    fn test_format_rounds_before_splitting() {
        assert_eq!(format_time(59.9996, "TAI", 3), "1977.01.01_00:01:00.000_TAI");
    }

    #[test]
    fn test_format_iso_strips_zone_marker() {
        let text = format_time_iso(60.0, 0);
        assert_eq!(text, "1977-01-01T00:01:00");
        assert_eq!(parse_time(&text).unwrap(), 60.0);
        assert_eq!(strip_zone_marker("2010-01-01T00:00:00+00:00"), "2010-01-01T00:00:00");
        assert_eq!(strip_zone_marker("2010-01-01 00:00:00 UTC"), "2010-01-01 00:00:00");
    }

    #[test]
    fn test_calendar_roundtrip() {
        for t in [0.0, 1.0e9, -5.0e8, 123_456.5] {
            let text = format_time(t, "TAI", 3);
            assert_eq!(parse_time(&text).unwrap(), t, "{}", text);
        }
    }
}
