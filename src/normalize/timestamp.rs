use crate::models::Cell;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

const FALLBACK_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Values above this are taken as epoch milliseconds rather than seconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

/// Parses with `format` first, then a short list of common layouts.
pub fn parse_timestamp(raw: &str, format: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
        return Some(parsed);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_local());
    }
    FALLBACK_FORMATS
        .iter()
        .find_map(|fallback| NaiveDateTime::parse_from_str(raw, fallback).ok())
}

pub fn from_epoch(value: f64) -> Option<NaiveDateTime> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let seconds = if value >= EPOCH_MILLIS_THRESHOLD { value / 1000.0 } else { value };
    let whole = seconds.trunc() as i64;
    let nanos = ((seconds - seconds.trunc()) * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(whole, nanos.min(999_999_999)).map(|parsed| parsed.naive_utc())
}

/// Turns the raw timestamp cell into its display string and parsed value.
/// Numeric cells, and text that only parses as a number, are epoch times rendered with `format`.
pub fn resolve(cell: Option<&Cell>, format: &str) -> (Option<String>, Option<NaiveDateTime>) {
    match cell {
        None | Some(Cell::Null) => (None, None),
        Some(Cell::Integer(value)) => epoch_pair(*value as f64, format),
        Some(Cell::Real(value)) => epoch_pair(*value, format),
        Some(cell) => {
            let text = cell.as_text();
            let parsed = text.as_deref().and_then(|text| parse_timestamp(text, format));
            match (parsed, text.as_deref().and_then(|text| text.parse::<f64>().ok())) {
                (None, Some(value)) if from_epoch(value).is_some() => epoch_pair(value, format),
                _ => (text, parsed),
            }
        }
    }
}

fn epoch_pair(value: f64, format: &str) -> (Option<String>, Option<NaiveDateTime>) {
    match from_epoch(value) {
        Some(parsed) => (Some(parsed.format(format).to_string()), Some(parsed)),
        None => (Some(value.to_string()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::{from_epoch, parse_timestamp, resolve};
    use crate::config::DEFAULT_TIMESTAMP_FORMAT;
    use crate::models::Cell;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|date| date.and_hms_opt(h, m, s))
            .expect("valid datetime")
    }

    #[test]
    fn parses_expected_format() {
        assert_eq!(
            parse_timestamp("2024-05-01 08:30:05", DEFAULT_TIMESTAMP_FORMAT),
            Some(at(8, 30, 5))
        );
    }

    #[test]
    fn accepts_iso_and_fractional_forms() {
        assert_eq!(
            parse_timestamp("2024-05-01T08:30:05", DEFAULT_TIMESTAMP_FORMAT),
            Some(at(8, 30, 5))
        );
        assert_eq!(
            parse_timestamp("2024-05-01T08:30:05+08:00", DEFAULT_TIMESTAMP_FORMAT),
            Some(at(8, 30, 5))
        );
        assert!(parse_timestamp("2024-05-01 08:30:05.250", DEFAULT_TIMESTAMP_FORMAT).is_some());
    }

    #[test]
    fn unparseable_text_keeps_string_but_no_datetime() {
        let (text, parsed) = resolve(Some(&Cell::Text("yesterday".to_string())), DEFAULT_TIMESTAMP_FORMAT);
        assert_eq!(text.as_deref(), Some("yesterday"));
        assert!(parsed.is_none());
    }

    #[test]
    fn numeric_cells_are_epoch_seconds_or_millis() {
        let expected = at(0, 0, 0);
        assert_eq!(from_epoch(1_714_521_600.0), Some(expected));
        assert_eq!(from_epoch(1_714_521_600_000.0), Some(expected));
        let (text, parsed) = resolve(Some(&Cell::Integer(1_714_521_600)), DEFAULT_TIMESTAMP_FORMAT);
        assert_eq!(text.as_deref(), Some("2024-05-01 00:00:00"));
        assert_eq!(parsed, Some(expected));
    }

    #[test]
    fn numeric_text_is_read_as_epoch() {
        let (text, parsed) = resolve(Some(&Cell::Text("1714521600".to_string())), DEFAULT_TIMESTAMP_FORMAT);
        assert_eq!(text.as_deref(), Some("2024-05-01 00:00:00"));
        assert_eq!(parsed, Some(at(0, 0, 0)));
    }

    #[test]
    fn absent_cell_is_absent() {
        assert_eq!(resolve(None, DEFAULT_TIMESTAMP_FORMAT), (None, None));
        assert_eq!(resolve(Some(&Cell::Null), DEFAULT_TIMESTAMP_FORMAT), (None, None));
    }
}
