//! Helpers for reading the loosely-typed JSON returned by the Tallinna Vesi API.
//!
//! The upstream API is inconsistent about key casing, so every field is read
//! through [`multi_get`] with an ordered list of candidate names.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

/// Returns the first present field among `keys`. Non-object values never match.
pub fn multi_get<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let object = value.as_object()?;
    keys.iter().find_map(|key| object.get(*key))
}

pub fn coerce_float(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Identifiers come back either as strings or as bare numbers.
pub fn coerce_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Parses an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(parsed) = DateTime::parse_from_str(text, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc());
        }
    }
    None
}

/// Parses the `LastReadingDate` of an overview entry.
///
/// Accepts ISO-8601 strings, unix timestamps and the locale `dd.mm.yyyy`
/// format. The latter is interpreted as the start of that day in `tz`.
pub fn parse_overview_date<Tz: TimeZone>(value: Option<&Value>, tz: &Tz) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(text) => parse_datetime(text).or_else(|| {
            let date = NaiveDate::parse_from_str(text.trim(), "%d.%m.%Y").ok()?;
            local_start_of_day(date, tz)
        }),
        Value::Number(number) => {
            let seconds = number
                .as_i64()
                .or_else(|| number.as_f64().map(|seconds| seconds.trunc() as i64))?;
            DateTime::from_timestamp(seconds, 0)
        }
        other => {
            debug!(value = %other, "Ignoring unsupported overview date");
            None
        }
    }
}

/// First instant of `date` in `tz`, as UTC.
///
/// A midnight skipped by a DST transition resolves to the first valid hour of the day.
pub fn local_start_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Option<DateTime<Utc>> {
    (0..24).find_map(|hour| {
        let naive = date.and_hms_opt(hour, 0, 0)?;
        tz.from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    })
}

/// Formats a window start for the `from` query parameter, e.g. `2024-09-24T15:30:00Z`.
pub fn format_window_start<Tz: TimeZone>(value: &DateTime<Tz>) -> String {
    value
        .with_timezone(&Utc)
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, LocalResult};
    use serde_json::json;

    /// UTC+2 that jumps to UTC+3 at midnight of 2025-03-30, so that midnight never happens.
    #[derive(Debug, Clone, Copy)]
    struct SkippedMidnight;

    impl SkippedMidnight {
        fn gap_day() -> NaiveDate {
            NaiveDate::from_ymd_opt(2025, 3, 30).unwrap()
        }

        fn offset(summer: bool) -> FixedOffset {
            FixedOffset::east_opt(if summer { 3 * 3600 } else { 2 * 3600 }).unwrap()
        }
    }

    impl TimeZone for SkippedMidnight {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            SkippedMidnight
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            LocalResult::Single(Self::offset(*local >= Self::gap_day()))
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let switch = Self::gap_day().and_hms_opt(1, 0, 0).unwrap();
            if local.date() == Self::gap_day() && *local < switch {
                LocalResult::None
            } else {
                LocalResult::Single(Self::offset(*local >= switch))
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            Self::offset(*utc >= Self::gap_day())
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            let switch = NaiveDate::from_ymd_opt(2025, 3, 29)
                .unwrap()
                .and_hms_opt(22, 0, 0)
                .unwrap();
            Self::offset(*utc >= switch)
        }
    }

    #[test]
    fn test_multi_get_prefers_first_candidate() {
        let value = json!({"MeterNr": "1", "meterNr": "2"});
        assert_eq!(multi_get(&value, &["MeterNr", "meterNr"]), Some(&json!("1")));
        assert_eq!(multi_get(&value, &["meterNr", "MeterNr"]), Some(&json!("2")));
    }

    #[test]
    fn test_multi_get_falls_back_and_ignores_non_objects() {
        let value = json!({"meterNr": "999999"});
        assert_eq!(
            multi_get(&value, &["MeterNr", "meterNr"]),
            Some(&json!("999999"))
        );
        assert_eq!(multi_get(&value, &["Address", "address"]), None);
        assert_eq!(multi_get(&json!([1, 2]), &["MeterNr"]), None);
    }

    #[test]
    fn test_coerce_float() {
        assert_eq!(coerce_float(Some(&json!(425))), Some(425.0));
        assert_eq!(coerce_float(Some(&json!(25.75))), Some(25.75));
        assert_eq!(coerce_float(Some(&json!(" 12.5 "))), Some(12.5));
        assert_eq!(coerce_float(Some(&json!("n/a"))), None);
        assert_eq!(coerce_float(Some(&json!(null))), None);
        assert_eq!(coerce_float(Some(&json!(true))), None);
        assert_eq!(coerce_float(None), None);
    }

    #[test]
    fn test_coerce_string_accepts_numbers() {
        assert_eq!(coerce_string(Some(&json!(79029))), Some("79029".to_string()));
        assert_eq!(coerce_string(Some(&json!("O057213"))), Some("O057213".to_string()));
        assert_eq!(coerce_string(Some(&json!(null))), None);
    }

    #[test]
    fn test_parse_datetime_variants() {
        let expected = Utc.with_ymd_and_hms(2023, 10, 1, 18, 48, 50).unwrap();
        assert_eq!(parse_datetime("2023-10-01T18:48:50+00:00"), Some(expected));
        assert_eq!(parse_datetime("2023-10-01T21:48:50+03:00"), Some(expected));
        assert_eq!(parse_datetime("2023-10-01T18:48:50Z"), Some(expected));
        assert_eq!(parse_datetime("2023-10-01T18:48:50"), Some(expected));
        assert_eq!(parse_datetime("2023-10-01 18:48:50"), Some(expected));
        assert!(parse_datetime("2023-10-01T18:48:50.250").is_some());
        assert_eq!(parse_datetime("yesterday"), None);
        assert_eq!(parse_datetime("31.08.2025"), None);
    }

    #[test]
    fn test_parse_overview_date_locale_format_is_local_midnight() {
        let tallinn = FixedOffset::east_opt(3 * 3600).unwrap();
        let parsed = parse_overview_date(Some(&json!("31.08.2025")), &tallinn).unwrap();

        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 8, 30, 21, 0, 0).unwrap());
        let local = parsed.with_timezone(&tallinn);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2025, 8, 31).unwrap());
        assert_eq!(local.time(), chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_overview_date_other_inputs() {
        assert_eq!(
            parse_overview_date(Some(&json!("2025-08-31T10:00:00+00:00")), &Utc),
            Some(Utc.with_ymd_and_hms(2025, 8, 31, 10, 0, 0).unwrap())
        );
        assert_eq!(
            parse_overview_date(Some(&json!(1_756_598_400)), &Utc),
            Some(Utc.with_ymd_and_hms(2025, 8, 31, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_overview_date(Some(&json!("not a date")), &Utc), None);
        assert_eq!(parse_overview_date(Some(&json!(null)), &Utc), None);
        assert_eq!(parse_overview_date(None, &Utc), None);
    }

    #[test]
    fn test_local_start_of_day_skips_missing_midnight() {
        let start = local_start_of_day(SkippedMidnight::gap_day(), &SkippedMidnight);
        // 01:00 at UTC+3 is the first valid local time of the day.
        assert_eq!(start, Some(Utc.with_ymd_and_hms(2025, 3, 29, 22, 0, 0).unwrap()));

        let day_before = NaiveDate::from_ymd_opt(2025, 3, 29).unwrap();
        assert_eq!(
            local_start_of_day(day_before, &SkippedMidnight),
            Some(Utc.with_ymd_and_hms(2025, 3, 28, 22, 0, 0).unwrap())
        );
        assert_eq!(
            parse_overview_date(Some(&json!("30.03.2025")), &SkippedMidnight),
            start
        );
    }

    #[test]
    fn test_format_window_start() {
        let value = DateTime::parse_from_rfc3339("2024-09-24T15:30:00+00:00").unwrap();
        assert_eq!(format_window_start(&value), "2024-09-24T15:30:00Z");

        let offset = DateTime::parse_from_rfc3339("2024-09-24T18:30:00.987+03:00").unwrap();
        assert_eq!(format_window_start(&offset), "2024-09-24T15:30:00Z");
    }
}
