//! Column type inference for ingested CSV data.
//!
//! CSV cells arrive as strings; each column is promoted to the narrowest type
//! that fits every non-null value: int → float → bool → datetime → text.
//! Datetime detection is a heuristic (column-name keywords or date-like
//! punctuation in the sampled content) and is configurable through
//! [`InferOptions`] rather than hard-coded.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use super::Column;

/// Knobs for the datetime-candidate heuristic.
#[derive(Debug, Clone)]
pub struct InferOptions {
    /// A column whose lowercased name contains any of these is a candidate.
    pub datetime_keywords: Vec<String>,
    /// How many leading non-null values to sniff for date-like content.
    pub sample_size: usize,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self {
            datetime_keywords: ["time", "date", "timestamp", "created", "updated", "at"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sample_size: 100,
        }
    }
}

/// Build a typed column from raw CSV cells. `None` cells are nulls of
/// whatever type the column ends up with.
pub fn build_column(name: &str, raw: &[Option<String>], options: &InferOptions) -> Column {
    let non_null: Vec<&str> = raw
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();
    if non_null.is_empty() {
        return Column::Text(vec![None; raw.len()]);
    }

    if non_null.iter().all(|s| s.trim().parse::<i64>().is_ok()) {
        return Column::Int(
            raw.iter()
                .map(|cell| cell.as_deref().and_then(|s| s.trim().parse().ok()))
                .collect(),
        );
    }

    if non_null.iter().all(|s| s.trim().parse::<f64>().is_ok()) {
        // Non-finite values (inf, nan) normalize to null so downstream JSON
        // serialization stays total.
        return Column::Float(
            raw.iter()
                .map(|cell| {
                    cell.as_deref()
                        .and_then(|s| s.trim().parse::<f64>().ok())
                        .filter(|f| f.is_finite())
                })
                .collect(),
        );
    }

    if non_null.iter().all(|s| parse_bool(s).is_some()) {
        return Column::Bool(
            raw.iter()
                .map(|cell| cell.as_deref().and_then(parse_bool))
                .collect(),
        );
    }

    if is_datetime_candidate(name, &non_null, options) {
        let parsed: Vec<Option<DateTime<Utc>>> = raw
            .iter()
            .map(|cell| cell.as_deref().and_then(parse_datetime))
            .collect();
        // If nothing in the whole column parses, it was a false positive:
        // leave the column as text instead of nulling it out.
        if parsed.iter().any(Option::is_some) {
            return Column::Datetime(parsed);
        }
    }

    Column::Text(raw.to_vec())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn is_datetime_candidate(name: &str, non_null: &[&str], options: &InferOptions) -> bool {
    let lower_name = name.to_lowercase();
    if options
        .datetime_keywords
        .iter()
        .any(|kw| lower_name.contains(kw))
    {
        return true;
    }
    // Content sniff: the first sampled value must carry date-like punctuation
    // together with digits.
    non_null
        .iter()
        .take(options.sample_size)
        .next()
        .map(|first| {
            first.chars().any(|c| matches!(c, '/' | '-' | ':'))
                && first.chars().any(|c| c.is_ascii_digit())
        })
        .unwrap_or(false)
}

/// Locale-flexible datetime parsing; offsets normalize to UTC, naive values
/// are taken as UTC.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    const ZONED: &[&str] = &["%Y-%m-%d %H:%M:%S%.f %z", "%Y-%m-%d %H:%M:%S%.f%z"];
    for fmt in ZONED {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    const NAIVE: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
    ];
    for fmt in NAIVE {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    const DATES: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
    for fmt in DATES {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            let dt = date.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnType;

    fn cells(values: &[&str]) -> Vec<Option<String>> {
        values
            .iter()
            .map(|s| {
                if s.is_empty() {
                    None
                } else {
                    Some(s.to_string())
                }
            })
            .collect()
    }

    #[test]
    fn integers_win_over_floats() {
        let col = build_column("count", &cells(&["1", "", "-3"]), &InferOptions::default());
        assert_eq!(col.column_type(), ColumnType::Int);
    }

    #[test]
    fn mixed_numbers_become_float_and_inf_is_nulled() {
        let col = build_column(
            "ratio",
            &cells(&["1.5", "inf", "-inf", "2"]),
            &InferOptions::default(),
        );
        match col {
            Column::Float(values) => {
                assert_eq!(values, vec![Some(1.5), None, None, Some(2.0)]);
            }
            other => panic!("expected float column, got {other:?}"),
        }
    }

    #[test]
    fn true_false_become_bool() {
        let col = build_column("active", &cells(&["true", "FALSE", ""]), &InferOptions::default());
        assert_eq!(col.column_type(), ColumnType::Bool);
    }

    #[test]
    fn keyword_named_column_parses_as_datetime() {
        let col = build_column(
            "created_at",
            &cells(&["2024-05-01T12:00:00+09:00", "garbage", ""]),
            &InferOptions::default(),
        );
        match col {
            Column::Datetime(values) => {
                // +09:00 normalizes to UTC; garbage coerces to null.
                assert_eq!(
                    values[0].map(|dt| dt.to_rfc3339()),
                    Some("2024-05-01T03:00:00+00:00".to_string())
                );
                assert_eq!(values[1], None);
                assert_eq!(values[2], None);
            }
            other => panic!("expected datetime column, got {other:?}"),
        }
    }

    #[test]
    fn content_sniff_catches_unlabelled_dates() {
        let col = build_column(
            "col1",
            &cells(&["2024/05/01 08:30:00", "2024/05/02 09:00:00"]),
            &InferOptions::default(),
        );
        assert_eq!(col.column_type(), ColumnType::Datetime);
    }

    #[test]
    fn whole_column_parse_failure_stays_text() {
        // "category" contains the keyword "at" but nothing parses.
        let col = build_column(
            "category",
            &cells(&["widget", "gadget"]),
            &InferOptions::default(),
        );
        assert_eq!(col.column_type(), ColumnType::String);
    }

    #[test]
    fn keywords_are_configurable() {
        let options = InferOptions {
            datetime_keywords: vec!["zeitpunkt".to_string()],
            sample_size: 10,
        };
        let col = build_column("zeitpunkt", &cells(&["2024-05-01"]), &options);
        assert_eq!(col.column_type(), ColumnType::Datetime);
    }

    #[test]
    fn all_null_column_is_text() {
        let col = build_column("empty", &cells(&["", ""]), &InferOptions::default());
        assert_eq!(col.column_type(), ColumnType::String);
    }
}
