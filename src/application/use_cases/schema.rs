// ============================================================
// SCHEMA DETECTION
// ============================================================
// Infer column types and constraints from raw tabular values

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use tracing::debug;

use crate::application::use_cases::naming::{resolve_duplicate_fields, sanitize_field_name};
use crate::domain::dataset::{DataType, DatasetColumn};
use crate::domain::table::DataTable;

/// Detectors requiring a parse-success rate accept a column at this ratio.
const NUMERIC_THRESHOLD: f64 = 0.95;
const TEMPORAL_THRESHOLD: f64 = 0.95;
/// Date-only columns tolerate slightly more parse noise, but nearly all
/// parsed values must sit at midnight.
const DATE_PARSE_THRESHOLD: f64 = 0.90;
const ZERO_TIME_THRESHOLD: f64 = 0.95;

/// Uniqueness is only computed below this row count.
const UNIQUENESS_ROW_CAP: usize = 10_000;

/// Text columns whose longest value fits this bound get a bounded type with a
/// growth buffer; anything longer becomes unbounded text.
const BOUNDED_TEXT_MAX: usize = 255;
const BOUNDED_TEXT_CAP: i64 = 500;

const SAMPLE_VALUE_COUNT: usize = 5;

/// Fixed vocabulary of boolean-like tokens, matched case-insensitively on
/// trimmed values.
const BOOLEAN_TOKENS: &[&str] = &[
    "true", "false", "yes", "no", "1", "0", "t", "f", "y", "n", "1.0", "0.0",
];

const TRUTHY_TOKENS: &[&str] = &["true", "yes", "1", "t", "y", "1.0"];

pub fn is_boolean_token(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    BOOLEAN_TOKENS.contains(&lowered.as_str())
}

pub fn is_truthy_token(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    TRUTHY_TOKENS.contains(&lowered.as_str())
}

/// Parse a raw value as a naive timestamp, trying the formats that show up in
/// real spreadsheet exports. Date-only formats land at midnight.
pub fn parse_temporal(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    None
}

/// Analyze a parsed table and return one descriptor per column, in source
/// order, with sanitized and de-duplicated field names.
pub fn detect_schema(table: &DataTable) -> Vec<DatasetColumn> {
    let row_count = table.row_count();
    let mut columns = Vec::with_capacity(table.column_count());

    for (position, header) in table.headers.iter().enumerate() {
        let values = table.column_values(position);
        let present: Vec<&str> = values.iter().filter_map(|v| *v).collect();

        debug!(
            column = header.as_str(),
            present = present.len(),
            "analyzing column"
        );

        // A fully-empty column defaults to nullable unconstrained text.
        if present.is_empty() {
            columns.push(DatasetColumn {
                name: header.clone(),
                field_name: sanitize_field_name(header),
                data_type: DataType::Text,
                nullable: true,
                unique: false,
                max_length: None,
                sample_values: Vec::new(),
                position: position as i64,
            });
            continue;
        }

        let (data_type, max_length) = infer_data_type(&present);
        let nullable = present.len() < row_count;
        let unique = if row_count <= UNIQUENESS_ROW_CAP {
            let distinct: std::collections::HashSet<&str> = present.iter().copied().collect();
            distinct.len() == present.len()
        } else {
            // Deliberately skipped above the cap; reported false even when
            // the values happen to be unique.
            false
        };

        let sample_values = present
            .iter()
            .take(SAMPLE_VALUE_COUNT)
            .map(|v| render_sample(v, data_type))
            .collect();

        columns.push(DatasetColumn {
            name: header.clone(),
            field_name: sanitize_field_name(header),
            data_type,
            nullable,
            unique,
            max_length,
            sample_values,
            position: position as i64,
        });
    }

    let mut field_names: Vec<String> = columns.iter().map(|c| c.field_name.clone()).collect();
    resolve_duplicate_fields(&mut field_names);
    for (column, field_name) in columns.iter_mut().zip(field_names) {
        column.field_name = field_name;
    }

    columns
}

/// Run the detectors in priority order over the present values:
/// boolean → integer → float → date → datetime → text.
/// The first match wins; ties are impossible by construction.
fn infer_data_type(present: &[&str]) -> (DataType, Option<i64>) {
    if is_boolean_column(present) {
        return (DataType::Boolean, None);
    }

    let (numeric_rate, all_integral) = numeric_stats(present);
    if numeric_rate >= NUMERIC_THRESHOLD && all_integral {
        return (DataType::Integer, None);
    }
    if numeric_rate >= NUMERIC_THRESHOLD {
        return (DataType::Float, None);
    }

    let (temporal_rate, zero_time_rate) = temporal_stats(present);
    if temporal_rate >= DATE_PARSE_THRESHOLD && zero_time_rate >= ZERO_TIME_THRESHOLD {
        return (DataType::Date, None);
    }
    if temporal_rate >= TEMPORAL_THRESHOLD {
        return (DataType::DateTime, None);
    }

    let max_len = present.iter().map(|v| v.chars().count()).max().unwrap_or(0);
    if max_len <= BOUNDED_TEXT_MAX {
        // Double the observed maximum as a growth buffer, capped.
        let bounded = ((max_len as i64) * 2).min(BOUNDED_TEXT_CAP);
        (DataType::Text, Some(bounded))
    } else {
        (DataType::Text, None)
    }
}

/// Every value must come from the boolean vocabulary; a single stray token
/// forces fallthrough to the next detector.
fn is_boolean_column(present: &[&str]) -> bool {
    present.iter().all(|v| is_boolean_token(v))
}

/// Returns (parse success rate, whether every parsed value is integral).
fn numeric_stats(present: &[&str]) -> (f64, bool) {
    let mut parsed = 0usize;
    let mut all_integral = true;

    for value in present {
        if let Ok(n) = value.trim().parse::<f64>() {
            if n.is_finite() {
                parsed += 1;
                if n.fract() != 0.0 {
                    all_integral = false;
                }
                continue;
            }
        }
    }

    if parsed == 0 {
        return (0.0, false);
    }
    (parsed as f64 / present.len() as f64, all_integral)
}

/// Returns (parse success rate, ratio of parsed values at midnight).
fn temporal_stats(present: &[&str]) -> (f64, f64) {
    let mut parsed = 0usize;
    let mut at_midnight = 0usize;

    for value in present {
        if let Some(dt) = parse_temporal(value) {
            parsed += 1;
            if dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 {
                at_midnight += 1;
            }
        }
    }

    if parsed == 0 {
        return (0.0, 0.0);
    }
    (
        parsed as f64 / present.len() as f64,
        at_midnight as f64 / parsed as f64,
    )
}

/// Samples are shipped to clients; temporal values are normalized to ISO-8601
/// so the frontend never sees the source-file format.
fn render_sample(value: &str, data_type: DataType) -> String {
    match data_type {
        DataType::Date => parse_temporal(value)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| value.to_string()),
        DataType::DateTime => parse_temporal(value)
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_else(|| value.to_string()),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> DataTable {
        DataTable::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| {
                    row.iter()
                        .map(|cell| {
                            let trimmed = cell.trim();
                            if trimmed.is_empty() {
                                None
                            } else {
                                Some(trimmed.to_string())
                            }
                        })
                        .collect()
                })
                .collect(),
        )
    }

    fn single(values: &[&str]) -> DatasetColumn {
        let rows: Vec<&[&str]> = values.iter().map(std::slice::from_ref).collect();
        detect_schema(&table(&["col"], &rows)).remove(0)
    }

    #[test]
    fn test_boolean_detection() {
        assert_eq!(single(&["true", "false", "TRUE", " no "]).data_type, DataType::Boolean);
        assert_eq!(single(&["0", "1", "1", "0"]).data_type, DataType::Boolean);
    }

    #[test]
    fn test_boolean_priority_over_integer() {
        // 0/1 columns are boolean because boolean is checked first.
        assert_eq!(single(&["0", "1"]).data_type, DataType::Boolean);
    }

    #[test]
    fn test_single_stray_token_breaks_boolean() {
        let col = single(&["true", "false", "maybe"]);
        assert_ne!(col.data_type, DataType::Boolean);
        assert_eq!(col.data_type, DataType::Text);
    }

    #[test]
    fn test_integer_detection() {
        assert_eq!(single(&["1", "2", "3", "42"]).data_type, DataType::Integer);
    }

    #[test]
    fn test_fractional_value_forces_float() {
        assert_eq!(single(&["1", "2", "3.5", "4"]).data_type, DataType::Float);
    }

    #[test]
    fn test_integer_threshold_boundary() {
        // 19/20 = 95% numeric parses: still integer.
        let mut values: Vec<String> = (0..19).map(|i| i.to_string()).collect();
        values.push("n/a".to_string());
        let refs: Vec<&str> = values.iter().map(|s| s.as_str()).collect();
        assert_eq!(single(&refs).data_type, DataType::Integer);

        // 18/20 = 90%: falls through past the numeric detectors.
        let mut values: Vec<String> = (0..18).map(|i| i.to_string()).collect();
        values.push("n/a".to_string());
        values.push("n/a".to_string());
        let refs: Vec<&str> = values.iter().map(|s| s.as_str()).collect();
        assert_eq!(single(&refs).data_type, DataType::Text);
    }

    #[test]
    fn test_date_detection() {
        let col = single(&["2026-01-01", "2026-01-02", "2026-01-03"]);
        assert_eq!(col.data_type, DataType::Date);
    }

    #[test]
    fn test_datetime_detection() {
        let col = single(&[
            "2026-01-01 10:30:00",
            "2026-01-02 11:00:00",
            "2026-01-03 12:15:30",
        ]);
        assert_eq!(col.data_type, DataType::DateTime);
    }

    #[test]
    fn test_midnight_heavy_column_is_date() {
        // One timestamped value among 39 midnights keeps the column date-only.
        let mut values: Vec<String> = (1..=39).map(|d| format!("2026-01-{:02}", (d % 28) + 1)).collect();
        values.push("2026-02-01 09:30:00".to_string());
        let refs: Vec<&str> = values.iter().map(|s| s.as_str()).collect();
        assert_eq!(single(&refs).data_type, DataType::Date);
    }

    #[test]
    fn test_mixed_time_column_is_datetime() {
        let col = single(&[
            "2026-01-01",
            "2026-01-02 08:00:00",
            "2026-01-03 09:00:00",
            "2026-01-04 10:00:00",
        ]);
        assert_eq!(col.data_type, DataType::DateTime);
    }

    #[test]
    fn test_text_fallback_with_bounded_length() {
        let col = single(&["Alice", "Bob", "Charlie"]);
        assert_eq!(col.data_type, DataType::Text);
        // max length 7 ("Charlie"), doubled as a growth buffer
        assert_eq!(col.max_length, Some(14));
    }

    #[test]
    fn test_long_text_is_unbounded() {
        let long = "x".repeat(300);
        let col = single(&["short", &long]);
        assert_eq!(col.data_type, DataType::Text);
        assert_eq!(col.max_length, None);
    }

    #[test]
    fn test_text_buffer_is_capped() {
        let long = "x".repeat(255);
        let col = single(&[&long]);
        assert_eq!(col.max_length, Some(500));
    }

    #[test]
    fn test_nullable_and_unique() {
        let t = table(&["a", "b"], &[&["1", "x"], &["", "y"], &["3", "x"]]);
        let schema = detect_schema(&t);
        assert!(schema[0].nullable);
        assert!(schema[0].unique);
        assert!(!schema[1].nullable);
        assert!(!schema[1].unique);
    }

    #[test]
    fn test_empty_column_defaults() {
        let t = table(&["a", "empty"], &[&["1", ""], &["2", ""]]);
        let schema = detect_schema(&t);
        assert_eq!(schema[1].data_type, DataType::Text);
        assert!(schema[1].nullable);
        assert!(!schema[1].unique);
        assert!(schema[1].sample_values.is_empty());
    }

    #[test]
    fn test_sample_values_are_first_five() {
        let col = single(&["a", "b", "c", "d", "e", "f", "g"]);
        assert_eq!(col.sample_values, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_temporal_samples_rendered_iso() {
        let col = single(&["01/15/2026", "01/16/2026", "01/17/2026"]);
        assert_eq!(col.data_type, DataType::Date);
        assert_eq!(col.sample_values[0], "2026-01-15");
    }

    #[test]
    fn test_duplicate_labels_get_unique_fields() {
        let t = table(&["Name", "name", "NAME"], &[&["a", "b", "c"]]);
        let schema = detect_schema(&t);
        let fields: Vec<&str> = schema.iter().map(|c| c.field_name.as_str()).collect();
        assert_eq!(fields, vec!["name", "name_1", "name_2"]);
    }

    #[test]
    fn test_parse_temporal_formats() {
        assert!(parse_temporal("2026-01-01").is_some());
        assert!(parse_temporal("2026/01/01").is_some());
        assert!(parse_temporal("01/15/2026").is_some());
        assert!(parse_temporal("2026-01-01T10:00:00").is_some());
        assert!(parse_temporal("2026-01-01T10:00:00Z").is_some());
        assert!(parse_temporal("not a date").is_none());
        assert!(parse_temporal("").is_none());
    }
}
