// ============================================================
// FILE PARSER
// ============================================================
// Turn an uploaded CSV/Excel file into a validated DataTable

pub mod csv;
pub mod xlsx;

use std::path::Path;

use tracing::info;

use crate::application::use_cases::naming::resolve_duplicate_fields;
use crate::domain::error::{AppError, Result};
use crate::domain::table::DataTable;

#[derive(Debug, Clone, Copy)]
pub struct ParseLimits {
    pub max_rows: usize,
    pub max_columns: usize,
}

/// Parse uploaded CSV or Excel files, dispatching on the file extension.
#[derive(Debug, Clone)]
pub struct FileParser {
    limits: ParseLimits,
}

impl FileParser {
    pub fn new(limits: ParseLimits) -> Self {
        Self { limits }
    }

    pub fn supported_extension(filename: &str) -> bool {
        matches!(extension_of(filename).as_str(), "csv" | "xlsx" | "xls")
    }

    pub fn parse(&self, path: &Path) -> Result<DataTable> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        let raw = match extension_of(filename).as_str() {
            "csv" => csv::parse_csv(path)?,
            "xlsx" | "xls" => xlsx::parse_excel(path)?,
            other => {
                return Err(AppError::ValidationError(format!(
                    "Unsupported file format: .{}",
                    other
                )))
            }
        };

        self.finalize(raw)
    }

    /// Validate and clean raw rows: trim cells, drop fully-empty rows and
    /// columns, enforce size caps, and normalize header labels.
    fn finalize(&self, mut raw: Vec<Vec<String>>) -> Result<DataTable> {
        if raw.is_empty() {
            return Err(AppError::ParseError("File contains no data rows.".to_string()));
        }

        let headers: Vec<String> = raw.remove(0).iter().map(|h| h.trim().to_string()).collect();
        let width = headers.len();

        let rows: Vec<Vec<Option<String>>> = raw
            .iter()
            .map(|row| {
                (0..width)
                    .map(|idx| {
                        row.get(idx).and_then(|cell| {
                            let trimmed = cell.trim();
                            if trimmed.is_empty() {
                                None
                            } else {
                                Some(trimmed.to_string())
                            }
                        })
                    })
                    .collect()
            })
            .collect();

        let mut table = DataTable::new(headers, rows);
        table.drop_empty();

        if table.column_count() > self.limits.max_columns {
            return Err(AppError::ValidationError(format!(
                "Too many columns ({}). Maximum is {}.",
                table.column_count(),
                self.limits.max_columns
            )));
        }
        if table.row_count() > self.limits.max_rows {
            return Err(AppError::ValidationError(format!(
                "Too many rows ({}). Maximum is {}.",
                table.row_count(),
                self.limits.max_rows
            )));
        }
        if table.row_count() == 0 {
            return Err(AppError::ParseError("File contains no data rows.".to_string()));
        }
        if table.column_count() == 0 {
            return Err(AppError::ParseError("File contains no columns.".to_string()));
        }

        // Headers must be non-empty and distinct before inference runs.
        for (idx, header) in table.headers.iter_mut().enumerate() {
            if header.is_empty() {
                *header = format!("column_{}", idx);
            }
        }
        resolve_duplicate_fields(&mut table.headers);

        info!(
            rows = table.row_count(),
            columns = table.column_count(),
            "parsed tabular file"
        );

        Ok(table)
    }
}

fn extension_of(filename: &str) -> String {
    filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> FileParser {
        FileParser::new(ParseLimits {
            max_rows: 100,
            max_columns: 10,
        })
    }

    fn finalize(raw: &[&[&str]]) -> Result<DataTable> {
        parser().finalize(
            raw.iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn test_finalize_happy_path() {
        let table = finalize(&[&["Name", "Age"], &["Alice", "30"], &["Bob", "25"]]).unwrap();
        assert_eq!(table.headers, vec!["Name", "Age"]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_empty_file_rejected() {
        assert!(matches!(finalize(&[]), Err(AppError::ParseError(_))));
        assert!(matches!(
            finalize(&[&["Name", "Age"]]),
            Err(AppError::ParseError(_))
        ));
    }

    #[test]
    fn test_fully_empty_rows_dropped() {
        let table = finalize(&[
            &["Name", "Age"],
            &["", ""],
            &["Alice", "30"],
            &["  ", ""],
        ])
        .unwrap();
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_column_cap() {
        let headers: Vec<String> = (0..11).map(|i| format!("c{}", i)).collect();
        let row: Vec<String> = (0..11).map(|i| i.to_string()).collect();
        let raw = vec![headers, row];
        let err = parser().finalize(raw).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn test_row_cap() {
        let mut raw = vec![vec!["a".to_string()]];
        for i in 0..101 {
            raw.push(vec![i.to_string()]);
        }
        let err = parser().finalize(raw).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn test_blank_and_duplicate_headers_normalized() {
        let table = finalize(&[&["", "x", "x"], &["1", "2", "3"]]).unwrap();
        assert_eq!(table.headers, vec!["column_0", "x", "x_1"]);
    }

    #[test]
    fn test_supported_extension() {
        assert!(FileParser::supported_extension("report.csv"));
        assert!(FileParser::supported_extension("Report.XLSX"));
        assert!(!FileParser::supported_extension("notes.txt"));
    }

    #[test]
    fn test_short_rows_padded_with_nulls() {
        let table = finalize(&[&["a", "b"], &["1"], &["2", "3"]]).unwrap();
        assert_eq!(table.rows[0], vec![Some("1".to_string()), None]);
    }
}
