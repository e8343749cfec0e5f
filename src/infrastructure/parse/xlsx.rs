// ============================================================
// EXCEL PARSER
// ============================================================
// Read the first worksheet of an .xlsx/.xls file into raw rows

use std::path::Path;

use calamine::{open_workbook_auto, Data, DataType, Reader};

use crate::domain::error::{AppError, Result};

/// Read the first worksheet into raw string rows (header row included).
pub fn parse_excel(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| AppError::ParseError(format!("Failed to open Excel file: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::ParseError("No worksheet found".to_string()))?
        .map_err(|e| AppError::ParseError(format!("Failed to read Excel range: {}", e)))?;

    let mut rows = Vec::new();
    for row in range.rows() {
        let row_data: Vec<String> = row.iter().map(cell_to_string).collect();
        rows.push(row_data);
    }

    Ok(rows)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        _ => cell
            .as_string()
            .unwrap_or_else(|| format!("{}", cell)),
    }
}
