// ============================================================
// VALUE COERCION
// ============================================================
// Convert raw cells and JSON payload values into storage values

use serde_json::Value;

use crate::application::use_cases::schema::{is_boolean_token, is_truthy_token, parse_temporal};
use crate::domain::dataset::DataType;
use crate::domain::error::{AppError, Result};

/// A value ready to be bound into a parameterized SQLite statement.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

/// Coerce a raw cell from the parsed file into a storage value keyed by the
/// column's semantic type. Absent or unparseable values become SQL NULL.
pub fn coerce_cell(raw: Option<&str>, data_type: DataType) -> CellValue {
    let Some(value) = raw else {
        return CellValue::Null;
    };
    let value = value.trim();
    if value.is_empty() {
        return CellValue::Null;
    }

    match data_type {
        DataType::Boolean => CellValue::Integer(if is_truthy_token(value) { 1 } else { 0 }),
        DataType::Integer => match value.parse::<f64>() {
            // int(float(v)) semantics: "3.0" loads as 3
            Ok(n) if n.is_finite() => CellValue::Integer(n.trunc() as i64),
            _ => CellValue::Null,
        },
        DataType::Float => match value.parse::<f64>() {
            Ok(n) if n.is_finite() => CellValue::Real(n),
            _ => CellValue::Null,
        },
        DataType::Date => match parse_temporal(value) {
            Some(dt) => CellValue::Text(dt.format("%Y-%m-%d").to_string()),
            None => CellValue::Null,
        },
        DataType::DateTime => match parse_temporal(value) {
            Some(dt) => CellValue::Text(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => CellValue::Null,
        },
        DataType::Text => CellValue::Text(value.to_string()),
    }
}

/// Coerce a JSON value from a CRUD request body into a storage value.
///
/// Unlike [`coerce_cell`], a value that does not fit the column type is a
/// request error, not a silent NULL.
pub fn coerce_json(field: &str, value: &Value, data_type: DataType) -> Result<CellValue> {
    if value.is_null() {
        return Ok(CellValue::Null);
    }

    let invalid = || {
        AppError::ValidationError(format!(
            "Field '{}' expects a {} value, got {}",
            field, data_type, value
        ))
    };

    match data_type {
        DataType::Boolean => match value {
            Value::Bool(b) => Ok(CellValue::Integer(if *b { 1 } else { 0 })),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(CellValue::Integer(0)),
                Some(1) => Ok(CellValue::Integer(1)),
                _ => Err(invalid()),
            },
            Value::String(s) if is_boolean_token(s) => {
                Ok(CellValue::Integer(if is_truthy_token(s) { 1 } else { 0 }))
            }
            _ => Err(invalid()),
        },
        DataType::Integer => match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(CellValue::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    if f.fract() == 0.0 {
                        Ok(CellValue::Integer(f.trunc() as i64))
                    } else {
                        Err(invalid())
                    }
                } else {
                    Err(invalid())
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(CellValue::Integer)
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        },
        DataType::Float => match value {
            Value::Number(n) => n.as_f64().map(CellValue::Real).ok_or_else(invalid),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(CellValue::Real)
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        },
        DataType::Date => match value {
            Value::String(s) => parse_temporal(s)
                .map(|dt| CellValue::Text(dt.format("%Y-%m-%d").to_string()))
                .ok_or_else(invalid),
            _ => Err(invalid()),
        },
        DataType::DateTime => match value {
            Value::String(s) => parse_temporal(s)
                .map(|dt| CellValue::Text(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
                .ok_or_else(invalid),
            _ => Err(invalid()),
        },
        DataType::Text => match value {
            Value::String(s) => Ok(CellValue::Text(s.clone())),
            Value::Number(n) => Ok(CellValue::Text(n.to_string())),
            Value::Bool(b) => Ok(CellValue::Text(b.to_string())),
            _ => Err(invalid()),
        },
    }
}

/// Coerce a filter value arriving as a query-string parameter.
pub fn coerce_filter(field: &str, raw: &str, data_type: DataType) -> Result<CellValue> {
    let invalid = || {
        AppError::ValidationError(format!(
            "Filter '{}' expects a {} value, got '{}'",
            field, data_type, raw
        ))
    };

    match data_type {
        DataType::Boolean => {
            if is_boolean_token(raw) {
                Ok(CellValue::Integer(if is_truthy_token(raw) { 1 } else { 0 }))
            } else {
                Err(invalid())
            }
        }
        DataType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(CellValue::Integer)
            .map_err(|_| invalid()),
        DataType::Float => raw
            .trim()
            .parse::<f64>()
            .map(CellValue::Real)
            .map_err(|_| invalid()),
        DataType::Date => parse_temporal(raw)
            .map(|dt| CellValue::Text(dt.format("%Y-%m-%d").to_string()))
            .ok_or_else(invalid),
        DataType::DateTime => parse_temporal(raw)
            .map(|dt| CellValue::Text(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
            .ok_or_else(invalid),
        DataType::Text => Ok(CellValue::Text(raw.to_string())),
    }
}
