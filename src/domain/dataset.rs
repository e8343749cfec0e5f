use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Semantic type detected for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::DateTime => "datetime",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "integer" => DataType::Integer,
            "float" => DataType::Float,
            "boolean" => DataType::Boolean,
            "date" => DataType::Date,
            "datetime" => DataType::DateTime,
            _ => DataType::Text,
        }
    }

    /// SQLite storage type for this semantic type.
    /// SQLite has no native boolean, booleans are stored as 0/1.
    pub fn storage_type(&self) -> &'static str {
        match self {
            DataType::Integer | DataType::Boolean => "INTEGER",
            DataType::Float => "REAL",
            DataType::Text | DataType::Date | DataType::DateTime => "TEXT",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    Processing,
    Ready,
    Error,
}

impl DatasetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Processing => "processing",
            DatasetStatus::Ready => "ready",
            DatasetStatus::Error => "error",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "ready" => DatasetStatus::Ready,
            "error" => DatasetStatus::Error,
            _ => DatasetStatus::Processing,
        }
    }
}

/// One uploaded file and its generated schema/table/API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub status: DatasetStatus,
    pub error_message: String,
    pub row_count: i64,
    pub table_name: String,
    pub api_key_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dataset {
    pub fn api_url(&self) -> String {
        format!("/api/v1/data/{}", self.slug)
    }
}

/// Inferred schema for one source column.
///
/// `field_name` is the sanitized identifier used for the physical column and
/// the JSON payloads; `name` is the original label from the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetColumn {
    pub name: String,
    pub field_name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub unique: bool,
    pub max_length: Option<i64>,
    pub sample_values: Vec<String>,
    pub position: i64,
}
