// ============================================================
// CSV PARSER
// ============================================================
// Parse CSV files with encoding and delimiter detection

use std::path::Path;

use csv::ReaderBuilder;

use crate::domain::error::{AppError, Result};

/// Read a CSV file into raw string rows (header row included).
pub fn parse_csv(path: &Path) -> Result<Vec<Vec<String>>> {
    let bytes = std::fs::read(path)
        .map_err(|e| AppError::IoError(format!("Failed to read file: {}", e)))?;
    let content = decode_bytes(&bytes);
    let delimiter = detect_delimiter(&content);

    parse_content(&content, delimiter)
}

pub fn parse_content(content: &str, delimiter: u8) -> Result<Vec<Vec<String>>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            AppError::ParseError(format!("Failed to parse CSV row {}: {}", index + 1, e))
        })?;
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }

    Ok(rows)
}

/// Decode as UTF-8, falling back to Windows-1252 for legacy exports.
fn decode_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(content) => content.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Detect the delimiter by scoring candidates over the first lines:
/// high average occurrence with low variance wins.
pub fn detect_delimiter(content: &str) -> u8 {
    let candidates = [b',', b';', b'\t', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    let mut best_delimiter = b',';
    let mut best_score = 0.0f32;

    for &delimiter in &candidates {
        if sample_lines.is_empty() {
            continue;
        }

        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| line.bytes().filter(|&b| b == delimiter).count())
            .collect();

        let avg = counts.iter().sum::<usize>() as f32 / counts.len() as f32;
        let variance = counts
            .iter()
            .map(|&x| (x as f32 - avg).powi(2))
            .sum::<f32>()
            / counts.len() as f32;

        let score = avg / (1.0 + variance.sqrt());
        if score > best_score {
            best_score = score;
            best_delimiter = delimiter;
        }
    }

    best_delimiter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_csv() {
        let rows = parse_content("name,age\nAlice,30\nBob,25", b',').unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["name", "age"]);
        assert_eq!(rows[1], vec!["Alice", "30"]);
    }

    #[test]
    fn test_quoted_fields() {
        let rows = parse_content("name,note\n\"Smith, Jane\",\"said \"\"hi\"\"\"", b',').unwrap();
        assert_eq!(rows[1], vec!["Smith, Jane", "said \"hi\""]);
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a,b,c\nd,e,f"), b',');
        assert_eq!(detect_delimiter("a;b;c\nd;e;f"), b';');
        assert_eq!(detect_delimiter("a\tb\tc\nd\te\tf"), b'\t');
    }

    #[test]
    fn test_decode_latin1_fallback() {
        // "café" in Windows-1252
        let bytes = [b'c', b'a', b'f', 0xE9];
        assert_eq!(decode_bytes(&bytes), "caf\u{e9}");
    }
}
