// ============================================================
// DATA TABLE
// ============================================================
// In-memory representation of a parsed tabular file

/// A parsed tabular file: header labels plus row-major cells.
///
/// A cell is `None` when the source value was absent (empty after trimming).
#[derive(Debug, Clone)]
pub struct DataTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl DataTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { headers, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Values of one column in source row order.
    pub fn column_values(&self, index: usize) -> Vec<Option<&str>> {
        self.rows
            .iter()
            .map(|row| row.get(index).and_then(|cell| cell.as_deref()))
            .collect()
    }

    /// Drop rows where every cell is absent, then columns where every
    /// remaining cell is absent.
    pub fn drop_empty(&mut self) {
        self.rows.retain(|row| row.iter().any(|cell| cell.is_some()));

        let keep: Vec<bool> = (0..self.headers.len())
            .map(|idx| self.rows.iter().any(|row| matches!(row.get(idx), Some(Some(_)))))
            .collect();

        if keep.iter().all(|k| *k) {
            return;
        }

        self.headers = self
            .headers
            .iter()
            .zip(keep.iter())
            .filter(|(_, k)| **k)
            .map(|(h, _)| h.clone())
            .collect();

        self.rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(keep.iter())
                    .filter(|(_, k)| **k)
                    .map(|(cell, _)| cell.clone())
                    .collect()
            })
            .collect();
    }
}
