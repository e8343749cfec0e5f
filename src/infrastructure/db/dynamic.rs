// ============================================================
// DYNAMIC TABLE MANAGER
// ============================================================
// DDL/DML for tables whose layout is only known at runtime

use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::application::use_cases::coerce::{coerce_cell, CellValue};
use crate::domain::dataset::{DataType, DatasetColumn};
use crate::domain::error::{AppError, Result};
use crate::domain::table::DataTable;

/// Owns all SQL against the per-dataset backing tables.
///
/// Table and column names originate from user input (sanitized, but still
/// user-influenced), so every identifier is quoted before it reaches SQL.
/// Values always travel as bind parameters.
#[derive(Debug, Clone)]
pub struct DynamicTableManager {
    pool: SqlitePool,
}

/// Double-quote an identifier, escaping embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: CellValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        CellValue::Null => query.bind(None::<String>),
        CellValue::Integer(v) => query.bind(v),
        CellValue::Real(v) => query.bind(v),
        CellValue::Text(v) => query.bind(v),
    }
}

impl DynamicTableManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the backing table for a schema. Safe to call when the table
    /// already exists so pipeline retries stay idempotent.
    pub async fn create_table(&self, table_name: &str, columns: &[DatasetColumn]) -> Result<()> {
        let mut col_defs = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];

        for column in columns {
            let mut def = format!(
                "{} {} {}",
                quote_ident(&column.field_name),
                column.data_type.storage_type(),
                if column.nullable { "NULL" } else { "NOT NULL" }
            );
            if column.unique {
                def.push_str(" UNIQUE");
            }
            col_defs.push(def);
        }

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(table_name),
            col_defs.join(", ")
        );
        debug!(sql = sql.as_str(), "creating dynamic table");

        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create table: {}", e)))?;

        info!(table = table_name, "created dynamic table");
        Ok(())
    }

    /// Idempotent destructive removal.
    pub async fn drop_table(&self, table_name: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote_ident(table_name));
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to drop table: {}", e)))?;

        info!(table = table_name, "dropped dynamic table");
        Ok(())
    }

    /// Insert every row of a parsed table in one transaction, coercing each
    /// cell through its column's semantic type. Returns the inserted count.
    pub async fn bulk_load(
        &self,
        table_name: &str,
        columns: &[DatasetColumn],
        table: &DataTable,
    ) -> Result<u64> {
        if table.rows.is_empty() {
            return Ok(0);
        }

        let field_list = columns
            .iter()
            .map(|c| quote_ident(&c.field_name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table_name),
            field_list,
            placeholders
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        let mut inserted: u64 = 0;
        for row in &table.rows {
            let mut query = sqlx::query(&sql);
            for column in columns {
                let cell = row
                    .get(column.position as usize)
                    .and_then(|c| c.as_deref());
                query = bind_value(query, coerce_cell(cell, column.data_type));
            }
            let result = query
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to insert row: {}", e)))?;
            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit bulk load: {}", e)))?;

        info!(table = table_name, rows = inserted, "bulk loaded rows");
        Ok(inserted)
    }

    /// Query rows as field→value maps (surrogate key included as `id`).
    ///
    /// `filters` are exact-match equality pairs and `order_by` accepts a
    /// field name with an optional `-` prefix for descending order. Field
    /// validation is the caller's job; only descriptor fields (plus `id`)
    /// may reach this method.
    pub async fn query(
        &self,
        table_name: &str,
        columns: &[DatasetColumn],
        filters: &[(String, CellValue)],
        order_by: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Map<String, Value>>> {
        let mut select_list = vec![quote_ident("id")];
        select_list.extend(columns.iter().map(|c| quote_ident(&c.field_name)));

        let mut sql = format!(
            "SELECT {} FROM {}",
            select_list.join(", "),
            quote_ident(table_name)
        );

        if !filters.is_empty() {
            let conditions = filters
                .iter()
                .map(|(field, _)| format!("{} = ?", quote_ident(field)))
                .collect::<Vec<_>>()
                .join(" AND ");
            sql.push_str(&format!(" WHERE {}", conditions));
        }

        if let Some(order) = order_by {
            let (field, direction) = match order.strip_prefix('-') {
                Some(field) => (field, "DESC"),
                None => (order, "ASC"),
            };
            sql.push_str(&format!(" ORDER BY {} {}", quote_ident(field), direction));
        }

        if limit.is_some() {
            sql.push_str(" LIMIT ?");
        }
        if offset.is_some() {
            sql.push_str(" OFFSET ?");
        }

        let mut query = sqlx::query(&sql);
        for (_, value) in filters {
            query = bind_value(query, value.clone());
        }
        if let Some(limit) = limit {
            query = query.bind(limit);
        }
        if let Some(offset) = offset {
            query = query.bind(offset);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to query table: {}", e)))?;

        rows.iter().map(|row| row_to_map(row, columns)).collect()
    }

    pub async fn count_rows(
        &self,
        table_name: &str,
        filters: &[(String, CellValue)],
    ) -> Result<i64> {
        let mut sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table_name));

        if !filters.is_empty() {
            let conditions = filters
                .iter()
                .map(|(field, _)| format!("{} = ?", quote_ident(field)))
                .collect::<Vec<_>>()
                .join(" AND ");
            sql.push_str(&format!(" WHERE {}", conditions));
        }

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for (_, value) in filters {
            query = match value.clone() {
                CellValue::Null => query.bind(None::<String>),
                CellValue::Integer(v) => query.bind(v),
                CellValue::Real(v) => query.bind(v),
                CellValue::Text(v) => query.bind(v),
            };
        }

        query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count rows: {}", e)))
    }

    pub async fn get_row(
        &self,
        table_name: &str,
        columns: &[DatasetColumn],
        row_id: i64,
    ) -> Result<Option<Map<String, Value>>> {
        let filters = vec![("id".to_string(), CellValue::Integer(row_id))];
        let mut rows = self
            .query(table_name, columns, &filters, None, Some(1), None)
            .await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    /// Insert a single row from pre-coerced values. Returns the new row id.
    pub async fn insert_row(
        &self,
        table_name: &str,
        values: &[(String, CellValue)],
    ) -> Result<i64> {
        let sql = if values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table_name))
        } else {
            let field_list = values
                .iter()
                .map(|(field, _)| quote_ident(field))
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = vec!["?"; values.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(table_name),
                field_list,
                placeholders
            )
        };

        let mut query = sqlx::query(&sql);
        for (_, value) in values {
            query = bind_value(query, value.clone());
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to insert row: {}", e)))?;

        Ok(result.last_insert_rowid())
    }

    /// Update a single row. Returns whether a row was touched.
    pub async fn update_row(
        &self,
        table_name: &str,
        row_id: i64,
        values: &[(String, CellValue)],
    ) -> Result<bool> {
        if values.is_empty() {
            return Ok(true);
        }

        let set_clause = values
            .iter()
            .map(|(field, _)| format!("{} = ?", quote_ident(field)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            quote_ident(table_name),
            set_clause
        );

        let mut query = sqlx::query(&sql);
        for (_, value) in values {
            query = bind_value(query, value.clone());
        }
        query = query.bind(row_id);

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to update row: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_row(&self, table_name: &str, row_id: i64) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", quote_ident(table_name));
        let result = sqlx::query(&sql)
            .bind(row_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete row: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_map(row: &SqliteRow, columns: &[DatasetColumn]) -> Result<Map<String, Value>> {
    let mut map = Map::new();

    let id: i64 = row
        .try_get(0)
        .map_err(|e| AppError::DatabaseError(format!("Failed to read row id: {}", e)))?;
    map.insert("id".to_string(), Value::from(id));

    for (index, column) in columns.iter().enumerate() {
        let idx = index + 1;
        let read_err =
            |e: sqlx::Error| AppError::DatabaseError(format!("Failed to read column: {}", e));

        let value = match column.data_type {
            DataType::Boolean => row
                .try_get::<Option<i64>, _>(idx)
                .map_err(read_err)?
                .map(|v| Value::Bool(v != 0))
                .unwrap_or(Value::Null),
            DataType::Integer => row
                .try_get::<Option<i64>, _>(idx)
                .map_err(read_err)?
                .map(Value::from)
                .unwrap_or(Value::Null),
            DataType::Float => row
                .try_get::<Option<f64>, _>(idx)
                .map_err(read_err)?
                .and_then(|v| serde_json::Number::from_f64(v).map(Value::Number))
                .unwrap_or(Value::Null),
            DataType::Text | DataType::Date | DataType::DateTime => row
                .try_get::<Option<String>, _>(idx)
                .map_err(read_err)?
                .map(Value::String)
                .unwrap_or(Value::Null),
        };

        map.insert(column.field_name.clone(), value);
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::connection::test_pool;
    use serde_json::json;

    fn schema() -> Vec<DatasetColumn> {
        let column = |field: &str, data_type, nullable, unique, position| DatasetColumn {
            name: field.to_string(),
            field_name: field.to_string(),
            data_type,
            nullable,
            unique,
            max_length: None,
            sample_values: Vec::new(),
            position,
        };

        vec![
            column("name", DataType::Text, false, true, 0),
            column("score", DataType::Integer, false, false, 1),
            column("active", DataType::Boolean, true, false, 2),
        ]
    }

    fn sample_table() -> DataTable {
        let cell = |s: &str| Some(s.to_string());
        DataTable::new(
            vec!["name".into(), "score".into(), "active".into()],
            vec![
                vec![cell("Alice"), cell("10"), cell("yes")],
                vec![cell("Bob"), cell("20"), cell("no")],
                vec![cell("Carol"), cell("30"), None],
            ],
        )
    }

    async fn manager() -> DynamicTableManager {
        DynamicTableManager::new(test_pool().await)
    }

    #[tokio::test]
    async fn test_create_table_is_idempotent() {
        let manager = manager().await;
        manager.create_table("dataset_t1", &schema()).await.unwrap();
        manager.create_table("dataset_t1", &schema()).await.unwrap();
    }

    #[tokio::test]
    async fn test_bulk_load_and_query() {
        let manager = manager().await;
        let columns = schema();
        manager.create_table("dataset_t2", &columns).await.unwrap();

        let inserted = manager
            .bulk_load("dataset_t2", &columns, &sample_table())
            .await
            .unwrap();
        assert_eq!(inserted, 3);

        let rows = manager
            .query("dataset_t2", &columns, &[], None, None, None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[0]["name"], json!("Alice"));
        assert_eq!(rows[0]["score"], json!(10));
        assert_eq!(rows[0]["active"], json!(true));
        assert_eq!(rows[2]["active"], Value::Null);
    }

    #[tokio::test]
    async fn test_query_filters_and_ordering() {
        let manager = manager().await;
        let columns = schema();
        manager.create_table("dataset_t3", &columns).await.unwrap();
        manager
            .bulk_load("dataset_t3", &columns, &sample_table())
            .await
            .unwrap();

        let filtered = manager
            .query(
                "dataset_t3",
                &columns,
                &[("name".to_string(), CellValue::Text("Bob".to_string()))],
                None,
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0]["score"], json!(20));

        let descending = manager
            .query("dataset_t3", &columns, &[], Some("-score"), Some(2), None)
            .await
            .unwrap();
        assert_eq!(descending[0]["score"], json!(30));
        assert_eq!(descending[1]["score"], json!(20));

        let count = manager.count_rows("dataset_t3", &[]).await.unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_single_row_crud() {
        let manager = manager().await;
        let columns = schema();
        manager.create_table("dataset_t4", &columns).await.unwrap();

        let id = manager
            .insert_row(
                "dataset_t4",
                &[
                    ("name".to_string(), CellValue::Text("Dave".to_string())),
                    ("score".to_string(), CellValue::Integer(7)),
                    ("active".to_string(), CellValue::Integer(1)),
                ],
            )
            .await
            .unwrap();

        let row = manager
            .get_row("dataset_t4", &columns, id)
            .await
            .unwrap()
            .expect("row exists");
        assert_eq!(row["name"], json!("Dave"));
        assert_eq!(row["active"], json!(true));

        let updated = manager
            .update_row(
                "dataset_t4",
                id,
                &[("score".to_string(), CellValue::Integer(8))],
            )
            .await
            .unwrap();
        assert!(updated);

        let row = manager
            .get_row("dataset_t4", &columns, id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["score"], json!(8));

        assert!(manager.delete_row("dataset_t4", id).await.unwrap());
        assert!(!manager.delete_row("dataset_t4", id).await.unwrap());
        assert!(manager
            .get_row("dataset_t4", &columns, id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unique_constraint_enforced() {
        let manager = manager().await;
        let columns = schema();
        manager.create_table("dataset_t5", &columns).await.unwrap();

        let values = vec![
            ("name".to_string(), CellValue::Text("Dup".to_string())),
            ("score".to_string(), CellValue::Integer(1)),
        ];
        manager.insert_row("dataset_t5", &values).await.unwrap();
        let err = manager.insert_row("dataset_t5", &values).await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(_)));
    }

    #[tokio::test]
    async fn test_drop_table_is_idempotent_and_frees_name() {
        let manager = manager().await;
        let columns = schema();
        manager.create_table("dataset_t6", &columns).await.unwrap();
        manager.drop_table("dataset_t6").await.unwrap();
        manager.drop_table("dataset_t6").await.unwrap();
        // The name is reusable after a drop.
        manager.create_table("dataset_t6", &columns).await.unwrap();
    }

    #[tokio::test]
    async fn test_identifier_quoting() {
        assert_eq!(quote_ident("name"), "\"name\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
