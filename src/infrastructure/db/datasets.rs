use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::application::use_cases::naming::slugify;
use crate::domain::dataset::{DataType, Dataset, DatasetColumn, DatasetStatus};
use crate::domain::error::{AppError, Result};

/// Repository for dataset records and their column descriptors.
#[derive(Debug, Clone)]
pub struct DatasetRepository {
    pool: SqlitePool,
}

#[derive(Debug)]
pub struct NewDataset {
    pub name: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub api_key_id: String,
}

impl DatasetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a dataset in `processing` state. The slug is derived from the
    /// name and deduplicated; the table name is derived from the id. Both are
    /// fixed for the record's lifetime.
    pub async fn create(&self, input: NewDataset) -> Result<Dataset> {
        let id = Uuid::new_v4();
        let table_name = format!("dataset_{}", &id.simple().to_string()[..8]);

        let base_slug = slugify(&input.name);
        let mut slug = base_slug.clone();
        let mut counter = 1;
        while self.slug_exists(&slug).await? {
            slug = format!("{}-{}", base_slug, counter);
            counter += 1;
        }

        let entity = sqlx::query_as::<_, DatasetEntity>(
            "INSERT INTO datasets (id, name, slug, original_filename, file_path, file_size, status, table_name, api_key_id)
             VALUES (?, ?, ?, ?, ?, ?, 'processing', ?, ?) RETURNING *",
        )
        .bind(id.to_string())
        .bind(&input.name)
        .bind(&slug)
        .bind(&input.original_filename)
        .bind(&input.file_path)
        .bind(input.file_size)
        .bind(&table_name)
        .bind(&input.api_key_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create dataset: {}", e)))?;

        Ok(entity.into())
    }

    pub async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM datasets WHERE slug = ?")
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to check slug: {}", e)))?;
        Ok(count > 0)
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Dataset> {
        let entity = sqlx::query_as::<_, DatasetEntity>("SELECT * FROM datasets WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch dataset: {}", e)))?;

        match entity {
            Some(entity) => Ok(entity.into()),
            None => Err(AppError::NotFound(format!("Dataset not found: {}", slug))),
        }
    }

    pub async fn list_by_owner(&self, api_key_id: &str) -> Result<Vec<Dataset>> {
        let entities = sqlx::query_as::<_, DatasetEntity>(
            "SELECT * FROM datasets WHERE api_key_id = ? ORDER BY created_at DESC",
        )
        .bind(api_key_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list datasets: {}", e)))?;

        Ok(entities.into_iter().map(|e| e.into()).collect())
    }

    /// All `ready` datasets, oldest first. Used by the startup reload.
    pub async fn list_ready(&self) -> Result<Vec<Dataset>> {
        let entities = sqlx::query_as::<_, DatasetEntity>(
            "SELECT * FROM datasets WHERE status = 'ready' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list ready datasets: {}", e)))?;

        Ok(entities.into_iter().map(|e| e.into()).collect())
    }

    pub async fn update_status(&self, id: &str, status: DatasetStatus) -> Result<()> {
        sqlx::query(
            "UPDATE datasets SET status = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update status: {}", e)))?;
        Ok(())
    }

    pub async fn mark_ready(&self, id: &str, row_count: i64) -> Result<()> {
        sqlx::query(
            "UPDATE datasets SET status = 'ready', error_message = '', row_count = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(row_count)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to mark dataset ready: {}", e)))?;
        Ok(())
    }

    pub async fn mark_error(&self, id: &str, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE datasets SET status = 'error', error_message = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(message)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to mark dataset errored: {}", e)))?;
        Ok(())
    }

    /// Replace the dataset's column descriptors in one transaction, so a
    /// re-process either swaps the whole schema or leaves the old one intact.
    pub async fn replace_columns(&self, dataset_id: &str, columns: &[DatasetColumn]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query("DELETE FROM dataset_columns WHERE dataset_id = ?")
            .bind(dataset_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to clear columns: {}", e)))?;

        for column in columns {
            let samples = serde_json::to_string(&column.sample_values)
                .unwrap_or_else(|_| "[]".to_string());
            sqlx::query(
                "INSERT INTO dataset_columns (dataset_id, name, field_name, data_type, nullable, is_unique, max_length, sample_values, position)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(dataset_id)
            .bind(&column.name)
            .bind(&column.field_name)
            .bind(column.data_type.as_str())
            .bind(column.nullable as i64)
            .bind(column.unique as i64)
            .bind(column.max_length)
            .bind(samples)
            .bind(column.position)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to insert column: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit columns: {}", e)))?;

        Ok(())
    }

    pub async fn columns_for(&self, dataset_id: &str) -> Result<Vec<DatasetColumn>> {
        let entities = sqlx::query_as::<_, ColumnEntity>(
            "SELECT name, field_name, data_type, nullable, is_unique, max_length, sample_values, position
             FROM dataset_columns WHERE dataset_id = ? ORDER BY position ASC",
        )
        .bind(dataset_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch columns: {}", e)))?;

        Ok(entities.into_iter().map(|e| e.into()).collect())
    }

    /// Delete the dataset record (column descriptors cascade).
    pub async fn delete(&self, id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM datasets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete dataset: {}", e)))?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct DatasetEntity {
    id: String,
    name: String,
    slug: String,
    original_filename: String,
    file_path: String,
    file_size: i64,
    status: String,
    error_message: String,
    row_count: i64,
    table_name: String,
    api_key_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DatasetEntity> for Dataset {
    fn from(e: DatasetEntity) -> Self {
        Self {
            id: e.id,
            name: e.name,
            slug: e.slug,
            original_filename: e.original_filename,
            file_path: e.file_path,
            file_size: e.file_size,
            status: DatasetStatus::from_str(&e.status),
            error_message: e.error_message,
            row_count: e.row_count,
            table_name: e.table_name,
            api_key_id: e.api_key_id,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ColumnEntity {
    name: String,
    field_name: String,
    data_type: String,
    nullable: i64,
    is_unique: i64,
    max_length: Option<i64>,
    sample_values: String,
    position: i64,
}

impl From<ColumnEntity> for DatasetColumn {
    fn from(e: ColumnEntity) -> Self {
        Self {
            name: e.name,
            field_name: e.field_name,
            data_type: DataType::from_str(&e.data_type),
            nullable: e.nullable != 0,
            unique: e.is_unique != 0,
            max_length: e.max_length,
            sample_values: serde_json::from_str(&e.sample_values).unwrap_or_default(),
            position: e.position,
        }
    }
}
