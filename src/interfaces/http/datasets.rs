// ============================================================
// DATASET MANAGEMENT ENDPOINTS
// ============================================================
// Upload, inspect, re-process, and delete datasets

use std::path::Path;

use actix_web::{delete, get, post, web, HttpRequest, HttpResponse, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::application::use_cases::rate_limiter::RateLimitScope;
use crate::domain::dataset::{Dataset, DatasetColumn, DatasetStatus};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::db::datasets::NewDataset;
use crate::infrastructure::parse::FileParser;

use super::auth::{authenticate, check_ownership, check_rate_limit};
use super::HttpState;

pub fn scope() -> Scope {
    web::scope("/datasets")
        .service(list_datasets)
        .service(upload_dataset)
        .service(get_dataset)
        .service(get_schema)
        .service(reprocess_dataset)
        .service(delete_dataset)
}

#[derive(Serialize)]
struct DatasetSummary {
    id: String,
    name: String,
    slug: String,
    status: DatasetStatus,
    row_count: i64,
    created_at: DateTime<Utc>,
    api_url: String,
}

impl From<Dataset> for DatasetSummary {
    fn from(d: Dataset) -> Self {
        let api_url = d.api_url();
        Self {
            id: d.id,
            name: d.name,
            slug: d.slug,
            status: d.status,
            row_count: d.row_count,
            created_at: d.created_at,
            api_url,
        }
    }
}

#[derive(Serialize)]
struct DatasetDetail {
    id: String,
    name: String,
    slug: String,
    original_filename: String,
    file_size: i64,
    status: DatasetStatus,
    error_message: String,
    row_count: i64,
    table_name: String,
    columns: Vec<DatasetColumn>,
    api_url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DatasetDetail {
    fn new(d: Dataset, columns: Vec<DatasetColumn>) -> Self {
        let api_url = d.api_url();
        Self {
            id: d.id,
            name: d.name,
            slug: d.slug,
            original_filename: d.original_filename,
            file_size: d.file_size,
            status: d.status,
            error_message: d.error_message,
            row_count: d.row_count,
            table_name: d.table_name,
            columns,
            api_url,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

async fn detail_for(data: &HttpState, slug: &str) -> Result<DatasetDetail> {
    let dataset = data.datasets.find_by_slug(slug).await?;
    let columns = data.datasets.columns_for(&dataset.id).await?;
    Ok(DatasetDetail::new(dataset, columns))
}

/// Fetch the dataset and verify the caller owns it.
async fn owned_dataset(data: &HttpState, req: &HttpRequest, slug: &str) -> Result<Dataset> {
    let key = authenticate(req, data).await?;
    let dataset = data.datasets.find_by_slug(slug).await?;
    check_ownership(&dataset, &key)?;
    Ok(dataset)
}

#[get("")]
async fn list_datasets(req: HttpRequest, data: web::Data<HttpState>) -> Result<HttpResponse> {
    let key = authenticate(&req, &data).await?;
    check_rate_limit(&data, &key.id, RateLimitScope::Read)?;

    let datasets = data.datasets.list_by_owner(&key.id).await?;
    let summaries: Vec<DatasetSummary> = datasets.into_iter().map(|d| d.into()).collect();

    Ok(HttpResponse::Ok().json(summaries))
}

#[derive(Deserialize, Validate)]
struct UploadQuery {
    #[validate(length(min = 1, max = 255))]
    name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    filename: String,
}

/// Upload a file as raw request bytes; `filename` (and optionally `name`)
/// arrive as query parameters. The pipeline runs synchronously, so the 201
/// response already carries the final `ready` or `error` state.
#[post("")]
async fn upload_dataset(
    req: HttpRequest,
    data: web::Data<HttpState>,
    query: web::Query<UploadQuery>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let key = authenticate(&req, &data).await?;
    check_rate_limit(&data, &key.id, RateLimitScope::Upload)?;
    query
        .validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let filename = query
        .filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .to_string();

    if !FileParser::supported_extension(&filename) {
        return Err(AppError::ValidationError(
            "Unsupported file type. Please upload CSV or Excel files only.".to_string(),
        ));
    }
    if body.is_empty() {
        return Err(AppError::ValidationError(
            "Uploaded file is empty.".to_string(),
        ));
    }
    if body.len() > data.config.max_upload_size {
        return Err(AppError::ValidationError(format!(
            "File too large. Maximum size is {} bytes.",
            data.config.max_upload_size
        )));
    }

    let stored_name = format!("{}_{}", Uuid::new_v4().simple(), filename);
    let stored_path = Path::new(&data.config.uploads_dir).join(stored_name);
    std::fs::write(&stored_path, &body)
        .map_err(|e| AppError::IoError(format!("Failed to store upload: {}", e)))?;

    let name = query
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(&filename)
        .to_string();

    let dataset = data
        .datasets
        .create(NewDataset {
            name,
            original_filename: filename,
            file_path: stored_path.to_string_lossy().to_string(),
            file_size: body.len() as i64,
            api_key_id: key.id,
        })
        .await?;

    info!(slug = dataset.slug.as_str(), "dataset uploaded");

    // A pipeline failure is already recorded on the record; the response
    // reports it through the dataset's status and error_message.
    let _ = data.pipeline.process(&dataset).await;

    let detail = detail_for(&data, &dataset.slug).await?;
    Ok(HttpResponse::Created().json(detail))
}

#[get("/{slug}")]
async fn get_dataset(
    req: HttpRequest,
    data: web::Data<HttpState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let slug = path.into_inner();
    let dataset = owned_dataset(&data, &req, &slug).await?;
    let columns = data.datasets.columns_for(&dataset.id).await?;

    Ok(HttpResponse::Ok().json(DatasetDetail::new(dataset, columns)))
}

#[get("/{slug}/schema")]
async fn get_schema(
    req: HttpRequest,
    data: web::Data<HttpState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let slug = path.into_inner();
    let dataset = owned_dataset(&data, &req, &slug).await?;
    let columns = data.datasets.columns_for(&dataset.id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "dataset": dataset.slug,
        "columns": columns,
    })))
}

/// Re-run the full pipeline against the stored upload, replacing the schema,
/// the backing table, and the registry entry wholesale.
#[post("/{slug}/reprocess")]
async fn reprocess_dataset(
    req: HttpRequest,
    data: web::Data<HttpState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let slug = path.into_inner();
    let dataset = owned_dataset(&data, &req, &slug).await?;
    check_rate_limit(&data, &dataset.api_key_id, RateLimitScope::Upload)?;

    let _ = data.pipeline.reprocess(&dataset).await;

    let detail = detail_for(&data, &slug).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// Delete a dataset: backing table first, then the registry entry, then the
/// record, so a request can never hit a registered slug whose table is gone.
#[delete("/{slug}")]
async fn delete_dataset(
    req: HttpRequest,
    data: web::Data<HttpState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let slug = path.into_inner();
    let dataset = owned_dataset(&data, &req, &slug).await?;
    check_rate_limit(&data, &dataset.api_key_id, RateLimitScope::Write)?;

    data.pipeline.delete_dataset(&dataset).await?;

    Ok(HttpResponse::NoContent().finish())
}
