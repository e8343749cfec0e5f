// ============================================================
// GENERATED CRUD SURFACE
// ============================================================
// One generic executor serves every dataset, parameterized at
// request time by the registry entry for the slug

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::{delete, get, patch, post, put, web, HttpRequest, HttpResponse, Scope};
use serde_json::Value;

use crate::application::use_cases::coerce::{coerce_filter, coerce_json, CellValue};
use crate::application::use_cases::rate_limiter::RateLimitScope;
use crate::application::use_cases::registry::RegistryEntry;
use crate::domain::dataset::DatasetColumn;
use crate::domain::error::{AppError, Result};

use super::auth::{authenticate, check_ownership, check_rate_limit};
use super::HttpState;

const DEFAULT_PAGE_SIZE: i64 = 25;
const MAX_PAGE_SIZE: i64 = 100;

pub fn scope() -> Scope {
    web::scope("/data")
        .service(list_rows)
        .service(create_row)
        .service(retrieve_row)
        .service(update_row)
        .service(partial_update_row)
        .service(destroy_row)
}

/// Authenticate, rate-limit, resolve the slug through the registry, and
/// verify ownership. Every handler starts here; an unregistered slug is a
/// 404 no matter what the datasets table says.
async fn resolve(
    req: &HttpRequest,
    data: &HttpState,
    slug: &str,
    scope: RateLimitScope,
) -> Result<Arc<RegistryEntry>> {
    let key = authenticate(req, data).await?;
    check_rate_limit(data, &key.id, scope)?;

    let entry = data
        .registry
        .lookup(slug)
        .ok_or_else(|| AppError::NotFound(format!("Dataset not found: {}", slug)))?;

    let dataset = data.datasets.find_by_slug(slug).await?;
    check_ownership(&dataset, &key)?;

    Ok(entry)
}

fn parse_row_id(raw: &str) -> Result<i64> {
    raw.parse::<i64>()
        .map_err(|_| AppError::ValidationError(format!("Invalid row id: {}", raw)))
}

fn find_column<'a>(columns: &'a [DatasetColumn], field: &str) -> Option<&'a DatasetColumn> {
    columns.iter().find(|c| c.field_name == field)
}

/// Validate a request body against the descriptors and coerce each present
/// field. With `partial` unset, every non-nullable field must be present.
/// Explicit nulls on non-nullable fields are rejected in both modes.
fn build_row_values(
    columns: &[DatasetColumn],
    body: &Value,
    partial: bool,
) -> Result<Vec<(String, CellValue)>> {
    let object = body
        .as_object()
        .ok_or_else(|| AppError::ValidationError("Request body must be a JSON object".to_string()))?;

    let mut values = Vec::new();
    for column in columns {
        match object.get(&column.field_name) {
            Some(value) => {
                let cell = coerce_json(&column.field_name, value, column.data_type)?;
                if cell.is_null() && !column.nullable {
                    return Err(AppError::ValidationError(format!(
                        "Field '{}' may not be null",
                        column.field_name
                    )));
                }
                values.push((column.field_name.clone(), cell));
            }
            None if partial => continue,
            None if column.nullable => continue,
            None => {
                return Err(AppError::ValidationError(format!(
                    "Field '{}' is required",
                    column.field_name
                )));
            }
        }
    }

    Ok(values)
}

#[get("/{slug}")]
async fn list_rows(
    req: HttpRequest,
    data: web::Data<HttpState>,
    path: web::Path<String>,
    query: web::Query<HashMap<String, String>>,
) -> Result<HttpResponse> {
    let slug = path.into_inner();
    let entry = resolve(&req, &data, &slug, RateLimitScope::Read).await?;

    let mut page: i64 = 1;
    let mut page_size: i64 = DEFAULT_PAGE_SIZE;
    let mut ordering: Option<String> = None;
    let mut filters: Vec<(String, CellValue)> = Vec::new();

    for (param, raw) in query.iter() {
        match param.as_str() {
            "page" => {
                page = raw
                    .parse::<i64>()
                    .ok()
                    .filter(|p| *p >= 1)
                    .ok_or_else(|| {
                        AppError::ValidationError(format!("Invalid page: {}", raw))
                    })?;
            }
            "page_size" => {
                page_size = raw
                    .parse::<i64>()
                    .ok()
                    .filter(|p| *p >= 1)
                    .ok_or_else(|| {
                        AppError::ValidationError(format!("Invalid page_size: {}", raw))
                    })?
                    .min(MAX_PAGE_SIZE);
            }
            "ordering" => {
                let field = raw.strip_prefix('-').unwrap_or(raw);
                if field != "id" && find_column(&entry.columns, field).is_none() {
                    return Err(AppError::ValidationError(format!(
                        "Unknown ordering field: {}",
                        field
                    )));
                }
                ordering = Some(raw.clone());
            }
            field => {
                // Any other parameter must name a column to filter on;
                // unknown fields are rejected, never silently ignored.
                let column = find_column(&entry.columns, field).ok_or_else(|| {
                    AppError::ValidationError(format!("Unknown filter field: {}", field))
                })?;
                filters.push((
                    column.field_name.clone(),
                    coerce_filter(field, raw, column.data_type)?,
                ));
            }
        }
    }

    let offset = (page - 1) * page_size;
    let rows = data
        .tables
        .query(
            &entry.table_name,
            &entry.columns,
            &filters,
            ordering.as_deref(),
            Some(page_size),
            Some(offset),
        )
        .await?;
    let count = data.tables.count_rows(&entry.table_name, &filters).await?;

    let next = if offset + page_size < count {
        Some(format!("?page={}", page + 1))
    } else {
        None
    };
    let previous = if page > 1 {
        Some(format!("?page={}", page - 1))
    } else {
        None
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "count": count,
        "next": next,
        "previous": previous,
        "results": rows,
    })))
}

#[post("/{slug}")]
async fn create_row(
    req: HttpRequest,
    data: web::Data<HttpState>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> Result<HttpResponse> {
    let slug = path.into_inner();
    let entry = resolve(&req, &data, &slug, RateLimitScope::Write).await?;

    let values = build_row_values(&entry.columns, &body, false)?;
    let row_id = data.tables.insert_row(&entry.table_name, &values).await?;

    let row = data
        .tables
        .get_row(&entry.table_name, &entry.columns, row_id)
        .await?
        .ok_or_else(|| AppError::Internal("Inserted row disappeared".to_string()))?;

    Ok(HttpResponse::Created().json(row))
}

#[get("/{slug}/{id}")]
async fn retrieve_row(
    req: HttpRequest,
    data: web::Data<HttpState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (slug, raw_id) = path.into_inner();
    let entry = resolve(&req, &data, &slug, RateLimitScope::Read).await?;
    let row_id = parse_row_id(&raw_id)?;

    let row = data
        .tables
        .get_row(&entry.table_name, &entry.columns, row_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Row not found: {}", row_id)))?;

    Ok(HttpResponse::Ok().json(row))
}

#[put("/{slug}/{id}")]
async fn update_row(
    req: HttpRequest,
    data: web::Data<HttpState>,
    path: web::Path<(String, String)>,
    body: web::Json<Value>,
) -> Result<HttpResponse> {
    replace_row(req, data, path, body, false).await
}

#[patch("/{slug}/{id}")]
async fn partial_update_row(
    req: HttpRequest,
    data: web::Data<HttpState>,
    path: web::Path<(String, String)>,
    body: web::Json<Value>,
) -> Result<HttpResponse> {
    replace_row(req, data, path, body, true).await
}

async fn replace_row(
    req: HttpRequest,
    data: web::Data<HttpState>,
    path: web::Path<(String, String)>,
    body: web::Json<Value>,
    partial: bool,
) -> Result<HttpResponse> {
    let (slug, raw_id) = path.into_inner();
    let entry = resolve(&req, &data, &slug, RateLimitScope::Write).await?;
    let row_id = parse_row_id(&raw_id)?;

    if data
        .tables
        .get_row(&entry.table_name, &entry.columns, row_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(format!("Row not found: {}", row_id)));
    }

    let values = build_row_values(&entry.columns, &body, partial)?;
    data.tables
        .update_row(&entry.table_name, row_id, &values)
        .await?;

    let row = data
        .tables
        .get_row(&entry.table_name, &entry.columns, row_id)
        .await?
        .ok_or_else(|| AppError::Internal("Updated row disappeared".to_string()))?;

    Ok(HttpResponse::Ok().json(row))
}

#[delete("/{slug}/{id}")]
async fn destroy_row(
    req: HttpRequest,
    data: web::Data<HttpState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (slug, raw_id) = path.into_inner();
    let entry = resolve(&req, &data, &slug, RateLimitScope::Write).await?;
    let row_id = parse_row_id(&raw_id)?;

    let deleted = data.tables.delete_row(&entry.table_name, row_id).await?;
    if !deleted {
        return Err(AppError::NotFound(format!("Row not found: {}", row_id)));
    }

    Ok(HttpResponse::NoContent().finish())
}
