use actix_web::{post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use validator::Validate;

use crate::domain::api_key::ApiKeyInput;
use crate::domain::error::{AppError, Result};

use super::HttpState;

#[derive(Serialize)]
struct ApiKeyResponse {
    id: String,
    name: String,
    prefix: String,
    /// Full key, shown exactly once.
    key: String,
    created_at: DateTime<Utc>,
}

/// Issue a new API key. Unauthenticated on purpose: this is how a caller
/// bootstraps their first principal.
#[post("/keys")]
pub async fn create_key(
    data: web::Data<HttpState>,
    body: web::Json<ApiKeyInput>,
) -> Result<HttpResponse> {
    body.validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let (api_key, full_key) = data.api_keys.generate(body.name.trim()).await?;

    Ok(HttpResponse::Created().json(ApiKeyResponse {
        id: api_key.id,
        name: api_key.name,
        prefix: api_key.prefix,
        key: full_key,
        created_at: api_key.created_at,
    }))
}
