use actix_web::http::header;
use actix_web::HttpRequest;

use crate::application::use_cases::rate_limiter::{RateLimitResult, RateLimitScope};
use crate::domain::api_key::ApiKey;
use crate::domain::dataset::Dataset;
use crate::domain::error::{AppError, Result};

use super::HttpState;

/// Resolve the caller's API key from `Authorization: Api-Key <key>` (or
/// `Bearer <key>`), falling back to the `X-Api-Key` header.
pub async fn authenticate(req: &HttpRequest, state: &HttpState) -> Result<ApiKey> {
    let from_authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            let mut parts = value.splitn(2, ' ');
            match (parts.next(), parts.next()) {
                (Some("Api-Key"), Some(key)) | (Some("Bearer"), Some(key)) => Some(key.trim()),
                _ => None,
            }
        });

    let token = from_authorization
        .or_else(|| {
            req.headers()
                .get("X-Api-Key")
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
        })
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("API key required".to_string()))?;

    state.api_keys.validate(token).await
}

pub fn check_rate_limit(state: &HttpState, api_key_id: &str, scope: RateLimitScope) -> Result<()> {
    match state.rate_limiter.check(api_key_id, scope) {
        RateLimitResult::Allowed => Ok(()),
        RateLimitResult::Exceeded {
            retry_after_seconds,
        } => Err(AppError::RateLimited(format!(
            "Too many requests. Retry in {} seconds.",
            retry_after_seconds
        ))),
    }
}

/// CRUD and delete require the caller's ownership key to match the dataset's.
pub fn check_ownership(dataset: &Dataset, key: &ApiKey) -> Result<()> {
    if dataset.api_key_id == key.id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You do not have access to this dataset".to_string(),
        ))
    }
}
