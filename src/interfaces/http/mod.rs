pub mod auth;
pub mod data_api;
pub mod datasets;
pub mod keys;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpResponse, HttpServer, ResponseError};

use crate::application::use_cases::pipeline::ProcessingPipeline;
use crate::application::use_cases::rate_limiter::RateLimiter;
use crate::application::use_cases::registry::ApiRegistry;
use crate::domain::error::AppError;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db::api_keys::ApiKeyRepository;
use crate::infrastructure::db::datasets::DatasetRepository;
use crate::infrastructure::db::dynamic::DynamicTableManager;

/// Shared state handed to every request handler.
pub struct HttpState {
    pub config: AppConfig,
    pub datasets: DatasetRepository,
    pub api_keys: ApiKeyRepository,
    pub tables: DynamicTableManager,
    pub registry: Arc<ApiRegistry>,
    pub pipeline: ProcessingPipeline,
    pub rate_limiter: RateLimiter,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_) | AppError::ParseError(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) | AppError::DatabaseError(_) | AppError::IoError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": true,
            "message": self.to_string(),
        }))
    }
}

fn build_cors(allowed_origins: &[String]) -> Cors {
    if allowed_origins.iter().any(|origin| origin == "*") {
        return Cors::permissive();
    }

    let mut cors = Cors::default().allow_any_method().allow_any_header();
    for origin in allowed_origins {
        cors = cors.allowed_origin(origin);
    }
    cors
}

pub fn start_server(state: web::Data<HttpState>) -> std::io::Result<Server> {
    let config = state.config.clone();
    let bind_addr = (config.host.clone(), config.port);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&config.cors_allowed_origins))
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(config.max_upload_size))
            .service(
                web::scope("/api/v1")
                    .service(keys::create_key)
                    .service(datasets::scope())
                    .service(data_api::scope()),
            )
    })
    .bind(bind_addr)?
    .run();

    Ok(server)
}
