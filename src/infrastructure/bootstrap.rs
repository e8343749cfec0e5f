use std::sync::Arc;

use actix_web::web;
use tracing::info;

use crate::application::use_cases::pipeline::ProcessingPipeline;
use crate::application::use_cases::rate_limiter::RateLimiter;
use crate::application::use_cases::registry::ApiRegistry;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db::api_keys::ApiKeyRepository;
use crate::infrastructure::db::connection::{connect_pool, init_db};
use crate::infrastructure::db::datasets::DatasetRepository;
use crate::infrastructure::db::dynamic::DynamicTableManager;
use crate::infrastructure::parse::{FileParser, ParseLimits};
use crate::interfaces::http::{start_server, HttpState};

/// Wire everything up and run the HTTP server until shutdown.
///
/// Ready datasets are re-registered before the server starts accepting
/// requests, so every pre-existing API is servable from the first request.
pub async fn run(config: AppConfig) -> Result<()> {
    std::fs::create_dir_all(&config.uploads_dir)
        .map_err(|e| AppError::IoError(format!("Failed to create uploads dir: {}", e)))?;

    if let Some(db_path) = config
        .database_url
        .strip_prefix("sqlite://")
        .map(std::path::Path::new)
    {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::IoError(format!("Failed to create database dir: {}", e))
                })?;
            }
        }
    }

    let pool = connect_pool(&config.database_url).await?;
    init_db(&pool).await?;

    let registry = Arc::new(ApiRegistry::new());
    let datasets = DatasetRepository::new(pool.clone());
    let api_keys = ApiKeyRepository::new(pool.clone(), config.api_key_salt.clone());
    let tables = DynamicTableManager::new(pool);
    let parser = FileParser::new(ParseLimits {
        max_rows: config.max_rows,
        max_columns: config.max_columns,
    });
    let pipeline = ProcessingPipeline::new(
        datasets.clone(),
        tables.clone(),
        registry.clone(),
        parser,
    );

    pipeline.reload_ready_datasets().await?;

    let rate_limiter = RateLimiter::new(config.rate_limits.clone());
    let bind = format!("{}:{}", config.host, config.port);

    let state = web::Data::new(HttpState {
        config,
        datasets,
        api_keys,
        tables,
        registry,
        pipeline,
        rate_limiter,
    });

    let server = start_server(state)
        .map_err(|e| AppError::Internal(format!("Failed to start HTTP server: {}", e)))?;

    info!(address = bind.as_str(), "listening");

    server
        .await
        .map_err(|e| AppError::Internal(format!("HTTP server failed: {}", e)))
}
