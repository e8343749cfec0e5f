use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::application::use_cases::rate_limiter::RateLimitConfig;
use crate::domain::error::{AppError, Result};

/// Service configuration, loaded from `sheetserve.toml` and `SHEETSERVE_`
/// environment variables on top of the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub uploads_dir: String,
    /// Maximum accepted upload size in bytes.
    pub max_upload_size: usize,
    /// Caps applied after empty rows/columns are dropped.
    pub max_rows: usize,
    pub max_columns: usize,
    pub api_key_salt: String,
    pub cors_allowed_origins: Vec<String>,
    pub rate_limits: RateLimitConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            database_url: "sqlite://data/sheetserve.db".to_string(),
            uploads_dir: "data/uploads".to_string(),
            max_upload_size: 10 * 1024 * 1024,
            max_rows: 100_000,
            max_columns: 100,
            api_key_salt: "change-this-salt-in-production".to_string(),
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            rate_limits: RateLimitConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file("sheetserve.toml"))
            .merge(Env::prefixed("SHEETSERVE_"))
            .extract()
            .map_err(|e| AppError::Internal(format!("Failed to load configuration: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.max_columns, 100);
        assert_eq!(config.max_rows, 100_000);
        assert!(config.max_upload_size > 0);
    }
}
