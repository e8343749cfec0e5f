use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// API key used as the ownership principal for datasets.
///
/// The full key (`ss_{prefix}_{secret}`) is returned exactly once at issuance;
/// only the prefix and a salted SHA-256 of the secret are stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub prefix: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApiKeyInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
}
