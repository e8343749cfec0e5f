//! Rate limiter for the public API.
//!
//! Fixed one-hour windows tracked in memory per (API key, scope):
//! - upload: dataset creation and re-processing
//! - read: list/retrieve on generated APIs
//! - write: create/update/delete on generated APIs

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

const WINDOW: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    Upload,
    Read,
    Write,
}

/// Requests allowed per hour for each scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub upload_per_hour: u32,
    pub read_per_hour: u32,
    pub write_per_hour: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            upload_per_hour: 10,
            read_per_hour: 1000,
            write_per_hour: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Exceeded { retry_after_seconds: u64 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed)
    }
}

#[derive(Debug)]
struct WindowState {
    started_at: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<(String, RateLimitScope), WindowState>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn limit_for(&self, scope: RateLimitScope) -> u32 {
        match scope {
            RateLimitScope::Upload => self.config.upload_per_hour,
            RateLimitScope::Read => self.config.read_per_hour,
            RateLimitScope::Write => self.config.write_per_hour,
        }
    }

    /// Count one request against the key's window and report whether it is
    /// allowed. The counter increments only on allowed requests.
    pub fn check(&self, api_key_id: &str, scope: RateLimitScope) -> RateLimitResult {
        let limit = self.limit_for(scope);
        if limit == 0 {
            return RateLimitResult::Allowed;
        }

        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();
        let state = windows
            .entry((api_key_id.to_string(), scope))
            .or_insert(WindowState {
                started_at: now,
                count: 0,
            });

        if now.duration_since(state.started_at) >= WINDOW {
            state.started_at = now;
            state.count = 0;
        }

        if state.count >= limit {
            let elapsed = now.duration_since(state.started_at);
            let retry_after_seconds = WINDOW.saturating_sub(elapsed).as_secs().max(1);
            return RateLimitResult::Exceeded {
                retry_after_seconds,
            };
        }

        state.count += 1;
        RateLimitResult::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            upload_per_hour: limit,
            read_per_hour: limit,
            write_per_hour: limit,
        })
    }

    #[test]
    fn test_allows_up_to_limit_then_blocks() {
        let limiter = limiter(3);
        for _ in 0..3 {
            assert!(limiter.check("key-1", RateLimitScope::Read).is_allowed());
        }
        match limiter.check("key-1", RateLimitScope::Read) {
            RateLimitResult::Exceeded {
                retry_after_seconds,
            } => assert!(retry_after_seconds > 0),
            RateLimitResult::Allowed => panic!("expected limit to trip"),
        }
    }

    #[test]
    fn test_scopes_and_keys_are_independent() {
        let limiter = limiter(1);
        assert!(limiter.check("key-1", RateLimitScope::Read).is_allowed());
        assert!(limiter.check("key-1", RateLimitScope::Write).is_allowed());
        assert!(limiter.check("key-2", RateLimitScope::Read).is_allowed());
        assert!(!limiter.check("key-1", RateLimitScope::Read).is_allowed());
    }

    #[test]
    fn test_zero_limit_disables_enforcement() {
        let limiter = limiter(0);
        for _ in 0..100 {
            assert!(limiter.check("key-1", RateLimitScope::Upload).is_allowed());
        }
    }
}
