use std::env;
use std::fmt::Display;
use std::str::FromStr;

use chrono::{Duration, Utc};
use rand::RngCore;
use tracing::{info, warn};

use crate::models::models::Id;

pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_POST_LENGTH: usize = 5000;
pub const MAX_COMMENT_LENGTH: usize = 2000;
pub const POSTS_PER_PAGE: usize = 20;
pub const MAX_POSTS_PER_PAGE: usize = 100;
pub const GITHUB_REPO_COUNT: usize = 5;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_TOKEN_EXPIRATION_HOURS: i64 = 100;
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_HASH_MEMORY_KIB: u32 = 19 * 1024;
pub const DEFAULT_HASH_ITERATIONS: u32 = 2;

// === Storage keys ===
pub const USERS_LIST_KEY: &str = "users_list";
pub const PROFILES_LIST_KEY: &str = "profiles_list";
pub const FEED_KEY: &str = "feed";

pub fn user_key(id: &Id) -> String {
    format!("user:{}", id)
}

pub fn email_key(email: &str) -> String {
    format!("email:{}", email)
}

pub fn profile_key(user_id: &Id) -> String {
    format!("profile:{}", user_id)
}

pub fn post_key(id: &Id) -> String {
    format!("post:{}", id)
}

/// Process configuration, read from `DEVLINK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub jwt_secret: Vec<u8>,
    pub token_expiration_hours: i64,
    pub github_api_url: String,
    pub github_client_id: Option<String>,
    pub github_client_secret: Option<String>,
    pub hash_memory_kib: u32,
    pub hash_iterations: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = match optional("DEVLINK_JWT_SECRET") {
            Some(secret) => secret.into_bytes(),
            None => {
                warn!("DEVLINK_JWT_SECRET not set, tokens will not survive a restart");
                random_secret()
            }
        };

        let token_expiration_hours = token_lifetime(parse_or(
            "DEVLINK_TOKEN_EXPIRATION_HOURS",
            DEFAULT_TOKEN_EXPIRATION_HOURS,
        )?)?;

        Ok(Self {
            bind_addr: optional("DEVLINK_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            jwt_secret,
            token_expiration_hours,
            github_api_url: optional("DEVLINK_GITHUB_API_URL")
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            github_client_id: optional("DEVLINK_GITHUB_CLIENT_ID"),
            github_client_secret: optional("DEVLINK_GITHUB_CLIENT_SECRET"),
            hash_memory_kib: parse_or("DEVLINK_HASH_MEMORY_KIB", DEFAULT_HASH_MEMORY_KIB)?,
            hash_iterations: parse_or("DEVLINK_HASH_ITERATIONS", DEFAULT_HASH_ITERATIONS)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            jwt_secret: random_secret(),
            token_expiration_hours: DEFAULT_TOKEN_EXPIRATION_HOURS,
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            github_client_id: None,
            github_client_secret: None,
            hash_memory_kib: DEFAULT_HASH_MEMORY_KIB,
            hash_iterations: DEFAULT_HASH_ITERATIONS,
        }
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {key} value {raw:?}: {e}")),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

/// Accepts a token lifetime only if tokens issued now can carry its expiry.
fn token_lifetime(hours: i64) -> anyhow::Result<i64> {
    if hours <= 0 {
        anyhow::bail!("DEVLINK_TOKEN_EXPIRATION_HOURS must be positive");
    }
    Duration::try_hours(hours)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .map(|_| hours)
        .ok_or_else(|| anyhow::anyhow!("DEVLINK_TOKEN_EXPIRATION_HOURS {hours} is too large"))
}

fn random_secret() -> Vec<u8> {
    let mut secret = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keys_are_namespaced() {
        let id: Id = "1b4e28ba-2fa1-41d2-883f-0016d3cca427".parse().unwrap();
        assert_eq!(user_key(&id), "user:1b4e28ba-2fa1-41d2-883f-0016d3cca427");
        assert_eq!(profile_key(&id), "profile:1b4e28ba-2fa1-41d2-883f-0016d3cca427");
        assert_eq!(post_key(&id), "post:1b4e28ba-2fa1-41d2-883f-0016d3cca427");
        assert_eq!(email_key("a@b.com"), "email:a@b.com");
    }

    #[test]
    fn default_config_has_random_secret() {
        let a = Config::default();
        let b = Config::default();
        assert_eq!(a.jwt_secret.len(), 32);
        assert_ne!(a.jwt_secret, b.jwt_secret);
        assert_eq!(a.token_expiration_hours, 100);
    }

    #[test]
    fn token_lifetime_bounds() {
        assert_eq!(token_lifetime(100).unwrap(), 100);
        assert!(token_lifetime(0).is_err());
        assert!(token_lifetime(-5).is_err());
        assert!(token_lifetime(i64::MAX).is_err());
        assert!(token_lifetime(10_000_000_000).is_err());
    }
}
