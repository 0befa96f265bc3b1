//! Repository listings from the GitHub REST API.

use serde_json::Value;

use crate::config::{Config, GITHUB_REPO_COUNT};

/// Looks up a user's public repositories on an external service.
pub trait RepoLookup: Send + Sync {
    /// `Ok(None)` when the service does not know `username`; `Err` when the
    /// service could not be reached or answered garbage.
    fn repositories(&self, username: &str) -> anyhow::Result<Option<Vec<Value>>>;
}

#[derive(Debug, Clone)]
pub struct GithubSettings {
    pub api_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl GithubSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_url: config.github_api_url.trim_end_matches('/').to_string(),
            client_id: config.github_client_id.clone(),
            client_secret: config.github_client_secret.clone(),
        }
    }

    /// Repositories of `username`, sorted by creation date.
    pub fn repos_url(&self, username: &str) -> String {
        let mut url = format!(
            "{}/users/{}/repos?per_page={}&sort=created:asc",
            self.api_url,
            urlencoding::encode(username),
            GITHUB_REPO_COUNT
        );
        if let (Some(id), Some(secret)) = (&self.client_id, &self.client_secret) {
            url.push_str(&format!(
                "&client_id={}&client_secret={}",
                urlencoding::encode(id),
                urlencoding::encode(secret)
            ));
        }
        url
    }
}

pub const USER_AGENT: &str = concat!("devlink/", env!("CARGO_PKG_VERSION"));

#[cfg(not(target_arch = "wasm32"))]
pub use native::GithubClient;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::time::Duration;

    use anyhow::Context;
    use serde_json::Value;
    use tracing::{debug, warn};

    use super::{GithubSettings, RepoLookup, USER_AGENT};

    /// Blocking client; call it from a thread that may block.
    pub struct GithubClient {
        settings: GithubSettings,
        timeout: Duration,
    }

    impl GithubClient {
        pub fn new(settings: GithubSettings) -> Self {
            Self {
                settings,
                timeout: Duration::from_secs(10),
            }
        }
    }

    impl RepoLookup for GithubClient {
        fn repositories(&self, username: &str) -> anyhow::Result<Option<Vec<Value>>> {
            // the blocking client owns a runtime, keep it on this thread
            let client = reqwest::blocking::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(self.timeout)
                .build()
                .context("building GitHub client")?;

            let url = self.settings.repos_url(username);
            debug!(%username, "fetching GitHub repositories");
            let response = client
                .get(&url)
                .send()
                .with_context(|| format!("requesting repositories for {username}"))?;

            if !response.status().is_success() {
                warn!(%username, status = response.status().as_u16(), "GitHub lookup missed");
                return Ok(None);
            }

            let repos = response
                .json::<Vec<Value>>()
                .with_context(|| format!("decoding repositories for {username}"))?;
            Ok(Some(repos))
        }
    }
}
