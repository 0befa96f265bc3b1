//! Spin HTTP component entry point (wasm32 only).

use std::sync::{Arc, OnceLock};

use anyhow::Context;
use serde_json::Value;
use spin_sdk::http::{IntoResponse, Method, Request, Response};
use spin_sdk::http_component;
use spin_sdk::key_value::Store;

use crate::config::Config;
use crate::core::helpers::ApiRequest;
use crate::core::store::KvStore;
use crate::github::{GithubSettings, RepoLookup, USER_AGENT};
use crate::handlers::App;

/// Spin's default key-value store, opened per operation.
struct SpinStore;

impl SpinStore {
    fn open() -> anyhow::Result<Store> {
        Store::open_default().map_err(|e| anyhow::anyhow!("opening key-value store: {e}"))
    }
}

impl KvStore for SpinStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Self::open()?
            .get(key)
            .map_err(|e| anyhow::anyhow!("reading {key}: {e}"))
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        Self::open()?
            .set(key, value)
            .map_err(|e| anyhow::anyhow!("writing {key}: {e}"))
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        Self::open()?
            .delete(key)
            .map_err(|e| anyhow::anyhow!("deleting {key}: {e}"))
    }
}

/// GitHub lookups through Spin outbound HTTP.
struct SpinGithub {
    settings: GithubSettings,
}

impl RepoLookup for SpinGithub {
    fn repositories(&self, username: &str) -> anyhow::Result<Option<Vec<Value>>> {
        let request = Request::builder()
            .method(Method::Get)
            .uri(self.settings.repos_url(username))
            .header("User-Agent", USER_AGENT)
            .build();

        let response: Response = spin_sdk::http::run(spin_sdk::http::send(request))
            .map_err(|e| anyhow::anyhow!("requesting repositories for {username}: {e}"))?;

        if !(200..300).contains(response.status()) {
            return Ok(None);
        }
        let repos = serde_json::from_slice(response.body())
            .with_context(|| format!("decoding repositories for {username}"))?;
        Ok(Some(repos))
    }
}

fn app() -> anyhow::Result<&'static App> {
    static APP: OnceLock<App> = OnceLock::new();
    if let Some(app) = APP.get() {
        return Ok(app);
    }
    let config = Config::from_env()?;
    let repos = SpinGithub {
        settings: GithubSettings::from_config(&config),
    };
    let app = App::from_config(&config, Arc::new(SpinStore), Arc::new(repos))?;
    Ok(APP.get_or_init(|| app))
}

fn to_api_request(req: &Request) -> anyhow::Result<ApiRequest> {
    let method = http::Method::from_bytes(req.method().to_string().as_bytes())?;
    let mut builder = http::Request::builder().method(method).uri(req.uri());
    for (name, value) in req.headers() {
        builder = builder.header(name, value.as_bytes());
    }
    Ok(builder.body(req.body().to_vec())?)
}

#[http_component]
fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
    let response = app()?.dispatch(to_api_request(&req)?);

    let mut builder = Response::builder();
    builder.status(response.status().as_u16());
    for (name, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            builder.header(name.as_str(), value);
        }
    }
    Ok(builder.body(response.into_body()).build())
}
