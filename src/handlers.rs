//! Route table and request pipeline.
//!
//! Every route is data: a method, a path pattern and an [`Access`] level
//! carrying the handler. Private routes pass through the auth gate before
//! their handler runs and receive the resolved [`Identity`]. Handlers decode
//! and validate their body first, then touch storage, then check ownership
//! before writing.

use std::collections::HashMap;
use std::sync::Arc;

use http::{header, Method, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::auth::{self, Identity};
use crate::config::Config;
use crate::core::errors::ApiError;
use crate::core::helpers::{ApiRequest, ApiResponse, PasswordHashing};
use crate::core::query_params::parse_query_params;
use crate::core::store::{Db, KvStore};
use crate::core::token::TokenService;
use crate::core::validate::Validate;
use crate::github::RepoLookup;
use crate::models::models::Id;
use crate::{posts, profile, users};

pub type PublicHandler = fn(&App, &Call<'_>) -> Result<ApiResponse, ApiError>;
pub type PrivateHandler = fn(&App, &Call<'_>, Identity) -> Result<ApiResponse, ApiError>;

pub enum Access {
    Public(PublicHandler),
    Private(PrivateHandler),
}

pub struct Route {
    pub method: Method,
    pub pattern: &'static str,
    pub access: Access,
}

impl Route {
    fn public(method: Method, pattern: &'static str, handler: PublicHandler) -> Self {
        Self { method, pattern, access: Access::Public(handler) }
    }

    fn private(method: Method, pattern: &'static str, handler: PrivateHandler) -> Self {
        Self { method, pattern, access: Access::Private(handler) }
    }
}

pub fn routes() -> Vec<Route> {
    vec![
        Route::public(Method::GET, "/", health),
        // accounts
        Route::public(Method::POST, "/users", users::register),
        Route::private(Method::GET, "/auth", auth::current_user),
        Route::public(Method::POST, "/auth", auth::login_user),
        // profiles
        Route::private(Method::GET, "/profile/me", profile::get_own_profile),
        Route::private(Method::POST, "/profile", profile::upsert_profile),
        Route::public(Method::GET, "/profile", profile::list_profiles),
        Route::public(Method::GET, "/profile/user/:user_id", profile::get_profile_by_user),
        Route::private(Method::DELETE, "/profile", profile::delete_account),
        Route::private(Method::PUT, "/profile/experience", profile::add_experience),
        Route::private(Method::PUT, "/profile/experience/:exp_id", profile::update_experience),
        Route::private(Method::DELETE, "/profile/experience/:exp_id", profile::remove_experience),
        Route::private(Method::PUT, "/profile/education", profile::add_education),
        Route::private(Method::PUT, "/profile/education/:edu_id", profile::update_education),
        Route::private(Method::DELETE, "/profile/education/:edu_id", profile::remove_education),
        Route::public(Method::GET, "/profile/github/:username", profile::github_repositories),
        // posts
        Route::private(Method::POST, "/posts", posts::create_post),
        Route::private(Method::GET, "/posts", posts::list_posts),
        Route::private(Method::GET, "/posts/:id", posts::get_post),
        Route::private(Method::DELETE, "/posts/:id", posts::delete_post),
        Route::private(Method::PUT, "/posts/like/:id", posts::like_post),
        Route::private(Method::PUT, "/posts/unlike/:id", posts::unlike_post),
        Route::private(Method::POST, "/posts/comment/:id", posts::add_comment),
        Route::private(Method::DELETE, "/posts/comment/:id/:comment_id", posts::delete_comment),
    ]
}

/// A matched request: the raw request plus its path parameters.
pub struct Call<'a> {
    pub request: &'a ApiRequest,
    params: Vec<(&'static str, String)>,
}

impl<'a> Call<'a> {
    pub fn new(request: &'a ApiRequest, params: Vec<(&'static str, String)>) -> Self {
        Self { request, params }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// An id path parameter. A malformed id cannot name anything, so it is
    /// reported as `not_found`.
    pub fn id_param(&self, name: &str, not_found: &'static str) -> Result<Id, ApiError> {
        self.param(name)
            .and_then(|raw| raw.parse().ok())
            .ok_or(ApiError::NotFound(not_found))
    }

    pub fn query(&self) -> HashMap<String, String> {
        self.request
            .uri()
            .path_and_query()
            .map(|pq| parse_query_params(pq.as_str()))
            .unwrap_or_default()
    }

    /// Decodes the JSON body into `F` and validates it. An empty body counts
    /// as `{}`.
    pub fn form<F>(&self) -> Result<F::Valid, ApiError>
    where
        F: DeserializeOwned + Validate,
    {
        let mut body: &[u8] = self.request.body();
        if body.iter().all(u8::is_ascii_whitespace) {
            body = b"{}";
        }
        let form: F = serde_json::from_slice(body).map_err(|e| {
            debug!(error = %e, "rejected request body");
            ApiError::validation("body", "Request body must be a valid JSON object")
        })?;
        form.validate()
    }
}

fn match_path(pattern: &'static str, path: &str) -> Option<Vec<(&'static str, String)>> {
    let mut params = Vec::new();
    let mut expected = pattern.trim_matches('/').split('/');
    let mut actual = path.trim_matches('/').split('/');

    loop {
        match (expected.next(), actual.next()) {
            (None, None) => return Some(params),
            (Some(want), Some(got)) => {
                if let Some(name) = want.strip_prefix(':') {
                    if got.is_empty() {
                        return None;
                    }
                    let decoded = urlencoding::decode(got)
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| got.to_string());
                    params.push((name, decoded));
                } else if want != got {
                    return None;
                }
            }
            _ => return None,
        }
    }
}

fn health(_app: &App, _call: &Call<'_>) -> Result<ApiResponse, ApiError> {
    let mut response = Response::new(b"API Running".to_vec());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    Ok(response)
}

/// Everything a request needs, shared across requests.
pub struct App {
    db: Db,
    tokens: TokenService,
    hashing: PasswordHashing,
    repos: Arc<dyn RepoLookup>,
    routes: Vec<Route>,
}

impl App {
    pub fn new(
        db: Db,
        tokens: TokenService,
        hashing: PasswordHashing,
        repos: Arc<dyn RepoLookup>,
    ) -> Self {
        Self {
            db,
            tokens,
            hashing,
            repos,
            routes: routes(),
        }
    }

    pub fn from_config(
        config: &Config,
        store: Arc<dyn KvStore>,
        repos: Arc<dyn RepoLookup>,
    ) -> anyhow::Result<Self> {
        Ok(Self::new(
            Db::new(store),
            TokenService::with_hours(&config.jwt_secret, config.token_expiration_hours)?,
            PasswordHashing::new(config.hash_memory_kib, config.hash_iterations)?,
            repos,
        ))
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn hashing(&self) -> &PasswordHashing {
        &self.hashing
    }

    pub fn repos(&self) -> &dyn RepoLookup {
        self.repos.as_ref()
    }

    /// Runs one request through the pipeline. Never fails: errors become
    /// their JSON responses here.
    pub fn dispatch(&self, request: ApiRequest) -> ApiResponse {
        let response = self.handle(&request).unwrap_or_else(Into::into);
        debug!(
            method = %request.method(),
            path = %request.uri().path(),
            status = response.status().as_u16(),
            "handled request"
        );
        response
    }

    fn handle(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let path = request.uri().path();

        for route in self.routes.iter().filter(|r| r.method == *request.method()) {
            let Some(params) = match_path(route.pattern, path) else {
                continue;
            };
            let call = Call::new(request, params);
            return match route.access {
                Access::Public(handler) => handler(self, &call),
                Access::Private(handler) => {
                    let identity = auth::authenticate(&self.tokens, request)?;
                    handler(self, &call, identity)
                }
            };
        }

        Err(ApiError::NotFound("Route not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_and_param_segments() {
        assert_eq!(match_path("/", "/"), Some(vec![]));
        assert_eq!(match_path("/posts", "/posts/"), Some(vec![]));
        assert_eq!(
            match_path("/posts/comment/:id/:comment_id", "/posts/comment/a/b"),
            Some(vec![("id", "a".to_string()), ("comment_id", "b".to_string())])
        );
        assert_eq!(match_path("/posts/:id", "/posts"), None);
        assert_eq!(match_path("/posts/:id", "/posts/a/b"), None);
        assert_eq!(match_path("/profile/me", "/profile/you"), None);
    }

    #[test]
    fn params_are_percent_decoded() {
        assert_eq!(
            match_path("/profile/github/:username", "/profile/github/ada%20l"),
            Some(vec![("username", "ada l".to_string())])
        );
    }

    #[test]
    fn every_route_pattern_is_unique_per_method() {
        let table = routes();
        for (i, a) in table.iter().enumerate() {
            for b in &table[i + 1..] {
                assert!(
                    !(a.method == b.method && a.pattern == b.pattern),
                    "duplicate route {} {}",
                    a.method,
                    a.pattern
                );
            }
        }
    }
}
