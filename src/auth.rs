use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::core::errors::ApiError;
use crate::core::helpers::{ok_json, ApiRequest, ApiResponse};
use crate::core::token::TokenService;
use crate::core::validate::{Checks, Validate};
use crate::handlers::{App, Call};
use crate::models::models::{Id, PublicUser};
use crate::users;

pub const TOKEN_HEADER: &str = "x-auth-token";

/// The caller, as proven by a verified token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Id,
}

/// Token from `x-auth-token`, falling back to `Authorization: Bearer`.
pub fn token_from(request: &ApiRequest) -> Option<&str> {
    let headers = request.headers();
    if let Some(token) = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(token.trim()).filter(|t| !t.is_empty());
    }
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The auth gate. Pure token check, no storage access.
pub fn authenticate(tokens: &TokenService, request: &ApiRequest) -> Result<Identity, ApiError> {
    let token = token_from(request).ok_or(ApiError::Unauthenticated(
        "No token, authorization denied",
    ))?;

    match tokens.verify(token) {
        Ok(user_id) => Ok(Identity { user_id }),
        Err(e) => {
            warn!(reason = %e, "rejected token");
            Err(ApiError::Unauthenticated("Token is not valid"))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Validate for LoginForm {
    type Valid = Credentials;

    fn validate(self) -> Result<Credentials, ApiError> {
        let mut checks = Checks::new();
        let email = checks.email("email", self.email.as_deref(), "Please include a valid email");
        let password = checks.present("password", self.password, "Password is required");
        checks.finish()?;

        match (email, password) {
            (Some(email), Some(password)) => Ok(Credentials { email, password }),
            _ => Err(ApiError::validation("body", "Invalid credentials")),
        }
    }
}

/// Verifies credentials and issues a token. Unknown email and wrong password
/// are the same error, reached after the same amount of hashing.
pub fn login(app: &App, credentials: &Credentials) -> Result<String, ApiError> {
    let user = users::find_by_email(app.db(), &credentials.email)?;

    let matched = match &user {
        Some(user) => app.hashing().verify(&credentials.password, &user.password),
        None => app.hashing().verify_decoy(&credentials.password),
    };

    match user {
        Some(user) if matched => {
            info!(user_id = %user.id, "user logged in");
            issue_token(app, user.id)
        }
        _ => Err(ApiError::InvalidCredentials),
    }
}

pub fn issue_token(app: &App, user_id: Id) -> Result<String, ApiError> {
    app.tokens()
        .issue(user_id)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("issuing token: {e}")))
}

// POST /auth
pub fn login_user(app: &App, call: &Call<'_>) -> Result<ApiResponse, ApiError> {
    let credentials = call.form::<LoginForm>()?;
    let token = login(app, &credentials)?;
    Ok(ok_json(&json!({ "token": token }))?)
}

// GET /auth
pub fn current_user(app: &App, _call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    let user = users::find_by_id(app.db(), &identity.user_id)?
        .ok_or(ApiError::NotFound("User not found"))?;
    Ok(ok_json(&PublicUser::from(&user))?)
}
