use http::{header, Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// One itemized problem with a request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub msg: String,
    pub param: String,
}

impl FieldError {
    pub fn new(param: &str, msg: &str) -> Self {
        Self {
            msg: msg.to_string(),
            param: param.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user already exists")]
    UserExists,
    #[error("unauthenticated: {0}")]
    Unauthenticated(&'static str),
    #[error("forbidden")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("post already liked")]
    AlreadyLiked,
    #[error("post not liked")]
    NotLiked,
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidCredentials
            | ApiError::UserExists
            | ApiError::AlreadyLiked
            | ApiError::NotLiked => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) | ApiError::Forbidden => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing JSON body. Internal and upstream details stay in the logs.
    pub fn body(&self) -> serde_json::Value {
        match self {
            ApiError::Validation(errors) => json!({ "errors": errors }),
            ApiError::InvalidCredentials => json!({ "errors": [{ "msg": "Invalid credentials" }] }),
            ApiError::UserExists => json!({ "errors": [{ "msg": "User already exists" }] }),
            ApiError::Unauthenticated(msg) | ApiError::NotFound(msg) => json!({ "msg": msg }),
            ApiError::Forbidden => json!({ "msg": "User not authorized" }),
            ApiError::AlreadyLiked => json!({ "msg": "Post already liked" }),
            ApiError::NotLiked => json!({ "msg": "Post has not yet been liked" }),
            ApiError::Upstream(_) => json!({ "msg": "Upstream service unavailable" }),
            ApiError::Internal(_) => json!({ "msg": "Server error" }),
        }
    }

    pub fn validation(param: &str, msg: &str) -> Self {
        ApiError::Validation(vec![FieldError::new(param, msg)])
    }
}

impl From<ApiError> for Response<Vec<u8>> {
    fn from(err: ApiError) -> Self {
        match &err {
            ApiError::Internal(e) => tracing::error!(error = %format!("{e:#}"), "request failed"),
            ApiError::Upstream(detail) => tracing::warn!(%detail, "upstream call failed"),
            _ => {}
        }

        let body = serde_json::to_vec(&err.body()).unwrap_or_default();
        let mut response = Response::new(body);
        *response.status_mut() = err.status();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        response
    }
}
