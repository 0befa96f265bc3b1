//! actix-web front end for the native build.

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{web, App as HttpApp, HttpRequest, HttpResponse, HttpServer};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::helpers::{ApiRequest, ApiResponse};
use crate::core::store::MemoryStore;
use crate::github::{GithubClient, GithubSettings};
use crate::handlers::App;

/// Native app over an in-memory store: nothing persists past the process.
pub fn build_app(config: &Config) -> anyhow::Result<App> {
    let repos = GithubClient::new(GithubSettings::from_config(config));
    App::from_config(config, Arc::new(MemoryStore::new()), Arc::new(repos))
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let app = web::Data::new(build_app(&config)?);
    warn!("using the in-memory store, accounts and posts are lost on restart");
    info!("Server listening on http://{}", config.bind_addr);

    HttpServer::new(move || HttpApp::new().configure(configure(app.clone())))
        .bind(&config.bind_addr)?
        .run()
        .await?;
    Ok(())
}

/// Routes every request into the shared [`App`].
pub fn configure(app: web::Data<App>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(app).default_service(web::route().to(handle_all));
    }
}

async fn handle_all(app: web::Data<App>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let request = match to_api_request(&req, body) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "could not translate request");
            return HttpResponse::BadRequest().json(serde_json::json!({"msg": "Invalid request"}));
        }
    };

    // hashing and outbound calls block, keep them off the async workers
    let app = app.into_inner();
    match web::block(move || app.dispatch(request)).await {
        Ok(response) => to_http_response(response),
        Err(e) => {
            error!(error = %e, "request worker failed");
            HttpResponse::InternalServerError().json(serde_json::json!({"msg": "Server error"}))
        }
    }
}

fn to_api_request(req: &HttpRequest, body: web::Bytes) -> anyhow::Result<ApiRequest> {
    let method = http::Method::from_bytes(req.method().as_str().as_bytes())?;
    let mut builder = http::Request::builder()
        .method(method)
        .uri(req.uri().to_string());

    for (name, value) in req.headers() {
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    Ok(builder.body(body.to_vec())?)
}

fn to_http_response(response: ApiResponse) -> HttpResponse {
    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = HttpResponse::build(status);

    for (name, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            builder.insert_header((name.as_str(), value));
        }
    }

    builder.body(response.into_body())
}
