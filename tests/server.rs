#![cfg(not(target_arch = "wasm32"))]

use std::sync::Arc;

use actix_web::{test, web};
use devlink::core::helpers::PasswordHashing;
use devlink::core::store::Db;
use devlink::core::token::TokenService;
use devlink::github::RepoLookup;
use devlink::App;
use serde_json::{json, Value};

struct NoGithub;

impl RepoLookup for NoGithub {
    fn repositories(&self, _username: &str) -> anyhow::Result<Option<Vec<Value>>> {
        Ok(None)
    }
}

fn app() -> web::Data<App> {
    web::Data::new(App::new(
        Db::in_memory(),
        TokenService::with_hours(b"server-secret", 100).unwrap(),
        PasswordHashing::new(1024, 1).unwrap(),
        Arc::new(NoGithub),
    ))
}

#[actix_web::test]
async fn test_health_over_http() {
    let service =
        test::init_service(actix_web::App::new().configure(devlink::server::configure(app()))).await;

    let response = test::call_service(&service, test::TestRequest::get().uri("/").to_request()).await;
    assert!(response.status().is_success());
    let body = test::read_body(response).await;
    assert_eq!(&body[..], b"API Running");
}

#[actix_web::test]
async fn test_register_then_read_back_over_http() {
    let service =
        test::init_service(actix_web::App::new().configure(devlink::server::configure(app()))).await;

    let request = test::TestRequest::post()
        .uri("/users")
        .set_json(json!({"name": "Ada", "email": "ada@example.com", "password": "secret123"}))
        .to_request();
    let registered: Value = test::call_and_read_body_json(&service, request).await;
    let token = registered["token"].as_str().unwrap();

    let request = test::TestRequest::get()
        .uri("/auth")
        .insert_header(("x-auth-token", token))
        .to_request();
    let response = test::call_service(&service, request).await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    let me: Value = test::read_body_json(response).await;
    assert_eq!(me["email"], "ada@example.com");
}

#[actix_web::test]
async fn test_errors_keep_their_status_over_http() {
    let service =
        test::init_service(actix_web::App::new().configure(devlink::server::configure(app()))).await;

    let request = test::TestRequest::get().uri("/posts").to_request();
    let response = test::call_service(&service, request).await;
    assert_eq!(response.status().as_u16(), 401);

    let request = test::TestRequest::get().uri("/profile/github/ghost").to_request();
    let response = test::call_service(&service, request).await;
    assert_eq!(response.status().as_u16(), 404);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body, json!({"msg": "No Github profile found"}));
}

#[actix_web::test]
async fn test_native_app_starts_empty() {
    let config = devlink::config::Config {
        hash_memory_kib: 1024,
        hash_iterations: 1,
        ..devlink::config::Config::default()
    };
    let app = web::Data::new(devlink::server::build_app(&config).unwrap());
    let service =
        test::init_service(actix_web::App::new().configure(devlink::server::configure(app))).await;

    let request = test::TestRequest::get().uri("/profile").to_request();
    let profiles: Value = test::call_and_read_body_json(&service, request).await;
    assert_eq!(profiles, json!([]));
}
