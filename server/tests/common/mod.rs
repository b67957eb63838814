#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use skillswap_server::config::Config;
use skillswap_server::routes;
use skillswap_server::state::AppState;
use skillswap_server::store::Repositories;

pub const ADMIN_EMAIL: &str = "admin@example.com";

pub fn test_config() -> Config {
    Config {
        bcrypt_cost: 4,
        admin_emails: vec![ADMIN_EMAIL.to_string()],
        counter_audit_cron: None,
        rate_limit_max: 0,
        ..Config::default()
    }
}

pub fn test_app() -> (Router, AppState) {
    let state = AppState::new(Repositories::in_memory(), &test_config());
    (routes::app(state.clone()), state)
}

/// Send a JSON request and decode the envelope
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

pub fn registration(name: &str, email: &str) -> Value {
    json!({
        "name": name,
        "email": email,
        "password": "Secret123",
        "confirmPassword": "Secret123",
        "location": "Berlin",
        "skillsOffered": ["Python"],
        "skillsWanted": ["Guitar"],
        "availability": { "weekends": true }
    })
}

/// Register a user and return `(token, id)`
pub async fn register(app: &Router, name: &str, email: &str) -> (String, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(registration(name, email)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    (
        body["data"]["token"].as_str().expect("token").to_string(),
        body["data"]["user"]["id"].as_str().expect("id").to_string(),
    )
}
