use axum::http::StatusCode;
use axum::Router;
use serde_json::json;

use super::http;

/// Register a fresh user and return their bearer token.
pub async fn register(router: &Router, email: &str) -> String {
    let (status, body) = http::post(
        router,
        "/api/auth/register",
        None,
        Some(json!({
            "email": email,
            "name": "Test User",
            "password": "Passw0rd123",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    body["data"]["token"]
        .as_str()
        .expect("token in register response")
        .to_string()
}
