pub mod auth;
pub mod health;
pub mod session_records;
pub mod users;

use axum::extract::DefaultBodyLimit;
use axum::middleware as axum_middleware;
use axum::response::IntoResponse;
use axum::Router;

use crate::middleware::rate_limit::rate_limit_middleware;
use crate::middleware::request_id::request_id_middleware;
use crate::response::AppError;
use crate::state::AppState;

/// 路由组装：/api 下的业务路由带限流和请求体大小限制，
/// /health 不带（探针不应被限流挡住）。request_id 中间件在最外层。
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/session-records", session_records::router())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(DefaultBodyLimit::max(64 * 1024));

    Router::new()
        .nest("/api", api)
        .nest("/health", health::router())
        .fallback(not_found_handler)
        .layer(axum_middleware::from_fn(request_id_middleware))
        .with_state(state)
}

async fn not_found_handler() -> impl IntoResponse {
    AppError::not_found("Route not found")
}
