use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::response::ok;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    store: &'static str,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    // 探活时顺便检查存储可用性（读一个不存在的键即可触发 IO 路径）
    let store_status = match state.store().get_user_by_id("__health__") {
        Ok(_) => "ok",
        Err(e) => {
            tracing::error!(error = %e, "Store health probe failed");
            "degraded"
        }
    };

    ok(HealthResponse {
        status: "ok",
        uptime_secs: state.uptime_secs(),
        store: store_status,
    })
}
