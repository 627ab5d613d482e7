use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;

use crate::response::AppError;
use crate::state::AppState;

/// Fixed-window counter per client IP. Windows are anchored to the epoch
/// second of the first request, so a full map scan is never needed to decide
/// a single request.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window_secs: u64,
    max_requests: u64,
    windows: Arc<Mutex<HashMap<IpAddr, Window>>>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    opened_at: u64,
    used: u64,
}

/// Outcome of one admission check, also the source for the X-RateLimit-*
/// response headers.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: u64,
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl RateLimiter {
    pub fn new(window_secs: u64, max_requests: u64) -> Self {
        Self {
            window_secs,
            max_requests,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn check(&self, ip: IpAddr) -> Decision {
        let now = epoch_secs();
        let mut windows = self.windows.lock().await;

        let window = windows.entry(ip).or_insert(Window {
            opened_at: now,
            used: 0,
        });
        if now.saturating_sub(window.opened_at) >= self.window_secs {
            *window = Window {
                opened_at: now,
                used: 0,
            };
        }

        let allowed = window.used < self.max_requests;
        if allowed {
            window.used += 1;
        }

        Decision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(window.used),
            reset_at: window.opened_at + self.window_secs,
        }
    }

    /// Drop windows that expired at least one full window ago.
    pub async fn evict_stale(&self) {
        let now = epoch_secs();
        let horizon = self.window_secs * 2;
        self.windows
            .lock()
            .await
            .retain(|_, w| now.saturating_sub(w.opened_at) <= horizon);
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub limiter: RateLimiter,
}

impl RateLimitState {
    pub fn new(window_secs: u64, max_requests: u64) -> Self {
        Self {
            limiter: RateLimiter::new(window_secs, max_requests),
        }
    }
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(req.headers(), state.config().trust_proxy);
    let decision = state.rate_limit().limiter.check(ip).await;

    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        AppError::too_many_requests("Too many requests, please slow down").into_response()
    };

    let headers = response.headers_mut();
    for (name, value) in [
        ("x-ratelimit-limit", decision.limit),
        ("x-ratelimit-remaining", decision.remaining),
        ("x-ratelimit-reset", decision.reset_at),
    ] {
        if let Ok(v) = value.to_string().parse() {
            headers.insert(name, v);
        }
    }

    Ok(response)
}

/// Background task dropping idle windows so the map does not grow with one
/// entry per IP ever seen.
pub async fn eviction_loop(state: AppState) {
    let mut shutdown_rx = state.shutdown_rx();
    let mut tick = tokio::time::interval(Duration::from_secs(300));
    loop {
        tokio::select! {
            _ = tick.tick() => state.rate_limit().limiter.evict_stale().await,
            _ = shutdown_rx.recv() => break,
        }
    }
}

/// 客户端 IP 解析：仅在 TRUST_PROXY=true 时信任 x-forwarded-for 首个地址，
/// 否则一律视为直连（代理头可被伪造）。
fn client_ip(headers: &HeaderMap, trust_proxy: bool) -> IpAddr {
    let forwarded = trust_proxy
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());

    forwarded.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
