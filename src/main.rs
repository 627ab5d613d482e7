use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use teachme_backend::config::Config;
use teachme_backend::logging;
use teachme_backend::routes::build_router;
use teachme_backend::services::llm_provider::LlmProvider;
use teachme_backend::services::tutor::TutorService;
use teachme_backend::state::AppState;
use teachme_backend::store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    logging::init_tracing(&logging::LogConfig {
        log_level: config.log_level.clone(),
        enable_file_logs: config.enable_file_logs,
        log_dir: config.log_dir.clone(),
    });
    tracing::info!(?config, "Starting teachme-backend");

    LlmProvider::validate_config(&config.llm);

    let store = Arc::new(Store::open(&config.sled_path)?);
    store.run_migrations()?;

    let tutor = Arc::new(TutorService::new(LlmProvider::new(&config.llm)));

    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let state = AppState::new(store.clone(), tutor, &config, shutdown_tx.clone());

    tokio::spawn(teachme_backend::middleware::rate_limit::eviction_loop(
        state.clone(),
    ));

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    let app = build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ));

    let addr = std::net::SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    // 关闭前把 sled 缓冲刷到磁盘
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Store flush on shutdown failed");
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Resolve on ctrl-c, SIGTERM, or an in-process shutdown broadcast.
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let mut shutdown_rx = shutdown_tx.subscribe();

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received ctrl-c"),
        _ = terminate => tracing::info!("Received SIGTERM"),
        _ = shutdown_rx.recv() => tracing::info!("Received in-process shutdown"),
    }
}
