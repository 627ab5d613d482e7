use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use axum::Router;
use tokio::sync::broadcast;

use teachme_backend::config::{Config, LlmConfig, RateLimitConfig};
use teachme_backend::routes::build_router;
use teachme_backend::services::llm_provider::LlmProvider;
use teachme_backend::services::tutor::TutorService;
use teachme_backend::state::AppState;
use teachme_backend::store::Store;

/// In-process app over a throwaway sled directory and the mock completion
/// client. Dropping the struct removes the directory.
pub struct TestApp {
    pub router: Router,
    _tmp: tempfile::TempDir,
}

/// Config built directly instead of from env so parallel tests cannot race
/// on process-global environment variables.
pub fn test_config() -> Config {
    Config {
        host: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
        port: 0,
        log_level: "warn".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: String::new(),
        jwt_secret: "test_secret_test_secret_test_secret_test_secret".to_string(),
        jwt_expires_in_hours: 1,
        cors_origin: "http://localhost:3000".to_string(),
        trust_proxy: false,
        rate_limit: RateLimitConfig {
            window_secs: 60,
            // High enough that no test trips the limiter by accident
            max_requests: 100_000,
        },
        llm: LlmConfig {
            mock: true,
            api_url: String::new(),
            api_key: String::new(),
            model: "test".to_string(),
            timeout_secs: 1,
        },
    }
}

pub fn spawn_test_app() -> TestApp {
    spawn_test_app_with(test_config())
}

pub fn spawn_test_app_with(config: Config) -> TestApp {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(
        Store::open(tmp.path().join("test.sled").to_str().expect("path")).expect("open store"),
    );
    store.run_migrations().expect("migrations");

    let tutor = Arc::new(TutorService::new(LlmProvider::new(&config.llm)));
    let (shutdown_tx, _) = broadcast::channel(4);
    let state = AppState::new(store, tutor, &config, shutdown_tx);

    TestApp {
        router: build_router(state),
        _tmp: tmp,
    }
}
