use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Runtime configuration, resolved once at startup from the environment
/// (after dotenvy has loaded `.env`). Every knob has a development default.
#[derive(Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub jwt_secret: String,
    pub jwt_expires_in_hours: u64,
    pub cors_origin: String,
    pub trust_proxy: bool,
    pub rate_limit: RateLimitConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u64,
}

#[derive(Clone)]
pub struct LlmConfig {
    /// 为 true 时完全不出网，聊天补全由内置的确定性桩实现应答。
    pub mock: bool,
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_parsed("HOST", IpAddr::from([127, 0, 0, 1])),
            port: env_parsed("PORT", 3000),
            log_level: env_string("RUST_LOG", "info"),
            enable_file_logs: env_flag("ENABLE_FILE_LOGS", false),
            log_dir: env_string("LOG_DIR", "./logs"),
            sled_path: env_string("SLED_PATH", "./data/teachme.sled"),
            jwt_secret: env_string("JWT_SECRET", "dev_secret_change_me_in_production"),
            jwt_expires_in_hours: env_parsed("JWT_EXPIRES_IN_HOURS", 24),
            cors_origin: env_string("CORS_ORIGIN", "http://localhost:3000"),
            trust_proxy: env_flag("TRUST_PROXY", false),
            rate_limit: RateLimitConfig {
                window_secs: env_parsed("RATE_LIMIT_WINDOW_SECS", 900),
                max_requests: env_parsed("RATE_LIMIT_MAX", 500),
            },
            llm: LlmConfig {
                mock: env_flag("LLM_MOCK", true),
                api_url: env_string("LLM_API_URL", "https://api.openai.com/v1"),
                api_key: env_string("OPENAI_API_KEY", ""),
                model: env_string("LLM_MODEL", "gpt-3.5-turbo"),
                timeout_secs: env_parsed("LLM_TIMEOUT_SECS", 30),
            },
        }
    }
}

const REDACTED: &str = "***REDACTED***";

// 手写 Debug：jwt_secret / api_key 不允许出现在任何日志里。
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("enable_file_logs", &self.enable_file_logs)
            .field("log_dir", &self.log_dir)
            .field("sled_path", &self.sled_path)
            .field("jwt_secret", &REDACTED)
            .field("jwt_expires_in_hours", &self.jwt_expires_in_hours)
            .field("cors_origin", &self.cors_origin)
            .field("trust_proxy", &self.trust_proxy)
            .field("rate_limit", &self.rate_limit)
            .field("llm", &self.llm)
            .finish()
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("mock", &self.mock)
            .field("api_url", &self.api_url)
            .field("api_key", &REDACTED)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
