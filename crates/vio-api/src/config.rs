//! # Service Configuration
//!
//! Every setting can be passed as a flag or through the environment. The
//! binary parses [`AppConfig`] once at start-up; tests build it directly.

use clap::Parser;

/// Attachment cap used when `APPEAL_MAX_ATTACHMENTS` is zero or negative.
pub const DEFAULT_MAX_ATTACHMENTS: usize = 5;

#[derive(Parser, Clone)]
#[command(name = "vio-api", about = "Violation and appeal workflow service")]
pub struct AppConfig {
    #[arg(long, env = "HTTP_HOST", default_value = "0.0.0.0")]
    pub http_host: String,

    #[arg(long, env = "HTTP_PORT", default_value_t = 7086)]
    pub http_port: u16,

    /// `production` switches logs to JSON.
    #[arg(long, env = "APP_ENV", default_value = "development")]
    pub app_env: String,

    /// Postgres URL. Without it the service runs on the in-memory store.
    #[arg(long, env = "DB_DSN")]
    pub db_dsn: Option<String>,

    #[arg(long, env = "DB_MAX_OPEN_CONNS", default_value_t = 20)]
    pub db_max_open_conns: u32,

    #[arg(long, env = "DB_MAX_IDLE_CONNS", default_value_t = 2)]
    pub db_max_idle_conns: u32,

    #[arg(long, env = "DB_CONN_MAX_LIFETIME_SECS", default_value_t = 1800)]
    pub db_conn_max_lifetime_secs: u64,

    /// HS256 secret for access tokens.
    #[arg(long, env = "JWT_ACCESS_SECRET")]
    pub jwt_access_secret: String,

    #[arg(long, env = "APPEAL_MAX_ATTACHMENTS", default_value_t = 5, allow_hyphen_values = true)]
    pub appeal_max_attachments: i64,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Effective attachment cap per appeal action.
    pub fn max_attachments(&self) -> usize {
        usize::try_from(self.appeal_max_attachments)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_ATTACHMENTS)
    }

    /// Configuration for tests and local runs: in-memory store, fixed secret.
    pub fn for_tests(secret: &str) -> Self {
        Self {
            http_host: "127.0.0.1".to_string(),
            http_port: 0,
            app_env: "test".to_string(),
            db_dsn: None,
            db_max_open_conns: 5,
            db_max_idle_conns: 1,
            db_conn_max_lifetime_secs: 60,
            jwt_access_secret: secret.to_string(),
            appeal_max_attachments: DEFAULT_MAX_ATTACHMENTS as i64,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("http_host", &self.http_host)
            .field("http_port", &self.http_port)
            .field("app_env", &self.app_env)
            .field("db_dsn", &self.db_dsn.as_ref().map(|_| "[REDACTED]"))
            .field("db_max_open_conns", &self.db_max_open_conns)
            .field("db_max_idle_conns", &self.db_max_idle_conns)
            .field("db_conn_max_lifetime_secs", &self.db_conn_max_lifetime_secs)
            .field("jwt_access_secret", &"[REDACTED]")
            .field("appeal_max_attachments", &self.appeal_max_attachments)
            .finish()
    }
}
