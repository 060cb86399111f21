//! API server configuration.

use edugate_core::auth::jwt::resolve_secret;
use edugate_core::auth::password::BCRYPT_COST;

/// Configuration for the API server.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Access-token signing secret.
    pub access_secret: String,
    /// Access-token lifetime, e.g. `"15m"`.
    pub access_duration: String,
    /// Refresh-token signing secret. Must differ from `access_secret`.
    pub refresh_secret: String,
    /// Refresh-token lifetime, e.g. `"7d"`.
    pub refresh_duration: String,
    /// Mark auth cookies `Secure`.
    pub secure_cookies: bool,
    /// bcrypt cost factor for new password hashes.
    pub bcrypt_cost: u32,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("access_duration", &self.access_duration)
            .field("refresh_duration", &self.refresh_duration)
            .field("secure_cookies", &self.secure_cookies)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish_non_exhaustive()
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable             | Default                                  |
    /// |----------------------|------------------------------------------|
    /// | `BIND_ADDR`          | `127.0.0.1:3100`                         |
    /// | `DATABASE_URL`       | `postgres://localhost:5432/edugate`      |
    /// | `JWT_ACCESS_SECRET`  | generated & persisted to file            |
    /// | `JWT_EXPIRES_IN`     | `15m`                                    |
    /// | `JWT_REFRESH_SECRET` | generated & persisted to file            |
    /// | `JWT_REFRESH_EXPIRES_IN` | `7d`                                 |
    /// | `SECURE_COOKIES`     | `false`                                  |
    /// | `BCRYPT_COST`        | `10`                                     |
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:3100"),
            database_url: env_or("DATABASE_URL", "postgres://localhost:5432/edugate"),
            access_secret: resolve_secret("JWT_ACCESS_SECRET", "jwt-access-secret"),
            access_duration: env_or("JWT_EXPIRES_IN", "15m"),
            refresh_secret: resolve_secret("JWT_REFRESH_SECRET", "jwt-refresh-secret"),
            refresh_duration: env_or("JWT_REFRESH_EXPIRES_IN", "7d"),
            secure_cookies: std::env::var("SECURE_COOKIES")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            bcrypt_cost: std::env::var("BCRYPT_COST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(BCRYPT_COST),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}
