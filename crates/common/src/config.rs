use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 10)
    pub db_max_connections: u32,

    /// Socket address the API server binds to (default: 0.0.0.0:3000)
    pub api_bind_addr: String,

    /// JWT secret for admin API authentication
    pub jwt_secret: String,

    /// Shared secret expected in `X-Cron-Secret` on job trigger endpoints
    pub cron_secret: String,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Resend API base URL
    pub resend_api_url: String,

    /// Email sender address
    pub email_from: String,

    /// Public URL of the web app, used for links inside templates
    pub app_base_url: String,

    /// Scheduler poll interval in milliseconds (default: 60000)
    pub scheduler_poll_interval_ms: u64,

    /// Interval between re-engagement runs in seconds (default: 86400)
    pub reengage_interval_secs: u64,

    /// Days since last login before a user is considered inactive (default: 7)
    pub reengage_inactivity_days: i64,

    /// Minimum days between two re-engagement emails to the same user (default: 21)
    pub reengage_cooldown_days: i64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "10")?,
            api_bind_addr: std::env::var("API_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            cron_secret: std::env::var("CRON_SECRET")
                .map_err(|_| anyhow::anyhow!("CRON_SECRET environment variable is required"))?,
            resend_api_key: std::env::var("RESEND_API_KEY").ok(),
            resend_api_url: std::env::var("RESEND_API_URL")
                .unwrap_or_else(|_| "https://api.resend.com".to_string()),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Courier <noreply@localhost>".to_string()),
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            scheduler_poll_interval_ms: parse_var("SCHEDULER_POLL_INTERVAL_MS", "60000")?,
            reengage_interval_secs: parse_var("REENGAGE_INTERVAL_SECS", "86400")?,
            reengage_inactivity_days: parse_var("REENGAGE_INACTIVITY_DAYS", "7")?,
            reengage_cooldown_days: parse_var("REENGAGE_COOLDOWN_DAYS", "21")?,
        })
    }
}

/// Read a numeric variable, falling back to `default` when unset.
fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> anyhow::Result<T> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a valid {}", name, std::any::type_name::<T>()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_default() {
        let value: u64 = parse_var("COURIER_TEST_UNSET_VARIABLE", "42").unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        let result: anyhow::Result<u32> = parse_var("COURIER_TEST_UNSET_VARIABLE", "abc");
        assert!(result.is_err());
    }
}
