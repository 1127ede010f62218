use std::time::Duration;

/// Chat API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HS256 secret shared with the identity provider that issues access tokens.
    pub jwt_secret: String,
    /// Expected `iss` claim on access tokens.
    pub jwt_issuer: String,
    /// Expected `aud` claim on access tokens.
    pub jwt_audience: String,
    /// PostgreSQL connection string. `None` runs against the in-memory store.
    pub database_url: Option<String>,
    /// Redis URL for the notification queue. `None` uses the in-process queue.
    pub redis_url: Option<String>,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Deadline for resolving a connection's memberships during connect.
    pub connect_timeout: Duration,
    /// Deadline for a single private or group send.
    pub send_timeout: Duration,
    /// Publish attempts after the first before a notification is given up on.
    pub queue_max_retries: u32,
    /// Backoff before the first publish retry; doubles per attempt.
    pub queue_retry_backoff: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            jwt_secret: required_var("JWT_SECRET"),
            jwt_issuer: var_or("JWT_ISSUER", "chat-identity"),
            jwt_audience: var_or("JWT_AUDIENCE", "chat-api"),
            database_url: optional_var("DATABASE_URL"),
            redis_url: optional_var("REDIS_URL"),
            port: parsed_var("PORT", 4100),
            connect_timeout: Duration::from_millis(parsed_var("CONNECT_TIMEOUT_MS", 5000)),
            send_timeout: Duration::from_millis(parsed_var("SEND_TIMEOUT_MS", 5000)),
            queue_max_retries: parsed_var("QUEUE_MAX_RETRIES", 3),
            queue_retry_backoff: Duration::from_millis(parsed_var("QUEUE_RETRY_BACKOFF_MS", 50)),
        }
    }

    /// Configuration for tests and local tooling: in-memory backends and
    /// short deadlines.
    pub fn for_tests(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            jwt_issuer: "chat-identity".to_string(),
            jwt_audience: "chat-api".to_string(),
            database_url: None,
            redis_url: None,
            port: 0,
            connect_timeout: Duration::from_secs(2),
            send_timeout: Duration::from_secs(2),
            queue_max_retries: 2,
            queue_retry_backoff: Duration::from_millis(1),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    optional_var(name).unwrap_or_else(|| default.to_string())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
