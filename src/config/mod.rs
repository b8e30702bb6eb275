/// Configuration management for the academy service
///
/// Handles server binding, database location, workflow timings, auth limits
/// and notification delivery. Every value can be overridden through an
/// `ACADEMY_*` environment variable.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Enquiry/payment workflow settings
    pub workflow: WorkflowConfig,
    /// Session, OTP and bootstrap admin settings
    pub auth: AuthConfig,
    /// Outbound notification settings
    pub notify: NotifyConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL (default: "sqlite://data/academy.db")
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Public front-end origin used to build payment links: {public_url}/payment/{token}
    pub public_url: String,
    /// Lifetime of a freshly minted payment token
    pub payment_token_ttl_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub session_ttl_hours: i64,
    pub otp_ttl_minutes: i64,
    /// Wrong guesses allowed before an OTP code is burned
    pub otp_max_attempts: i64,
    /// Optional admin account created at startup when both email and password are set
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub admin_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// When unset, notifications are only written to the log
    pub webhook_url: Option<String>,
}

impl Config {
    /// Build configuration from ACADEMY_* environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("ACADEMY_HOST", "0.0.0.0"),
                port: env_parse("ACADEMY_PORT", 5000),
            },
            database: DatabaseConfig {
                url: env_or("ACADEMY_DATABASE_URL", "sqlite://data/academy.db"),
            },
            workflow: WorkflowConfig {
                public_url: env_or("ACADEMY_PUBLIC_URL", "http://localhost:3000")
                    .trim_end_matches('/')
                    .to_string(),
                payment_token_ttl_hours: env_parse("ACADEMY_PAYMENT_TOKEN_TTL_HOURS", 168),
            },
            auth: AuthConfig {
                session_ttl_hours: env_parse("ACADEMY_SESSION_TTL_HOURS", 24),
                otp_ttl_minutes: env_parse("ACADEMY_OTP_TTL_MINUTES", 10),
                otp_max_attempts: env_parse("ACADEMY_OTP_MAX_ATTEMPTS", 5),
                admin_email: env_opt("ACADEMY_ADMIN_EMAIL"),
                admin_password: env_opt("ACADEMY_ADMIN_PASSWORD"),
                admin_name: env_or("ACADEMY_ADMIN_NAME", "Administrator"),
            },
            notify: NotifyConfig {
                webhook_url: env_opt("ACADEMY_NOTIFY_WEBHOOK_URL"),
            },
        }
    }

    /// Configuration for tests and embedded use: in-memory database, no webhook
    pub fn in_memory() -> Self {
        let mut config = Self::from_env();
        config.database.url = "sqlite::memory:".to_string();
        config.notify.webhook_url = None;
        config.auth.admin_email = None;
        config.auth.admin_password = None;
        config
    }
}

impl WorkflowConfig {
    /// Payment link shown to the admin and mailed to the student
    pub fn payment_link(&self, token: &str) -> String {
        format!("{}/payment/{}", self.public_url, token)
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
