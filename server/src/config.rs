//! Environment-driven configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

const DEV_JWT_SECRET: &str = "skillswap-dev-secret";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("JWT_SECRET must be set when DATABASE_URL is configured")]
    MissingJwtSecret,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs on the in-memory store
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub host: IpAddr,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub bcrypt_cost: u32,
    pub cors_allowed_origins: Vec<String>,
    pub admin_emails: Vec<String>,
    /// Cron expression for the counter audit; `None` disables it
    pub counter_audit_cron: Option<String>,
    /// Requests per client and window on `/api`; 0 disables the limit
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 5,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5000,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_expiry_hours: 24 * 7,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            cors_allowed_origins: Vec::new(),
            admin_emails: Vec::new(),
            counter_audit_cron: Some("0 */15 * * * *".to_string()),
            rate_limit_max: 100,
            rate_limit_window_secs: 15 * 60,
        }
    }
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let database_url = var("DATABASE_URL").filter(|v| !v.is_empty());
        let jwt_secret = match var("JWT_SECRET").filter(|v| !v.is_empty()) {
            Some(secret) => secret,
            None if database_url.is_some() => return Err(ConfigError::MissingJwtSecret),
            None => {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                defaults.jwt_secret
            }
        };

        Ok(Self {
            database_max_connections: parse(
                "DATABASE_MAX_CONNECTIONS",
                var("DATABASE_MAX_CONNECTIONS"),
                defaults.database_max_connections,
                "number",
            )?,
            host: parse("HOST", var("HOST"), defaults.host, "IP address")?,
            port: parse("PORT", var("PORT"), defaults.port, "port number")?,
            jwt_expiry_hours: parse(
                "JWT_EXPIRY_HOURS",
                var("JWT_EXPIRY_HOURS"),
                defaults.jwt_expiry_hours,
                "number",
            )?,
            bcrypt_cost: parse("BCRYPT_COST", var("BCRYPT_COST"), defaults.bcrypt_cost, "number")?,
            cors_allowed_origins: split_list(var("CORS_ALLOWED_ORIGINS")),
            admin_emails: split_list(var("ADMIN_EMAILS"))
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
            counter_audit_cron: match var("COUNTER_AUDIT_CRON") {
                Some(cron) if cron.is_empty() => None,
                Some(cron) => Some(cron),
                None => defaults.counter_audit_cron,
            },
            rate_limit_max: parse(
                "RATE_LIMIT_MAX",
                var("RATE_LIMIT_MAX"),
                defaults.rate_limit_max,
                "number",
            )?,
            rate_limit_window_secs: parse(
                "RATE_LIMIT_WINDOW_SECS",
                var("RATE_LIMIT_WINDOW_SECS"),
                defaults.rate_limit_window_secs,
                "number",
            )?,
            database_url,
            jwt_secret,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

fn parse<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value: v,
        }),
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
