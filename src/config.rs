use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_FCM_API_URL: &str = "https://fcm.googleapis.com/v1";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub fcm: FcmConfig,
    pub push: PushDefaults,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL for the persistent token store.
    /// When `None` registrations live in process memory only.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmConfig {
    /// Path to the Google service-account key JSON.
    pub service_account_path: String,
    /// Overrides the `project_id` found in the service-account key.
    pub project_id: Option<String>,
    /// Base of the FCM HTTP v1 API, e.g. `https://fcm.googleapis.com/v1`.
    pub api_url: String,
    /// Bound applied to every outbound call (token exchange and send).
    pub timeout_seconds: u64,
}

/// Static platform defaults baked into every push payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PushDefaults {
    pub app_url: String,
    pub icon_url: String,
    pub badge_url: String,
    pub android_channel_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for /api endpoints
    pub per_second: u32,
    /// Burst size for /api endpoints
    pub burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let service_account_path = env::var("FCM_SERVICE_ACCOUNT_PATH")
            .or_else(|_| env::var("GOOGLE_APPLICATION_CREDENTIALS"))
            .map_err(|_| ConfigError::MissingEnv("FCM_SERVICE_ACCOUNT_PATH".to_string()))?;

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("PORT", 8080)?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
                max_connections: nonzero("DATABASE_MAX_CONNECTIONS", env_or("DATABASE_MAX_CONNECTIONS", 5)?)?,
            },
            fcm: FcmConfig {
                service_account_path,
                project_id: env::var("FCM_PROJECT_ID").ok(),
                api_url: env::var("FCM_API_URL").unwrap_or_else(|_| DEFAULT_FCM_API_URL.to_string()),
                timeout_seconds: nonzero("PUSH_TIMEOUT_SECONDS", env_or("PUSH_TIMEOUT_SECONDS", 5)?)?,
            },
            push: PushDefaults {
                app_url: env::var("PUSH_APP_URL")
                    .unwrap_or_else(|_| "https://jibzo.vercel.app".to_string()),
                icon_url: env::var("PUSH_ICON_URL")
                    .unwrap_or_else(|_| "/icon-192x192.png".to_string()),
                badge_url: env::var("PUSH_BADGE_URL")
                    .unwrap_or_else(|_| "/badge-72x72.png".to_string()),
                android_channel_id: env::var("PUSH_ANDROID_CHANNEL_ID")
                    .unwrap_or_else(|_| "chat_messages".to_string()),
            },
            rate_limit: RateLimitConfig {
                per_second: nonzero("RATE_LIMIT_PER_SECOND", env_or("RATE_LIMIT_PER_SECOND", 5)?)?,
                burst: nonzero("RATE_LIMIT_BURST", env_or("RATE_LIMIT_BURST", 20)?)?,
            },
        })
    }
}

/// Read `name` from the environment, falling back to `default` when unset.
fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    parse_or(name, env::var(name).ok(), default)
}

fn parse_or<T: FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        None => Ok(default),
    }
}

fn nonzero<T: Default + PartialEq>(name: &str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::InvalidValue(name.to_string()));
    }
    Ok(value)
}

impl RateLimitConfig {
    /// Time for the limiter to replenish one request slot.
    pub fn replenish_interval(&self) -> Duration {
        Duration::from_secs(1) / self.per_second.max(1)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
            },
            fcm: FcmConfig {
                service_account_path: String::new(),
                project_id: None,
                api_url: DEFAULT_FCM_API_URL.to_string(),
                timeout_seconds: 5,
            },
            push: PushDefaults::default(),
            rate_limit: RateLimitConfig {
                per_second: 5,
                burst: 20,
            },
        }
    }
}

impl Default for PushDefaults {
    fn default() -> Self {
        PushDefaults {
            app_url: "https://jibzo.vercel.app".to_string(),
            icon_url: "/icon-192x192.png".to_string(),
            badge_url: "/badge-72x72.png".to_string(),
            android_channel_id: "chat_messages".to_string(),
        }
    }
}
