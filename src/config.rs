/// Configuration management for the FarmCert service
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
    /// Allowed CORS origin; `None` allows any origin
    pub cors_origin: Option<String>,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub account_db: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    /// Access token lifetime in seconds
    pub access_token_ttl: i64,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl: i64,
    /// Shared secret allowing admin creation without an admin session
    pub bootstrap_token: Option<String>,
    /// Admin account created at start-up when absent
    pub seed_admin: Option<SeedAdminConfig>,
}

/// Admin account seeded on first start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedAdminConfig {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            authenticated_rps: 100,
            unauthenticated_rps: 10,
            burst_size: 50,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

const DEFAULT_ACCESS_TTL: i64 = 24 * 3600;
const DEFAULT_REFRESH_TTL: i64 = 7 * 24 * 3600;

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("FARMCERT_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("FARMCERT_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;
        let version = env!("CARGO_PKG_VERSION").to_string();
        let cors_origin = env::var("FARMCERT_CORS_ORIGIN").ok().filter(|s| !s.is_empty());

        let data_directory: PathBuf = env::var("FARMCERT_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let account_db = env::var("FARMCERT_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("farmcert.sqlite"));

        let access_token_secret = env::var("FARMCERT_JWT_SECRET")
            .map_err(|_| AppError::Validation("JWT secret required".to_string()))?;
        let refresh_token_secret = env::var("FARMCERT_JWT_REFRESH_SECRET")
            .map_err(|_| AppError::Validation("JWT refresh secret required".to_string()))?;
        let access_token_ttl = env::var("FARMCERT_ACCESS_TOKEN_TTL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_ACCESS_TTL);
        let refresh_token_ttl = env::var("FARMCERT_REFRESH_TOKEN_TTL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REFRESH_TTL);
        let bootstrap_token = env::var("FARMCERT_BOOTSTRAP_TOKEN")
            .ok()
            .filter(|s| !s.is_empty());

        let seed_admin = match (
            env::var("FARMCERT_ADMIN_EMAIL"),
            env::var("FARMCERT_ADMIN_PASSWORD"),
        ) {
            (Ok(email), Ok(password)) => Some(SeedAdminConfig {
                email,
                password,
                name: env::var("FARMCERT_ADMIN_NAME")
                    .unwrap_or_else(|_| "System Administrator".to_string()),
            }),
            _ => None,
        };

        let rate_limit_enabled = env::var("FARMCERT_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let defaults = RateLimitConfig::default();
        let authenticated_rps = env::var("FARMCERT_RATE_LIMIT_AUTHENTICATED_RPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.authenticated_rps);
        let unauthenticated_rps = env::var("FARMCERT_RATE_LIMIT_UNAUTHENTICATED_RPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.unauthenticated_rps);
        let burst_size = env::var("FARMCERT_RATE_LIMIT_BURST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.burst_size);

        let log_level = env::var("FARMCERT_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
        let log_format = match env::var("FARMCERT_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
                cors_origin,
            },
            storage: StorageConfig {
                data_directory,
                account_db,
            },
            authentication: AuthConfig {
                access_token_secret,
                refresh_token_secret,
                access_token_ttl,
                refresh_token_ttl,
                bootstrap_token,
                seed_admin,
            },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                authenticated_rps,
                unauthenticated_rps,
                burst_size,
            },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        let auth = &self.authentication;
        if auth.access_token_secret.len() < 32 || auth.refresh_token_secret.len() < 32 {
            return Err(AppError::Validation(
                "JWT secrets must be at least 32 characters".to_string(),
            ));
        }

        if auth.access_token_secret == auth.refresh_token_secret {
            return Err(AppError::Validation(
                "Access and refresh token secrets must differ".to_string(),
            ));
        }

        if auth.access_token_ttl <= 0 || auth.refresh_token_ttl <= 0 {
            return Err(AppError::Validation("Token lifetimes must be positive".to_string()));
        }

        if auth.access_token_ttl > auth.refresh_token_ttl {
            return Err(AppError::Validation(
                "Access token lifetime cannot exceed refresh token lifetime".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration suitable for tests: in-memory database, fixed secrets
    pub fn for_testing() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 0,
                version: env!("CARGO_PKG_VERSION").to_string(),
                cors_origin: None,
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                account_db: PathBuf::from(":memory:"),
            },
            authentication: AuthConfig {
                access_token_secret: "test-access-secret-key-for-testing-only".to_string(),
                refresh_token_secret: "test-refresh-secret-key-for-testing-only".to_string(),
                access_token_ttl: DEFAULT_ACCESS_TTL,
                refresh_token_ttl: DEFAULT_REFRESH_TTL,
                bootstrap_token: Some("test-bootstrap-token".to_string()),
                seed_admin: None,
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                ..RateLimitConfig::default()
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}
