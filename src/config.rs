/// Configuration management for Estate Portal
use crate::error::{PortalError, PortalResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub email: Option<EmailConfig>,
    pub payments: PaymentConfig,
    pub invites: InviteConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Public application URL used in invitation and callback links
    pub base_url: String,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
    /// Mark the session cookie `Secure`
    pub secure_cookies: bool,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Mobile-money provider configuration shared by every property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    pub callback_url: String,
    pub request_timeout_secs: u64,
    /// Minutes a transaction may sit in `pending` before reconciliation fails it
    pub pending_timeout_minutes: i64,
    /// Hours a transaction may sit in `processing` without a callback
    pub processing_timeout_hours: i64,
}

/// Invitation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteConfig {
    pub ttl_days: i64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> PortalResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("PORTAL_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORTAL_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| PortalError::Validation("Invalid port number".to_string()))?;
        let base_url = env::var("PORTAL_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();
        let version = env!("CARGO_PKG_VERSION").to_string();

        let database_path = env::var("PORTAL_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/portal.sqlite"));
        let max_connections = env_or("PORTAL_DATABASE_MAX_CONNECTIONS", 10);

        let jwt_secret = env::var("PORTAL_JWT_SECRET")
            .map_err(|_| PortalError::Validation("JWT secret required".to_string()))?;
        let session_ttl_hours = env_or("PORTAL_SESSION_TTL_HOURS", 24 * 7);
        let secure_cookies = base_url.starts_with("https://");

        let email = if let Ok(smtp_url) = env::var("PORTAL_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("PORTAL_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let callback_url = env::var("PORTAL_MPESA_CALLBACK_URL")
            .unwrap_or_else(|_| format!("{}/api/payments/callback", base_url));

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("PORTAL_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                base_url,
                version,
            },
            storage: StorageConfig {
                database_path,
                max_connections,
            },
            authentication: AuthConfig {
                jwt_secret,
                session_ttl_hours,
                secure_cookies,
            },
            email,
            payments: PaymentConfig {
                callback_url,
                request_timeout_secs: env_or("PORTAL_MPESA_TIMEOUT_SECS", 30),
                pending_timeout_minutes: env_or("PORTAL_PAYMENT_PENDING_TIMEOUT_MINUTES", 15),
                processing_timeout_hours: env_or("PORTAL_PAYMENT_PROCESSING_TIMEOUT_HOURS", 24),
            },
            invites: InviteConfig {
                ttl_days: env_or("PORTAL_INVITE_TTL_DAYS", 7),
            },
            rate_limit: RateLimitConfig {
                enabled: env_or("PORTAL_RATE_LIMITS_ENABLED", true),
                requests_per_second: env_or("PORTAL_RATE_LIMIT_RPS", 50),
            },
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> PortalResult<()> {
        if self.service.hostname.is_empty() {
            return Err(PortalError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(PortalError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.session_ttl_hours <= 0 {
            return Err(PortalError::Validation(
                "Session TTL must be positive".to_string(),
            ));
        }

        if !self.payments.callback_url.starts_with("http") {
            return Err(PortalError::Validation(
                "Payment callback URL must be an absolute http(s) URL".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration used by unit tests
    #[cfg(test)]
    pub fn for_tests() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
                version: "0.1.0".to_string(),
            },
            storage: StorageConfig {
                database_path: PathBuf::from(":memory:"),
                max_connections: 1,
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-key-for-testing-only-0123".to_string(),
                session_ttl_hours: 24,
                secure_cookies: false,
            },
            email: None,
            payments: PaymentConfig {
                callback_url: "http://localhost:8080/api/payments/callback".to_string(),
                request_timeout_secs: 5,
                pending_timeout_minutes: 15,
                processing_timeout_hours: 24,
            },
            invites: InviteConfig { ttl_days: 7 },
            rate_limit: RateLimitConfig {
                enabled: false,
                requests_per_second: 1000,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }
}
