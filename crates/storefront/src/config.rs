//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront (used for payment return URLs)
//! - `ASSET_UPLOAD_URL` - Asset endpoint that stores payment-proof images
//! - `ASSET_UPLOAD_TOKEN` - Bearer token for the asset endpoint
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_CURRENCY` - Display currency (default: PHP)
//! - `STOREFRONT_ADMIN_EMAILS` - Comma-separated operator emails allowed on `/admin`
//! - `STOREFRONT_LOG_FORMAT` - `json` for structured logs, anything else for text
//! - `ASSET_MAX_BYTES` - Maximum proof image size (default: 10 MiB)
//! - `PAYMONGO_SECRET_KEY` - Enables the PayMongo redirect payment method
//! - `PAYMONGO_API_BASE` - PayMongo API base (default: <https://api.paymongo.com/v1>)
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `EMAIL_FROM`,
//!   `ADMIN_NOTIFY_EMAIL` - Order notification email (all required to enable)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT` - Sentry error tracking

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use bytestall_core::{CurrencyCode, Email};
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;
const DEFAULT_ASSET_MAX_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_PAYMONGO_API_BASE: &str = "https://api.paymongo.com/v1";

/// Blocklist of common placeholder patterns (case-insensitive).
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: Url,
    /// Display currency for cart and order totals
    pub currency: CurrencyCode,
    /// Operators allowed to use the admin routes
    pub admin_emails: Vec<Email>,
    /// Log output format
    pub log_format: LogFormat,
    /// PayMongo configuration (redirect payments are disabled when absent)
    pub paymongo: Option<PayMongoConfig>,
    /// Payment-proof asset upload configuration
    pub assets: AssetConfig,
    /// SMTP notification configuration (notifications are logged when absent)
    pub email: Option<EmailConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// PayMongo API configuration.
///
/// Implements `Debug` manually to redact the secret key.
#[derive(Clone)]
pub struct PayMongoConfig {
    /// Secret API key (`sk_live_...` / `sk_test_...`)
    pub secret_key: SecretString,
    /// API base URL
    pub api_base: Url,
}

impl std::fmt::Debug for PayMongoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayMongoConfig")
            .field("secret_key", &"[REDACTED]")
            .field("api_base", &self.api_base.as_str())
            .finish()
    }
}

/// Asset upload configuration.
#[derive(Clone)]
pub struct AssetConfig {
    /// Upload endpoint
    pub upload_url: Url,
    /// Bearer token
    pub token: SecretString,
    /// Maximum accepted image size in bytes
    pub max_bytes: usize,
}

impl std::fmt::Debug for AssetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetConfig")
            .field("upload_url", &self.upload_url.as_str())
            .field("token", &"[REDACTED]")
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

/// SMTP configuration for order notifications.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    /// Sender address
    pub from_address: String,
    /// Operator inbox that receives new-order notifications
    pub admin_address: Email,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .field("admin_address", &self.admin_address.as_str())
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = parse_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env("STOREFRONT_PORT", "3000")?;
        let base_url = get_url("STOREFRONT_BASE_URL")?;
        let currency = get_env_or_default("STOREFRONT_CURRENCY", "PHP")
            .parse::<CurrencyCode>()
            .map_err(|e| ConfigError::InvalidEnvVar("STOREFRONT_CURRENCY".to_string(), e))?;
        let admin_emails = parse_email_list(
            "STOREFRONT_ADMIN_EMAILS",
            &get_env_or_default("STOREFRONT_ADMIN_EMAILS", ""),
        )?;
        let log_format = match get_optional_env("STOREFRONT_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            currency,
            admin_emails,
            log_format,
            paymongo: PayMongoConfig::from_env()?,
            assets: AssetConfig::from_env()?,
            email: EmailConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether `email` belongs to a configured operator.
    #[must_use]
    pub fn is_admin(&self, email: &Email) -> bool {
        self.admin_emails.contains(email)
    }
}

impl PayMongoConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        if get_optional_env("PAYMONGO_SECRET_KEY").is_none() {
            return Ok(None);
        }
        let api_base = Url::parse(&get_env_or_default(
            "PAYMONGO_API_BASE",
            DEFAULT_PAYMONGO_API_BASE,
        ))
        .map_err(|e| ConfigError::InvalidEnvVar("PAYMONGO_API_BASE".to_string(), e.to_string()))?;

        Ok(Some(Self {
            secret_key: get_validated_secret("PAYMONGO_SECRET_KEY")?,
            api_base,
        }))
    }
}

impl AssetConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            upload_url: get_url("ASSET_UPLOAD_URL")?,
            token: get_validated_secret("ASSET_UPLOAD_TOKEN")?,
            max_bytes: parse_env("ASSET_MAX_BYTES", &DEFAULT_ASSET_MAX_BYTES.to_string())?,
        })
    }
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };
        let admin_address = Email::parse(&get_required_env("ADMIN_NOTIFY_EMAIL")?).map_err(|e| {
            ConfigError::InvalidEnvVar("ADMIN_NOTIFY_EMAIL".to_string(), e.to_string())
        })?;

        Ok(Some(Self {
            smtp_host,
            smtp_port: parse_env("SMTP_PORT", "587")?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: SecretString::from(get_required_env("SMTP_PASSWORD")?),
            from_address: get_required_env("EMAIL_FROM")?,
            admin_address,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    std::env::var(primary_key)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional, non-empty environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Get a required environment variable as an absolute URL.
fn get_url(key: &str) -> Result<Url, ConfigError> {
    Url::parse(&get_required_env(key)?)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a comma-separated list of emails, skipping blanks.
fn parse_email_list(key: &str, raw: &str) -> Result<Vec<Email>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Email::parse(s).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
        .collect()
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Reject placeholder values and low-entropy secrets.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
