//! Client configuration.
//!
//! Configuration is loaded from environment variables (a `.env` file is
//! honoured in development) or built directly with [`ClientConfig::new`]
//! when the caller already has the values. Secrets are validated before
//! use: placeholder values and low-entropy strings are rejected at load
//! time rather than producing confusing 401s later.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {name}: {reason}")]
    InvalidEnvVar { name: String, reason: String },

    #[error("insecure secret in {name}: {reason}")]
    InsecureSecret { name: String, reason: String },
}

// ============================================================================
// Secret validation
// ============================================================================

/// Common placeholder values that indicate an unconfigured secret.
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "your_",
    "changeme",
    "change-me",
    "placeholder",
    "example",
    "fixme",
    "dummy",
    "xxx",
];

/// Minimum Shannon entropy (bits per character) for secrets.
///
/// Real API keys and JWTs comfortably exceed this; english words and
/// keyboard mashing do not.
const MIN_SECRET_ENTROPY: f64 = 3.3;

/// Calculate Shannon entropy of a string in bits per character.
fn shannon_entropy(value: &str) -> f64 {
    if value.is_empty() {
        return 0.0;
    }

    let mut counts = std::collections::HashMap::new();
    for c in value.chars() {
        *counts.entry(c).or_insert(0u32) += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    let len = value.chars().count() as f64;

    counts
        .values()
        .map(|&count| {
            let p = f64::from(count) / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate a secret value without touching the environment.
fn validate_secret_value(name: &str, value: &str, min_length: usize) -> Result<(), ConfigError> {
    if value.len() < min_length {
        return Err(ConfigError::InsecureSecret {
            name: name.to_string(),
            reason: format!("must be at least {min_length} characters"),
        });
    }

    let lowered = value.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lowered.contains(pattern) {
            return Err(ConfigError::InsecureSecret {
                name: name.to_string(),
                reason: format!("looks like a placeholder (contains {pattern:?})"),
            });
        }
    }

    if shannon_entropy(value) < MIN_SECRET_ENTROPY {
        return Err(ConfigError::InsecureSecret {
            name: name.to_string(),
            reason: "entropy too low for a real credential".to_string(),
        });
    }

    Ok(())
}

// ============================================================================
// Environment helpers
// ============================================================================

fn get_required_env(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn get_env_or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env_or_default<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidEnvVar {
            name: name.to_string(),
            reason: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}

fn get_validated_secret(name: &str, min_length: usize) -> Result<SecretString, ConfigError> {
    let value = get_required_env(name)?;
    validate_secret_value(name, &value, min_length)?;
    Ok(SecretString::from(value))
}

// ============================================================================
// Sync policy
// ============================================================================

/// Retry policy for the cart sync worker.
#[derive(Debug, Clone, Copy)]
pub struct SyncPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on the exponential backoff.
    pub max_delay: Duration,
    /// Random jitter added on top of every delay.
    pub jitter: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            jitter: Duration::from_millis(250),
        }
    }
}

impl SyncPolicy {
    /// Delay before retry number `attempt` (1-based).
    ///
    /// Exponential backoff capped at `max_delay`, raised to any
    /// server-provided `retry_after`, plus random jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let mut delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(shift))
            .min(self.max_delay);

        if let Some(floor) = retry_after {
            delay = delay.max(floor);
        }

        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms > 0 {
            delay += Duration::from_millis(rand::rng().random_range(0..=jitter_ms));
        }

        delay
    }
}

// ============================================================================
// Cache configuration
// ============================================================================

/// Tuning for the catalog read cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            capacity: 1000,
        }
    }
}

// ============================================================================
// Client configuration
// ============================================================================

/// Everything needed to construct an [`crate::state::AppState`].
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the backend (PostgREST and GoTrue live under it).
    pub backend_url: Url,
    /// Public API key sent with every request.
    pub anon_key: SecretString,
    /// Where the local cart file lives.
    pub cart_path: PathBuf,
    /// Catalog read cache tuning.
    pub catalog_cache: CacheConfig,
    /// Cart sync retry policy.
    pub sync: SyncPolicy,
    /// Attempts per line when settling stock at checkout.
    pub stock_retries: u32,
}

impl ClientConfig {
    /// Build a configuration with defaults for everything but the
    /// backend coordinates.
    #[must_use]
    pub fn new(backend_url: Url, anon_key: SecretString) -> Self {
        Self {
            backend_url,
            anon_key,
            cart_path: PathBuf::from("shopconnect-cart.json"),
            catalog_cache: CacheConfig::default(),
            sync: SyncPolicy::default(),
            stock_retries: 3,
        }
    }

    /// Load configuration from the environment.
    ///
    /// Reads a `.env` file first if one is present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing, a
    /// value fails to parse, or the anon key fails secret validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let raw_url = get_required_env("SHOPCONNECT_BACKEND_URL")?;
        let backend_url = Url::parse(&raw_url).map_err(|e| ConfigError::InvalidEnvVar {
            name: "SHOPCONNECT_BACKEND_URL".to_string(),
            reason: format!("{e}"),
        })?;

        let anon_key = get_validated_secret("SHOPCONNECT_ANON_KEY", 20)?;

        let cart_path = PathBuf::from(get_env_or_default(
            "SHOPCONNECT_CART_PATH",
            "shopconnect-cart.json",
        ));

        let catalog_cache = CacheConfig {
            ttl: Duration::from_secs(parse_env_or_default("SHOPCONNECT_CACHE_TTL_SECS", 300)?),
            capacity: parse_env_or_default("SHOPCONNECT_CACHE_CAPACITY", 1000)?,
        };

        let sync = SyncPolicy {
            base_delay: Duration::from_millis(parse_env_or_default(
                "SHOPCONNECT_SYNC_BASE_MS",
                500,
            )?),
            max_delay: Duration::from_secs(parse_env_or_default("SHOPCONNECT_SYNC_MAX_SECS", 60)?),
            ..SyncPolicy::default()
        };

        let stock_retries = parse_env_or_default("SHOPCONNECT_STOCK_RETRIES", 3)?;

        Ok(Self {
            backend_url,
            anon_key,
            cart_path,
            catalog_cache,
            sync,
            stock_retries,
        })
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("backend_url", &self.backend_url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("cart_path", &self.cart_path)
            .field("catalog_cache", &self.catalog_cache)
            .field("sync", &self.sync)
            .field("stock_retries", &self.stock_retries)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
