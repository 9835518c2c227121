//! Application configuration loaded from environment variables.

use std::time::Duration;

use domain::CommissionRate;
use settlement::{RetryPolicy, SettlementConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server and settlement configuration.
///
/// Reads from environment variables; a missing or unparsable value falls
/// back to its default:
/// - `HOST` (`0.0.0.0`), `PORT` (`3000`)
/// - `RUST_LOG` (`info`), `LOG_FORMAT` (`text` or `json`)
/// - `DATABASE_URL`: unset keeps events in memory
/// - `COMMISSION_RATE_BPS` (`1000`, i.e. 10%)
/// - `RETRY_MAX_ATTEMPTS` (`3`), `RETRY_INITIAL_BACKOFF_MS` (`100`),
///   `RETRY_MAX_BACKOFF_MS` (`2000`), `REQUEST_TIMEOUT_MS` (`5000`)
/// - `PROJECTION_INTERVAL_MS` (`500`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub commission_rate: CommissionRate,
    pub retry: RetryPolicy,
    pub projection_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |name: &str, default: Duration| {
            parsed(name)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let retry = RetryPolicy::new(
            parsed("RETRY_MAX_ATTEMPTS")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.retry.max_attempts),
            millis("RETRY_INITIAL_BACKOFF_MS", defaults.retry.initial_backoff),
            millis("RETRY_MAX_BACKOFF_MS", defaults.retry.max_backoff),
            millis("REQUEST_TIMEOUT_MS", defaults.retry.timeout),
        );

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            commission_rate: parsed("COMMISSION_RATE_BPS")
                .and_then(|bps| u32::try_from(bps).ok())
                .and_then(|bps| CommissionRate::from_bps(bps).ok())
                .unwrap_or(defaults.commission_rate),
            retry,
            projection_interval: millis("PROJECTION_INTERVAL_MS", defaults.projection_interval),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn settlement(&self) -> SettlementConfig {
        SettlementConfig::new(self.commission_rate, self.retry)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            commission_rate: CommissionRate::default(),
            retry: RetryPolicy::default(),
            projection_interval: Duration::from_millis(500),
        }
    }
}
